//! Two parties and a judge on one in-memory network.

use std::sync::Arc;
use std::time::Duration;

use escrow_channel_core::{Account, ChannelId, Judge, Keypair, SecretSeed};
use escrow_channel_store::MemoryStore;
use escrow_channel_transport::{Delivery, Inbox, MemoryNetwork, MemoryTransport};

use crate::config::ClientConfig;
use crate::context::Context;
use crate::receiver::Inbound;

pub(crate) const ALICE: &str = "alice:3001";
pub(crate) const BOB: &str = "bob:3002";
pub(crate) const JUDGE: &str = "judge:3004";

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub(crate) struct Party {
    pub ctx: Context<MemoryStore, MemoryTransport>,
    pub inbox: Inbox,
    pub account: Account,
}

impl Party {
    /// The next delivery in this party's inbox.
    pub async fn next(&self) -> Delivery {
        next(&self.inbox).await
    }

    /// Take the next delivery and hand it to this party's receiver.
    pub async fn handle_next(&self) -> Inbound {
        let delivery = self.next().await;
        self.ctx.receiver().deliver(delivery).await.unwrap()
    }
}

pub(crate) struct Pair {
    pub network: Arc<MemoryNetwork>,
    pub alice: Party,
    pub bob: Party,
    pub judge: Judge,
    pub judge_inbox: Inbox,
}

pub(crate) async fn next(inbox: &Inbox) -> Delivery {
    inbox
        .recv_timeout(Duration::from_secs(1))
        .await
        .unwrap()
        .expect("no delivery")
}

async fn party(
    network: &Arc<MemoryNetwork>,
    config: &ClientConfig,
    judge: &Judge,
    seed: [u8; 32],
    name: &str,
    address: &str,
    other: &Account,
) -> Party {
    let ctx = Context::new(MemoryStore::new(), network.create_transport(), config.clone());
    let registry = ctx.registry();
    registry.add_judge(judge.clone()).await.unwrap();
    let account = registry
        .add_account(name, SecretSeed(seed), address, judge.pubkey)
        .await
        .unwrap();
    registry
        .add_counterparty(other.name.clone(), other.pubkey, other.address.clone(), judge.pubkey)
        .await
        .unwrap();
    Party {
        inbox: network.register(address).await,
        ctx,
        account,
    }
}

pub(crate) async fn pair(config: ClientConfig) -> Pair {
    init_tracing();
    let network = MemoryNetwork::new();
    let judge = Judge {
        name: "joe".into(),
        pubkey: Keypair::from_seed(&SecretSeed([9; 32])).pubkey(),
        address: JUDGE.into(),
    };
    let judge_inbox = network.register(JUDGE).await;

    let alice_acct = Account::new("alice", SecretSeed([1; 32]), ALICE, judge.clone());
    let bob_acct = Account::new("bob", SecretSeed([2; 32]), BOB, judge.clone());

    let alice = party(&network, &config, &judge, [1; 32], "alice", ALICE, &bob_acct).await;
    let bob = party(&network, &config, &judge, [2; 32], "bob", BOB, &alice_acct).await;

    Pair {
        network,
        alice,
        bob,
        judge,
        judge_inbox,
    }
}

/// Run the opening handshake to completion; alice proposes.
pub(crate) async fn open(pair: &Pair) -> ChannelId {
    let channel = pair
        .alice
        .ctx
        .caller()
        .propose_channel(pair.alice.account.pubkey, pair.bob.account.pubkey, "s0".into(), Some(60))
        .await
        .unwrap();
    pair.alice.ctx.caller().confirm_channel(channel.channel_id).await.unwrap();

    pair.bob.handle_next().await;
    pair.bob.ctx.caller().confirm_channel(channel.channel_id).await.unwrap();
    pair.alice.handle_next().await;

    channel.channel_id
}
