//! Test fixtures and helpers.
//!
//! A fixture is a judge plus any number of parties on one in-memory
//! network. Every party registers the judge, its own account, and every
//! other party as a counterparty.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use escrow_channel::{ClientConfig, Context, Inbound};
use escrow_channel_core::{Account, ChannelId, Judge, Keypair, SecretSeed};
use escrow_channel_store::{MemoryStore, SqliteStore, Store};
use escrow_channel_transport::{Delivery, Inbox, MemoryNetwork, MemoryTransport};
use rand::Rng;

/// How long helpers wait for a delivery before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Address of the fixture's judge.
pub const JUDGE_ADDRESS: &str = "judge:3004";

/// A fresh random secret seed.
pub fn random_seed() -> SecretSeed {
    SecretSeed(rand::thread_rng().gen())
}

/// One party: its client context, inbox and local account.
pub struct TestParty<S: Store = MemoryStore> {
    pub ctx: Context<S, MemoryTransport>,
    pub inbox: Inbox,
    pub account: Account,
}

impl<S: Store> TestParty<S> {
    pub fn address(&self) -> &str {
        &self.account.address
    }

    /// Wait for the next delivery.
    pub async fn next(&self) -> Delivery {
        recv(&self.inbox).await
    }

    /// Wait for the next delivery and pass it to this party's receiver.
    pub async fn handle_next(&self) -> escrow_channel::Result<Inbound> {
        let delivery = self.next().await;
        self.ctx.receiver().deliver(delivery).await
    }
}

/// Wait for a delivery on `inbox`, panicking on timeout.
pub async fn recv(inbox: &Inbox) -> Delivery {
    match inbox.recv_timeout(RECV_TIMEOUT).await {
        Ok(Some(delivery)) => delivery,
        Ok(None) => panic!("no delivery for {} within {:?}", inbox.address(), RECV_TIMEOUT),
        Err(e) => panic!("inbox {} failed: {}", inbox.address(), e),
    }
}

/// A judge and its parties on one network.
pub struct TestFixture<S: Store = MemoryStore> {
    pub network: Arc<MemoryNetwork>,
    pub judge: Judge,
    pub judge_inbox: Inbox,
    pub parties: Vec<TestParty<S>>,
}

impl TestFixture<MemoryStore> {
    /// Alice (seed 1) and bob (seed 2) with default configuration.
    pub async fn new() -> Self {
        Self::with_config(ClientConfig::default()).await
    }

    pub async fn with_config(config: ClientConfig) -> Self {
        Self::build(
            &[("alice", [1; 32]), ("bob", [2; 32])],
            config,
            |_| MemoryStore::new(),
        )
        .await
    }

    /// `count` parties with random seeds, named `party-0`, `party-1`, ...
    pub async fn multi_party(count: usize) -> Self {
        let names: Vec<String> = (0..count).map(|i| format!("party-{}", i)).collect();
        let parties: Vec<(&str, [u8; 32])> = names
            .iter()
            .map(|name| (name.as_str(), random_seed().0))
            .collect();
        Self::build(&parties, ClientConfig::default(), |_| MemoryStore::new()).await
    }
}

impl TestFixture<SqliteStore> {
    /// Alice and bob, each with a SQLite database under `dir`.
    pub async fn sqlite(dir: &Path, config: ClientConfig) -> Self {
        Self::build(&[("alice", [1; 32]), ("bob", [2; 32])], config, |name| {
            SqliteStore::open(dir.join(format!("{}.db", name))).expect("open sqlite store")
        })
        .await
    }
}

impl<S: Store> TestFixture<S> {
    /// Build a fixture; `make_store` is called once per party name.
    pub async fn build(
        parties: &[(&str, [u8; 32])],
        config: ClientConfig,
        make_store: impl Fn(&str) -> S,
    ) -> Self {
        let network = MemoryNetwork::new();
        let judge = Judge {
            name: "joe".into(),
            pubkey: Keypair::from_seed(&SecretSeed([0x99; 32])).pubkey(),
            address: JUDGE_ADDRESS.into(),
        };
        let judge_inbox = network.register(JUDGE_ADDRESS).await;

        let accounts: Vec<Account> = parties
            .iter()
            .enumerate()
            .map(|(i, (name, seed))| {
                Account::new(*name, SecretSeed(*seed), format!("{}:{}", name, 3001 + i), judge.clone())
            })
            .collect();

        let mut built = Vec::with_capacity(accounts.len());
        for account in &accounts {
            let ctx = Context::new(make_store(&account.name), network.create_transport(), config.clone());
            let registry = ctx.registry();
            registry.add_judge(judge.clone()).await.expect("add judge");
            registry
                .add_account(
                    account.name.clone(),
                    account.privkey.clone(),
                    account.address.clone(),
                    judge.pubkey,
                )
                .await
                .expect("add account");
            for other in accounts.iter().filter(|a| a.pubkey != account.pubkey) {
                registry
                    .add_counterparty(other.name.clone(), other.pubkey, other.address.clone(), judge.pubkey)
                    .await
                    .expect("add counterparty");
            }

            built.push(TestParty {
                inbox: network.register(account.address.clone()).await,
                ctx,
                account: account.clone(),
            });
        }

        Self {
            network,
            judge,
            judge_inbox,
            parties: built,
        }
    }

    pub fn alice(&self) -> &TestParty<S> {
        &self.parties[0]
    }

    pub fn bob(&self) -> &TestParty<S> {
        &self.parties[1]
    }

    /// Run the opening handshake between two parties; `proposer` proposes.
    /// Leaves the judge's copy of the opening in its inbox.
    pub async fn open_channel(&self, proposer: usize, receiver: usize, state: &[u8]) -> ChannelId {
        let a = &self.parties[proposer];
        let b = &self.parties[receiver];

        let channel = a
            .ctx
            .caller()
            .propose_channel(a.account.pubkey, b.account.pubkey, state.to_vec().into(), None)
            .await
            .expect("propose");
        a.ctx.caller().confirm_channel(channel.channel_id).await.expect("release proposal");

        b.handle_next().await.expect("receive proposal");
        b.ctx.caller().confirm_channel(channel.channel_id).await.expect("counter-sign opening");
        a.handle_next().await.expect("open");

        channel.channel_id
    }

    /// One complete update: `from` proposes, the other side counter-signs,
    /// and the full envelope comes back.
    pub async fn agree_update(&self, channel_id: ChannelId, from: usize, to: usize, state: &[u8]) {
        let a = &self.parties[from];
        let b = &self.parties[to];

        a.ctx
            .caller()
            .send_update_tx(channel_id, state.to_vec().into(), false)
            .await
            .expect("send update");
        b.handle_next().await.expect("receive update");
        b.ctx.caller().confirm_update_tx(channel_id).await.expect("confirm update");
        a.handle_next().await.expect("receive confirmation");
    }
}
