//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use escrow_channel_core::{Account, Channel, ChannelId, Judge, Keypair, SecretSeed};

/// Generate a random secret seed.
pub fn seed() -> impl Strategy<Value = SecretSeed> {
    any::<[u8; 32]>().prop_map(SecretSeed)
}

/// Generate a random ChannelId.
pub fn channel_id() -> impl Strategy<Value = ChannelId> {
    any::<[u8; 32]>().prop_map(ChannelId::from_bytes)
}

/// Generate opaque state bytes of at most `max_len`.
pub fn state(max_len: usize) -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Bytes::from)
}

/// Generate a hold period in seconds.
pub fn hold_period() -> impl Strategy<Value = u32> {
    1u32..=30 * 86_400
}

/// One protocol step in an update history.
#[derive(Debug, Clone)]
pub enum Step {
    /// Party 0 or 1 proposes `state`; the other side counter-signs.
    Agree { from: usize, state: Bytes, fast: bool },
    /// Party 0 or 1 proposes `state` and the other side never answers.
    Abandon { from: usize, state: Bytes },
    /// The receiving side re-applies the last full envelope.
    Replay,
}

pub fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0usize..2, state(64), any::<bool>())
            .prop_map(|(from, state, fast)| Step::Agree { from, state, fast }),
        1 => (0usize..2, state(64)).prop_map(|(from, state)| Step::Abandon { from, state }),
        1 => Just(Step::Replay),
    ]
}

/// Parameters for a two-party channel history.
#[derive(Debug, Clone)]
pub struct HistoryParams {
    pub seeds: [SecretSeed; 2],
    pub channel_id: ChannelId,
    pub opening_state: Bytes,
    pub hold_period: u32,
    pub steps: Vec<Step>,
}

impl Arbitrary for HistoryParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            seed(),
            seed(),
            channel_id(),
            state(64),
            hold_period(),
            prop::collection::vec(step(), 0..24),
        )
            .prop_filter("parties must differ", |(a, b, ..)| a != b)
            .prop_map(|(a, b, channel_id, opening_state, hold_period, steps)| HistoryParams {
                seeds: [a, b],
                channel_id,
                opening_state,
                hold_period,
                steps,
            })
            .boxed()
    }
}

fn judge() -> Judge {
    Judge {
        name: "joe".into(),
        pubkey: Keypair::from_seed(&SecretSeed([0x99; 32])).pubkey(),
        address: "judge:3004".into(),
    }
}

/// Open a channel between two accounts directly on the state machine,
/// without store or transport. Returns (proposer, receiver).
pub fn open_pair(params: &HistoryParams) -> (Channel, Channel) {
    let judge = judge();
    let a = Account::new("a", params.seeds[0].clone(), "a:1", judge.clone());
    let b = Account::new("b", params.seeds[1].clone(), "b:1", judge);

    let mut proposer = Channel::propose(
        params.channel_id,
        a.clone(),
        b.as_counterparty(),
        params.opening_state.clone(),
        params.hold_period,
    )
    .expect("propose");
    let proposal = proposer.confirm().expect("release proposal");

    let mut receiver =
        Channel::from_opening_envelope(&proposal, b, a.as_counterparty()).expect("receive proposal");
    let full = receiver.confirm().expect("counter-sign opening");
    proposer.open(&full).expect("open");

    (proposer, receiver)
}

/// Apply one step to both sides. Abandoned proposals stay pending on both
/// sides, so later steps may legitimately fail; the error is returned.
pub fn apply_step(sides: &mut [Channel; 2], step: &Step) -> escrow_channel_core::Result<()> {
    match step {
        Step::Agree { from, state, fast } => {
            let (from, to) = (*from, 1 - *from);
            let proposal = sides[from].send_update(state.clone(), *fast)?;
            sides[to].receive_update(&proposal)?;
            let full = sides[to].confirm_update()?;
            sides[from].receive_update(&full)?;
            Ok(())
        }
        Step::Abandon { from, state } => {
            let (from, to) = (*from, 1 - *from);
            let proposal = sides[from].send_update(state.clone(), false)?;
            sides[to].receive_update(&proposal)?;
            Ok(())
        }
        Step::Replay => {
            if let Some(last) = sides[0].last_full_update_tx_envelope.clone() {
                if last.kind == escrow_channel_core::TxKind::Update {
                    sides[1].receive_update(&last)?;
                }
            }
            Ok(())
        }
    }
}
