//! Request-level entry points.
//!
//! Each method validates a typed request, runs the matching driver
//! operation, and returns a serializable response. An HTTP layer only has
//! to decode JSON into the request, call one method, and map
//! [`ErrorKind`](crate::ErrorKind) to a status.

use escrow_channel_core::{Counterparty, Judge};
use escrow_channel_store::Store;
use escrow_channel_transport::Transport;

use crate::context::Context;
use crate::error::Result;
use crate::requests::{
    AddAccountRequest, AddCounterpartyRequest, AddFulfillmentRequest, AddJudgeRequest,
    ChannelRequest, ChannelSummary, ProposeChannelRequest, SendUpdateRequest,
};

/// Typed request handlers over one [`Context`].
pub struct Api<S: Store, T: Transport> {
    ctx: Context<S, T>,
}

impl<S: Store, T: Transport> Api<S, T> {
    pub fn new(ctx: Context<S, T>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context<S, T> {
        &self.ctx
    }

    pub async fn add_judge(&self, req: AddJudgeRequest) -> Result<Judge> {
        let new = req.validate()?;
        self.ctx
            .registry()
            .add_judge(Judge {
                name: new.name,
                pubkey: new.pubkey,
                address: new.address,
            })
            .await
    }

    /// Returns the public view of the new account; the seed never leaves
    /// the store.
    pub async fn add_account(&self, req: AddAccountRequest) -> Result<Counterparty> {
        let new = req.validate()?;
        let account = self
            .ctx
            .registry()
            .add_account(new.name, new.seed, new.address, new.judge)
            .await?;
        Ok(account.as_counterparty())
    }

    pub async fn add_counterparty(&self, req: AddCounterpartyRequest) -> Result<Counterparty> {
        let new = req.validate()?;
        self.ctx
            .registry()
            .add_counterparty(new.name, new.pubkey, new.address, new.judge)
            .await
    }

    pub async fn new_channel(&self, req: ProposeChannelRequest) -> Result<ChannelSummary> {
        let new = req.validate()?;
        let channel = self
            .ctx
            .caller()
            .propose_channel(new.account, new.counterparty, new.state, new.hold_period)
            .await?;
        Ok(ChannelSummary::from(&channel))
    }

    pub async fn confirm_channel(&self, req: ChannelRequest) -> Result<ChannelSummary> {
        let channel_id = req.validate()?;
        let channel = self.ctx.caller().confirm_channel(channel_id).await?;
        Ok(ChannelSummary::from(&channel))
    }

    pub async fn send_update_tx(&self, req: SendUpdateRequest) -> Result<ChannelSummary> {
        let new = req.validate()?;
        let channel = self
            .ctx
            .caller()
            .send_update_tx(new.channel_id, new.state, new.fast)
            .await?;
        Ok(ChannelSummary::from(&channel))
    }

    pub async fn confirm_update_tx(&self, req: ChannelRequest) -> Result<ChannelSummary> {
        let channel_id = req.validate()?;
        let channel = self.ctx.caller().confirm_update_tx(channel_id).await?;
        Ok(ChannelSummary::from(&channel))
    }

    /// The counterparty stalled: dispute with the last full update.
    pub async fn dispute(&self, req: ChannelRequest) -> Result<ChannelSummary> {
        let channel_id = req.validate()?;
        let channel = self
            .ctx
            .caller()
            .check_final_update_tx(channel_id, None)
            .await?;
        Ok(ChannelSummary::from(&channel))
    }

    pub async fn add_fulfillment(&self, req: AddFulfillmentRequest) -> Result<ChannelSummary> {
        let (channel_id, fulfillment) = req.validate()?;
        let channel = self
            .ctx
            .caller()
            .add_fulfillment(channel_id, fulfillment)
            .await?;
        Ok(ChannelSummary::from(&channel))
    }

    pub async fn get_channel(&self, req: ChannelRequest) -> Result<ChannelSummary> {
        let channel_id = req.validate()?;
        let channel = self.ctx.registry().get_channel(channel_id).await?;
        Ok(ChannelSummary::from(&channel))
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelSummary>> {
        let channels = self.ctx.registry().list_channels().await?;
        Ok(channels.iter().map(ChannelSummary::from).collect())
    }

    /// Channels waiting on a local decision: our unsent proposals and
    /// counterparty updates still lacking our signature.
    pub async fn pending(&self) -> Result<Vec<ChannelSummary>> {
        let registry = self.ctx.registry();
        let mut channels = registry.proposed_channels().await?;
        channels.extend(registry.pending_self_signature().await?);
        Ok(channels.iter().map(ChannelSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::ErrorKind;
    use escrow_channel_core::{Keypair, SecretSeed};
    use escrow_channel_store::MemoryStore;
    use escrow_channel_transport::{MemoryNetwork, MemoryTransport};

    fn api() -> Api<MemoryStore, MemoryTransport> {
        let network = MemoryNetwork::new();
        let ctx = Context::new(MemoryStore::new(), network.create_transport(), ClientConfig::default());
        Api::new(ctx)
    }

    fn judge_request() -> AddJudgeRequest {
        AddJudgeRequest {
            name: "joe".into(),
            pubkey: Keypair::from_seed(&SecretSeed([9; 32])).pubkey().to_hex(),
            address: "judge:3004".into(),
        }
    }

    #[tokio::test]
    async fn test_new_channel_through_requests() {
        let api = api();
        let judge = api.add_judge(judge_request()).await.unwrap();

        let alice = api
            .add_account(AddAccountRequest {
                name: "alice".into(),
                seed: hex::encode([1u8; 32]),
                address: "alice:3001".into(),
                judge_pubkey: judge.pubkey.to_hex(),
            })
            .await
            .unwrap();
        let bob = api
            .add_counterparty(AddCounterpartyRequest {
                name: "bob".into(),
                pubkey: Keypair::from_seed(&SecretSeed([2; 32])).pubkey().to_hex(),
                address: "bob:3002".into(),
                judge_pubkey: judge.pubkey.to_hex(),
            })
            .await
            .unwrap();

        let summary = api
            .new_channel(ProposeChannelRequest {
                state: "00ff".into(),
                my_account_pubkey: alice.pubkey.to_hex(),
                their_account_pubkey: bob.pubkey.to_hex(),
                hold_period: None,
            })
            .await
            .unwrap();

        assert_eq!(summary.phase, "PROPOSED");
        assert_eq!(summary.me, 0);
        assert_eq!(summary.hold_period, 86_400);
        assert_eq!(summary.state, "00ff");
        assert_eq!(summary.sequence, None);

        let pending = api.pending().await.unwrap();
        assert_eq!(pending, vec![summary.clone()]);

        let fetched = api
            .get_channel(ChannelRequest {
                channel_id: summary.channel_id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(fetched, summary);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_found() {
        let api = api();
        let err = api
            .get_channel(ChannelRequest {
                channel_id: hex::encode([7u8; 32]),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_account_under_unknown_judge() {
        let api = api();
        let err = api
            .add_account(AddAccountRequest {
                name: "alice".into(),
                seed: hex::encode([1u8; 32]),
                address: "alice:3001".into(),
                judge_pubkey: hex::encode([5u8; 32]),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_malformed_request_never_reaches_store() {
        let api = api();
        let err = api
            .confirm_channel(ChannelRequest {
                channel_id: "not hex".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(api.list_channels().await.unwrap().is_empty());
    }
}
