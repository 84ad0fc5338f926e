//! Typed requests and responses.
//!
//! Keys, ids and opaque blobs travel as hex strings. Each request validates
//! into plain domain values before any driver sees it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use escrow_channel_core::{Channel, ChannelId, Pubkey, SecretSeed};

use crate::error::{ClientError, ErrorKind, Result};

fn invalid(field: &str, reason: impl std::fmt::Display) -> ClientError {
    ClientError::InvalidRequest(format!("{}: {}", field, reason))
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_hex(value).map_err(|e| invalid(field, e))
}

fn parse_channel_id(field: &str, value: &str) -> Result<ChannelId> {
    ChannelId::from_hex(value).map_err(|e| invalid(field, e))
}

fn parse_blob(field: &str, value: &str) -> Result<Bytes> {
    hex::decode(value).map(Bytes::from).map_err(|e| invalid(field, e))
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddJudgeRequest {
    pub name: String,
    pub pubkey: String,
    pub address: String,
}

/// A validated [`AddJudgeRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJudge {
    pub name: String,
    pub pubkey: Pubkey,
    pub address: String,
}

impl AddJudgeRequest {
    pub fn validate(self) -> Result<NewJudge> {
        require("name", &self.name)?;
        require("address", &self.address)?;
        Ok(NewJudge {
            pubkey: parse_pubkey("pubkey", &self.pubkey)?,
            name: self.name,
            address: self.address,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAccountRequest {
    pub name: String,
    /// Hex-encoded 32-byte secret seed.
    pub seed: String,
    pub address: String,
    pub judge_pubkey: String,
}

impl std::fmt::Debug for AddAccountRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddAccountRequest")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("judge_pubkey", &self.judge_pubkey)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub name: String,
    pub seed: SecretSeed,
    pub address: String,
    pub judge: Pubkey,
}

impl AddAccountRequest {
    pub fn validate(self) -> Result<NewAccount> {
        require("name", &self.name)?;
        require("address", &self.address)?;
        let seed: [u8; 32] = hex::decode(&self.seed)
            .map_err(|e| invalid("seed", e))?
            .try_into()
            .map_err(|_| invalid("seed", "expected 32 bytes"))?;
        Ok(NewAccount {
            seed: SecretSeed(seed),
            judge: parse_pubkey("judge_pubkey", &self.judge_pubkey)?,
            name: self.name,
            address: self.address,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCounterpartyRequest {
    pub name: String,
    pub pubkey: String,
    pub address: String,
    pub judge_pubkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCounterparty {
    pub name: String,
    pub pubkey: Pubkey,
    pub address: String,
    pub judge: Pubkey,
}

impl AddCounterpartyRequest {
    pub fn validate(self) -> Result<NewCounterparty> {
        require("name", &self.name)?;
        require("address", &self.address)?;
        Ok(NewCounterparty {
            pubkey: parse_pubkey("pubkey", &self.pubkey)?,
            judge: parse_pubkey("judge_pubkey", &self.judge_pubkey)?,
            name: self.name,
            address: self.address,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposeChannelRequest {
    /// Hex-encoded opening state.
    pub state: String,
    pub my_account_pubkey: String,
    pub their_account_pubkey: String,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub hold_period: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub state: Bytes,
    pub account: Pubkey,
    pub counterparty: Pubkey,
    pub hold_period: Option<u32>,
}

impl ProposeChannelRequest {
    pub fn validate(self) -> Result<NewChannel> {
        let account = parse_pubkey("my_account_pubkey", &self.my_account_pubkey)?;
        let counterparty = parse_pubkey("their_account_pubkey", &self.their_account_pubkey)?;
        if account == counterparty {
            return Err(invalid("their_account_pubkey", "must differ from my_account_pubkey"));
        }
        if self.hold_period == Some(0) {
            return Err(invalid("hold_period", "must be positive"));
        }
        Ok(NewChannel {
            state: parse_blob("state", &self.state)?,
            account,
            counterparty,
            hold_period: self.hold_period,
        })
    }
}

/// Any request that names only a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub channel_id: String,
}

impl ChannelRequest {
    pub fn validate(self) -> Result<ChannelId> {
        parse_channel_id("channel_id", &self.channel_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendUpdateRequest {
    pub channel_id: String,
    /// Hex-encoded successor state.
    pub state: String,
    #[serde(default)]
    pub fast: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUpdate {
    pub channel_id: ChannelId,
    pub state: Bytes,
    pub fast: bool,
}

impl SendUpdateRequest {
    pub fn validate(self) -> Result<NewUpdate> {
        Ok(NewUpdate {
            channel_id: parse_channel_id("channel_id", &self.channel_id)?,
            state: parse_blob("state", &self.state)?,
            fast: self.fast,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFulfillmentRequest {
    pub channel_id: String,
    /// Hex-encoded fulfillment blob.
    pub fulfillment: String,
}

impl AddFulfillmentRequest {
    pub fn validate(self) -> Result<(ChannelId, Bytes)> {
        let channel_id = parse_channel_id("channel_id", &self.channel_id)?;
        let fulfillment = parse_blob("fulfillment", &self.fulfillment)?;
        if fulfillment.is_empty() {
            return Err(invalid("fulfillment", "must not be empty"));
        }
        Ok((channel_id, fulfillment))
    }
}

/// The public view of a channel returned by every channel operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel_id: String,
    pub phase: String,
    /// Slot owned by the local account.
    pub me: u8,
    pub account: String,
    pub counterparty: String,
    pub judge: String,
    pub hold_period: u32,
    /// Sequence of the last full update; absent until the channel opens.
    pub sequence: Option<u64>,
    pub proposed_sequence: Option<u64>,
    /// Hex of the most recent agreed state (the opening state before open).
    pub state: String,
    pub fulfillments: usize,
}

impl From<&Channel> for ChannelSummary {
    fn from(ch: &Channel) -> Self {
        let state = ch
            .last_full_update_tx
            .as_ref()
            .map_or(&ch.opening_tx.state, |u| &u.state);
        Self {
            channel_id: ch.channel_id.to_hex(),
            phase: ch.phase.as_str().to_string(),
            me: ch.me.into(),
            account: ch.account.name.clone(),
            counterparty: ch.counterparty.name.clone(),
            judge: ch.judge.name.clone(),
            hold_period: ch.opening_tx.hold_period,
            sequence: ch.sequence(),
            proposed_sequence: ch.proposed_update_tx.as_ref().map(|u| u.sequence_number),
            state: hex::encode(state),
            fulfillments: ch.fulfillments.len(),
        }
    }
}

/// Error body for a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

impl From<&ClientError> for ErrorResponse {
    fn from(err: &ClientError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK_A: &str = "0101010101010101010101010101010101010101010101010101010101010101";
    const PK_B: &str = "0202020202020202020202020202020202020202020202020202020202020202";

    #[test]
    fn test_propose_request_from_json() {
        let req: ProposeChannelRequest = serde_json::from_str(&format!(
            r#"{{"state":"cafe","my_account_pubkey":"{}","their_account_pubkey":"{}"}}"#,
            PK_A, PK_B
        ))
        .unwrap();
        let new = req.validate().unwrap();
        assert_eq!(new.state, Bytes::from_static(&[0xca, 0xfe]));
        assert_eq!(new.account, Pubkey([1; 32]));
        assert_eq!(new.hold_period, None);
    }

    #[test]
    fn test_propose_rejects_same_party() {
        let req = ProposeChannelRequest {
            state: String::new(),
            my_account_pubkey: PK_A.into(),
            their_account_pubkey: PK_A.into(),
            hold_period: None,
        };
        let err = req.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_propose_rejects_zero_hold_period() {
        let req = ProposeChannelRequest {
            state: String::new(),
            my_account_pubkey: PK_A.into(),
            their_account_pubkey: PK_B.into(),
            hold_period: Some(0),
        };
        assert!(matches!(req.validate(), Err(ClientError::InvalidRequest(_))));
    }

    #[test]
    fn test_bad_hex_names_the_field() {
        let req = SendUpdateRequest {
            channel_id: "zz".into(),
            state: "00".into(),
            fast: false,
        };
        match req.validate() {
            Err(ClientError::InvalidRequest(msg)) => assert!(msg.starts_with("channel_id")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_account_seed_length() {
        let req = AddAccountRequest {
            name: "alice".into(),
            seed: "0011".into(),
            address: "alice:3001".into(),
            judge_pubkey: PK_B.into(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_account_debug_hides_seed() {
        let req = AddAccountRequest {
            name: "alice".into(),
            seed: PK_A.into(),
            address: "alice:3001".into(),
            judge_pubkey: PK_B.into(),
        };
        assert!(!format!("{:?}", req).contains(PK_A));
    }

    #[test]
    fn test_empty_name_rejected() {
        let req = AddJudgeRequest {
            name: " ".into(),
            pubkey: PK_A.into(),
            address: "judge:3004".into(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_empty_fulfillment_rejected() {
        let req = AddFulfillmentRequest {
            channel_id: PK_A.into(),
            fulfillment: String::new(),
        };
        assert!(req.validate().is_err());
    }
}
