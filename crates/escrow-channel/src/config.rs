//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration for the client.
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Verify inbound envelopes (declared kind and every present signature)
    /// before dispatching them.
    pub verify_inbound: bool,
    /// File the fully signed opening envelope with the judge.
    pub notify_judge_on_open: bool,
    /// Hold period used when a proposal does not name one.
    pub default_hold_period: u32,
    /// How long to wait for the counterparty before disputing.
    #[serde(with = "duration_secs")]
    pub dispute_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            verify_inbound: true,
            notify_judge_on_open: true,
            default_hold_period: 86_400,
            dispute_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
