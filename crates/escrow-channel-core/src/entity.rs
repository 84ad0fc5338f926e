//! The three party entities a channel refers to.
//!
//! Each is identified by its pubkey. Channels embed copies of all three;
//! the entity store keeps those copies in line with the standalone records.

use serde::{Deserialize, Serialize};

use crate::crypto::{Keypair, Pubkey, SecretSeed};

/// A trusted third party able to enforce the last fully-signed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judge {
    pub name: String,
    pub pubkey: Pubkey,
    pub address: String,
}

/// A local party. Holds the secret used to sign this side's envelope slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub pubkey: Pubkey,
    pub privkey: SecretSeed,
    pub address: String,
    pub judge: Judge,
}

impl Account {
    /// Build an account from its secret seed; the pubkey is derived.
    pub fn new(
        name: impl Into<String>,
        privkey: SecretSeed,
        address: impl Into<String>,
        judge: Judge,
    ) -> Self {
        let pubkey = Keypair::from_seed(&privkey).pubkey();
        Self {
            name: name.into(),
            pubkey,
            privkey,
            address: address.into(),
            judge,
        }
    }

    pub fn keypair(&self) -> Keypair {
        Keypair::from_seed(&self.privkey)
    }

    /// The public view of this account, as the other side registers it.
    pub fn as_counterparty(&self) -> Counterparty {
        Counterparty {
            name: self.name.clone(),
            pubkey: self.pubkey,
            address: self.address.clone(),
            judge: self.judge.clone(),
        }
    }
}

/// A remote party. Public information only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: String,
    pub pubkey: Pubkey,
    pub address: String,
    pub judge: Judge,
}
