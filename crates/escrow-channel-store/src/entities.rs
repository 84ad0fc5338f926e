//! Entity layer: typed records over raw buckets.
//!
//! Writes cascade. Storing an account or counterparty also stores its judge;
//! storing a channel also stores its judge, account and counterparty and
//! indexes the channel under its judge. Reads populate. Embedded copies are
//! replaced by the standalone records, so a stale snapshot inside a channel
//! never leaks out of the store.
//!
//! Every method here runs inside a [`Store`](crate::Store) transaction, so a
//! cascade either lands completely or not at all.

use serde::de::DeserializeOwned;
use serde::Serialize;

use escrow_channel_core::{Account, Channel, ChannelId, Counterparty, Judge, Phase, Pubkey, Slot};

use crate::error::{Result, StoreError};
use crate::traits::{Bucket, KvTx};

/// Prefix of the judge index: `(relation, field)` of the compound key.
const JUDGE_INDEX: &[u8] = b"Judge\x00Pubkey\x00";

fn judge_index_prefix(judge: &Pubkey) -> Vec<u8> {
    let mut key = Vec::with_capacity(JUDGE_INDEX.len() + 32);
    key.extend_from_slice(JUDGE_INDEX);
    key.extend_from_slice(judge.as_bytes());
    key
}

fn judge_index_key(judge: &Pubkey, channel_id: &ChannelId) -> Vec<u8> {
    let mut key = judge_index_prefix(judge);
    key.extend_from_slice(channel_id.as_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(kind: &str, bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes)
        .map_err(|e| StoreError::Serialization(format!("corrupt {} record: {}", kind, e)))
}

/// Typed entity operations, available on every [`KvTx`].
pub trait EntityTx: KvTx {
    // ─────────────────────────────────────────────────────────────────────────
    // Judges
    // ─────────────────────────────────────────────────────────────────────────

    fn put_judge(&mut self, judge: &Judge) -> Result<()> {
        self.put(Bucket::Judges, judge.pubkey.as_bytes(), &encode(judge)?)
    }

    fn get_judge(&self, pubkey: &Pubkey) -> Result<Judge> {
        match self.get(Bucket::Judges, pubkey.as_bytes())? {
            Some(bytes) => decode("judge", &bytes),
            None => Err(StoreError::not_found("judge", pubkey)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accounts and counterparties
    // ─────────────────────────────────────────────────────────────────────────

    fn put_account(&mut self, account: &Account) -> Result<()> {
        self.put(Bucket::Accounts, account.pubkey.as_bytes(), &encode(account)?)?;
        self.put_judge(&account.judge)
    }

    fn get_account(&self, pubkey: &Pubkey) -> Result<Account> {
        let mut account: Account = match self.get(Bucket::Accounts, pubkey.as_bytes())? {
            Some(bytes) => decode("account", &bytes)?,
            None => return Err(StoreError::not_found("account", pubkey)),
        };
        account.judge = self.get_judge(&account.judge.pubkey)?;
        Ok(account)
    }

    fn put_counterparty(&mut self, counterparty: &Counterparty) -> Result<()> {
        self.put(
            Bucket::Counterparties,
            counterparty.pubkey.as_bytes(),
            &encode(counterparty)?,
        )?;
        self.put_judge(&counterparty.judge)
    }

    fn get_counterparty(&self, pubkey: &Pubkey) -> Result<Counterparty> {
        let mut counterparty: Counterparty =
            match self.get(Bucket::Counterparties, pubkey.as_bytes())? {
                Some(bytes) => decode("counterparty", &bytes)?,
                None => return Err(StoreError::not_found("counterparty", pubkey)),
            };
        counterparty.judge = self.get_judge(&counterparty.judge.pubkey)?;
        Ok(counterparty)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a channel and cascade to its embedded entities and index.
    fn put_channel(&mut self, channel: &Channel) -> Result<()> {
        self.put(Bucket::Channels, channel.channel_id.as_bytes(), &encode(channel)?)?;

        self.put_judge(&channel.judge)?;
        self.put(Bucket::Accounts, channel.account.pubkey.as_bytes(), &encode(&channel.account)?)?;
        self.put(
            Bucket::Counterparties,
            channel.counterparty.pubkey.as_bytes(),
            &encode(&channel.counterparty)?,
        )?;

        self.put(
            Bucket::Indexes,
            &judge_index_key(&channel.judge.pubkey, &channel.channel_id),
            channel.channel_id.as_bytes(),
        )
    }

    /// Re-read the embedded entities from their own buckets.
    fn populate_channel(&self, channel: &mut Channel) -> Result<()> {
        channel.account = self.get_account(&channel.account.pubkey)?;
        channel.counterparty = self.get_counterparty(&channel.counterparty.pubkey)?;
        channel.judge = self.get_judge(&channel.judge.pubkey)?;
        Ok(())
    }

    fn find_channel(&self, channel_id: &ChannelId) -> Result<Option<Channel>> {
        let Some(bytes) = self.get(Bucket::Channels, channel_id.as_bytes())? else {
            return Ok(None);
        };
        let mut channel: Channel = decode("channel", &bytes)?;
        self.populate_channel(&mut channel)?;
        Ok(Some(channel))
    }

    fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel> {
        self.find_channel(channel_id)?
            .ok_or_else(|| StoreError::not_found("channel", channel_id))
    }

    fn has_channel(&self, channel_id: &ChannelId) -> Result<bool> {
        Ok(self.get(Bucket::Channels, channel_id.as_bytes())?.is_some())
    }

    /// Every stored channel, ordered by channel id.
    fn list_channels(&self) -> Result<Vec<Channel>> {
        self.scan(Bucket::Channels, &[])?
            .into_iter()
            .map(|(_, bytes)| {
                let mut channel: Channel = decode("channel", &bytes)?;
                self.populate_channel(&mut channel)?;
                Ok(channel)
            })
            .collect()
    }

    /// Channels filed under `judge`, via the judge index.
    fn channels_by_judge(&self, judge: &Pubkey) -> Result<Vec<Channel>> {
        self.scan(Bucket::Indexes, &judge_index_prefix(judge))?
            .into_iter()
            .map(|(_, value)| {
                let channel_id = ChannelId::try_from(value.as_slice()).map_err(|_| {
                    StoreError::Serialization("corrupt judge index entry".into())
                })?;
                self.get_channel(&channel_id)
            })
            .collect()
    }

    /// Proposed channels whose opening envelope still lacks a signature.
    fn query_proposed_channels(&self) -> Result<Vec<Channel>> {
        Ok(self
            .list_channels()?
            .into_iter()
            .filter(|ch| ch.phase == Phase::Proposed && ch.opening_tx_envelope.signature_count() < 2)
            .collect())
    }

    /// Channels owning slot `me` whose proposed update still lacks the
    /// local signature.
    fn query_pending_self_signature(&self, me: Slot) -> Result<Vec<Channel>> {
        Ok(self
            .list_channels()?
            .into_iter()
            .filter(|ch| {
                ch.me == me
                    && ch
                        .proposed_update_tx_envelope
                        .as_ref()
                        .is_some_and(|ev| !ev.has_signature(me))
            })
            .collect())
    }
}

impl<T: KvTx + ?Sized> EntityTx for T {}
