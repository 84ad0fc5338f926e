//! Entity registration and read-only queries.

use escrow_channel_core::{Account, Channel, ChannelId, Counterparty, Judge, Pubkey, SecretSeed, Slot};
use escrow_channel_store::{EntityTx, KvTx, Store};
use escrow_channel_transport::Transport;

use crate::context::Context;
use crate::error::{ClientError, Result};

/// Registers judges, accounts and counterparties, and answers queries.
pub struct Registry<S: Store, T: Transport> {
    ctx: Context<S, T>,
}

impl<S: Store, T: Transport> Registry<S, T> {
    pub(crate) fn new(ctx: Context<S, T>) -> Self {
        Self { ctx }
    }

    pub async fn add_judge(&self, judge: Judge) -> Result<Judge> {
        let stored = judge.clone();
        self.ctx
            .store()
            .update(move |tx| Ok::<_, ClientError>(tx.put_judge(&stored)?))
            .await?;
        tracing::info!(name = %judge.name, pubkey = %judge.pubkey, "added judge");
        Ok(judge)
    }

    /// Create a local account from its secret seed under a known judge.
    pub async fn add_account(
        &self,
        name: impl Into<String>,
        privkey: SecretSeed,
        address: impl Into<String>,
        judge: Pubkey,
    ) -> Result<Account> {
        let name = name.into();
        let address = address.into();
        let account = self
            .ctx
            .store()
            .update(move |tx| {
                let judge = tx.get_judge(&judge)?;
                let account = Account::new(name, privkey, address, judge);
                tx.put_account(&account)?;
                Ok::<_, ClientError>(account)
            })
            .await?;
        tracing::info!(name = %account.name, pubkey = %account.pubkey, "added account");
        Ok(account)
    }

    /// Register a remote party under a known judge.
    pub async fn add_counterparty(
        &self,
        name: impl Into<String>,
        pubkey: Pubkey,
        address: impl Into<String>,
        judge: Pubkey,
    ) -> Result<Counterparty> {
        let name = name.into();
        let address = address.into();
        let counterparty = self
            .ctx
            .store()
            .update(move |tx| {
                let counterparty = Counterparty {
                    name,
                    pubkey,
                    address,
                    judge: tx.get_judge(&judge)?,
                };
                tx.put_counterparty(&counterparty)?;
                Ok::<_, ClientError>(counterparty)
            })
            .await?;
        tracing::info!(name = %counterparty.name, pubkey = %counterparty.pubkey, "added counterparty");
        Ok(counterparty)
    }

    pub async fn get_judge(&self, pubkey: Pubkey) -> Result<Judge> {
        self.view(move |tx| Ok(tx.get_judge(&pubkey)?)).await
    }

    pub async fn get_account(&self, pubkey: Pubkey) -> Result<Account> {
        self.view(move |tx| Ok(tx.get_account(&pubkey)?)).await
    }

    pub async fn get_counterparty(&self, pubkey: Pubkey) -> Result<Counterparty> {
        self.view(move |tx| Ok(tx.get_counterparty(&pubkey)?)).await
    }

    pub async fn get_channel(&self, channel_id: ChannelId) -> Result<Channel> {
        self.view(move |tx| Ok(tx.get_channel(&channel_id)?)).await
    }

    pub async fn list_channels(&self) -> Result<Vec<Channel>> {
        self.view(|tx| Ok(tx.list_channels()?)).await
    }

    pub async fn channels_by_judge(&self, judge: Pubkey) -> Result<Vec<Channel>> {
        self.view(move |tx| Ok(tx.channels_by_judge(&judge)?)).await
    }

    /// Channels we proposed that the counterparty has not signed yet.
    pub async fn proposed_channels(&self) -> Result<Vec<Channel>> {
        self.view(|tx| Ok(tx.query_proposed_channels()?)).await
    }

    /// Channels with an update proposal waiting for the local signature,
    /// whichever slot we own.
    pub async fn pending_self_signature(&self) -> Result<Vec<Channel>> {
        self.view(|tx| {
            let mut channels = Vec::new();
            for slot in Slot::BOTH {
                channels.extend(tx.query_pending_self_signature(slot)?);
            }
            channels.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
            Ok(channels)
        })
        .await
    }

    async fn view<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn KvTx) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.ctx.store().view(f).await
    }
}
