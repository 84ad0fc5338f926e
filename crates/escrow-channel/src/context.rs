//! The shared context every role driver runs against.
//!
//! Holds the store and transport handles acquired at startup. Drivers are
//! cheap views over a context; clone it freely.

use std::sync::Arc;

use escrow_channel_core::{Channel, ChannelId, Envelope};
use escrow_channel_store::{EntityTx, Store};
use escrow_channel_transport::{Delivery, Origin, Transport};

use crate::caller::Caller;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::judge::JudgeClient;
use crate::receiver::Receiver;
use crate::registry::Registry;

/// Store, transport and configuration for one client.
pub struct Context<S: Store, T: Transport> {
    store: Arc<S>,
    transport: Arc<T>,
    config: ClientConfig,
}

impl<S: Store, T: Transport> Clone for Context<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
        }
    }
}

impl<S: Store, T: Transport> Context<S, T> {
    /// Create a new context.
    pub fn new(store: S, transport: T, config: ClientConfig) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(transport), config)
    }

    /// Create a context over handles shared with other components.
    pub fn from_shared(store: Arc<S>, transport: Arc<T>, config: ClientConfig) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Proposer-side and local operations.
    pub fn caller(&self) -> Caller<S, T> {
        Caller::new(self.clone())
    }

    /// Inbound deliveries.
    pub fn receiver(&self) -> Receiver<S, T> {
        Receiver::new(self.clone())
    }

    pub fn judge(&self) -> JudgeClient<S, T> {
        JudgeClient::new(self.clone())
    }

    /// Entity registration and queries.
    pub fn registry(&self) -> Registry<S, T> {
        Registry::new(self.clone())
    }

    /// Load a channel, apply `f`, and store the result in one transaction.
    /// Nothing is written if `f` fails.
    pub(crate) async fn update_channel<F, R>(&self, channel_id: ChannelId, f: F) -> Result<(Channel, R)>
    where
        F: FnOnce(&mut Channel) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.store
            .update(move |tx| {
                let mut channel = tx.get_channel(&channel_id)?;
                let out = f(&mut channel)?;
                tx.put_channel(&channel)?;
                Ok((channel, out))
            })
            .await
    }

    /// Send a committed envelope as a channel party, to the counterparty
    /// or the judge alike. A failure is reported as
    /// [`ClientError::Undelivered`] carrying what to resend.
    pub(crate) async fn send(
        &self,
        channel_id: Option<ChannelId>,
        from: &str,
        address: &str,
        envelope: Envelope,
    ) -> Result<()> {
        let delivery = Delivery::new(Origin::Counterparty, from, envelope.clone());
        match self.transport.send(address, delivery).await {
            Ok(()) => {
                tracing::debug!(channel_id = ?channel_id, address, kind = ?envelope.kind, "sent envelope");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(
                    channel_id = ?channel_id,
                    address,
                    error = %source,
                    "delivery failed after commit"
                );
                Err(ClientError::Undelivered {
                    channel_id,
                    address: address.to_string(),
                    envelope: Box::new(envelope),
                    source,
                })
            }
        }
    }
}
