//! Transport abstraction for envelope delivery.
//!
//! The transport layer handles message serialization and delivery to an
//! address. Implementations may use HTTP or anything else; the client only
//! needs to know whether the remote took the delivery.

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::Delivery;

/// Transport trait for sending deliveries to counterparties and judges.
///
/// Implementations must be thread-safe (Send + Sync). A failed send must
/// report [`TransportError::Unresponsive`](crate::TransportError::Unresponsive)
/// when the remote could not be reached and
/// [`TransportError::RemoteRejected`](crate::TransportError::RemoteRejected)
/// when it answered with a refusal.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver to the party listening at `address`.
    async fn send(&self, address: &str, delivery: Delivery) -> Result<()>;
}

/// A simple in-memory transport for testing.
///
/// Uses channels to simulate delivery between parties. Each registered
/// address gets an [`Inbox`]; deliveries travel as encoded bytes.
pub mod memory {
    use super::*;
    use crate::error::TransportError;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, Mutex, RwLock};

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        /// Sender channels for each registered address.
        senders: RwLock<HashMap<String, mpsc::Sender<Vec<u8>>>>,
        /// Addresses that currently refuse deliveries.
        rejecting: RwLock<HashSet<String>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Register `address` and return its inbox.
        pub async fn register(&self, address: impl Into<String>) -> Inbox {
            let address = address.into();
            let (tx, rx) = mpsc::channel(1000);
            self.senders.write().await.insert(address.clone(), tx);
            Inbox {
                address,
                receiver: Mutex::new(rx),
            }
        }

        /// Create a transport that sends into this network.
        pub fn create_transport(self: &Arc<Self>) -> MemoryTransport {
            MemoryTransport {
                network: Arc::clone(self),
            }
        }

        /// Drop `address`; later sends to it are unresponsive.
        pub async fn disconnect(&self, address: &str) {
            self.senders.write().await.remove(address);
        }

        /// Make `address` refuse (or accept again) deliveries.
        pub async fn set_rejecting(&self, address: &str, rejecting: bool) {
            let mut set = self.rejecting.write().await;
            if rejecting {
                set.insert(address.to_string());
            } else {
                set.remove(address);
            }
        }
    }

    impl Default for MemoryNetwork {
        fn default() -> Self {
            Self {
                senders: RwLock::new(HashMap::new()),
                rejecting: RwLock::new(HashSet::new()),
            }
        }
    }

    /// The receiving end for one address.
    pub struct Inbox {
        address: String,
        receiver: Mutex<mpsc::Receiver<Vec<u8>>>,
    }

    impl Inbox {
        pub fn address(&self) -> &str {
            &self.address
        }

        /// Receive the next delivery.
        pub async fn recv(&self) -> Result<Delivery> {
            let mut rx = self.receiver.lock().await;
            match rx.recv().await {
                Some(bytes) => Delivery::from_bytes(&bytes),
                None => Err(TransportError::unresponsive(&self.address, "channel closed")),
            }
        }

        /// Receive with timeout.
        ///
        /// Returns None if timeout expires before a delivery arrives.
        pub async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Delivery>> {
            let mut rx = self.receiver.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(bytes)) => Delivery::from_bytes(&bytes).map(Some),
                Ok(None) => Err(TransportError::unresponsive(&self.address, "channel closed")),
                Err(_) => Ok(None),
            }
        }

        /// Take a delivery if one is already queued.
        pub async fn try_recv(&self) -> Result<Option<Delivery>> {
            let mut rx = self.receiver.lock().await;
            match rx.try_recv() {
                Ok(bytes) => Delivery::from_bytes(&bytes).map(Some),
                Err(_) => Ok(None),
            }
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        network: Arc<MemoryNetwork>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, address: &str, delivery: Delivery) -> Result<()> {
            if self.network.rejecting.read().await.contains(address) {
                return Err(TransportError::RemoteRejected {
                    address: address.to_string(),
                    reason: "refused by remote".into(),
                });
            }

            let bytes = delivery.to_bytes()?;
            let senders = self.network.senders.read().await;
            let sender = senders
                .get(address)
                .ok_or_else(|| TransportError::unresponsive(address, "no such address"))?;
            sender
                .send(bytes)
                .await
                .map_err(|_| TransportError::unresponsive(address, "peer disconnected"))?;

            tracing::trace!(address, kind = ?delivery.declared_kind, "delivered envelope");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;
    use crate::error::TransportError;
    use crate::messages::Origin;
    use bytes::Bytes;
    use escrow_channel_core::{ChannelId, Envelope, OpeningTx, Pubkey, TxPayload};
    use std::time::Duration;

    fn delivery() -> Delivery {
        let envelope = Envelope::new(&TxPayload::Opening(OpeningTx {
            channel_id: ChannelId::from_bytes([1; 32]),
            pubkeys: [Pubkey([2; 32]), Pubkey([3; 32])],
            state: Bytes::from_static(b"s0"),
            hold_period: 5,
        }));
        Delivery::new(Origin::Counterparty, "alice:3001", envelope)
    }

    #[tokio::test]
    async fn test_memory_transport_send_recv() {
        let network = MemoryNetwork::new();
        let inbox = network.register("bob:3002").await;
        let transport = network.create_transport();

        transport.send("bob:3002", delivery()).await.unwrap();

        let received = inbox.recv().await.unwrap();
        assert_eq!(received, delivery());
        assert_eq!(inbox.address(), "bob:3002");
    }

    #[tokio::test]
    async fn test_unknown_address_is_unresponsive() {
        let network = MemoryNetwork::new();
        let transport = network.create_transport();

        let err = transport.send("nobody:1", delivery()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unresponsive { .. }));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let network = MemoryNetwork::new();
        let _inbox = network.register("bob:3002").await;
        let transport = network.create_transport();
        network.disconnect("bob:3002").await;

        let err = transport.send("bob:3002", delivery()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unresponsive { .. }));
    }

    #[tokio::test]
    async fn test_rejecting_remote() {
        let network = MemoryNetwork::new();
        let inbox = network.register("judge:3004").await;
        let transport = network.create_transport();

        network.set_rejecting("judge:3004", true).await;
        let err = transport.send("judge:3004", delivery()).await.unwrap_err();
        assert!(matches!(err, TransportError::RemoteRejected { .. }));
        assert!(inbox.try_recv().await.unwrap().is_none());

        network.set_rejecting("judge:3004", false).await;
        transport.send("judge:3004", delivery()).await.unwrap();
        assert!(inbox.try_recv().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_recv_timeout_expires() {
        let network = MemoryNetwork::new();
        let inbox = network.register("bob:3002").await;
        let got = inbox.recv_timeout(Duration::from_millis(10)).await.unwrap();
        assert!(got.is_none());
    }
}
