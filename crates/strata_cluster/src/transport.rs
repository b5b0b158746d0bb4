//! Cluster messaging.
//!
//! [`ClusterCommunicationTransport`] is the unicast/subscribe surface the
//! inter-partition components need. [`LocalCluster`] connects any number of
//! in-process members, which is what single-process nodes and tests use.

use bytes::Bytes;
use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::NodeId;

/// Callback invoked with the sender and payload of every message on a topic
pub type MessageHandler = Arc<dyn Fn(NodeId, Bytes) + Send + Sync>;

/// Topic-addressed messaging between cluster members
pub trait ClusterCommunicationTransport: Send + Sync {
    /// Member this transport sends from
    fn local_member(&self) -> NodeId;

    /// Send `payload` to the handler of `topic` on `target`
    ///
    /// Fire-and-forget: delivery is not acknowledged and a missing handler
    /// drops the message. `reliable` asks for an ordered, connection-backed
    /// channel where the transport has one.
    fn unicast(&self, topic: &str, payload: Bytes, target: NodeId, reliable: bool);

    /// Register the handler for `topic` on the local member, replacing any
    /// previous one
    fn subscribe(&self, topic: &str, handler: MessageHandler);

    /// Remove the local handler for `topic`
    fn unsubscribe(&self, topic: &str);
}

#[derive(Default)]
struct Registry {
    handlers: IndexMap<(NodeId, String), MessageHandler>,
}

/// In-process network connecting [`LocalClusterTransport`] members
#[derive(Clone, Default)]
pub struct LocalCluster {
    registry: Arc<RwLock<Registry>>,
    delivered: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl LocalCluster {
    /// Create an empty network
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport of member `node` on this network
    #[must_use]
    pub fn member(&self, node: NodeId) -> LocalClusterTransport {
        LocalClusterTransport {
            node,
            cluster: self.clone(),
        }
    }

    /// Whether `node` has a handler for `topic`
    #[must_use]
    pub fn is_subscribed(&self, node: NodeId, topic: &str) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .contains_key(&(node, topic.to_string()))
    }

    /// Messages handed to a handler so far
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Messages dropped for lack of a handler so far
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("LocalCluster")
            .field("subscriptions", &registry.handlers.len())
            .field("delivered", &self.delivered())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// One member's view of a [`LocalCluster`]
#[derive(Clone, Debug)]
pub struct LocalClusterTransport {
    node: NodeId,
    cluster: LocalCluster,
}

impl ClusterCommunicationTransport for LocalClusterTransport {
    fn local_member(&self) -> NodeId {
        self.node
    }

    fn unicast(&self, topic: &str, payload: Bytes, target: NodeId, _reliable: bool) {
        let handler = self
            .cluster
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .get(&(target, topic.to_string()))
            .cloned();

        // The registry lock is released before the handler runs, so a
        // handler may itself subscribe or send.
        match handler {
            Some(handler) => {
                self.cluster.delivered.fetch_add(1, Ordering::Relaxed);
                handler(self.node, payload);
            }
            None => {
                self.cluster.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    from = %self.node,
                    to = %target,
                    topic,
                    "No subscriber for topic, dropping message"
                );
            }
        }
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) {
        self.cluster
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .insert((self.node, topic.to_string()), handler);
    }

    fn unsubscribe(&self, topic: &str) {
        self.cluster
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .shift_remove(&(self.node, topic.to_string()));
    }
}
