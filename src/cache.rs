//! Bounded per-node connection cache.
//!
//! Connections are created lazily on first use, probed for liveness, and
//! evicted oldest-first once the cache is full. The cache is the sole owner
//! of every connection it holds; callers borrow for a single attempt and
//! never retain one across calls.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::node::Node;
use crate::store::{Connector, StoreConnection, PONG};

/// Default bound on cached connections.
pub const DEFAULT_MAX_CACHED_CONNECTIONS: usize = 2;

/// Bounded map of node name to live connection, with FIFO eviction.
#[derive(Debug)]
pub struct ConnectionCache<C: Connector> {
    connector: C,
    capacity: usize,
    conns: HashMap<String, C::Conn>,
    /// Insertion order of `conns` keys; front is evicted first. Reuse does
    /// not refresh a connection's position.
    order: VecDeque<String>,
}

impl<C: Connector> ConnectionCache<C> {
    /// Creates an empty cache holding at most `capacity` connections.
    pub fn new(connector: C, capacity: usize) -> Self {
        Self {
            connector,
            capacity: capacity.max(1),
            conns: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Borrows the connector used to open new connections.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Number of cached connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// True if no connections are cached.
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Borrows the cached connection with this name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut C::Conn> {
        self.conns.get_mut(name)
    }

    /// Returns a healthy connection to `node`, creating one if needed.
    ///
    /// A cached connection is probed first and discarded when stale. A fresh
    /// connection must answer the probe with `PONG` before it is cached;
    /// inserting evicts oldest entries until the cache is under its bound.
    ///
    /// On success the connection stays owned by the cache and its name is
    /// returned for lookup via [`get_mut`].
    ///
    /// # Errors
    ///
    /// Transport errors from connect or probe; the caller is expected to
    /// fall back to random selection.
    ///
    /// [`get_mut`]: ConnectionCache::get_mut
    pub async fn acquire(&mut self, node: &Node) -> Result<String> {
        let name = node.name();
        if self.conns.contains_key(&name) {
            if self.probe(&name).await {
                return Ok(name);
            }
            self.discard(&name).await;
        }

        let conn = self.connect_probed(node).await?;
        self.insert(name.clone(), conn).await;
        Ok(name)
    }

    /// Returns a healthy connection to any of the given nodes.
    ///
    /// Nodes are tried in shuffled order; for each, a cached connection is
    /// probed and reused, otherwise a fresh connect-and-probe is attempted.
    ///
    /// # Errors
    ///
    /// [`Error::NoNodeAvailable`] once every node has failed.
    pub async fn acquire_random(&mut self, nodes: &[Arc<Node>]) -> Result<String> {
        let mut candidates: Vec<Arc<Node>> = nodes.to_vec();
        candidates.shuffle(&mut rand::thread_rng());

        for node in candidates {
            let name = node.name();
            if self.conns.contains_key(&name) {
                if self.probe(&name).await {
                    return Ok(name);
                }
                self.discard(&name).await;
            }
            match self.connect_probed(&node).await {
                Ok(conn) => {
                    self.insert(name.clone(), conn).await;
                    return Ok(name);
                }
                Err(err) => {
                    debug!(node = %node, error = %err, "node skipped during random selection");
                }
            }
        }
        Err(Error::NoNodeAvailable)
    }

    /// Closes and removes the named connection, if cached.
    pub async fn discard(&mut self, name: &str) {
        if let Some(mut conn) = self.conns.remove(name) {
            conn.close().await;
        }
        self.order.retain(|cached| cached != name);
    }

    /// Closes and clears every cached connection. Idempotent.
    pub async fn close_all(&mut self) {
        for (_, mut conn) in self.conns.drain() {
            conn.close().await;
        }
        self.order.clear();
    }

    /// Probes the cached connection with this name.
    async fn probe(&mut self, name: &str) -> bool {
        let Some(conn) = self.conns.get_mut(name) else {
            return false;
        };
        match conn.ping().await {
            Ok(token) if token == PONG => true,
            Ok(_) => false,
            Err(err) => {
                debug!(node = name, error = %err, "probe failed on cached connection");
                false
            }
        }
    }

    /// Opens a fresh connection and verifies it answers the probe.
    async fn connect_probed(&self, node: &Node) -> Result<C::Conn> {
        let mut conn = self.connector.connect(&node.host, node.port).await?;
        match conn.ping().await {
            Ok(token) if token == PONG => Ok(conn),
            Ok(token) => {
                conn.close().await;
                Err(Error::Connection {
                    message: format!(
                        "unexpected probe reply from {}: {:?}",
                        node,
                        String::from_utf8_lossy(&token)
                    ),
                })
            }
            Err(err) => {
                conn.close().await;
                Err(err)
            }
        }
    }

    /// Inserts a connection, evicting oldest entries to stay in bounds.
    async fn insert(&mut self, name: String, conn: C::Conn) {
        while self.conns.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(mut evicted) = self.conns.remove(&oldest) {
                warn!(node = %oldest, "evicting oldest cached connection");
                evicted.close().await;
            }
        }
        self.order.push_back(name.clone());
        self.conns.insert(name, conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;

    fn node(name: &str) -> Node {
        Node::parse(name).unwrap()
    }

    fn nodes(names: &[&str]) -> Vec<Arc<Node>> {
        names.iter().map(|n| Arc::new(node(n))).collect()
    }

    #[tokio::test]
    async fn test_acquire_creates_and_caches() {
        let connector = MockConnector::new();
        let mut cache = ConnectionCache::new(connector.clone(), 2);

        let name = cache.acquire(&node("10.0.0.1:7000")).await.unwrap();
        assert_eq!(name, "10.0.0.1:7000");
        assert_eq!(cache.len(), 1);
        assert!(cache.get_mut(&name).is_some());

        // Second acquire reuses the cached connection.
        cache.acquire(&node("10.0.0.1:7000")).await.unwrap();
        assert_eq!(connector.connect_count("10.0.0.1:7000"), 1);
    }

    #[tokio::test]
    async fn test_acquire_fails_on_unreachable_node() {
        let connector = MockConnector::new();
        connector.set_down("10.0.0.1:7000");
        let mut cache = ConnectionCache::new(connector, 2);

        let err = cache.acquire(&node("10.0.0.1:7000")).await.unwrap_err();
        assert!(err.is_transport());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_closes_fresh_connection() {
        let connector = MockConnector::new();
        connector.set_ping_token("10.0.0.1:7000", "LOADING");
        let mut cache = ConnectionCache::new(connector.clone(), 2);

        let err = cache.acquire(&node("10.0.0.1:7000")).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(connector.close_count("10.0.0.1:7000"), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_fifo_eviction_respects_bound() {
        let connector = MockConnector::new();
        let mut cache = ConnectionCache::new(connector.clone(), 2);

        cache.acquire(&node("10.0.0.1:7000")).await.unwrap();
        cache.acquire(&node("10.0.0.2:7000")).await.unwrap();
        assert_eq!(cache.len(), 2);

        // Third node evicts the oldest-inserted entry.
        cache.acquire(&node("10.0.0.3:7000")).await.unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get_mut("10.0.0.1:7000").is_none());
        assert!(cache.get_mut("10.0.0.2:7000").is_some());
        assert!(cache.get_mut("10.0.0.3:7000").is_some());
        assert_eq!(connector.close_count("10.0.0.1:7000"), 1);

        // Reuse does not refresh FIFO order: 10.0.0.2 is still oldest.
        cache.acquire(&node("10.0.0.2:7000")).await.unwrap();
        cache.acquire(&node("10.0.0.4:7000")).await.unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get_mut("10.0.0.2:7000").is_none());
        assert_eq!(connector.close_count("10.0.0.2:7000"), 1);
    }

    #[tokio::test]
    async fn test_stale_cached_connection_is_replaced() {
        let connector = MockConnector::new();
        let mut cache = ConnectionCache::new(connector.clone(), 2);

        cache.acquire(&node("10.0.0.1:7000")).await.unwrap();
        connector.set_ping_failure("10.0.0.1:7000");

        // Cached entry fails its probe; a reconnect also fails its probe.
        let err = cache.acquire(&node("10.0.0.1:7000")).await.unwrap_err();
        assert!(err.is_transport());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_random_skips_dead_nodes() {
        let connector = MockConnector::new();
        connector.set_down("10.0.0.1:7000");
        connector.set_down("10.0.0.2:7000");
        let mut cache = ConnectionCache::new(connector, 2);

        let name = cache
            .acquire_random(&nodes(&["10.0.0.1:7000", "10.0.0.2:7000", "10.0.0.3:7000"]))
            .await
            .unwrap();
        assert_eq!(name, "10.0.0.3:7000");
    }

    #[tokio::test]
    async fn test_acquire_random_exhausted() {
        let connector = MockConnector::new();
        connector.set_down("10.0.0.1:7000");
        connector.set_down("10.0.0.2:7000");
        let mut cache = ConnectionCache::new(connector, 2);

        let err = cache
            .acquire_random(&nodes(&["10.0.0.1:7000", "10.0.0.2:7000"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoNodeAvailable));
    }

    #[tokio::test]
    async fn test_acquire_random_empty_registry() {
        let connector = MockConnector::new();
        let mut cache: ConnectionCache<MockConnector> = ConnectionCache::new(connector, 2);
        let err = cache.acquire_random(&[]).await.unwrap_err();
        assert!(matches!(err, Error::NoNodeAvailable));
    }

    #[tokio::test]
    async fn test_discard_closes_once() {
        let connector = MockConnector::new();
        let mut cache = ConnectionCache::new(connector.clone(), 2);

        cache.acquire(&node("10.0.0.1:7000")).await.unwrap();
        cache.discard("10.0.0.1:7000").await;
        cache.discard("10.0.0.1:7000").await;
        assert_eq!(connector.close_count("10.0.0.1:7000"), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_idempotent() {
        let connector = MockConnector::new();
        let mut cache = ConnectionCache::new(connector.clone(), 2);

        cache.acquire(&node("10.0.0.1:7000")).await.unwrap();
        cache.acquire(&node("10.0.0.2:7000")).await.unwrap();

        cache.close_all().await;
        cache.close_all().await;
        assert!(cache.is_empty());
        assert_eq!(connector.close_count("10.0.0.1:7000"), 1);
        assert_eq!(connector.close_count("10.0.0.2:7000"), 1);
    }
}
