//! Cluster client: slot-based routing and the redirection state machine.
//!
//! [`ClusterClient`] is the top-level entry point. Every command flows
//! through [`ClusterClient::execute`]: the key picks a slot, the slot picks
//! a node, the cache supplies the connection, and MOVED/ASK replies are
//! absorbed by retrying until the redirection budget runs out.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{ConnectionCache, DEFAULT_MAX_CACHED_CONNECTIONS};
use crate::error::{Error, Result};
use crate::node::{parse_seed_list, Node};
use crate::redirect::Redirect;
use crate::slot::key_slot;
use crate::store::{Connector, StoreConnection};
use crate::topology::Topology;
use crate::value::Value;

/// Redirection budget per dispatched command.
pub const MAX_REDIRECTIONS: u32 = 16;

/// Administrative commands that carry no routing key and always go to a
/// randomly selected node.
const KEYLESS_COMMANDS: &[&str] = &[
    "INFO", "MULTI", "EXEC", "SLAVEOF", "REPLICAOF", "CONFIG", "SHUTDOWN",
];

/// Returns the routing key for a command, the first argument unless the
/// command is administrative (matched case-insensitively).
fn routing_key<'a>(command: &str, args: &'a [Bytes]) -> Option<&'a Bytes> {
    if KEYLESS_COMMANDS.iter().any(|c| command.eq_ignore_ascii_case(c)) {
        return None;
    }
    args.first()
}

/// Cluster-aware command router.
///
/// Discovers topology from seed nodes at construction, routes each command
/// to the node owning its key's slot, and transparently follows MOVED and
/// ASK redirects. Cheap to share: all mutable state lives behind one lock
/// held for the duration of each dispatch, so concurrent callers serialize
/// and never observe a half-updated slot table.
///
/// # Example
///
/// ```no_run
/// # async fn example<C: slotwise::Connector>(connector: C) -> slotwise::Result<()> {
/// use slotwise::ClusterClient;
///
/// let client = ClusterClient::connect(connector, "127.0.0.1:7000,127.0.0.1:7001").await?;
/// client.set("key", "value".into()).await?;
/// let value = client.get("key").await?;
/// # Ok(())
/// # }
/// ```
pub struct ClusterClient<C: Connector> {
    inner: Mutex<Inner<C>>,
}

impl<C: Connector> std::fmt::Debug for ClusterClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient").finish_non_exhaustive()
    }
}

struct Inner<C: Connector> {
    /// The original seed list; full rediscovery always starts from here.
    seeds: Vec<Node>,
    topology: Topology,
    cache: ConnectionCache<C>,
    /// Set by MOVED replies, consumed at the start of the next dispatch.
    needs_refresh: bool,
}

impl<C: Connector> ClusterClient<C> {
    /// Connects to the cluster through the given seed addresses.
    ///
    /// Topology is discovered up front; a client is only returned once some
    /// seed has answered.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an unparseable seed list,
    /// [`Error::NoSeedAvailable`] if no seed answers discovery.
    pub async fn connect(connector: C, addresses: &str) -> Result<Self> {
        ClusterClientBuilder::new()
            .addresses(addresses)
            .build(connector)
            .await
    }

    /// Returns a builder for tuning the client before connecting.
    pub fn builder() -> ClusterClientBuilder {
        ClusterClientBuilder::new()
    }

    /// Dispatches a command to the cluster and returns its reply.
    ///
    /// The routing key is the first argument, except for administrative
    /// commands (INFO, MULTI, EXEC, SLAVEOF, REPLICAOF, CONFIG, SHUTDOWN)
    /// which go to a random node. MOVED and ASK redirects are handled
    /// internally; transport failures retry on a different node. Any other
    /// error reply propagates verbatim.
    ///
    /// # Errors
    ///
    /// [`Error::TooManyRedirects`] once the redirection budget (16) is
    /// spent, [`Error::NoNodeAvailable`] if no node can be reached, and
    /// [`Error::Reply`] for non-redirect error replies.
    pub async fn execute(&self, command: &str, args: &[Bytes]) -> Result<Value> {
        let mut inner = self.inner.lock().await;
        inner.dispatch(command, args).await
    }

    /// Rebuilds topology from the original seed list.
    ///
    /// Also runs implicitly at the start of the dispatch following a MOVED
    /// reply.
    pub async fn refresh_topology(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.rebuild().await
    }

    /// Number of known cluster nodes.
    pub async fn node_count(&self) -> usize {
        self.inner.lock().await.topology.node_count()
    }

    /// True if every slot in the keyspace has an owner.
    pub async fn is_fully_covered(&self) -> bool {
        self.inner.lock().await.topology.is_fully_covered()
    }

    /// Closes every cached connection. Idempotent; the client remains
    /// usable and will reconnect lazily.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.cache.close_all().await;
    }

    /// Gets the value of a key.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let reply = self
            .execute("GET", &[Bytes::copy_from_slice(key.as_bytes())])
            .await?;
        match reply {
            Value::Bulk(data) => Ok(data),
            Value::Null => Ok(None),
            other => Err(Error::Protocol {
                message: format!("unexpected reply type for GET: {:?}", other),
            }),
        }
    }

    /// Sets the value of a key.
    pub async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.execute("SET", &[Bytes::copy_from_slice(key.as_bytes()), value])
            .await?;
        Ok(())
    }

    /// Deletes a key, returning how many keys were removed.
    pub async fn del(&self, key: &str) -> Result<i64> {
        let reply = self
            .execute("DEL", &[Bytes::copy_from_slice(key.as_bytes())])
            .await?;
        reply.as_int().ok_or_else(|| Error::Protocol {
            message: "unexpected reply type for DEL".to_string(),
        })
    }

    /// True if the key exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let reply = self
            .execute("EXISTS", &[Bytes::copy_from_slice(key.as_bytes())])
            .await?;
        match reply.as_int() {
            Some(n) => Ok(n > 0),
            None => Err(Error::Protocol {
                message: "unexpected reply type for EXISTS".to_string(),
            }),
        }
    }
}

impl<C: Connector> Inner<C> {
    /// Full topology rebuild from the original seeds.
    async fn rebuild(&mut self) -> Result<()> {
        let topology = Topology::discover(self.cache.connector(), &self.seeds).await?;
        self.topology = topology;
        Ok(())
    }

    /// The redirection state machine. One call per dispatched command.
    async fn dispatch(&mut self, command: &str, args: &[Bytes]) -> Result<Value> {
        if self.needs_refresh {
            self.needs_refresh = false;
            self.rebuild().await?;
        }

        let mut num_redirects = 0;
        let mut asking = false;
        let mut force_random = false;
        let mut ask_target: Option<Arc<Node>> = None;

        while num_redirects < MAX_REDIRECTIONS {
            num_redirects += 1;

            // Node selection: an ASK hint wins for exactly one attempt,
            // then forced-random, then the slot owner for the routing key.
            let target = if let Some(node) = ask_target.take() {
                Some(node)
            } else if force_random {
                force_random = false;
                None
            } else if let Some(key) = routing_key(command, args) {
                self.topology.node_for_slot(key_slot(key)).cloned()
            } else {
                None
            };

            let candidates: Vec<Arc<Node>> = self.topology.known_nodes().cloned().collect();
            let name = match target {
                Some(node) => match self.cache.acquire(&node).await {
                    Ok(name) => name,
                    Err(err) if err.is_transport() => {
                        debug!(node = %node, "slot owner unreachable, selecting randomly");
                        self.cache.acquire_random(&candidates).await?
                    }
                    Err(err) => return Err(err),
                },
                None => self.cache.acquire_random(&candidates).await?,
            };

            if asking {
                asking = false;
                let result = match self.cache.get_mut(&name) {
                    Some(conn) => conn.execute("ASKING", &[]).await,
                    None => Err(missing_connection(&name)),
                };
                match result {
                    Ok(_) => {}
                    Err(err) if err.is_transport() => {
                        self.cache.discard(&name).await;
                        force_random = true;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }

            let result = match self.cache.get_mut(&name) {
                Some(conn) => conn.execute(command, args).await,
                None => Err(missing_connection(&name)),
            };
            match result {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_transport() => {
                    warn!(node = %name, error = %err, "transport failure, retrying elsewhere");
                    self.cache.discard(&name).await;
                    force_random = true;
                }
                Err(Error::Reply { message }) => match Redirect::parse(&message) {
                    Some(Redirect::Moved { slot, node }) => {
                        debug!(slot, target = %node, "following MOVED redirect");
                        self.needs_refresh = true;
                        self.topology.assign_slot(slot, node);
                    }
                    Some(Redirect::Ask { slot, node }) => {
                        debug!(slot, target = %node, "following ASK redirect");
                        asking = true;
                        ask_target = Some(Arc::new(node));
                    }
                    None => return Err(Error::Reply { message }),
                },
                Err(err) => return Err(err),
            }
        }

        Err(Error::TooManyRedirects {
            command: command.to_string(),
            args: args
                .iter()
                .map(|a| String::from_utf8_lossy(a).into_owned())
                .collect::<Vec<_>>()
                .join(" "),
            limit: MAX_REDIRECTIONS,
        })
    }
}

fn missing_connection(name: &str) -> Error {
    Error::Protocol {
        message: format!("connection to {} missing from cache", name),
    }
}

/// Builder for a [`ClusterClient`].
///
/// # Example
///
/// ```no_run
/// # async fn example<C: slotwise::Connector>(connector: C) -> slotwise::Result<()> {
/// use slotwise::ClusterClientBuilder;
///
/// let client = ClusterClientBuilder::new()
///     .addresses("127.0.0.1:7000")
///     .max_cached_connections(4)
///     .build(connector)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ClusterClientBuilder {
    addresses: Option<String>,
    max_cached_connections: usize,
}

impl ClusterClientBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            addresses: None,
            max_cached_connections: DEFAULT_MAX_CACHED_CONNECTIONS,
        }
    }

    /// Sets the comma-separated seed addresses.
    pub fn addresses(mut self, addresses: impl Into<String>) -> Self {
        self.addresses = Some(addresses.into());
        self
    }

    /// Sets the bound on cached connections (default 2, minimum 1).
    pub fn max_cached_connections(mut self, bound: usize) -> Self {
        self.max_cached_connections = bound;
        self
    }

    /// Discovers the cluster and builds the client.
    ///
    /// # Errors
    ///
    /// See [`ClusterClient::connect`].
    pub async fn build<C: Connector>(self, connector: C) -> Result<ClusterClient<C>> {
        let addresses = self.addresses.ok_or_else(|| Error::InvalidArgument {
            message: "no seed addresses configured".to_string(),
        })?;
        let seeds = parse_seed_list(&addresses)?;
        let topology = Topology::discover(&connector, &seeds).await?;

        Ok(ClusterClient {
            inner: Mutex::new(Inner {
                seeds,
                topology,
                cache: ConnectionCache::new(connector, self.max_cached_connections),
                needs_refresh: false,
            }),
        })
    }
}

impl Default for ClusterClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
