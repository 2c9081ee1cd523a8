//! Cluster node identity and seed-address parsing.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// Default port assumed when a seed address omits one.
const DEFAULT_PORT: u16 = 6379;

/// Flags reported by the membership query for a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeFlags {
    /// Node is a master.
    pub master: bool,
    /// Node is a replica.
    pub replica: bool,
    /// Node is in a failed or possibly-failing state.
    pub fail: bool,
}

impl NodeFlags {
    /// Parses flags from the comma-separated flags column
    /// (e.g. `"master,myself"`).
    pub fn parse(flags_str: &str) -> Self {
        let mut flags = Self::default();
        for flag in flags_str.split(',') {
            match flag.trim() {
                "master" => flags.master = true,
                "slave" | "replica" => flags.replica = true,
                "fail" | "fail?" | "pfail" => flags.fail = true,
                _ => {}
            }
        }
        flags
    }
}

/// An addressable node in the cluster.
///
/// Identity is the `"host:port"` name: two nodes with the same name are the
/// same node regardless of id or flags.
#[derive(Debug, Clone)]
pub struct Node {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Node id assigned by the cluster, when known.
    pub id: Option<String>,
    /// Role and health flags, when known.
    pub flags: NodeFlags,
}

impl Node {
    /// Creates a node from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            id: None,
            flags: NodeFlags::default(),
        }
    }

    /// The `"host:port"` name identifying this node.
    pub fn name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parses a `"host:port"` address as reported in redirects and topology
    /// records. Bracketed IPv6 forms like `"[::1]:7000"` are accepted.
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let (host, port) = address.rsplit_once(':').ok_or_else(|| Error::Protocol {
            message: format!("invalid node address '{}'", address),
        })?;
        let port: u16 = port.parse().map_err(|_| Error::Protocol {
            message: format!("invalid port in node address '{}'", address),
        })?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(Error::Protocol {
                message: format!("missing host in node address '{}'", address),
            });
        }
        Ok(Self::new(host, port))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses a comma-separated seed list into nodes.
///
/// Each entry is validated through the `url` crate; the `redis://` scheme is
/// optional and a missing port defaults to 6379.
///
/// # Examples
///
/// ```
/// use slotwise::parse_seed_list;
///
/// let seeds = parse_seed_list("127.0.0.1:7000, redis://127.0.0.1:7001").unwrap();
/// assert_eq!(seeds.len(), 2);
/// assert_eq!(seeds[0].port, 7000);
/// ```
pub fn parse_seed_list(addresses: &str) -> Result<Vec<Node>> {
    let mut seeds = Vec::new();
    for addr in addresses.split(',') {
        let addr = addr.trim();
        if addr.is_empty() {
            continue;
        }
        let with_scheme = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("redis://{}", addr)
        };

        let parsed = url::Url::parse(&with_scheme).map_err(|_| Error::InvalidArgument {
            message: format!("invalid seed address '{}'", addr),
        })?;
        if parsed.scheme() != "redis" {
            return Err(Error::InvalidArgument {
                message: format!(
                    "invalid scheme '{}' in seed address, expected redis://",
                    parsed.scheme()
                ),
            });
        }
        let host = parsed.host_str().ok_or_else(|| Error::InvalidArgument {
            message: format!("missing host in seed address '{}'", addr),
        })?;
        let port = parsed.port().unwrap_or(DEFAULT_PORT);
        seeds.push(Node::new(host, port));
    }

    if seeds.is_empty() {
        return Err(Error::InvalidArgument {
            message: "no valid seed addresses provided".to_string(),
        });
    }
    Ok(seeds)
}
