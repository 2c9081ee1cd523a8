//! Cluster topology: the slot table and the node registry.
//!
//! Topology is built by querying seed nodes for membership and slot
//! ownership, and rebuilt wholesale whenever a refresh is triggered.
//! Individual slots are also patched in place between refreshes as MOVED
//! replies reveal ownership changes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::node::{Node, NodeFlags};
use crate::slot::SLOT_COUNT;
use crate::store::{Connector, StoreConnection};
use crate::value::Value;

/// Slot-to-node mapping plus the registry of known nodes.
///
/// Invariants: each slot maps to at most one node; the registry is deduped
/// by node name and only ever grows between full rebuilds.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Slot table, one entry per slot; `None` means unassigned.
    slots: Vec<Option<Arc<Node>>>,
    /// Known nodes, keyed by `"host:port"` name.
    nodes: HashMap<String, Arc<Node>>,
}

impl Topology {
    /// Creates an empty topology with every slot unassigned.
    pub fn new() -> Self {
        Self {
            slots: vec![None; SLOT_COUNT as usize],
            nodes: HashMap::new(),
        }
    }

    /// Returns the node owning `slot`, if the slot is mapped.
    pub fn node_for_slot(&self, slot: u16) -> Option<&Arc<Node>> {
        self.slots.get(slot as usize).and_then(|owner| owner.as_ref())
    }

    /// Returns the registered node with this `"host:port"` name.
    pub fn node_by_name(&self, name: &str) -> Option<&Arc<Node>> {
        self.nodes.get(name)
    }

    /// Iterates over all known nodes.
    pub fn known_nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }

    /// Number of known nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True if every slot in the keyspace has an owner.
    pub fn is_fully_covered(&self) -> bool {
        self.slots.iter().all(|owner| owner.is_some())
    }

    /// Registers a node, deduplicating by name. Returns the registered
    /// instance, which is the existing one if the node was already known.
    pub fn intern(&mut self, node: Node) -> Arc<Node> {
        self.nodes
            .entry(node.name())
            .or_insert_with(|| Arc::new(node))
            .clone()
    }

    /// Points `slot` at the node with the given address, registering the
    /// node if it was previously unknown. This is the in-place patch driven
    /// by MOVED replies; it never touches any other slot.
    pub fn assign_slot(&mut self, slot: u16, node: Node) {
        let node = self.intern(node);
        if let Some(entry) = self.slots.get_mut(slot as usize) {
            *entry = Some(node);
        }
    }

    /// Queries seed nodes and builds a fresh topology.
    ///
    /// Seeds are tried in order; each must answer both the membership query
    /// and the slot-ownership query. The first seed that answers both wins;
    /// any transport or protocol failure moves on to the next seed. This is
    /// always a full rebuild from the given seed list, never an incremental
    /// patch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSeedAvailable`] if every seed fails.
    pub async fn discover<C: Connector>(connector: &C, seeds: &[Node]) -> Result<Self> {
        for seed in seeds {
            match Self::discover_from(connector, seed).await {
                Ok(topology) => {
                    debug!(
                        seed = %seed,
                        nodes = topology.node_count(),
                        "cluster topology discovered"
                    );
                    return Ok(topology);
                }
                Err(err) => {
                    warn!(seed = %seed, error = %err, "seed failed during discovery");
                }
            }
        }
        Err(Error::NoSeedAvailable)
    }

    /// Runs both topology queries against a single seed.
    async fn discover_from<C: Connector>(connector: &C, seed: &Node) -> Result<Self> {
        let mut conn = connector.connect(&seed.host, seed.port).await?;
        let members = conn.execute("CLUSTER", &["NODES".into()]).await;
        let ranges = conn.execute("CLUSTER", &["SLOTS".into()]).await;
        conn.close().await;

        let mut topology = Self::new();
        topology.seed_members(&members?)?;
        topology.apply_slot_ranges(&ranges?)?;
        Ok(topology)
    }

    /// Seeds the registry from the membership reply: newline-delimited
    /// records of `id address flags ...`. Malformed lines are skipped.
    fn seed_members(&mut self, reply: &Value) -> Result<()> {
        let text = reply.as_str().ok_or_else(|| Error::Protocol {
            message: "membership reply is not text".to_string(),
        })?;

        for line in text.lines() {
            let mut columns = line.split_whitespace();
            let (Some(id), Some(address), Some(flags)) =
                (columns.next(), columns.next(), columns.next())
            else {
                continue;
            };
            // The address column may carry a cluster-bus suffix ("ip:port@bus").
            let address = address.split('@').next().unwrap_or(address);
            let Ok(mut node) = Node::parse(address) else {
                continue;
            };
            node.id = Some(id.to_string());
            node.flags = NodeFlags::parse(flags);
            self.intern(node);
        }
        Ok(())
    }

    /// Expands the slot-ownership reply into per-slot entries.
    ///
    /// Each range is `[start, end, [host, port, ...], ...replicas]`; bounds
    /// are inclusive and replicas are ignored. Owners absent from the
    /// membership records are registered as they appear.
    fn apply_slot_ranges(&mut self, reply: &Value) -> Result<()> {
        let ranges = reply.as_array().ok_or_else(|| Error::Protocol {
            message: "slot-ownership reply is not an array".to_string(),
        })?;

        for range in ranges {
            let Some(items) = range.as_array() else {
                continue;
            };
            if items.len() < 3 {
                continue;
            }
            let (Some(start), Some(end)) = (items[0].as_int(), items[1].as_int()) else {
                continue;
            };
            let owner = parse_range_owner(&items[2])?;
            let owner = self.intern(owner);
            let start = start.clamp(0, i64::from(SLOT_COUNT - 1)) as u16;
            let end = end.clamp(0, i64::from(SLOT_COUNT - 1)) as u16;
            for slot in start..=end {
                self.slots[slot as usize] = Some(owner.clone());
            }
        }
        Ok(())
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses the `[host, port, ...]` owner element of a slot range.
fn parse_range_owner(value: &Value) -> Result<Node> {
    let items = value.as_array().ok_or_else(|| Error::Protocol {
        message: "slot range owner is not an array".to_string(),
    })?;
    let host = items.first().and_then(Value::as_str).ok_or_else(|| Error::Protocol {
        message: "slot range owner has no host".to_string(),
    })?;
    let port = items.get(1).and_then(Value::as_int).ok_or_else(|| Error::Protocol {
        message: "slot range owner has no port".to_string(),
    })?;
    let port = u16::try_from(port).map_err(|_| Error::Protocol {
        message: format!("slot range owner port {} out of range", port),
    })?;
    Ok(Node::new(host, port))
}
