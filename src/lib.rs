//! # Slotwise
//!
//! Cluster-aware command router for sharded key-value stores that partition
//! their keyspace into 16384 hash slots.
//!
//! Slotwise maps each key to its slot, discovers which node owns which slot
//! from a set of seed nodes, keeps a small bounded cache of per-node
//! connections, and transparently follows MOVED/ASK redirects when slots
//! migrate between nodes.
//!
//! The wire protocol and transport are not part of this crate: plug in any
//! store client by implementing [`Connector`] and [`StoreConnection`].
//!
//! ## Example
//!
//! ```no_run
//! # async fn example<C: slotwise::Connector>(connector: C) -> slotwise::Result<()> {
//! use slotwise::ClusterClient;
//!
//! // Seed nodes bootstrap topology discovery; commands are then routed
//! // to whichever node owns the key's slot.
//! let client = ClusterClient::connect(connector, "127.0.0.1:7000,127.0.0.1:7001").await?;
//! client.set("user:{1000}:name", "alice".into()).await?;
//! let name = client.get("user:{1000}:name").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod cache;
mod client;
mod error;
mod node;
mod redirect;
mod slot;
mod store;
mod topology;
mod value;

#[cfg(test)]
mod mock;

pub use crate::cache::{ConnectionCache, DEFAULT_MAX_CACHED_CONNECTIONS};
pub use crate::client::{ClusterClient, ClusterClientBuilder, MAX_REDIRECTIONS};
pub use crate::error::{Error, Result};
pub use crate::node::{parse_seed_list, Node, NodeFlags};
pub use crate::redirect::Redirect;
pub use crate::slot::{key_slot, SLOT_COUNT};
pub use crate::store::{Connector, StoreConnection, PONG};
pub use crate::topology::Topology;
pub use crate::value::Value;
