//! Parsing of redirection replies.
//!
//! The cluster signals slot movement through error replies:
//! - `MOVED <slot> <host>:<port>` - the slot's ownership changed permanently
//! - `ASK <slot> <host>:<port>` - a single key is mid-migration; the next
//!   request must be preceded by a bare ASKING command on the target node
//!
//! Any other error reply is not a redirect and propagates to the caller.

use crate::node::Node;
use crate::slot::SLOT_COUNT;

/// A redirection parsed from an error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Permanent ownership change: patch the slot table and retry.
    Moved {
        /// The slot that moved.
        slot: u16,
        /// Its new owner.
        node: Node,
    },
    /// One-shot migration redirect: retry once on the target with ASKING.
    Ask {
        /// The slot being migrated.
        slot: u16,
        /// The node temporarily serving the key.
        node: Node,
    },
}

impl Redirect {
    /// Parses a reply error message into a redirect, if its leading token
    /// is MOVED or ASK. Returns `None` for every other error reply.
    pub fn parse(message: &str) -> Option<Self> {
        let message = message.trim();
        if let Some(rest) = message.strip_prefix("MOVED ") {
            let (slot, node) = parse_target(rest)?;
            return Some(Redirect::Moved { slot, node });
        }
        if let Some(rest) = message.strip_prefix("ASK ") {
            let (slot, node) = parse_target(rest)?;
            return Some(Redirect::Ask { slot, node });
        }
        None
    }
}

/// Parses the `"<slot> <host>:<port>"` tail of a redirect reply.
fn parse_target(args: &str) -> Option<(u16, Node)> {
    let mut parts = args.split_whitespace();
    let slot: u16 = parts.next()?.parse().ok()?;
    let node = Node::parse(parts.next()?).ok()?;
    if parts.next().is_some() || slot >= SLOT_COUNT {
        return None;
    }
    Some((slot, node))
}
