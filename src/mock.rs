//! Scripted in-memory connector for unit tests.
//!
//! Each node is addressed by its `"host:port"` name and carries a script of
//! replies for `execute`, plus switches for connect and probe failures. All
//! state is shared behind a mutex so tests can inspect what the router did.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::store::{Connector, StoreConnection, PONG};
use crate::value::Value;

/// One scripted outcome for an `execute` call.
#[derive(Debug, Clone)]
pub enum Script {
    /// Successful reply.
    Reply(Value),
    /// Error reply with the given message.
    ReplyError(String),
    /// Transport failure mid-command.
    Disconnect,
}

#[derive(Debug, Default)]
struct NodeState {
    down: bool,
    ping_fails: bool,
    ping_token: Option<Bytes>,
    scripts: Vec<Script>,
    default_reply: Option<Value>,
    default_error: Option<String>,
    cluster_nodes: Option<Value>,
    cluster_slots: Option<Value>,
    log: Vec<(String, Vec<Bytes>)>,
    connects: usize,
    closes: usize,
}

/// Shared fake cluster: a [`Connector`] whose nodes are scripted by tests.
#[derive(Debug, Default, Clone)]
pub struct MockConnector {
    nodes: Arc<Mutex<HashMap<String, NodeState>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_node<R>(&self, name: &str, f: impl FnOnce(&mut NodeState) -> R) -> R {
        let mut nodes = self.nodes.lock().unwrap();
        f(nodes.entry(name.to_string()).or_default())
    }

    /// Makes connect attempts to this node fail.
    pub fn set_down(&self, name: &str) {
        self.with_node(name, |n| n.down = true);
    }

    /// Makes ping probes on this node fail at the transport level.
    pub fn set_ping_failure(&self, name: &str) {
        self.with_node(name, |n| n.ping_fails = true);
    }

    /// Overrides the token this node answers to probes (default `PONG`).
    pub fn set_ping_token(&self, name: &str, token: impl Into<Bytes>) {
        let token = token.into();
        self.with_node(name, |n| n.ping_token = Some(token));
    }

    /// Queues a successful reply for the next unscripted command.
    pub fn push_reply(&self, name: &str, reply: Value) {
        self.with_node(name, |n| n.scripts.push(Script::Reply(reply)));
    }

    /// Queues an error reply.
    pub fn push_error(&self, name: &str, message: &str) {
        let message = message.to_string();
        self.with_node(name, |n| n.scripts.push(Script::ReplyError(message)));
    }

    /// Queues a transport failure.
    pub fn push_disconnect(&self, name: &str) {
        self.with_node(name, |n| n.scripts.push(Script::Disconnect));
    }

    /// Reply served once the script queue is drained.
    pub fn set_default_reply(&self, name: &str, reply: Value) {
        self.with_node(name, |n| n.default_reply = Some(reply));
    }

    /// Error reply served for every unscripted command on this node.
    pub fn set_default_error(&self, name: &str, message: &str) {
        let message = message.to_string();
        self.with_node(name, |n| n.default_error = Some(message));
    }

    /// Arms the topology queries on this node.
    pub fn set_cluster_replies(&self, name: &str, members: String, slots: Value) {
        self.with_node(name, |n| {
            n.cluster_nodes = Some(Value::Bulk(Some(Bytes::from(members))));
            n.cluster_slots = Some(slots);
        });
    }

    /// Commands executed against this node, in order. ASKING is logged too.
    pub fn commands(&self, name: &str) -> Vec<(String, Vec<Bytes>)> {
        self.with_node(name, |n| n.log.clone())
    }

    /// Just the command names executed against this node.
    pub fn command_names(&self, name: &str) -> Vec<String> {
        self.with_node(name, |n| n.log.iter().map(|(cmd, _)| cmd.clone()).collect())
    }

    /// How many times this node accepted a connection.
    pub fn connect_count(&self, name: &str) -> usize {
        self.with_node(name, |n| n.connects)
    }

    /// How many times connections to this node were closed.
    pub fn close_count(&self, name: &str) -> usize {
        self.with_node(name, |n| n.closes)
    }
}

impl Connector for MockConnector {
    type Conn = MockConnection;

    async fn connect(&self, host: &str, port: u16) -> Result<MockConnection> {
        let name = format!("{}:{}", host, port);
        self.with_node(&name, |n| {
            if n.down {
                Err(Error::Connection {
                    message: format!("connection to {} refused", name),
                })
            } else {
                n.connects += 1;
                Ok(())
            }
        })?;
        Ok(MockConnection {
            name,
            nodes: Arc::clone(&self.nodes),
            closed: false,
        })
    }
}

/// A connection handle into the fake cluster.
#[derive(Debug)]
pub struct MockConnection {
    name: String,
    nodes: Arc<Mutex<HashMap<String, NodeState>>>,
    closed: bool,
}

impl StoreConnection for MockConnection {
    async fn ping(&mut self) -> Result<Bytes> {
        let mut nodes = self.nodes.lock().unwrap();
        let state = nodes.entry(self.name.clone()).or_default();
        if state.ping_fails {
            return Err(Error::Connection {
                message: format!("ping to {} failed", self.name),
            });
        }
        Ok(state.ping_token.clone().unwrap_or_else(|| Bytes::from_static(PONG)))
    }

    async fn execute(&mut self, command: &str, args: &[Bytes]) -> Result<Value> {
        let mut nodes = self.nodes.lock().unwrap();
        let state = nodes.entry(self.name.clone()).or_default();
        state.log.push((command.to_string(), args.to_vec()));

        // Topology queries and the ASKING preamble bypass the script queue
        // so scripted replies line up with the commands under test.
        if command.eq_ignore_ascii_case("CLUSTER") {
            let sub = args.first().and_then(|a| std::str::from_utf8(a).ok());
            let reply = match sub {
                Some(s) if s.eq_ignore_ascii_case("NODES") => state.cluster_nodes.clone(),
                Some(s) if s.eq_ignore_ascii_case("SLOTS") => state.cluster_slots.clone(),
                _ => None,
            };
            return reply.ok_or_else(|| Error::Reply {
                message: "ERR unsupported cluster query".to_string(),
            });
        }
        if command.eq_ignore_ascii_case("ASKING") {
            return Ok(Value::Simple("OK".to_string()));
        }

        if state.scripts.is_empty() {
            if let Some(message) = state.default_error.clone() {
                return Err(Error::Reply { message });
            }
            return Ok(state
                .default_reply
                .clone()
                .unwrap_or_else(|| Value::Simple("OK".to_string())));
        }
        match state.scripts.remove(0) {
            Script::Reply(reply) => Ok(reply),
            Script::ReplyError(message) => Err(Error::Reply { message }),
            Script::Disconnect => Err(Error::Connection {
                message: format!("connection to {} dropped", self.name),
            }),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut nodes = self.nodes.lock().unwrap();
        nodes.entry(self.name.clone()).or_default().closes += 1;
    }
}

/// Builds a membership reply body from `(id, address, flags)` records.
pub fn nodes_text(records: &[(&str, &str, &str)]) -> String {
    records
        .iter()
        .map(|(id, addr, flags)| format!("{} {} {} - 0 0 0 connected", id, addr, flags))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds a slot-ownership reply from `(start, end, host, port)` ranges.
pub fn slots_reply(ranges: &[(i64, i64, &str, u16)]) -> Value {
    Value::Array(
        ranges
            .iter()
            .map(|(start, end, host, port)| {
                Value::Array(vec![
                    Value::Int(*start),
                    Value::Int(*end),
                    Value::Array(vec![
                        Value::Bulk(Some(Bytes::copy_from_slice(host.as_bytes()))),
                        Value::Int(i64::from(*port)),
                    ]),
                ])
            })
            .collect(),
    )
}
