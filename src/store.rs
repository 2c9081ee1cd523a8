//! The store-client collaborator contract.
//!
//! The routing layer owns no wire format and no sockets. Whatever speaks the
//! store's protocol plugs in through these traits: the router asks the
//! [`Connector`] for per-node connections and drives each one through
//! [`StoreConnection`]. Replies come back as [`Value`]s; error replies come
//! back as [`Error::Reply`] with the verbatim server message, which is what
//! the redirection state machine inspects.

use bytes::Bytes;

use crate::error::Result;
use crate::value::Value;

/// Canonical liveness token expected from a probe.
pub const PONG: &[u8] = b"PONG";

/// Opens connections to individual cluster nodes.
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// The connection type this connector produces.
    type Conn: StoreConnection;

    /// Connects to the node at `host:port`.
    ///
    /// # Errors
    ///
    /// Returns a transport-level error ([`Error::Io`] or
    /// [`Error::Connection`]) if the node is unreachable.
    ///
    /// [`Error::Io`]: crate::Error::Io
    /// [`Error::Connection`]: crate::Error::Connection
    async fn connect(&self, host: &str, port: u16) -> Result<Self::Conn>;
}

/// A live connection to one cluster node.
#[allow(async_fn_in_trait)]
pub trait StoreConnection {
    /// Lightweight liveness probe. A healthy node answers [`PONG`].
    async fn ping(&mut self) -> Result<Bytes>;

    /// Executes a command and returns its decoded reply.
    ///
    /// # Errors
    ///
    /// - transport failures surface as [`Error::Io`] / [`Error::Connection`]
    /// - error replies surface as [`Error::Reply`] carrying the verbatim
    ///   server message, e.g. `"MOVED 5000 10.0.0.2:7000"`
    ///
    /// [`Error::Io`]: crate::Error::Io
    /// [`Error::Connection`]: crate::Error::Connection
    /// [`Error::Reply`]: crate::Error::Reply
    async fn execute(&mut self, command: &str, args: &[Bytes]) -> Result<Value>;

    /// Closes the connection. Idempotent.
    async fn close(&mut self);
}
