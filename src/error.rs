//! Error types for the routing layer.

use std::io;

use thiserror::Error;

/// Result type alias for slotwise operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while routing commands through the cluster.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An IO error occurred on the transport.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// The transport to a node failed or was refused.
    ///
    /// Handled internally by falling back to random node selection; it only
    /// surfaces from the collaborator contract, never from `execute`.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the transport failure.
        message: String,
    },

    /// The server returned an error reply, verbatim.
    ///
    /// MOVED and ASK replies drive the redirection state machine and are
    /// consumed internally; every other reply error propagates unchanged.
    #[error("reply error: {message}")]
    Reply {
        /// Error message from the server, `"<CODE> <args...>"`.
        message: String,
    },

    /// A topology response could not be parsed.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the malformed payload.
        message: String,
    },

    /// Invalid argument provided by the caller.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// No seed node answered topology discovery.
    ///
    /// Fatal: the client is unusable until discovery succeeds.
    #[error("cluster discovery failed: no seed node answered")]
    NoSeedAvailable,

    /// Random node selection exhausted every known node.
    #[error("no reachable node among known cluster nodes")]
    NoNodeAvailable,

    /// The redirection budget was exhausted without a final reply.
    #[error("{command} {args} - max redirection limit exceeded ({limit} times)")]
    TooManyRedirects {
        /// The command that kept being redirected.
        command: String,
        /// Its arguments, space-joined for display.
        args: String,
        /// The redirection budget that was exhausted.
        limit: u32,
    },
}

impl Error {
    /// Returns true for transport-level failures.
    ///
    /// Transport failures are retried internally on a different node; reply
    /// errors and everything else are not.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io { .. } | Error::Connection { .. })
    }
}
