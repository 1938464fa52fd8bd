use std::io;

use thiserror::Error;

/// Result type alias for slotmux operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the cluster.
#[derive(Debug, Error)]
pub enum Error {
    /// An IO error occurred.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// The peer closed the stream.
    #[error("connection closed")]
    ConnectionClosed,

    /// A protocol error occurred.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the error.
        message: String,
    },

    /// The server returned an error.
    #[error("server error: {message}")]
    Server {
        /// Error message from server.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of invalid argument.
        message: String,
    },

    /// The keys of a request or transaction hash to more than one slot.
    #[error("keys hash to more than one slot")]
    CrossSlot,

    /// No node connection exists for the target slot or address.
    #[error("no node found for {target}")]
    MissingNode {
        /// The slot or address that could not be resolved.
        target: String,
    },

    /// The command is not known to the cluster command table.
    #[error("unsupported cluster command: {name}")]
    UnsupportedCommand {
        /// The command name as submitted.
        name: String,
    },
}

/// A flushed batch's outcome is shared by every reply handle issued from it,
/// so errors must be duplicable per observer. `io::Error` is not `Clone`;
/// it is rebuilt from its kind and message.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Io { source } => Error::Io {
                source: io::Error::new(source.kind(), source.to_string()),
            },
            Error::ConnectionClosed => Error::ConnectionClosed,
            Error::Protocol { message } => Error::Protocol {
                message: message.clone(),
            },
            Error::Server { message } => Error::Server {
                message: message.clone(),
            },
            Error::InvalidArgument { message } => Error::InvalidArgument {
                message: message.clone(),
            },
            Error::CrossSlot => Error::CrossSlot,
            Error::MissingNode { target } => Error::MissingNode {
                target: target.clone(),
            },
            Error::UnsupportedCommand { name } => Error::UnsupportedCommand {
                name: name.clone(),
            },
        }
    }
}
