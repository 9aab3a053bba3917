use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by ring operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The peer could not be dialled within the configured attempts.
    #[error("unreachable peer: {0}")]
    UnreachablePeer(String),

    /// The peer was reached but its handler returned a failure.
    #[error("remote method {method} failed: {message}")]
    RemoteMethod { method: &'static str, message: String },

    #[error("node is not running")]
    NotRunning,

    #[error("empty address passed to a remote operation")]
    MalformedAddress,

    #[error("no successor is reachable")]
    NoLiveSuccessor,

    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}
