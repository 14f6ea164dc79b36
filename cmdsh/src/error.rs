use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The server configuration is incomplete or points to missing files.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The listen address could not be bound.
    #[error("failed to listen on {address}: {source}")]
    ListenerBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Key exchange or authentication failed for one connection.
    #[error("handshake failed: {0}")]
    Handshake(#[source] russh::Error),

    /// A public key was refused, or the trust store could not be used.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A channel request could not be decoded.
    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),

    /// Reading from a channel failed for a reason other than end of stream.
    #[error("channel read failed: {0}")]
    TransportRead(String),

    /// The connection owning a channel is gone.
    #[error("channel closed")]
    ChannelClosed,

    /// A registered command failed.
    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Keys(#[from] russh::keys::Error),

    #[error(transparent)]
    SshKey(#[from] russh::keys::ssh_key::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl From<russh::Error> for Error {
    fn from(e: russh::Error) -> Self {
        Error::Handshake(e)
    }
}
