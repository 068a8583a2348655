//! Error taxonomy of the SDK.
//!
//! Every variant carries a message naming the stage and the identifier involved.
//! Nothing here is retried internally; the caller decides.

use {ktcloud_protocol::rpc::RpcError, std::io, thiserror::Error};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required identifier, name or path is missing.
    #[error("invalid input: {0}")]
    Input(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Passphrase or key material is missing or unusable.
    #[error("credential error: {0}")]
    Credential(String),

    /// Key unlock, encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("network error: {0}")]
    Network(String),

    /// The API answered with a non-zero error code.
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    /// The response does not match the expected schema.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn crypto(context: impl AsRef<str>, err: &anyhow::Error) -> Self {
        Self::Crypto(format!("{}: {err:#}", context.as_ref()))
    }

    pub(crate) fn network(context: impl AsRef<str>, err: &reqwest::Error) -> Self {
        Self::Network(format!("{}: {err}", context.as_ref()))
    }

    pub(crate) fn io(context: impl AsRef<str>, err: &io::Error) -> Self {
        Self::Io(io::Error::new(
            err.kind(),
            format!("{}: {err}", context.as_ref()),
        ))
    }
}

impl From<RpcError> for Error {
    #[inline]
    fn from(err: RpcError) -> Self {
        Self::Server {
            code: err.code,
            message: err.message,
        }
    }
}
