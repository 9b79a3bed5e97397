use std::fmt;
use crate::codes::disconnect;

/// Result type for our [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error that occured while decoding a message or performing the handshake.
///
/// Every error returned during key exchange or authentication is fatal to the connection: the
/// handshake state cannot be rolled back, so the caller must close the connection. Ordinary
/// authentication failures (unknown key, wrong response) are not errors, they are reported as
/// [`AuthOutcome::Rejected`][crate::auth::AuthOutcome::Rejected].
///
/// This enum is `#[non_exhaustive]`, so we reserve the right to add more variants and don't
/// consider this to break backwards compatibility.
#[derive(thiserror::Error, Debug)]
#[allow(missing_docs)]
#[non_exhaustive]
pub enum Error {
    #[error("message incomplete")]
    MessageIncomplete,
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),
    #[error("unexpected trailing data in message")]
    TrailingData,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("key type does not match")]
    KeyTypeMismatch,
    #[error("no buffer space")]
    NoBufferSpace,
    #[error("memory allocation failed")]
    AllocFail,
    #[error("cryptography error: {0}")]
    Crypto(&'static str),
    #[error("randomness error: {0}")]
    Random(&'static str),
    #[error("internal error: {0}")]
    Internal(&'static str),
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    #[error("unexpected packet {0}")]
    UnexpectedPacket(u8),
    #[error("could not negotiate algorithm: {0}")]
    AlgoNegotiate(AlgoNegotiateError),
    #[error("signature verification failed")]
    Signature,
    #[error("host key was not accepted")]
    HostKeyRejected,
    #[error("could not sign with host key")]
    HostKeySign,
    #[error("connection unexpectedly closed by peer")]
    PeerClosed,
    #[error("peer disconnected: {0}")]
    PeerDisconnected(DisconnectError),
    #[error("IO error when reading key file")]
    KeyFileIo(#[source] std::io::Error),
}

impl Error {
    /// The disconnect reason code that should be sent to the peer when this error aborts the
    /// connection.
    pub fn disconnect_reason(&self) -> u32 {
        match self {
            Error::AlgoNegotiate(_) | Error::Crypto(_) | Error::Random(_) |
            Error::HostKeySign | Error::KeyTypeMismatch => disconnect::KEY_EXCHANGE_FAILED,
            Error::Signature | Error::HostKeyRejected => disconnect::HOST_KEY_NOT_VERIFIABLE,
            _ => disconnect::PROTOCOL_ERROR,
        }
    }
}

/// Error that occured because we could not negotiate an algorithm.
///
/// During the SSH key exchange, the client and the server must negotiate which algorithms to
/// use, as described in RFC 4253, section 7.1. This error occurs when there is no intersection
/// between the set of algorithms supported by the client and by the server.
#[derive(Debug, Clone, thiserror::Error)]
#[error("for {algo_name:}, client algos are {client_algos:?}, server algos are {server_algos:?}")]
pub struct AlgoNegotiateError {
    /// Human readable name of the algorithm.
    pub algo_name: String,
    /// The set of algorithms proposed by the client.
    pub client_algos: Vec<String>,
    /// The set of algorithms proposed by the server.
    pub server_algos: Vec<String>,
}

/// Error that occured because the peer disconnected.
///
/// This corresponds to the `SSH_MSG_DISCONNECT` packet described in RFC 4253, section 11.1.
#[derive(Debug, Clone, thiserror::Error)]
pub struct DisconnectError {
    /// Machine-readable reason code (see [`codes::disconnect`][crate::codes::disconnect]).
    pub reason_code: u32,
    /// Human-readable description of the error.
    pub description: String,
    /// Language tag of `description` (per RFC 3066).
    pub description_lang: String,
}

impl DisconnectError {
    /// Translates the [`reason_code`][Self::reason_code] into a string.
    pub fn reason_to_str(&self) -> Option<&'static str> {
        disconnect::to_str(self.reason_code)
    }
}

impl fmt::Display for DisconnectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "peer sent error ")?;
        if let Some(reason) = self.reason_to_str() {
            write!(f, "`{}` ({})", reason, self.reason_code)?;
        } else {
            write!(f, "{}", self.reason_code)?;
        }
        if !self.description.is_empty() {
            write!(f, ": {:?}", self.description)?;
        }
        Ok(())
    }
}
