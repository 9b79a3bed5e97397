use bytes::Bytes;
use std::fmt;
use crate::error::{Error, Result};
use crate::pubkey::PubkeyAlgo;
use super::{EphemeralKex, ExchangeHash, KexAlgo, KeyLens};

/// Which side of the connection we are.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    /// We initiated the connection.
    Client,
    /// We accepted the connection.
    Server,
}

/// Identifier of an SSH session.
///
/// This is the exchange hash of the first key exchange on the connection. It is unique for every
/// connection and it binds the user authentication to the connection.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionId(Vec<u8>);

impl SessionId {
    /// The bytes of the identifier.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for SessionId {
    fn from(bytes: &[u8]) -> Self {
        SessionId(bytes.to_vec())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SessionId({:x})", Bytes::copy_from_slice(&self.0))
    }
}

/// Per-connection state of the key exchange.
///
/// The context is owned by one connection. It remembers the identification strings, the
/// `SSH_MSG_KEXINIT` payloads and the algorithms negotiated for the current key exchange, our
/// ephemeral keypair while an exchange is in progress, and the session identifier.
///
/// The session identifier is set by the first key exchange and is never changed: later key
/// exchanges (re-keys) compute a fresh exchange hash, but the session identifier stays the same.
pub struct KexContext {
    role: Role,
    client_ident: Bytes,
    server_ident: Bytes,
    client_kex_init: Bytes,
    server_kex_init: Bytes,
    kex_algo: Option<&'static KexAlgo>,
    hostkey_algo: Option<&'static PubkeyAlgo>,
    key_lens: KeyLens,
    session_id: Option<SessionId>,
    pub(crate) eph: Option<EphemeralKex>,
}

impl KexContext {
    /// Creates a context for a new connection.
    ///
    /// The identification strings must not contain the terminating CR and LF.
    pub fn new(role: Role, client_ident: &[u8], server_ident: &[u8]) -> Self {
        Self {
            role,
            client_ident: Bytes::copy_from_slice(client_ident),
            server_ident: Bytes::copy_from_slice(server_ident),
            client_kex_init: Bytes::new(),
            server_kex_init: Bytes::new(),
            kex_algo: None,
            hostkey_algo: None,
            key_lens: KeyLens::default(),
            session_id: None,
            eph: None,
        }
    }

    /// Our role in the connection.
    pub fn role(&self) -> Role { self.role }

    /// The client's identification string.
    pub fn client_ident(&self) -> &[u8] { &self.client_ident }

    /// The server's identification string.
    pub fn server_ident(&self) -> &[u8] { &self.server_ident }

    /// Payload of the client's `SSH_MSG_KEXINIT` in the current exchange.
    pub fn client_kex_init(&self) -> &[u8] { &self.client_kex_init }

    /// Payload of the server's `SSH_MSG_KEXINIT` in the current exchange.
    pub fn server_kex_init(&self) -> &[u8] { &self.server_kex_init }

    /// The negotiated key exchange algorithm.
    pub fn kex_algo(&self) -> Result<&'static KexAlgo> {
        self.kex_algo.ok_or(Error::InvalidArgument("key exchange algorithm was not negotiated"))
    }

    /// The negotiated host key algorithm.
    pub fn hostkey_algo(&self) -> Result<&'static PubkeyAlgo> {
        self.hostkey_algo.ok_or(Error::InvalidArgument("host key algorithm was not negotiated"))
    }

    /// Lengths of the keys that we derive after the exchange.
    pub fn key_lens(&self) -> &KeyLens { &self.key_lens }

    /// Sets the lengths of the keys derived after the exchange.
    ///
    /// The longest key also determines the size of the Diffie-Hellman private exponent.
    pub fn set_key_lens(&mut self, key_lens: KeyLens) {
        self.key_lens = key_lens;
    }

    /// The session identifier, if the first key exchange has already finished.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Starts a new key exchange with the given `SSH_MSG_KEXINIT` payloads and negotiated
    /// algorithms.
    ///
    /// The payloads are the complete payloads, including the message number. This can be called
    /// again for a re-key; the session identifier is kept.
    pub fn begin_exchange(
        &mut self,
        client_kex_init: Bytes,
        server_kex_init: Bytes,
        kex_algo: &'static KexAlgo,
        hostkey_algo: &'static PubkeyAlgo,
    ) {
        self.client_kex_init = client_kex_init;
        self.server_kex_init = server_kex_init;
        self.kex_algo = Some(kex_algo);
        self.hostkey_algo = Some(hostkey_algo);
        self.eph = None;
    }

    /// Sets the session identifier to `exchange_hash` if it was not set yet.
    ///
    /// Returns the session identifier, which is the hash of the first exchange.
    pub(crate) fn bind_session_id(&mut self, exchange_hash: &ExchangeHash) -> &SessionId {
        if self.session_id.is_none() {
            log::debug!("session id is set by the first key exchange");
        }
        self.session_id.get_or_insert_with(|| SessionId::from(exchange_hash.as_bytes()))
    }

    /// Bits of security that the derived keys need.
    pub(crate) fn need_bits(&self) -> usize {
        self.key_lens.max_len() * 8
    }

    /// Destroys our ephemeral keypair, if any.
    pub(crate) fn destroy_ephemeral(&mut self) {
        self.eph = None;
    }
}

impl fmt::Debug for KexContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("KexContext")
            .field("role", &self.role)
            .field("client_ident", &self.client_ident)
            .field("server_ident", &self.server_ident)
            .field("kex_algo", &self.kex_algo.map(|a| a.name))
            .field("hostkey_algo", &self.hostkey_algo.map(|a| a.name))
            .field("session_id", &self.session_id)
            .field("in_progress", &self.eph.is_some())
            .finish()
    }
}
