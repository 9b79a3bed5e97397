//! Key exchange.
//!
//! The key exchange (kex) establishes a shared secret between the client and the server and binds
//! it to the identity of the server: both peers hash everything that identifies the exchange into
//! the exchange hash, and the server signs that hash with its host key. The first exchange hash of
//! a connection becomes the session identifier, which never changes afterwards.
//!
//! The server side is driven by [`KexServer`] (or the blocking [`run_server()`]), the client side
//! by [`KexClient`] (or [`run_client()`]). Both operate on a [`KexContext`], which holds the
//! per-connection state.
//!
//! # Supported algorithms
//!
//! - "curve25519-sha256" / "curve25519-sha256@libssh.com" ([`CURVE25519_SHA256`] /
//! [`CURVE25519_SHA256_LIBSSH`])
//! - "ecdh-sha2-nistp256" ([`ECDH_SHA2_NISTP256`])
//! - "ecdh-sha2-nistp384" ([`ECDH_SHA2_NISTP384`])
//! - "diffie-hellman-group14-sha256" ([`DIFFIE_HELLMAN_GROUP14_SHA256`])
//! - "diffie-hellman-group16-sha512" ([`DIFFIE_HELLMAN_GROUP16_SHA512`])
//! - "diffie-hellman-group18-sha512" ([`DIFFIE_HELLMAN_GROUP18_SHA512`])
//! - "diffie-hellman-group14-sha1" ([`DIFFIE_HELLMAN_GROUP14_SHA1`])
//! - "diffie-hellman-group1-sha1" ([`DIFFIE_HELLMAN_GROUP1_SHA1`])
use bytes::Bytes;
use derivative::Derivative;
use num_bigint_dig::BigUint;
use std::fmt;
use zeroize::Zeroizing;
use crate::codec::WireBuf;
use crate::error::{Error, Result};
use crate::util::CryptoRngCore;
pub use self::client::{KexClient, VerifyHostKey, run_client};
pub use self::context::{KexContext, Role, SessionId};
pub use self::curve25519::{CURVE25519_SHA256, CURVE25519_SHA256_LIBSSH};
pub use self::ecdh::{ECDH_SHA2_NISTP256, ECDH_SHA2_NISTP384};
pub use self::dh::{
    DIFFIE_HELLMAN_GROUP1_SHA1, DIFFIE_HELLMAN_GROUP14_SHA1, DIFFIE_HELLMAN_GROUP14_SHA256,
    DIFFIE_HELLMAN_GROUP16_SHA512, DIFFIE_HELLMAN_GROUP18_SHA512,
};
pub use self::hash::{
    HashAlgo, ExchangeHash, ExchangeHashInput, exchange_hash,
    DirectionLens, KeyLens, DirectionKeys, NewKeys, derive_key, derive_keys,
};
pub use self::init::KexInit;
pub use self::server::{KexServer, run_server};

mod client;
mod context;
mod curve25519;
mod dh;
mod ecdh;
mod hash;
mod init;
mod server;

/// Algorithm for key exchange.
///
/// See the [module documentation][self] for details.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct KexAlgo {
    /// Name of the algorithm.
    pub name: &'static str,
    /// Hash function used for the exchange hash and key derivation.
    pub hash: HashAlgo,
    #[derivative(Debug = "ignore")]
    pub(crate) make_kex: fn(rng: &mut dyn CryptoRngCore, need_bits: usize) -> Result<EphemeralKex>,
}

impl KexAlgo {
    /// Generates our ephemeral keypair for this algorithm.
    ///
    /// `need_bits` is the security level (in bits) that the keys derived from the exchange need;
    /// it is used to size the Diffie-Hellman private exponent. Zero means "use the whole group".
    pub(crate) fn generate(&self, rng: &mut dyn CryptoRngCore, need_bits: usize) -> Result<EphemeralKex> {
        (self.make_kex)(rng, need_bits)
    }
}

/// Ephemeral state of one key exchange, one variant per family of algorithms.
///
/// The private part is zeroed when this value is dropped.
#[derive(Debug)]
pub(crate) enum EphemeralKex {
    Dh(dh::DhKex),
    Curve25519(curve25519::Curve25519Kex),
    EcdhP256(ecdh::EcdhKex<p256::NistP256>),
    EcdhP384(ecdh::EcdhKex<p384::NistP384>),
}

impl EphemeralKex {
    /// Our ephemeral public value.
    pub fn our_pubkey(&self) -> EphPubkey {
        match self {
            EphemeralKex::Dh(kex) => kex.our_pubkey(),
            EphemeralKex::Curve25519(kex) => kex.our_pubkey(),
            EphemeralKex::EcdhP256(kex) => kex.our_pubkey(),
            EphemeralKex::EcdhP384(kex) => kex.our_pubkey(),
        }
    }

    /// Decodes and validates the ephemeral public value of the peer.
    ///
    /// An invalid value fails with [`Error::Protocol`][crate::Error::Protocol].
    pub fn decode_peer_pubkey(&self, payload: &mut WireBuf) -> Result<EphPubkey> {
        match self {
            EphemeralKex::Dh(kex) => kex.decode_peer_pubkey(payload),
            EphemeralKex::Curve25519(kex) => kex.decode_peer_pubkey(payload),
            EphemeralKex::EcdhP256(kex) => kex.decode_peer_pubkey(payload),
            EphemeralKex::EcdhP384(kex) => kex.decode_peer_pubkey(payload),
        }
    }

    /// Computes the shared secret, consuming (and destroying) our private key.
    pub fn compute_shared_secret(self, peer_pubkey: &EphPubkey) -> Result<SharedSecret> {
        match self {
            EphemeralKex::Dh(kex) => kex.compute_shared_secret(peer_pubkey),
            EphemeralKex::Curve25519(kex) => kex.compute_shared_secret(peer_pubkey),
            EphemeralKex::EcdhP256(kex) => kex.compute_shared_secret(peer_pubkey),
            EphemeralKex::EcdhP384(kex) => kex.compute_shared_secret(peer_pubkey),
        }
    }
}

/// Ephemeral public value exchanged in the kex init and reply messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EphPubkey {
    /// Diffie-Hellman public value (`e` or `f`), encoded as `mpint`.
    Mpint(BigUint),
    /// Elliptic curve point (`Q_C` or `Q_S`), encoded as `string`.
    Bytes(Bytes),
}

impl EphPubkey {
    /// Appends the wire encoding of this value.
    pub fn put(&self, buf: &mut WireBuf) -> Result<()> {
        match self {
            EphPubkey::Mpint(value) => buf.put_biguint(value),
            EphPubkey::Bytes(value) => buf.put_bytes(value),
        }
    }
}

/// Shared secret `K` established by a key exchange, as an unsigned big endian integer.
///
/// The value is zeroed when dropped and its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(pub(crate) Zeroizing<Vec<u8>>);

impl SharedSecret {
    /// The bytes of the secret.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// State of a [`KexServer`] or [`KexClient`].
///
/// ```text
/// (client) SendingInit
///              |
///              v
///     AwaitingPeerPubkey -> ComputingSecret -> Signing -> SendingReply -> Done
///              |                  |               |
///              +------------------+---------------+--------------------> Aborted
/// ```
///
/// `Signing` and `SendingReply` only occur on the server, the client goes directly from
/// `ComputingSecret` to `Done` after it has verified the signature. Every failure is terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KexState {
    /// Our init message has not been sent yet (client only).
    SendingInit,
    /// Waiting for the ephemeral public value of the peer.
    AwaitingPeerPubkey,
    /// Computing the shared secret and the exchange hash.
    ComputingSecret,
    /// Signing the exchange hash with the host key.
    Signing,
    /// The reply is ready to be sent.
    SendingReply,
    /// The exchange has finished successfully.
    Done,
    /// The exchange has failed; the connection must be closed.
    Aborted,
}

/// Result of a successful key exchange.
#[derive(Debug)]
pub struct KexOutput {
    /// The algorithm that was used.
    pub kex_algo: &'static KexAlgo,
    /// Shared secret `K`, until the keys are derived.
    pub(crate) shared_secret: Option<SharedSecret>,
    /// Exchange hash `H` of this exchange.
    pub exchange_hash: ExchangeHash,
    /// Session identifier of the connection (the exchange hash of the first exchange).
    pub session_id: SessionId,
    /// Public host key of the server.
    pub server_pubkey: crate::pubkey::Pubkey,
}

impl KexOutput {
    /// Derives the keys for encryption and integrity from this exchange.
    ///
    /// The shared secret is erased by this call, so the keys can be derived only once.
    pub fn derive_keys(&mut self, lens: &KeyLens) -> Result<NewKeys> {
        let shared_secret = self.shared_secret.take()
            .ok_or(Error::InvalidArgument("keys of this exchange were already derived"))?;
        derive_keys(
            self.kex_algo.hash, &shared_secret, &self.exchange_hash,
            self.session_id.as_bytes(), lens,
        )
    }
}
