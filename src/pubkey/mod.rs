//! Public key algorithms.
//!
//! Public keys authenticate the server during key exchange (the server signs the exchange hash
//! with its host key) and, in the legacy RSA challenge-response authentication, identify the
//! client.
//!
//! # Supported algorithms
//!
//! - "ssh-ed25519" ([`SSH_ED25519`], uses [`Ed25519Pubkey`] and [`Ed25519Privkey`])
//! - "rsa-sha2-256" ([`RSA_SHA2_256`], uses [`RsaPubkey`] and [`RsaPrivkey`])
//! - "rsa-sha2-512" ([`RSA_SHA2_512`], uses [`RsaPubkey`] and [`RsaPrivkey`])
//! - "ssh-rsa" ([`SSH_RSA_SHA1`], uses [`RsaPubkey`] and [`RsaPrivkey`])
use base64::Engine as _;
use bytes::Bytes;
use derivative::Derivative;
use std::fmt;
use crate::codec::WireBuf;
use crate::error::{Result, Error};
pub use self::ed25519::{SSH_ED25519, Ed25519Pubkey, Ed25519Privkey};
pub use self::rsa::{SSH_RSA_SHA1, RSA_SHA2_256, RSA_SHA2_512, RsaPubkey, RsaPrivkey};

mod ed25519;
mod rsa;

/// Algorithm for public key cryptography.
///
/// See the [module documentation][self] for details.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PubkeyAlgo {
    /// Name of the algorithm.
    pub name: &'static str,
    #[derivative(Debug = "ignore")]
    pub(crate) verify: fn(pubkey: &Pubkey, message: &[u8], signature: Bytes) -> Result<SignatureVerified>,
    #[derivative(Debug = "ignore")]
    pub(crate) sign: fn(privkey: &Privkey, message: &[u8]) -> Result<Bytes>,
}

impl PubkeyAlgo {
    /// Verifies a signature of `message` made with this algorithm.
    ///
    /// Fails with [`Error::Signature`] if the signature is not valid.
    pub fn verify(&self, pubkey: &Pubkey, message: &[u8], signature: Bytes) -> Result<()> {
        (self.verify)(pubkey, message, signature).map(|_| ())
    }

    /// Signs `message` with this algorithm.
    pub fn sign(&self, privkey: &Privkey, message: &[u8]) -> Result<Bytes> {
        (self.sign)(privkey, message)
    }
}

/// Public key in one of supported formats.
///
/// This enum is marked as `#[non_exhaustive]`, so we might add new variants without breaking
/// backwards compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Pubkey {
    /// Ed25519 public key.
    Ed25519(Ed25519Pubkey),
    /// RSA public key.
    Rsa(RsaPubkey),
}

impl Pubkey {
    /// Get best public key algorithms that work with this key.
    pub fn algos_secure(&self) -> &'static [&'static PubkeyAlgo] {
        static ED25519: &[&PubkeyAlgo] = &[&SSH_ED25519];
        static RSA: &[&PubkeyAlgo] = &[&RSA_SHA2_256, &RSA_SHA2_512];
        match self {
            Pubkey::Ed25519(_) => ED25519,
            Pubkey::Rsa(_) => RSA,
        }
    }

    /// Get all public key algorithms that work with this key, including those based on SHA-1.
    pub fn algos_compatible_less_secure(&self) -> &'static [&'static PubkeyAlgo] {
        static RSA: &[&PubkeyAlgo] = &[&RSA_SHA2_256, &RSA_SHA2_512, &SSH_RSA_SHA1];
        match self {
            Pubkey::Rsa(_) => RSA,
            _ => self.algos_secure(),
        }
    }

    /// Returns true if the given algorithm can be used with this key.
    pub fn supports_algo(&self, algo: &PubkeyAlgo) -> bool {
        self.algos_compatible_less_secure().iter().any(|a| a.name == algo.name)
    }

    /// Decode a public key from SSH wire encoding (RFC 4253, section 6.6).
    pub fn decode(blob: Bytes) -> Result<Self> {
        decode_pubkey(blob)
    }

    /// Encode a public key into SSH wire encoding.
    ///
    /// This blob is sent in `SSH_MSG_KEXDH_REPLY` and mixed into the exchange hash.
    pub fn encode(&self) -> Result<Bytes> {
        encode_pubkey(self)
    }

    /// Compute a fingerprint of the public key.
    ///
    /// The fingerprint is the SHA-256 digest of the encoded key in base64 without padding,
    /// prefixed with `SHA256:` (the format used by OpenSSH).
    pub fn fingerprint(&self) -> Result<String> {
        use sha2::Digest as _;
        let digest = sha2::Sha256::digest(self.encode()?);
        Ok(format!("SHA256:{}", base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest)))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Pubkey::Ed25519(pubkey) => fmt::Display::fmt(pubkey, f),
            Pubkey::Rsa(pubkey) => fmt::Display::fmt(pubkey, f),
        }
    }
}

impl From<Ed25519Pubkey> for Pubkey {
    fn from(pubkey: Ed25519Pubkey) -> Self { Pubkey::Ed25519(pubkey) }
}

impl From<RsaPubkey> for Pubkey {
    fn from(pubkey: RsaPubkey) -> Self { Pubkey::Rsa(pubkey) }
}

#[derive(Debug)]
pub(crate) struct SignatureVerified(());

impl SignatureVerified {
    fn assertion() -> Self { Self(()) }
}

/// Private key (keypair) in one of supported formats.
///
/// This enum is marked as `#[non_exhaustive]`, so we might add new variants without breaking
/// backwards compatibility.
#[derive(Clone, PartialEq, Eq)]
#[non_exhaustive]
#[cfg_attr(feature = "debug_less_secure", derive(Debug))]
pub enum Privkey {
    /// Ed25519 private key.
    Ed25519(Ed25519Privkey),
    /// RSA private key.
    Rsa(RsaPrivkey),
}

impl Privkey {
    /// Return the public key associated with this private key.
    pub fn pubkey(&self) -> Pubkey {
        match self {
            Privkey::Ed25519(privkey) => Pubkey::Ed25519(privkey.pubkey()),
            Privkey::Rsa(privkey) => Pubkey::Rsa(privkey.pubkey()),
        }
    }
}

impl From<Ed25519Privkey> for Privkey {
    fn from(privkey: Ed25519Privkey) -> Self { Privkey::Ed25519(privkey) }
}

impl From<RsaPrivkey> for Privkey {
    fn from(privkey: RsaPrivkey) -> Self { Privkey::Rsa(privkey) }
}

fn decode_pubkey(blob: Bytes) -> Result<Pubkey> {
    let mut blob = WireBuf::from(blob);
    let format = blob.get_cstring()?;
    let pubkey = match format.as_str() {
        "ssh-ed25519" => ed25519::decode_pubkey(&mut blob).map(Pubkey::Ed25519)?,
        "ssh-rsa" => rsa::decode_pubkey(&mut blob).map(Pubkey::Rsa)?,
        _ => {
            log::debug!("unknown pubkey format {:?}", format);
            return Err(Error::InvalidFormat("unknown public key format"))
        },
    };
    blob.ensure_end()?;
    Ok(pubkey)
}

fn encode_pubkey(pubkey: &Pubkey) -> Result<Bytes> {
    let mut blob = WireBuf::new();
    match pubkey {
        Pubkey::Ed25519(pubkey) => ed25519::encode_pubkey(&mut blob, pubkey)?,
        Pubkey::Rsa(pubkey) => rsa::encode_pubkey(&mut blob, pubkey)?,
    }
    Ok(blob.into_bytes())
}
