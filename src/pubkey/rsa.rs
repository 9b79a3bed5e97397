use bytes::Bytes;
use num_bigint_dig::BigUint;
use rsa::traits::PublicKeyParts as _;
use std::fmt;
use crate::codec::WireBuf;
use crate::error::{Result, Error};
use crate::util::CryptoRngCore;
use super::{PubkeyAlgo, Pubkey, Privkey, SignatureVerified};

/// "ssh-rsa" public key algorithm using SHA-1 from RFC 4253.
///
/// This algorithm is compatible with [`RsaPubkey`] and [`RsaPrivkey`].
pub static SSH_RSA_SHA1: PubkeyAlgo = PubkeyAlgo {
    name: "ssh-rsa",
    verify: verify::<sha1::Sha1>,
    sign: sign::<sha1::Sha1>,
};

/// "rsa-sha2-256" public key algorithm using SHA2-256 from RFC 8332.
///
/// This algorithm is compatible with [`RsaPubkey`] and [`RsaPrivkey`].
pub static RSA_SHA2_256: PubkeyAlgo = PubkeyAlgo {
    name: "rsa-sha2-256",
    verify: verify::<sha2::Sha256>,
    sign: sign::<sha2::Sha256>,
};

/// "rsa-sha2-512" public key algorithm using SHA2-512 from RFC 8332.
///
/// This algorithm is compatible with [`RsaPubkey`] and [`RsaPrivkey`].
pub static RSA_SHA2_512: PubkeyAlgo = PubkeyAlgo {
    name: "rsa-sha2-512",
    verify: verify::<sha2::Sha512>,
    sign: sign::<sha2::Sha512>,
};

/// Largest modulus that we accept in keys read from authorized keys files.
const MAX_MODULUS_BITS: usize = 16384;

/// RSA public key.
///
/// This key is compatible with [`SSH_RSA_SHA1`], [`RSA_SHA2_256`] and [`RSA_SHA2_512`]. You can
/// convert it to and from [`rsa::RsaPublicKey`] using `from()`/`into()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPubkey {
    pub(crate) pubkey: rsa::RsaPublicKey,
}

/// RSA private key.
///
/// This key is compatible with [`SSH_RSA_SHA1`], [`RSA_SHA2_256`] and [`RSA_SHA2_512`]. You can
/// convert it to and from [`rsa::RsaPrivateKey`] using `from()`/`into()`.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "debug_less_secure", derive(Debug))]
pub struct RsaPrivkey {
    pub(crate) privkey: rsa::RsaPrivateKey,
}

impl RsaPubkey {
    /// Creates a key from the modulus and public exponent.
    pub fn new(n: BigUint, e: BigUint) -> Result<Self> {
        let pubkey = rsa::RsaPublicKey::new_with_max_size(n, e, MAX_MODULUS_BITS)
            .map_err(|_| Error::Crypto("rsa public key is not valid"))?;
        Ok(Self { pubkey })
    }

    /// The modulus `n`.
    pub fn n(&self) -> &BigUint {
        self.pubkey.n()
    }

    /// The public exponent `e`.
    pub fn e(&self) -> &BigUint {
        self.pubkey.e()
    }

    /// Number of significant bits in the modulus.
    pub fn bits(&self) -> usize {
        self.pubkey.n().bits()
    }

    /// Encrypts `msg` with PKCS#1 v1.5 padding.
    pub(crate) fn encrypt(&self, mut rng: &mut dyn CryptoRngCore, msg: &[u8]) -> Result<Vec<u8>> {
        self.pubkey.encrypt(&mut rng, rsa::Pkcs1v15Encrypt, msg)
            .map_err(|_| Error::Crypto("could not encrypt with rsa public key"))
    }
}

impl RsaPrivkey {
    /// Generates a new random keypair with a modulus of `bits` bits.
    ///
    /// This is slow, it is meant for tests and tools.
    pub fn random(mut rng: &mut dyn CryptoRngCore, bits: usize) -> Result<Self> {
        let privkey = rsa::RsaPrivateKey::new(&mut rng, bits)
            .map_err(|_| Error::Crypto("could not generate rsa private key"))?;
        Ok(Self { privkey })
    }

    /// Get the public key associated with this private key.
    pub fn pubkey(&self) -> RsaPubkey {
        RsaPubkey { pubkey: self.privkey.to_public_key() }
    }

    /// Decrypts a PKCS#1 v1.5 encrypted message.
    pub(crate) fn decrypt(&self, ciphertext: &[u8]) -> Result<zeroize::Zeroizing<Vec<u8>>> {
        // the ciphertext may have lost leading zeros when it was sent as a bignum
        let size = self.privkey.size();
        if ciphertext.len() > size {
            return Err(Error::Crypto("rsa ciphertext is too long"))
        }
        let mut padded = vec![0; size - ciphertext.len()];
        padded.extend_from_slice(ciphertext);

        self.privkey.decrypt(rsa::Pkcs1v15Encrypt, &padded)
            .map(zeroize::Zeroizing::new)
            .map_err(|_| Error::Crypto("could not decrypt with rsa private key"))
    }
}

fn verify<H: RsaHash>(pubkey: &Pubkey, message: &[u8], signature: Bytes) -> Result<SignatureVerified> {
    let Pubkey::Rsa(pubkey) = pubkey else { return Err(Error::KeyTypeMismatch) };

    let mut signature = WireBuf::from(signature);
    if signature.get_cstring()? != H::ALGO_NAME {
        return Err(Error::InvalidFormat("unexpected rsa signature format"))
    }
    let signature_data = signature.get_bytes()?;
    signature.ensure_end()?;

    let hashed = H::digest(message);
    let scheme = rsa::Pkcs1v15Sign::new::<H>();
    match pubkey.pubkey.verify(scheme, &hashed, &signature_data) {
        Ok(_) => Ok(SignatureVerified::assertion()),
        Err(_) => Err(Error::Signature),
    }
}

fn sign<H: RsaHash>(privkey: &Privkey, message: &[u8]) -> Result<Bytes> {
    let Privkey::Rsa(privkey) = privkey else { return Err(Error::KeyTypeMismatch) };

    let hashed = H::digest(message);
    let scheme = rsa::Pkcs1v15Sign::new::<H>();
    let signature_data = privkey.privkey.sign(scheme, &hashed)
        .map_err(|_| Error::Crypto("could not sign with rsa"))?;

    let mut signature = WireBuf::new();
    signature.put_str(H::ALGO_NAME)?;
    signature.put_bytes(&signature_data)?;
    Ok(signature.into_bytes())
}

trait RsaHash: sha2::Digest + sha2::digest::const_oid::AssociatedOid {
    const ALGO_NAME: &'static str;
}

impl RsaHash for sha1::Sha1 {
    const ALGO_NAME: &'static str = "ssh-rsa";
}

impl RsaHash for sha2::Sha256 {
    const ALGO_NAME: &'static str = "rsa-sha2-256";
}

impl RsaHash for sha2::Sha512 {
    const ALGO_NAME: &'static str = "rsa-sha2-512";
}

pub(super) fn encode_pubkey(blob: &mut WireBuf, pubkey: &RsaPubkey) -> Result<()> {
    blob.put_str("ssh-rsa")?;
    blob.put_biguint(pubkey.e())?;
    blob.put_biguint(pubkey.n())
}

pub(super) fn decode_pubkey(blob: &mut WireBuf) -> Result<RsaPubkey> {
    let e = blob.get_biguint()?;
    let n = blob.get_biguint()?;
    RsaPubkey::new(n, e)
}

impl From<rsa::RsaPublicKey> for RsaPubkey {
    fn from(pubkey: rsa::RsaPublicKey) -> Self { Self { pubkey } }
}

impl From<RsaPubkey> for rsa::RsaPublicKey {
    fn from(pubkey: RsaPubkey) -> Self { pubkey.pubkey }
}

impl From<rsa::RsaPrivateKey> for RsaPrivkey {
    fn from(privkey: rsa::RsaPrivateKey) -> Self { Self { privkey } }
}

impl From<RsaPrivkey> for rsa::RsaPrivateKey {
    fn from(privkey: RsaPrivkey) -> Self { privkey.privkey }
}

impl fmt::Display for RsaPubkey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "rsa {} bits, e {}", self.bits(), self.e())
    }
}
