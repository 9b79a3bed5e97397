use bytes::Bytes;
use std::fmt;
use zeroize::Zeroizing;
use crate::codec::WireBuf;
use crate::error::{Error, Result};
use crate::util::CryptoRngCore;
use super::{EphemeralKex, EphPubkey, HashAlgo, KexAlgo, SharedSecret};

/// "curve25519-sha256" key exchange from RFC 8731.
pub static CURVE25519_SHA256: KexAlgo = KexAlgo {
    name: "curve25519-sha256",
    hash: HashAlgo::Sha256,
    make_kex: |rng, _| Ok(EphemeralKex::Curve25519(Curve25519Kex::generate(rng))),
};

/// "curve25519-sha256@libssh.com" key exchange, the name used before RFC 8731.
pub static CURVE25519_SHA256_LIBSSH: KexAlgo = KexAlgo {
    name: "curve25519-sha256@libssh.com",
    hash: HashAlgo::Sha256,
    make_kex: |rng, _| Ok(EphemeralKex::Curve25519(Curve25519Kex::generate(rng))),
};

pub(crate) struct Curve25519Kex {
    our_privkey: x25519_dalek::EphemeralSecret,
    our_pubkey: x25519_dalek::PublicKey,
}

impl Curve25519Kex {
    fn generate(rng: &mut dyn CryptoRngCore) -> Self {
        let our_privkey = x25519_dalek::EphemeralSecret::random_from_rng(&mut *rng);
        let our_pubkey = x25519_dalek::PublicKey::from(&our_privkey);
        log::debug!("generated curve25519 keypair");
        Self { our_privkey, our_pubkey }
    }

    pub fn our_pubkey(&self) -> EphPubkey {
        EphPubkey::Bytes(Bytes::copy_from_slice(self.our_pubkey.as_bytes()))
    }

    pub fn decode_peer_pubkey(&self, payload: &mut WireBuf) -> Result<EphPubkey> {
        // RFC 8731, section 3
        let peer_pubkey = payload.get_bytes()?;
        if peer_pubkey.len() != 32 {
            return Err(Error::Protocol("curve25519 public key must have 32 bytes"))
        }
        Ok(EphPubkey::Bytes(peer_pubkey))
    }

    pub fn compute_shared_secret(self, peer_pubkey: &EphPubkey) -> Result<SharedSecret> {
        let EphPubkey::Bytes(peer_pubkey) = peer_pubkey else {
            return Err(Error::KeyTypeMismatch)
        };
        let peer_pubkey: [u8; 32] = peer_pubkey.as_ref().try_into()
            .map_err(|_| Error::Protocol("curve25519 public key must have 32 bytes"))?;

        let shared = self.our_privkey.diffie_hellman(&x25519_dalek::PublicKey::from(peer_pubkey));

        // RFC 8731, section 3: an all-zero result means that the peer sent a low-order point
        if !shared.was_contributory() {
            return Err(Error::Protocol("curve25519 shared secret is not contributory"))
        }
        Ok(SharedSecret(Zeroizing::new(shared.as_bytes().to_vec())))
    }
}

impl fmt::Debug for Curve25519Kex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Curve25519Kex")
            .field("our_pubkey", &Bytes::copy_from_slice(self.our_pubkey.as_bytes()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use super::*;

    fn encoded(bytes: &[u8]) -> WireBuf {
        let mut buf = WireBuf::new();
        buf.put_bytes(bytes).unwrap();
        buf
    }

    #[test]
    fn test_shared_secret_agrees() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
        let alice = Curve25519Kex::generate(&mut rng);
        let bob = Curve25519Kex::generate(&mut rng);

        let alice_pub = bob.decode_peer_pubkey(&mut encoded(alice.our_pubkey.as_bytes())).unwrap();
        let bob_pub = alice.decode_peer_pubkey(&mut encoded(bob.our_pubkey.as_bytes())).unwrap();
        let alice_secret = alice.compute_shared_secret(&bob_pub).unwrap();
        let bob_secret = bob.compute_shared_secret(&alice_pub).unwrap();
        assert_eq!(alice_secret, bob_secret);
        assert_eq!(alice_secret.as_bytes().len(), 32);
    }

    #[test]
    fn test_reject_wrong_length() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(4);
        let kex = Curve25519Kex::generate(&mut rng);
        assert!(matches!(kex.decode_peer_pubkey(&mut encoded(&[9; 31])), Err(Error::Protocol(_))));
        assert!(matches!(kex.decode_peer_pubkey(&mut encoded(&[9; 33])), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_reject_low_order_point() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(5);
        let kex = Curve25519Kex::generate(&mut rng);
        let zero = kex.decode_peer_pubkey(&mut encoded(&[0; 32])).unwrap();
        assert!(matches!(kex.compute_shared_secret(&zero), Err(Error::Protocol(_))));
    }
}
