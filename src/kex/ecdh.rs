use bytes::Bytes;
use p256::elliptic_curve;
use elliptic_curve::{AffinePoint, CurveArithmetic, FieldBytesSize, PublicKey};
use elliptic_curve::ecdh::EphemeralSecret;
use elliptic_curve::sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint};
use std::fmt;
use zeroize::Zeroizing;
use crate::codec::WireBuf;
use crate::error::{Error, Result};
use crate::util::CryptoRngCore;
use super::{EphemeralKex, EphPubkey, HashAlgo, KexAlgo, SharedSecret};

/// "ecdh-sha2-nistp256" key exchange from RFC 5656.
pub static ECDH_SHA2_NISTP256: KexAlgo = KexAlgo {
    name: "ecdh-sha2-nistp256",
    hash: HashAlgo::Sha256,
    make_kex: |rng, _| Ok(EphemeralKex::EcdhP256(EcdhKex::generate(rng))),
};

/// "ecdh-sha2-nistp384" key exchange from RFC 5656.
pub static ECDH_SHA2_NISTP384: KexAlgo = KexAlgo {
    name: "ecdh-sha2-nistp384",
    hash: HashAlgo::Sha384,
    make_kex: |rng, _| Ok(EphemeralKex::EcdhP384(EcdhKex::generate(rng))),
};

pub(crate) struct EcdhKex<C: CurveArithmetic> {
    our_privkey: EphemeralSecret<C>,
    our_pubkey: Bytes,
}

impl<C> EcdhKex<C>
    where C: CurveArithmetic,
          FieldBytesSize<C>: ModulusSize,
          AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
{
    fn generate(rng: &mut dyn CryptoRngCore) -> Self {
        let mut rng = rng;
        let our_privkey = EphemeralSecret::<C>::random(&mut rng);
        let our_point = our_privkey.public_key().to_encoded_point(false);
        log::debug!("generated ecdh keypair");
        Self { our_privkey, our_pubkey: Bytes::copy_from_slice(our_point.as_bytes()) }
    }

    pub fn our_pubkey(&self) -> EphPubkey {
        EphPubkey::Bytes(self.our_pubkey.clone())
    }

    pub fn decode_peer_pubkey(&self, payload: &mut WireBuf) -> Result<EphPubkey> {
        // RFC 5656, sections 4 and 3.2.2: uncompressed point that lies on the curve
        let peer_pubkey = payload.get_bytes()?;
        if peer_pubkey.len() != self.our_pubkey.len() || peer_pubkey.first() != Some(&0x04) {
            return Err(Error::Protocol("ecdh public key must be an uncompressed point"))
        }
        decode_point::<C>(&peer_pubkey)?;
        Ok(EphPubkey::Bytes(peer_pubkey))
    }

    pub fn compute_shared_secret(self, peer_pubkey: &EphPubkey) -> Result<SharedSecret> {
        let EphPubkey::Bytes(peer_pubkey) = peer_pubkey else {
            return Err(Error::KeyTypeMismatch)
        };
        let peer_pubkey = decode_point::<C>(peer_pubkey)?;
        let shared = self.our_privkey.diffie_hellman(&peer_pubkey);
        Ok(SharedSecret(Zeroizing::new(shared.raw_secret_bytes().to_vec())))
    }
}

fn decode_point<C>(bytes: &[u8]) -> Result<PublicKey<C>>
    where C: CurveArithmetic,
          FieldBytesSize<C>: ModulusSize,
          AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
{
    PublicKey::<C>::from_sec1_bytes(bytes)
        .map_err(|_| Error::Protocol("ecdh public key is not a valid curve point"))
}

impl<C: CurveArithmetic> fmt::Debug for EcdhKex<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EcdhKex")
            .field("our_pubkey", &self.our_pubkey)
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

    fn check_agrees<C>(seed: u64, secret_len: usize)
        where C: CurveArithmetic,
              FieldBytesSize<C>: ModulusSize,
              AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        let alice = EcdhKex::<C>::generate(&mut rng);
        let bob = EcdhKex::<C>::generate(&mut rng);
        assert_eq!(alice.our_pubkey.len(), 1 + 2 * secret_len);

        let alice_pub = bob.decode_peer_pubkey(&mut encoded(&alice.our_pubkey)).unwrap();
        let bob_pub = alice.decode_peer_pubkey(&mut encoded(&bob.our_pubkey)).unwrap();
        let alice_secret = alice.compute_shared_secret(&bob_pub).unwrap();
        let bob_secret = bob.compute_shared_secret(&alice_pub).unwrap();
        assert_eq!(alice_secret, bob_secret);
        assert_eq!(alice_secret.as_bytes().len(), secret_len);
    }

    #[test]
    fn test_shared_secret_agrees() {
        check_agrees::<p256::NistP256>(11, 32);
        check_agrees::<p384::NistP384>(12, 48);
    }

    #[test]
    fn test_reject_invalid_points() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(13);
        let kex = EcdhKex::<p256::NistP256>::generate(&mut rng);
        let check_err = |bytes: &[u8]| {
            let res = kex.decode_peer_pubkey(&mut encoded(bytes));
            assert!(matches!(res, Err(Error::Protocol(_))), "{:?}", res);
        };

        // identity, compressed form, wrong length and a point off the curve
        check_err(&[0x00]);
        let mut compressed = kex.our_pubkey[..33].to_vec();
        compressed[0] = 0x02;
        check_err(&compressed);
        check_err(&kex.our_pubkey[..64]);
        let mut off_curve = vec![0x04];
        off_curve.extend_from_slice(&[0; 64]);
        check_err(&off_curve);

        // a p384 point is not a p256 point
        let other = EcdhKex::<p384::NistP384>::generate(&mut rng);
        check_err(&other.our_pubkey);

        assert!(matches!(kex.decode_peer_pubkey(&mut WireBuf::from_bytes(&[0, 0, 0, 65, 4])),
            Err(Error::MessageIncomplete)));
    }
}
