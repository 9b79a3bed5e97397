use md5::{Digest as _, Md5};
use num_bigint_dig::{BigUint, RandBigInt as _};
use std::fmt;
use subtle::ConstantTimeEq as _;
use zeroize::Zeroizing;
use crate::error::{Error, Result};
use crate::pubkey::{RsaPrivkey, RsaPubkey};
use crate::util::CryptoRngCore;

/// Length of the client's response in bytes.
pub const RESPONSE_LEN: usize = 16;

/// Number of random bits in a challenge, before it is reduced modulo `n`.
const CHALLENGE_BITS: usize = 256;

/// Length to which the challenge is padded before hashing.
const PADDED_CHALLENGE_LEN: usize = 32;

const MAX_CHALLENGE_ATTEMPTS: usize = 10;

/// A single-use RSA challenge.
///
/// The plaintext is zeroed when the challenge is dropped and it is never printed.
pub struct Challenge {
    plaintext: Zeroizing<BigUint>,
    encrypted: BigUint,
}

impl Challenge {
    /// The challenge encrypted with the client's public key, to be sent to the client.
    pub fn encrypted(&self) -> &BigUint {
        &self.encrypted
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Challenge")
            .field("encrypted_bits", &self.encrypted.bits())
            .finish_non_exhaustive()
    }
}

/// Generates a random challenge for `pubkey` and encrypts it.
///
/// Returns `None` (without generating anything) if the modulus of the key has fewer than
/// `min_bits` bits.
pub fn generate_challenge(
    pubkey: &RsaPubkey,
    min_bits: usize,
    rng: &mut dyn CryptoRngCore,
) -> Result<Option<Challenge>> {
    if pubkey.bits() < min_bits {
        log::info!("rsa modulus too small: {} < minimum {} bits", pubkey.bits(), min_bits);
        return Ok(None)
    }

    let plaintext = random_challenge(pubkey.n(), rng)?;
    let plaintext_bytes = Zeroizing::new(plaintext.to_bytes_be());
    let encrypted = pubkey.encrypt(rng, &plaintext_bytes)?;
    Ok(Some(Challenge { plaintext, encrypted: BigUint::from_bytes_be(&encrypted) }))
}

fn random_challenge(n: &BigUint, rng: &mut dyn CryptoRngCore) -> Result<Zeroizing<BigUint>> {
    for _ in 0..MAX_CHALLENGE_ATTEMPTS {
        let random = Zeroizing::new(rng.as_rngcore().gen_biguint(CHALLENGE_BITS));
        let challenge = Zeroizing::new(&*random % n);
        // zero has no encoding in the padded form and would be trivial to answer
        if challenge.bits() != 0 {
            return Ok(challenge)
        }
    }
    Err(Error::Random("could not generate nonzero rsa challenge"))
}

/// Computes the expected response to a challenge: `MD5(pad32(challenge) || session_id)`.
pub fn expected_response(challenge: &BigUint, session_id: &[u8]) -> Result<[u8; RESPONSE_LEN]> {
    let challenge_bytes = Zeroizing::new(challenge.to_bytes_be());
    if challenge.bits() == 0 || challenge_bytes.len() > PADDED_CHALLENGE_LEN {
        return Err(Error::Internal("rsa challenge must have between 1 and 32 bytes"))
    }

    let mut padded = Zeroizing::new([0u8; PADDED_CHALLENGE_LEN]);
    padded[PADDED_CHALLENGE_LEN - challenge_bytes.len()..].copy_from_slice(&challenge_bytes);

    let mut md = Md5::new();
    md.update(&padded[..]);
    md.update(session_id);
    let mut response = [0; RESPONSE_LEN];
    response.copy_from_slice(&md.finalize());
    Ok(response)
}

/// Checks the client's response in constant time.
///
/// The response is bound to `session_id`, so a response captured on another connection is
/// rejected.
pub fn verify_response(challenge: &Challenge, session_id: &[u8], response: &[u8]) -> Result<bool> {
    let expected = Zeroizing::new(expected_response(&challenge.plaintext, session_id)?);
    Ok(expected[..].ct_eq(response).into())
}

/// Computes the client's response to an encrypted challenge.
pub fn compute_response(
    privkey: &RsaPrivkey,
    encrypted: &BigUint,
    session_id: &[u8],
) -> Result<[u8; RESPONSE_LEN]> {
    let plaintext_bytes = privkey.decrypt(&encrypted.to_bytes_be())?;
    let plaintext = Zeroizing::new(BigUint::from_bytes_be(&plaintext_bytes));
    expected_response(&plaintext, session_id)
}
