use rand::{CryptoRng, RngCore};
use crate::error::{Error, Result};

/// Cryptographically secure random generator, usable as a trait object.
///
/// This is implemented for every [`RngCore`] + [`CryptoRng`], such as [`rand::rngs::OsRng`].
// adapted from an unpublished version of `rng_core`
pub trait CryptoRngCore: CryptoRng + RngCore {
    /// Upcast to a plain [`RngCore`] trait object.
    fn as_rngcore(&mut self) -> &mut dyn RngCore;
}

impl<T: CryptoRng + RngCore> CryptoRngCore for T {
    fn as_rngcore(&mut self) -> &mut dyn RngCore {
        self
    }
}

pub(crate) fn fill_random(rng: &mut dyn CryptoRngCore, dest: &mut [u8], what: &'static str) -> Result<()> {
    rng.try_fill_bytes(dest).map_err(|_| Error::Random(what))
}
