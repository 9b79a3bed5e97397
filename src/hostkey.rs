//! Access to the server's long-term host keys.
//!
//! The key exchange never touches the private host key directly: it asks a [`HostKeys`]
//! implementation for the public key and for a signature. The signer may live behind a privilege
//! boundary (for example in a separate process); [`LocalHostKeys`] is the in-process
//! implementation.
use bytes::Bytes;
use crate::error::{Error, Result};
use crate::pubkey::{Privkey, Pubkey, PubkeyAlgo};

/// Provider of host keys for the server side of the key exchange.
pub trait HostKeys {
    /// Returns the public host key usable with `algo`.
    ///
    /// Fails with [`Error::KeyTypeMismatch`] if there is no such key.
    fn pubkey(&self, algo: &PubkeyAlgo) -> Result<Pubkey>;

    /// Signs `data` (the exchange hash) with the host key usable with `algo`.
    ///
    /// Any failure is reported as [`Error::HostKeySign`].
    fn sign(&self, algo: &PubkeyAlgo, data: &[u8]) -> Result<Bytes>;

    /// Returns true if we have a host key for `algo`.
    fn supports(&self, algo: &PubkeyAlgo) -> bool {
        self.pubkey(algo).is_ok()
    }
}

/// Host keys held in memory of this process.
#[derive(Default)]
#[cfg_attr(feature = "debug_less_secure", derive(Debug))]
pub struct LocalHostKeys {
    keys: Vec<Privkey>,
}

impl LocalHostKeys {
    /// Creates a provider with the given keys.
    ///
    /// When several keys fit an algorithm, the first one is used.
    pub fn new(keys: Vec<Privkey>) -> Self {
        Self { keys }
    }

    /// Adds another key.
    pub fn add(&mut self, key: Privkey) {
        self.keys.push(key);
    }

    fn find(&self, algo: &PubkeyAlgo) -> Result<&Privkey> {
        self.keys.iter()
            .find(|key| key.pubkey().supports_algo(algo))
            .ok_or(Error::KeyTypeMismatch)
    }
}

impl HostKeys for LocalHostKeys {
    fn pubkey(&self, algo: &PubkeyAlgo) -> Result<Pubkey> {
        self.find(algo).map(|key| key.pubkey())
    }

    fn sign(&self, algo: &PubkeyAlgo, data: &[u8]) -> Result<Bytes> {
        let key = self.find(algo).map_err(|_| Error::HostKeySign)?;
        algo.sign(key, data).map_err(|err| {
            log::warn!("could not sign with host key for {}: {}", algo.name, err);
            Error::HostKeySign
        })
    }
}
