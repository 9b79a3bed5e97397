//! RSA challenge-response authentication.
//!
//! The client offers the modulus of its RSA key. The server looks the key up in the user's
//! authorized keys files ([`RsaAuth::lookup()`]), encrypts a random challenge with it
//! ([`RsaAuth::challenge()`]) and accepts the client only if it answers with
//! `MD5(challenge || session_id)` ([`RsaAuth::verify()`]). Binding the answer to the session
//! identifier prevents replay on another connection.
//!
//! Rejection is an ordinary outcome ([`AuthOutcome::Rejected`]), not an error, and the peer
//! always receives the same failure message, whatever the reason.
use num_bigint_dig::BigUint;
use crate::codec::WireBuf;
use crate::codes::msg;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::kex::SessionId;
use crate::pubkey::{Pubkey, RsaPrivkey, RsaPubkey};
use crate::transport::{Transport, disconnect_on_error};
use crate::util::CryptoRngCore;
pub use self::key_file::{KeyFile, KeyRecord};
pub use self::options::{ClientAddr, KeyOptions, OptionsPolicy, StandardOptionsPolicy};
pub use self::rsa::{
    Challenge, RESPONSE_LEN, compute_response, expected_response, generate_challenge,
    verify_response,
};
pub use self::sources::{FsKeySources, KeySources};

mod key_file;
mod options;
mod rsa;
mod sources;

/// Check whether a key has been revoked.
pub trait RevocationCheck {
    /// Returns true if `key` must never be accepted.
    fn is_revoked(&self, key: &RsaPubkey) -> bool;
}

/// No key is revoked.
#[derive(Debug, Copy, Clone, Default)]
pub struct NoRevocation;

impl RevocationCheck for NoRevocation {
    fn is_revoked(&self, _key: &RsaPubkey) -> bool {
        false
    }
}

/// A list of revoked keys.
#[derive(Debug, Clone, Default)]
pub struct RevokedKeys {
    keys: Vec<RsaPubkey>,
}

impl RevokedKeys {
    /// Creates the list.
    pub fn new(keys: Vec<RsaPubkey>) -> Self {
        Self { keys }
    }

    /// Adds a revoked key.
    pub fn revoke(&mut self, key: RsaPubkey) {
        self.keys.push(key);
    }
}

impl RevocationCheck for RevokedKeys {
    fn is_revoked(&self, key: &RsaPubkey) -> bool {
        self.keys.iter().any(|revoked| revoked == key)
    }
}

/// A key found by [`RsaAuth::lookup()`], together with its parsed options.
#[derive(Debug, Clone)]
pub struct AuthorizedKey {
    /// The record from the authorized keys file.
    pub record: KeyRecord,
    /// The options of the key, which restrict what the authenticated client may do.
    pub options: KeyOptions,
}

/// Result of one authentication attempt.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// The client proved possession of this key.
    Accepted(AuthorizedKey),
    /// The attempt failed; the client may try another key.
    Rejected,
}

/// Server side of RSA challenge-response authentication for one user.
pub struct RsaAuth<'a> {
    config: &'a ServerConfig,
    sources: &'a dyn KeySources,
    revocation: &'a dyn RevocationCheck,
    policy: &'a dyn OptionsPolicy,
}

impl<'a> RsaAuth<'a> {
    /// Creates the authenticator.
    ///
    /// The key files named in [`ServerConfig::authorized_keys_files`] are read from `sources`.
    pub fn new(
        config: &'a ServerConfig,
        sources: &'a dyn KeySources,
        revocation: &'a dyn RevocationCheck,
        policy: &'a dyn OptionsPolicy,
    ) -> Self {
        Self { config, sources, revocation, policy }
    }

    /// Finds the authorized key with modulus `client_n`.
    ///
    /// The sources are tried in order and the first usable match wins; a source that cannot be
    /// read is skipped like a missing one. Keys that are revoked,
    /// whose options are rejected or that are marked `cert-authority` are never returned.
    pub fn lookup(&self, client_n: &BigUint) -> Result<Option<AuthorizedKey>> {
        for source in self.config.authorized_keys_files.iter() {
            if source.eq_ignore_ascii_case("none") {
                continue
            }

            let data = match self.sources.read(source) {
                Ok(Some(data)) => data,
                Ok(None) => {
                    log::debug!("authorized keys file {:?} does not exist", source);
                    continue
                },
                Err(err) => {
                    log::warn!("could not read authorized keys file {:?}: {}", source, err);
                    continue
                },
            };
            let file = KeyFile::decode(source, data);
            if let Some(key) = self.lookup_in_file(&file, client_n) {
                return Ok(Some(key))
            }
        }
        Ok(None)
    }

    fn lookup_in_file(&self, file: &KeyFile, client_n: &BigUint) -> Option<AuthorizedKey> {
        for record in file.records() {
            let pubkey = record.pubkey();
            if pubkey.n() != client_n {
                continue
            }

            if record.bits() as usize != pubkey.bits() {
                log::warn!("{}, line {}: keysize mismatch: actual {} vs. announced {}",
                    record.source(), record.line(), pubkey.bits(), record.bits());
            }
            log::debug!("matching key found: {}, line {}: {}", record.source(), record.line(),
                fingerprint(pubkey));

            if self.revocation.is_revoked(pubkey) {
                log::info!("{}, line {}: key is revoked", record.source(), record.line());
                return None
            }

            let options = match record.options() {
                Some(options) => match self.policy.parse(options) {
                    Some(options) => options,
                    None => continue,
                },
                None => KeyOptions::default(),
            };
            if options.cert_authority {
                log::debug!("{}, line {}: key is a certificate authority", record.source(), record.line());
                continue
            }

            return Some(AuthorizedKey { record: record.clone(), options })
        }
        None
    }

    /// Generates a challenge for `key`.
    ///
    /// Returns `None` if the modulus of the key is smaller than
    /// [`ServerConfig::rsa_min_modulus_bits`].
    pub fn challenge(&self, key: &AuthorizedKey, rng: &mut dyn CryptoRngCore) -> Result<Option<Challenge>> {
        generate_challenge(key.record.pubkey(), self.config.rsa_min_modulus_bits, rng)
    }

    /// Checks the client's response to `challenge`.
    pub fn verify(&self, challenge: &Challenge, session_id: &SessionId, response: &[u8]) -> Result<bool> {
        verify_response(challenge, session_id.as_bytes(), response)
    }

    /// Runs one authentication attempt.
    ///
    /// `request` is the payload of `SSH_CMSG_AUTH_RSA` with the client's modulus. If the key is
    /// usable, we send `SSH_SMSG_AUTH_RSA_CHALLENGE` and wait for `SSH_CMSG_AUTH_RSA_RESPONSE`.
    /// The attempt ends with `SSH_SMSG_SUCCESS` or `SSH_SMSG_FAILURE`.
    ///
    /// Malformed messages are fatal errors; we try to send `SSH_MSG_DISCONNECT` before returning
    /// them.
    pub fn authenticate(
        &self,
        session_id: &SessionId,
        transport: &mut dyn Transport,
        request: &mut WireBuf,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<AuthOutcome> {
        let res = self.run_attempt(session_id, transport, request, rng);
        if let Err(err) = &res {
            disconnect_on_error(transport, err);
        }
        res
    }

    fn run_attempt(
        &self,
        session_id: &SessionId,
        transport: &mut dyn Transport,
        request: &mut WireBuf,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<AuthOutcome> {
        let client_n = request.get_bignum1()?;
        request.ensure_end()?;

        let Some(key) = self.lookup(&client_n)? else {
            log::debug!("rsa key with {}-bit modulus is not authorized", client_n.bits());
            return reject(transport)
        };
        let Some(challenge) = self.challenge(&key, rng)? else {
            return reject(transport)
        };

        let mut payload = WireBuf::new();
        payload.put_bignum1(challenge.encrypted())?;
        transport.send(msg::SMSG_AUTH_RSA_CHALLENGE, payload)?;

        let mut payload = transport.recv_expecting(msg::CMSG_AUTH_RSA_RESPONSE)?;
        let response = payload.get_raw(RESPONSE_LEN)?;
        payload.ensure_end()?;

        if !self.verify(&challenge, session_id, &response)? {
            log::info!("wrong response to rsa authentication challenge");
            return reject(transport)
        }

        log::info!("rsa authentication accepted: {}, line {}: {}",
            key.record.source(), key.record.line(), fingerprint(key.record.pubkey()));
        transport.send(msg::SMSG_SUCCESS, WireBuf::new())?;
        Ok(AuthOutcome::Accepted(key))
    }
}

fn reject(transport: &mut dyn Transport) -> Result<AuthOutcome> {
    transport.send(msg::SMSG_FAILURE, WireBuf::new())?;
    Ok(AuthOutcome::Rejected)
}

fn fingerprint(pubkey: &RsaPubkey) -> String {
    Pubkey::Rsa(pubkey.clone()).fingerprint()
        .unwrap_or_else(|_| "<no fingerprint>".into())
}

/// Client side of one RSA authentication attempt.
///
/// Offers `privkey` to the server and answers its challenge. Returns true if the server accepted
/// the key.
pub fn authenticate_client(
    privkey: &RsaPrivkey,
    session_id: &SessionId,
    transport: &mut dyn Transport,
) -> Result<bool> {
    let mut request = WireBuf::new();
    request.put_bignum1(privkey.pubkey().n())?;
    transport.send(msg::CMSG_AUTH_RSA, request)?;

    let (msg_id, mut payload) = transport.recv()?;
    match msg_id {
        msg::SMSG_FAILURE => {
            payload.ensure_end()?;
            return Ok(false)
        },
        msg::SMSG_AUTH_RSA_CHALLENGE => {},
        _ => return Err(Error::UnexpectedPacket(msg_id)),
    }

    let encrypted = payload.get_bignum1()?;
    payload.ensure_end()?;
    let response = compute_response(privkey, &encrypted, session_id.as_bytes())?;
    let mut payload = WireBuf::new();
    payload.put_raw(&response)?;
    transport.send(msg::CMSG_AUTH_RSA_RESPONSE, payload)?;

    let (msg_id, payload) = transport.recv()?;
    payload.ensure_end()?;
    match msg_id {
        msg::SMSG_SUCCESS => Ok(true),
        msg::SMSG_FAILURE => Ok(false),
        _ => Err(Error::UnexpectedPacket(msg_id)),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rand::SeedableRng as _;
    use std::collections::HashMap;
    use super::*;

    struct Fixture {
        privkey: RsaPrivkey,
        sources: HashMap<String, Bytes>,
    }

    fn key_line(pubkey: &RsaPubkey) -> String {
        format!("{} {} {}", pubkey.bits(), pubkey.e(), pubkey.n())
    }

    fn fixture(lines: impl Fn(&str) -> String) -> Fixture {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(17);
        let privkey = RsaPrivkey::random(&mut rng, 1024).unwrap();
        let data = lines(&key_line(&privkey.pubkey()));
        let mut sources = HashMap::new();
        sources.insert(".ssh/authorized_keys".to_string(), Bytes::from(data));
        Fixture { privkey, sources }
    }

    fn lookup(fixture: &Fixture, config: &ServerConfig, revocation: &dyn RevocationCheck) -> Option<AuthorizedKey> {
        let policy = StandardOptionsPolicy::default();
        let auth = RsaAuth::new(config, &fixture.sources, revocation, &policy);
        auth.lookup(fixture.privkey.pubkey().n()).unwrap()
    }

    #[test]
    fn test_lookup_finds_key() {
        let fixture = fixture(|key| format!("# comment\n{} first\n{} second\n", key, key));
        let found = lookup(&fixture, &ServerConfig::default(), &NoRevocation).unwrap();
        assert_eq!(found.record.line(), 2);
        assert_eq!(found.record.comment(), Some("first"));
        assert_eq!(found.options, KeyOptions::default());
    }

    #[test]
    fn test_lookup_unknown_key() {
        let fixture = fixture(|_| "1024 65537 1234567\n".into());
        assert!(lookup(&fixture, &ServerConfig::default(), &NoRevocation).is_none());
    }

    #[test]
    fn test_lookup_skips_rejected_options_and_cert_authority() {
        let fixture = fixture(|key| format!(
            "bogus-option {key} a\ncert-authority {key} b\nno-pty {key} c\n", key = key));
        let found = lookup(&fixture, &ServerConfig::default(), &NoRevocation).unwrap();
        assert_eq!(found.record.comment(), Some("c"));
        assert!(found.options.no_pty);
    }

    #[test]
    fn test_lookup_ignores_bits_mismatch() {
        let fixture = fixture(|key| {
            let (_bits, rest) = key.split_once(' ').unwrap();
            format!("2048 {}\n", rest)
        });
        let found = lookup(&fixture, &ServerConfig::default(), &NoRevocation).unwrap();
        assert_eq!(found.record.bits(), 2048);
    }

    #[test]
    fn test_lookup_never_returns_revoked_key() {
        let fixture = fixture(|key| format!("{}\n", key));
        let revoked = RevokedKeys::new(vec![fixture.privkey.pubkey()]);
        assert!(lookup(&fixture, &ServerConfig::default(), &revoked).is_none());
    }

    #[test]
    fn test_lookup_sources() {
        let fixture = fixture(|key| format!("{}\n", key));

        let config = ServerConfig::default().with(|c| {
            c.authorized_keys_files = vec!["NONE".into(), "missing".into(), ".ssh/authorized_keys".into()];
        });
        assert!(lookup(&fixture, &config, &NoRevocation).is_some());

        let config = ServerConfig::default().with(|c| {
            c.authorized_keys_files = vec!["none".into()];
        });
        assert!(lookup(&fixture, &config, &NoRevocation).is_none());
    }

    #[test]
    fn test_lookup_skips_unreadable_source() {
        let fixture = fixture(|key| format!("{}\n", key));
        let home = std::env::temp_dir().join(format!("kagi-unreadable-{}", std::process::id()));
        std::fs::create_dir_all(home.join("is_a_dir")).unwrap();
        std::fs::write(home.join("keys"), &fixture.sources[".ssh/authorized_keys"]).unwrap();

        let sources = FsKeySources::new(&home, "me");
        let config = ServerConfig::default().with(|c| {
            c.authorized_keys_files = vec!["is_a_dir".into(), "keys".into()];
        });
        let policy = StandardOptionsPolicy::default();
        let auth = RsaAuth::new(&config, &sources, &NoRevocation, &policy);
        let found = auth.lookup(fixture.privkey.pubkey().n());
        std::fs::remove_dir_all(&home).unwrap();

        let found = found.unwrap().unwrap();
        assert_eq!(found.record.source(), "keys");
    }

    #[test]
    fn test_challenge_below_minimum() {
        let fixture = fixture(|key| format!("{}\n", key));
        let config = ServerConfig::default().with(|c| c.rsa_min_modulus_bits = 2048);
        let policy = StandardOptionsPolicy::default();
        let auth = RsaAuth::new(&config, &fixture.sources, &NoRevocation, &policy);

        let key = auth.lookup(fixture.privkey.pubkey().n()).unwrap().unwrap();
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(18);
        assert!(auth.challenge(&key, &mut rng).unwrap().is_none());
    }
}
