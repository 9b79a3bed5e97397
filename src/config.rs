use crate::kex::{self, KexAlgo};
use crate::pubkey::{self, PubkeyAlgo};

/// Configuration of the server side of the handshake.
///
/// You should start from the [default][Default] instance, which has reasonable default
/// configuration, and modify it according to your needs. You may also find the method
/// [`ServerConfig::with()`] syntactically convenient.
///
/// If you need compatibility with old SSH clients that use outdated crypto, you may use
/// [`ServerConfig::default_compatible_less_secure()`]. However, this configuration is less secure.
///
/// This struct is `#[non_exhaustive]`, so we may add more fields without breaking backward
/// compatibility.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ServerConfig {
    /// Supported [key exchange algorithms][crate::kex].
    ///
    /// The client's order of preference decides which algorithm is used. If there is no
    /// overlap, the connnection will abort.
    pub kex_algos: Vec<&'static KexAlgo>,

    /// Supported [host key algorithms][crate::pubkey].
    ///
    /// We only offer the algorithms for which we actually have a host key.
    pub server_pubkey_algos: Vec<&'static PubkeyAlgo>,

    /// Files with authorized RSA keys, tried in this order.
    ///
    /// The tokens `%h` (home directory of the user), `%u` (name of the user) and `%%` are
    /// expanded, relative paths are relative to the home directory. A source named `none` is
    /// skipped.
    pub authorized_keys_files: Vec<String>,

    /// Smallest RSA modulus (in bits) that we accept for authentication.
    ///
    /// Keys with smaller moduli are never challenged.
    pub rsa_min_modulus_bits: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            kex_algos: vec![
                &kex::CURVE25519_SHA256, &kex::CURVE25519_SHA256_LIBSSH,
                &kex::ECDH_SHA2_NISTP256, &kex::ECDH_SHA2_NISTP384,
                &kex::DIFFIE_HELLMAN_GROUP16_SHA512, &kex::DIFFIE_HELLMAN_GROUP18_SHA512,
                &kex::DIFFIE_HELLMAN_GROUP14_SHA256,
            ],
            server_pubkey_algos: vec![
                &pubkey::SSH_ED25519,
                &pubkey::RSA_SHA2_256, &pubkey::RSA_SHA2_512,
            ],
            authorized_keys_files: vec![".ssh/authorized_keys".into()],
            rsa_min_modulus_bits: 1024,
        }
    }
}

impl ServerConfig {
    /// Default configuration with higher compatibility and lower security.
    ///
    /// Returns a configuration that includes support for outdated and potentially insecure crypto,
    /// notably SHA-1 and the 1024-bit Diffie-Hellman group. **Use at your own risk!**.
    pub fn default_compatible_less_secure() -> ServerConfig {
        Self::default().with(|c| {
            c.kex_algos.extend_from_slice(&[
                &kex::DIFFIE_HELLMAN_GROUP14_SHA1,
                &kex::DIFFIE_HELLMAN_GROUP1_SHA1,
            ]);
            c.server_pubkey_algos.push(&pubkey::SSH_RSA_SHA1);
        })
    }

    /// Mutate `self` in a closure.
    ///
    /// This method applies your closure to `self` and returns the mutated configuration.
    pub fn with<F: FnOnce(&mut Self)>(mut self, f: F) -> Self {
        f(&mut self);
        self
    }
}

/// Configuration of the client side of the handshake.
///
/// This mirrors [`ServerConfig`]; see its documentation for details.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    /// Supported [key exchange algorithms][crate::kex], in our order of preference.
    pub kex_algos: Vec<&'static KexAlgo>,

    /// Supported [server public key algorithms][crate::pubkey], in our order of preference.
    pub server_pubkey_algos: Vec<&'static PubkeyAlgo>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            kex_algos: vec![
                &kex::CURVE25519_SHA256, &kex::CURVE25519_SHA256_LIBSSH,
                &kex::ECDH_SHA2_NISTP256, &kex::ECDH_SHA2_NISTP384,
                &kex::DIFFIE_HELLMAN_GROUP16_SHA512, &kex::DIFFIE_HELLMAN_GROUP18_SHA512,
                &kex::DIFFIE_HELLMAN_GROUP14_SHA256,
            ],
            server_pubkey_algos: vec![
                &pubkey::SSH_ED25519,
                &pubkey::RSA_SHA2_256, &pubkey::RSA_SHA2_512,
            ],
        }
    }
}

impl ClientConfig {
    /// Default configuration with higher compatibility and lower security.
    ///
    /// See [`ServerConfig::default_compatible_less_secure()`].
    pub fn default_compatible_less_secure() -> ClientConfig {
        Self::default().with(|c| {
            c.kex_algos.extend_from_slice(&[
                &kex::DIFFIE_HELLMAN_GROUP14_SHA1,
                &kex::DIFFIE_HELLMAN_GROUP1_SHA1,
            ]);
            c.server_pubkey_algos.push(&pubkey::SSH_RSA_SHA1);
        })
    }

    /// Mutate `self` in a closure.
    pub fn with<F: FnOnce(&mut Self)>(mut self, f: F) -> Self {
        f(&mut self);
        self
    }
}
