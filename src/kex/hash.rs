use std::fmt;
use zeroize::Zeroizing;
use crate::codec::WireBuf;
use crate::error::{Error, Result};
use super::{EphPubkey, SharedSecret};

/// Hash function used by a key exchange algorithm.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HashAlgo {
    /// SHA-1 (20 bytes).
    Sha1,
    /// SHA2-256 (32 bytes).
    Sha256,
    /// SHA2-384 (48 bytes).
    Sha384,
    /// SHA2-512 (64 bytes).
    Sha512,
}

impl HashAlgo {
    /// Length of the digest in bytes.
    pub fn output_len(self) -> usize {
        match self {
            HashAlgo::Sha1 => 20,
            HashAlgo::Sha256 => 32,
            HashAlgo::Sha384 => 48,
            HashAlgo::Sha512 => 64,
        }
    }

    /// Hashes the concatenation of `parts`.
    pub fn digest_parts(self, parts: &[&[u8]]) -> Zeroizing<Vec<u8>> {
        match self {
            HashAlgo::Sha1 => digest_parts::<sha1::Sha1>(parts),
            HashAlgo::Sha256 => digest_parts::<sha2::Sha256>(parts),
            HashAlgo::Sha384 => digest_parts::<sha2::Sha384>(parts),
            HashAlgo::Sha512 => digest_parts::<sha2::Sha512>(parts),
        }
    }
}

fn digest_parts<D: sha2::Digest>(parts: &[&[u8]]) -> Zeroizing<Vec<u8>> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    Zeroizing::new(hasher.finalize().to_vec())
}

/// The exchange hash `H` computed at the end of a key exchange.
///
/// The value is zeroed when dropped and its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ExchangeHash(pub(crate) Zeroizing<Vec<u8>>);

impl ExchangeHash {
    /// The bytes of the hash.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ExchangeHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("ExchangeHash").field(&format_args!("<{} bytes>", self.0.len())).finish()
    }
}

/// Values that identify one key exchange.
///
/// The fields are mixed into the hash in the order in which they are declared here (RFC 4253,
/// section 8 and RFC 5656, section 4); both peers must use exactly the same values, otherwise
/// the hashes diverge and the signature check fails.
#[derive(Debug)]
pub struct ExchangeHashInput<'a> {
    /// `V_C`, the client's identification string (without CR and LF).
    pub client_ident: &'a [u8],
    /// `V_S`, the server's identification string (without CR and LF).
    pub server_ident: &'a [u8],
    /// `I_C`, the payload of the client's `SSH_MSG_KEXINIT`.
    pub client_kex_init: &'a [u8],
    /// `I_S`, the payload of the server's `SSH_MSG_KEXINIT`.
    pub server_kex_init: &'a [u8],
    /// `K_S`, the server's public host key blob.
    pub server_hostkey: &'a [u8],
    /// `e` (or `Q_C`), the client's ephemeral public value.
    pub client_eph_pubkey: &'a EphPubkey,
    /// `f` (or `Q_S`), the server's ephemeral public value.
    pub server_eph_pubkey: &'a EphPubkey,
    /// `K`, the shared secret.
    pub shared_secret: &'a SharedSecret,
}

/// Computes the exchange hash from the given inputs.
///
/// This is a pure function: the same inputs always produce the same hash.
pub fn exchange_hash(hash: HashAlgo, input: &ExchangeHashInput) -> Result<ExchangeHash> {
    let mut data = WireBuf::sensitive();
    data.put_bytes(input.client_ident)?;
    data.put_bytes(input.server_ident)?;
    data.put_bytes(input.client_kex_init)?;
    data.put_bytes(input.server_kex_init)?;
    data.put_bytes(input.server_hostkey)?;
    input.client_eph_pubkey.put(&mut data)?;
    input.server_eph_pubkey.put(&mut data)?;
    data.put_mpint_uint_be(input.shared_secret.as_bytes())?;
    Ok(ExchangeHash(hash.digest_parts(&[data.as_slice()])))
}

/// Lengths of the keys that should be derived for one direction of the connection.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DirectionLens {
    /// Length of the initial IV.
    pub iv_len: usize,
    /// Length of the encryption key.
    pub key_len: usize,
    /// Length of the integrity (MAC) key.
    pub mac_len: usize,
}

/// Lengths of all keys that should be derived after a key exchange.
///
/// These lengths depend on the cipher and MAC algorithms, which are negotiated by the outer
/// transport layer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct KeyLens {
    /// Lengths for messages sent from the client to the server.
    pub client_to_server: DirectionLens,
    /// Lengths for messages sent from the server to the client.
    pub server_to_client: DirectionLens,
}

impl KeyLens {
    /// The longest key, in bytes.
    pub fn max_len(&self) -> usize {
        let c2s = &self.client_to_server;
        let s2c = &self.server_to_client;
        [c2s.iv_len, c2s.key_len, c2s.mac_len, s2c.iv_len, s2c.key_len, s2c.mac_len]
            .into_iter().max().unwrap_or(0)
    }
}

/// Keys for one direction of the connection.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DirectionKeys {
    /// Initial IV.
    pub iv: Zeroizing<Vec<u8>>,
    /// Encryption key.
    pub key: Zeroizing<Vec<u8>>,
    /// Integrity key.
    pub mac_key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for DirectionKeys {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DirectionKeys")
            .field("iv_len", &self.iv.len())
            .field("key_len", &self.key.len())
            .field("mac_key_len", &self.mac_key.len())
            .finish()
    }
}

/// All keys derived from a key exchange (RFC 4253, section 7.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewKeys {
    /// Keys for messages sent from the client to the server (letters A, C and E).
    pub client_to_server: DirectionKeys,
    /// Keys for messages sent from the server to the client (letters B, D and F).
    pub server_to_client: DirectionKeys,
}

/// Derives all keys with the lengths in `lens`.
pub fn derive_keys(
    hash: HashAlgo,
    shared_secret: &SharedSecret,
    exchange_hash: &ExchangeHash,
    session_id: &[u8],
    lens: &KeyLens,
) -> Result<NewKeys> {
    let derive = |letter, len| derive_key(hash, shared_secret, exchange_hash, letter, session_id, len);
    let c2s = &lens.client_to_server;
    let s2c = &lens.server_to_client;
    Ok(NewKeys {
        client_to_server: DirectionKeys {
            iv: derive(b'A', c2s.iv_len)?,
            key: derive(b'C', c2s.key_len)?,
            mac_key: derive(b'E', c2s.mac_len)?,
        },
        server_to_client: DirectionKeys {
            iv: derive(b'B', s2c.iv_len)?,
            key: derive(b'D', s2c.key_len)?,
            mac_key: derive(b'F', s2c.mac_len)?,
        },
    })
}

/// Derives one key (RFC 4253, section 7.2).
///
/// `K1 = HASH(K || H || letter || session_id)`, and the key is extended with
/// `Kn = HASH(K || H || K1 || ... || Kn-1)` until it is at least `key_len` bytes long.
pub fn derive_key(
    hash: HashAlgo,
    shared_secret: &SharedSecret,
    exchange_hash: &ExchangeHash,
    letter: u8,
    session_id: &[u8],
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if !(b'A'..=b'F').contains(&letter) {
        return Err(Error::InvalidArgument("key letter must be between 'A' and 'F'"))
    }

    let mut encoded_secret = WireBuf::sensitive();
    encoded_secret.put_mpint_uint_be(shared_secret.as_bytes())?;
    let prefix = [encoded_secret.as_slice(), exchange_hash.as_bytes()];

    let mut key = Zeroizing::new(Vec::new());
    if key_len == 0 {
        return Ok(key)
    }

    let first = hash.digest_parts(&[prefix[0], prefix[1], &[letter], session_id]);
    key.extend_from_slice(&first);
    while key.len() < key_len {
        let next = hash.digest_parts(&[prefix[0], prefix[1], &key]);
        key.extend_from_slice(&next);
    }
    key.truncate(key_len);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use hex_literal::hex;
    use num_bigint_dig::BigUint;
    use super::*;

    fn secret(bytes: &[u8]) -> SharedSecret {
        SharedSecret(Zeroizing::new(bytes.to_vec()))
    }

    fn input<'a>(e: &'a EphPubkey, f: &'a EphPubkey, k: &'a SharedSecret) -> ExchangeHashInput<'a> {
        ExchangeHashInput {
            client_ident: b"SSH-2.0-client",
            server_ident: b"SSH-2.0-server",
            client_kex_init: b"\x14client kexinit",
            server_kex_init: b"\x14server kexinit",
            server_hostkey: b"hostkey blob",
            client_eph_pubkey: e,
            server_eph_pubkey: f,
            shared_secret: k,
        }
    }

    #[test]
    fn test_exchange_hash_is_deterministic() {
        let e = EphPubkey::Mpint(BigUint::from(0x1234u32));
        let f = EphPubkey::Mpint(BigUint::from(0x80u32));
        let k = secret(&hex!("ff00ff"));

        let h1 = exchange_hash(HashAlgo::Sha256, &input(&e, &f, &k)).unwrap();
        let h2 = exchange_hash(HashAlgo::Sha256, &input(&e, &f, &k)).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.as_bytes().len(), 32);
    }

    #[test]
    fn test_exchange_hash_field_order() {
        let e = EphPubkey::Bytes(Bytes::from_static(&[1; 32]));
        let f = EphPubkey::Bytes(Bytes::from_static(&[2; 32]));
        let k = secret(&hex!("0102"));

        let fields: [&[u8]; 7] = [
            b"SSH-2.0-client", b"SSH-2.0-server", b"\x14client kexinit",
            b"\x14server kexinit", b"hostkey blob", &[1; 32], &[2; 32],
        ];
        let mut data = WireBuf::new();
        for field in fields {
            data.put_bytes(field).unwrap();
        }
        data.put_raw(&hex!("00000002 0102")).unwrap();
        let expected = HashAlgo::Sha1.digest_parts(&[data.as_slice()]);

        let hash = exchange_hash(HashAlgo::Sha1, &input(&e, &f, &k)).unwrap();
        assert_eq!(hash.as_bytes(), expected.as_slice());

        // swapping the ephemeral keys changes the hash
        let swapped = exchange_hash(HashAlgo::Sha1, &input(&f, &e, &k)).unwrap();
        assert_ne!(hash, swapped);
    }

    #[test]
    fn test_derive_key() {
        let k = secret(&hex!("8000"));
        let h = ExchangeHash(Zeroizing::new(vec![7; 32]));
        let session_id = [9; 32];

        let key = derive_key(HashAlgo::Sha256, &k, &h, b'C', &session_id, 16).unwrap();
        let expected = HashAlgo::Sha256.digest_parts(&[&hex!("00000003 008000"), &[7; 32], b"C", &[9; 32]]);
        assert_eq!(key.as_slice(), &expected[..16]);

        // extension beyond one hash output
        let long = derive_key(HashAlgo::Sha256, &k, &h, b'C', &session_id, 40).unwrap();
        assert_eq!(long.len(), 40);
        assert_eq!(&long[..32], expected.as_slice());
        let k2 = HashAlgo::Sha256.digest_parts(&[&hex!("00000003 008000"), &[7; 32], &expected]);
        assert_eq!(&long[32..], &k2[..8]);

        assert!(derive_key(HashAlgo::Sha256, &k, &h, b'G', &session_id, 16).is_err());
    }

    #[test]
    fn test_derive_keys_are_independent() {
        let k = secret(&hex!("42"));
        let h = ExchangeHash(Zeroizing::new(vec![1; 20]));
        let dir = DirectionLens { iv_len: 16, key_len: 32, mac_len: 20 };
        let lens = KeyLens { client_to_server: dir, server_to_client: dir };
        let keys = derive_keys(HashAlgo::Sha1, &k, &h, &[3; 20], &lens).unwrap();

        let all = [
            &keys.client_to_server.iv[..16], &keys.server_to_client.iv[..16],
            &keys.client_to_server.key[..16], &keys.server_to_client.key[..16],
            &keys.client_to_server.mac_key[..16], &keys.server_to_client.mac_key[..16],
        ];
        for i in 0..all.len() {
            for j in i + 1..all.len() {
                assert_ne!(all[i], all[j]);
            }
        }
        assert_eq!(keys.client_to_server.key.len(), 32);
        assert_eq!(keys.server_to_client.mac_key.len(), 20);
    }
}
