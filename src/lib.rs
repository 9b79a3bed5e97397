//! Server-side SSH handshake core in pure Rust.
//!
//! Kagi implements the parts of an SSH server that decode bytes from an untrusted peer and bind
//! them cryptographically:
//!
//! - [`WireBuf`], the bounds-checked buffer that encodes and decodes every protocol message.
//! - The key exchange in the [`kex`] module: the server side ([`kex::KexServer`],
//! [`kex::run_server()`]) computes the shared secret, the exchange hash and the session
//! identifier, signs the hash with a host key from [`hostkey::HostKeys`] and derives the
//! directional keys. The client side ([`kex::KexClient`]) is provided as well.
//! - RSA challenge-response authentication in the [`auth`] module, with lookup of keys in
//! authorized keys files.
//!
//! Packet framing, encryption and the rest of the protocol are left to the caller, which plugs in
//! through the [`transport::Transport`] trait.
//!
#![allow(clippy::collapsible_if)]
#![allow(clippy::module_inception)]
#![allow(clippy::type_complexity)]
#![warn(missing_docs)]

pub use crate::codec::{WireBuf, DEFAULT_MAX_SIZE};
pub use crate::config::{ClientConfig, ServerConfig};
pub use crate::error::{Result, Error, AlgoNegotiateError, DisconnectError};
pub use crate::util::CryptoRngCore;

pub use self::kex::KexAlgo;
pub use self::pubkey::{PubkeyAlgo, Pubkey, Privkey};

pub use bytes;
pub use ed25519_dalek;
pub use num_bigint_dig;
pub use rsa;

pub mod auth;
mod codec;
pub mod codes;
mod config;
mod error;
pub mod hostkey;
pub mod kex;
pub mod pubkey;
pub mod transport;
mod util;
