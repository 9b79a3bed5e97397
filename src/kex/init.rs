use bytes::Bytes;
use crate::codec::WireBuf;
use crate::codes::msg;
use crate::error::{AlgoNegotiateError, Error, Result};
use crate::pubkey::PubkeyAlgo;
use crate::transport::Transport;
use crate::util::{CryptoRngCore, fill_random};
use super::KexAlgo;

/// Contents of the `SSH_MSG_KEXINIT` message (RFC 4253, section 7.1).
///
/// Only the key exchange and host key algorithms are negotiated here; the remaining name-lists
/// (ciphers, MACs, compression and languages) are carried for the outer transport layer, which
/// negotiates them itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexInit {
    /// Random cookie.
    pub cookie: [u8; 16],
    /// `kex_algorithms`.
    pub kex_algos: Vec<String>,
    /// `server_host_key_algorithms`.
    pub server_host_key_algos: Vec<String>,
    /// `encryption_algorithms_client_to_server`.
    pub cipher_algos_cts: Vec<String>,
    /// `encryption_algorithms_server_to_client`.
    pub cipher_algos_stc: Vec<String>,
    /// `mac_algorithms_client_to_server`.
    pub mac_algos_cts: Vec<String>,
    /// `mac_algorithms_server_to_client`.
    pub mac_algos_stc: Vec<String>,
    /// `compression_algorithms_client_to_server`.
    pub compression_algos_cts: Vec<String>,
    /// `compression_algorithms_server_to_client`.
    pub compression_algos_stc: Vec<String>,
    /// `languages_client_to_server`.
    pub languages_cts: Vec<String>,
    /// `languages_server_to_client`.
    pub languages_stc: Vec<String>,
    /// `first_kex_packet_follows`.
    pub first_kex_packet_follows: bool,
}

impl KexInit {
    /// Creates our proposal with a fresh random cookie.
    ///
    /// The cipher and MAC lists are left empty and compression is `none`; the outer transport
    /// can fill them in before the proposal is encoded.
    pub fn new(
        rng: &mut dyn CryptoRngCore,
        kex_algos: &[&KexAlgo],
        server_host_key_algos: &[&PubkeyAlgo],
    ) -> Result<Self> {
        let mut cookie = [0; 16];
        fill_random(rng, &mut cookie, "could not generate random cookie")?;
        Ok(Self {
            cookie,
            kex_algos: kex_algos.iter().map(|a| a.name.into()).collect(),
            server_host_key_algos: server_host_key_algos.iter().map(|a| a.name.into()).collect(),
            cipher_algos_cts: Vec::new(),
            cipher_algos_stc: Vec::new(),
            mac_algos_cts: Vec::new(),
            mac_algos_stc: Vec::new(),
            compression_algos_cts: vec!["none".into()],
            compression_algos_stc: vec!["none".into()],
            languages_cts: Vec::new(),
            languages_stc: Vec::new(),
            first_kex_packet_follows: false,
        })
    }

    /// Encodes the complete payload of `SSH_MSG_KEXINIT`, including the message number.
    ///
    /// This is exactly the blob that is mixed into the exchange hash.
    pub fn encode(&self) -> Result<Bytes> {
        fn names(list: &[String]) -> Vec<&str> {
            list.iter().map(|x| x.as_str()).collect()
        }

        let mut payload = WireBuf::new();
        payload.put_u8(msg::KEXINIT)?;
        payload.put_raw(&self.cookie)?;
        payload.put_name_list(&names(&self.kex_algos))?;
        payload.put_name_list(&names(&self.server_host_key_algos))?;
        payload.put_name_list(&names(&self.cipher_algos_cts))?;
        payload.put_name_list(&names(&self.cipher_algos_stc))?;
        payload.put_name_list(&names(&self.mac_algos_cts))?;
        payload.put_name_list(&names(&self.mac_algos_stc))?;
        payload.put_name_list(&names(&self.compression_algos_cts))?;
        payload.put_name_list(&names(&self.compression_algos_stc))?;
        payload.put_name_list(&names(&self.languages_cts))?;
        payload.put_name_list(&names(&self.languages_stc))?;
        payload.put_bool(self.first_kex_packet_follows)?;
        payload.put_u32(0)?; // reserved
        Ok(payload.into_bytes())
    }

    /// Decodes the complete payload of `SSH_MSG_KEXINIT`, including the message number.
    ///
    /// A peer that sets `first_kex_packet_follows` is rejected: we never guess the algorithms, so
    /// we would have to discard its guessed packet, which we do not support.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut payload = WireBuf::from_bytes(payload);
        let msg_id = payload.get_u8()?;
        if msg_id != msg::KEXINIT {
            return Err(Error::UnexpectedPacket(msg_id))
        }

        let mut cookie = [0; 16];
        cookie.copy_from_slice(&payload.get_raw(16)?);
        let kex_init = Self {
            cookie,
            kex_algos: payload.get_name_list()?,
            server_host_key_algos: payload.get_name_list()?,
            cipher_algos_cts: payload.get_name_list()?,
            cipher_algos_stc: payload.get_name_list()?,
            mac_algos_cts: payload.get_name_list()?,
            mac_algos_stc: payload.get_name_list()?,
            compression_algos_cts: payload.get_name_list()?,
            compression_algos_stc: payload.get_name_list()?,
            languages_cts: payload.get_name_list()?,
            languages_stc: payload.get_name_list()?,
            first_kex_packet_follows: payload.get_bool()?,
        };
        payload.get_u32()?; // reserved
        payload.ensure_end()?;

        if kex_init.first_kex_packet_follows {
            return Err(Error::Protocol("received SSH_MSG_KEXINIT with first_kex_packet_follows set"))
        }
        Ok(kex_init)
    }
}

/// Algorithms negotiated from the two proposals.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Negotiated {
    pub kex: &'static KexAlgo,
    pub hostkey: &'static PubkeyAlgo,
}

/// Negotiates the key exchange and host key algorithms (RFC 4253, section 7.1).
///
/// The first algorithm on the client's list that is also on the server's list wins. `our_algos`
/// are the algorithms that we support (in our order of preference), `client` and `server` are
/// the two proposals.
pub(crate) fn negotiate(
    our_kex_algos: &[&'static KexAlgo],
    our_hostkey_algos: &[&'static PubkeyAlgo],
    client: &KexInit,
    server: &KexInit,
) -> Result<Negotiated> {
    let kex_name = negotiate_name(&client.kex_algos, &server.kex_algos, "key exchange")?;
    let hostkey_name = negotiate_name(
        &client.server_host_key_algos, &server.server_host_key_algos, "server host key")?;

    let kex = *our_kex_algos.iter().find(|a| a.name == kex_name)
        .ok_or(Error::Internal("negotiated key exchange algorithm that we do not support"))?;
    let hostkey = *our_hostkey_algos.iter().find(|a| a.name == hostkey_name)
        .ok_or(Error::Internal("negotiated host key algorithm that we do not support"))?;
    Ok(Negotiated { kex, hostkey })
}

fn negotiate_name<'a>(
    client_algos: &'a [String],
    server_algos: &[String],
    name: &'static str,
) -> Result<&'a str> {
    for client_algo in client_algos.iter() {
        if server_algos.contains(client_algo) {
            log::debug!("negotiated algo {:?} for {}", client_algo, name);
            return Ok(client_algo.as_str())
        }
    }

    Err(Error::AlgoNegotiate(AlgoNegotiateError {
        algo_name: name.into(),
        client_algos: client_algos.into(),
        server_algos: server_algos.into(),
    }))
}

/// Sends our `SSH_MSG_KEXINIT` and receives the peer's.
///
/// Both payloads include the message number, as they are hashed into the exchange hash.
pub(crate) fn exchange_kex_init(transport: &mut dyn Transport, ours: &Bytes) -> Result<Bytes> {
    let our_fields = ours.get(1..).ok_or(Error::Internal("encoded SSH_MSG_KEXINIT is empty"))?;
    transport.send(msg::KEXINIT, WireBuf::from_bytes(our_fields))?;

    let peer = transport.recv_expecting(msg::KEXINIT)?;
    let mut payload = Vec::with_capacity(peer.len() + 1);
    payload.push(msg::KEXINIT);
    payload.extend_from_slice(peer.as_slice());
    Ok(Bytes::from(payload))
}
