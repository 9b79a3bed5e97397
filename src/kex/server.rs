use crate::codec::WireBuf;
use crate::codes::msg;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::hostkey::HostKeys;
use crate::pubkey::PubkeyAlgo;
use crate::transport::{Transport, disconnect_on_error};
use crate::util::CryptoRngCore;
use super::{ExchangeHashInput, KexContext, KexOutput, KexState, NewKeys, Role, exchange_hash};
use super::init::{KexInit, exchange_kex_init, negotiate};

/// Server side of one key exchange.
///
/// The exchange is a short-lived state machine (see [`KexState`]):
///
/// 1. [`KexServer::start()`] generates our ephemeral keypair.
/// 2. [`KexServer::recv_packet()`] consumes the client's init message (`SSH_MSG_KEXDH_INIT` or
/// `SSH_MSG_KEX_ECDH_INIT`), computes the shared secret and the exchange hash, binds the session
/// identifier and signs the hash with the host key.
/// 3. [`KexServer::send_packet()`] returns the reply that should be sent to the client.
/// 4. [`KexServer::finish()`] returns the [`KexOutput`].
///
/// Any error aborts the exchange and the connection must be closed; there is no retry. The
/// ephemeral keypair is destroyed when the exchange finishes, fails or is dropped.
pub struct KexServer<'a> {
    ctx: &'a mut KexContext,
    host_keys: &'a dyn HostKeys,
    state: KexState,
    reply: Option<WireBuf>,
    output: Option<KexOutput>,
}

impl<'a> KexServer<'a> {
    /// Starts the exchange with the algorithms negotiated in `ctx`.
    pub fn start(
        ctx: &'a mut KexContext,
        host_keys: &'a dyn HostKeys,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Self> {
        if ctx.role() != Role::Server {
            return Err(Error::InvalidArgument("server key exchange needs a server context"))
        }
        let kex_algo = ctx.kex_algo()?;
        let hostkey_algo = ctx.hostkey_algo()?;

        let eph = kex_algo.generate(rng, ctx.need_bits())?;
        ctx.eph = Some(eph);
        log::debug!("started server kex {:?} with host key algo {:?}", kex_algo.name, hostkey_algo.name);

        Ok(Self { ctx, host_keys, state: KexState::AwaitingPeerPubkey, reply: None, output: None })
    }

    /// Current state of the exchange.
    pub fn state(&self) -> KexState {
        self.state
    }

    /// Processes a message from the client.
    ///
    /// Only the init message is expected; any other message aborts the exchange with
    /// [`Error::UnexpectedPacket`].
    pub fn recv_packet(&mut self, msg_id: u8, payload: &mut WireBuf) -> Result<()> {
        if self.state != KexState::AwaitingPeerPubkey {
            return Err(self.abort(Error::UnexpectedPacket(msg_id)))
        }
        if msg_id != msg::KEXDH_INIT {
            return Err(self.abort(Error::UnexpectedPacket(msg_id)))
        }

        match self.process_init(payload) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.abort(err)),
        }
    }

    fn process_init(&mut self, payload: &mut WireBuf) -> Result<()> {
        let kex_algo = self.ctx.kex_algo()?;
        let hostkey_algo = self.ctx.hostkey_algo()?;
        let eph = self.ctx.eph.take()
            .ok_or(Error::Internal("ephemeral keypair is missing"))?;

        let client_eph_pubkey = eph.decode_peer_pubkey(payload)?;
        payload.ensure_end()?;
        let server_eph_pubkey = eph.our_pubkey();

        self.state = KexState::ComputingSecret;
        let shared_secret = eph.compute_shared_secret(&client_eph_pubkey)?;

        let server_pubkey = self.host_keys.pubkey(hostkey_algo)?;
        let server_hostkey = server_pubkey.encode()?;
        let exchange_hash = exchange_hash(kex_algo.hash, &ExchangeHashInput {
            client_ident: self.ctx.client_ident(),
            server_ident: self.ctx.server_ident(),
            client_kex_init: self.ctx.client_kex_init(),
            server_kex_init: self.ctx.server_kex_init(),
            server_hostkey: &server_hostkey,
            client_eph_pubkey: &client_eph_pubkey,
            server_eph_pubkey: &server_eph_pubkey,
            shared_secret: &shared_secret,
        })?;
        let session_id = self.ctx.bind_session_id(&exchange_hash).clone();

        self.state = KexState::Signing;
        let signature = sign_exchange_hash(self.host_keys, hostkey_algo, exchange_hash.as_bytes())?;

        let mut reply = WireBuf::new();
        reply.put_bytes(&server_hostkey)?;
        server_eph_pubkey.put(&mut reply)?;
        reply.put_bytes(&signature)?;

        log::debug!("computed server kex reply, host key {}", server_pubkey);
        self.reply = Some(reply);
        self.output = Some(KexOutput {
            kex_algo, shared_secret: Some(shared_secret), exchange_hash, session_id, server_pubkey,
        });
        self.state = KexState::SendingReply;
        Ok(())
    }

    /// Returns the next message that should be sent to the client, if any.
    pub fn send_packet(&mut self) -> Result<Option<(u8, WireBuf)>> {
        if self.state != KexState::SendingReply {
            return Ok(None)
        }
        let reply = self.reply.take().ok_or(Error::Internal("kex reply is missing"))?;
        self.state = KexState::Done;
        Ok(Some((msg::KEXDH_REPLY, reply)))
    }

    /// Returns the result of the finished exchange.
    pub fn finish(mut self) -> Result<KexOutput> {
        if self.state != KexState::Done {
            return Err(Error::InvalidArgument("key exchange has not finished"))
        }
        self.output.take().ok_or(Error::Internal("kex output is missing"))
    }

    fn abort(&mut self, err: Error) -> Error {
        log::debug!("server kex aborted: {}", err);
        self.state = KexState::Aborted;
        self.ctx.destroy_ephemeral();
        self.reply = None;
        self.output = None;
        err
    }
}

impl Drop for KexServer<'_> {
    fn drop(&mut self) {
        self.ctx.destroy_ephemeral();
    }
}

fn sign_exchange_hash(host_keys: &dyn HostKeys, algo: &PubkeyAlgo, hash: &[u8]) -> Result<bytes::Bytes> {
    host_keys.sign(algo, hash).map_err(|err| match err {
        Error::HostKeySign => err,
        err => {
            log::warn!("host key signer failed: {}", err);
            Error::HostKeySign
        },
    })
}

/// Runs one complete key exchange on the server side.
///
/// This exchanges `SSH_MSG_KEXINIT` with the client, negotiates the algorithms, performs the
/// exchange using [`KexServer`], exchanges `SSH_MSG_NEWKEYS` and derives the new keys with the
/// lengths from [`KexContext::key_lens()`]. Call it again on the same context to re-key; the
/// session identifier is kept.
///
/// On a fatal error, we try to send `SSH_MSG_DISCONNECT` to the client before returning the
/// error.
pub fn run_server(
    ctx: &mut KexContext,
    transport: &mut dyn Transport,
    config: &ServerConfig,
    host_keys: &dyn HostKeys,
    rng: &mut dyn CryptoRngCore,
) -> Result<(KexOutput, NewKeys)> {
    let res = run_server_exchange(ctx, transport, config, host_keys, rng);
    if let Err(err) = &res {
        disconnect_on_error(transport, err);
    }
    res
}

fn run_server_exchange(
    ctx: &mut KexContext,
    transport: &mut dyn Transport,
    config: &ServerConfig,
    host_keys: &dyn HostKeys,
    rng: &mut dyn CryptoRngCore,
) -> Result<(KexOutput, NewKeys)> {
    let hostkey_algos = config.server_pubkey_algos.iter()
        .copied()
        .filter(|algo| host_keys.supports(algo))
        .collect::<Vec<_>>();
    if hostkey_algos.is_empty() {
        return Err(Error::InvalidArgument("we have no host key for any configured algorithm"))
    }

    let our_kex_init = KexInit::new(rng, &config.kex_algos, &hostkey_algos)?;
    let our_payload = our_kex_init.encode()?;
    let peer_payload = exchange_kex_init(transport, &our_payload)?;
    let peer_kex_init = KexInit::decode(&peer_payload)?;

    let negotiated = negotiate(&config.kex_algos, &hostkey_algos, &peer_kex_init, &our_kex_init)?;
    ctx.begin_exchange(peer_payload, our_payload, negotiated.kex, negotiated.hostkey);

    let mut kex = KexServer::start(ctx, host_keys, rng)?;
    let mut payload = transport.recv_expecting(msg::KEXDH_INIT)?;
    kex.recv_packet(msg::KEXDH_INIT, &mut payload)?;
    while let Some((msg_id, reply)) = kex.send_packet()? {
        transport.send(msg_id, reply)?;
    }
    let mut output = kex.finish()?;

    transport.send(msg::NEWKEYS, WireBuf::new())?;
    transport.recv_expecting(msg::NEWKEYS)?.ensure_end()?;

    let new_keys = output.derive_keys(ctx.key_lens())?;
    log::info!("server kex {:?} finished, session {:?}", output.kex_algo.name, output.session_id);
    Ok((output, new_keys))
}
