use crate::codec::WireBuf;
use crate::codes::msg;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::pubkey::Pubkey;
use crate::transport::{Transport, disconnect_on_error};
use crate::util::CryptoRngCore;
use super::{ExchangeHashInput, KexContext, KexOutput, KexState, NewKeys, Role, exchange_hash};
use super::init::{KexInit, exchange_kex_init, negotiate};

/// Decides whether the server's host key is trusted.
///
/// The signature of the exchange hash is verified before this is called, so the server has
/// already proven that it holds the private key.
pub trait VerifyHostKey {
    /// Returns true if we accept `pubkey` as the host key of the server.
    fn accept(&self, pubkey: &Pubkey) -> bool;
}

/// Accepts exactly this key.
impl VerifyHostKey for Pubkey {
    fn accept(&self, pubkey: &Pubkey) -> bool {
        self == pubkey
    }
}

impl<F: Fn(&Pubkey) -> bool> VerifyHostKey for F {
    fn accept(&self, pubkey: &Pubkey) -> bool {
        self(pubkey)
    }
}

/// Client side of one key exchange.
///
/// 1. [`KexClient::start()`] generates our ephemeral keypair and prepares the init message.
/// 2. [`KexClient::send_packet()`] returns the init message.
/// 3. [`KexClient::recv_packet()`] consumes the server's reply, computes the shared secret and the
/// exchange hash, verifies the signature and asks the [`VerifyHostKey`] whether the host key is
/// trusted.
/// 4. [`KexClient::finish()`] returns the [`KexOutput`].
///
/// Any error aborts the exchange.
pub struct KexClient<'a> {
    ctx: &'a mut KexContext,
    verifier: &'a dyn VerifyHostKey,
    state: KexState,
    init: Option<WireBuf>,
    output: Option<KexOutput>,
}

impl<'a> KexClient<'a> {
    /// Starts the exchange with the algorithms negotiated in `ctx`.
    pub fn start(
        ctx: &'a mut KexContext,
        verifier: &'a dyn VerifyHostKey,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Self> {
        if ctx.role() != Role::Client {
            return Err(Error::InvalidArgument("client key exchange needs a client context"))
        }
        let kex_algo = ctx.kex_algo()?;
        ctx.hostkey_algo()?;

        let eph = kex_algo.generate(rng, ctx.need_bits())?;
        let mut init = WireBuf::new();
        eph.our_pubkey().put(&mut init)?;
        ctx.eph = Some(eph);
        log::debug!("started client kex {:?}", kex_algo.name);

        Ok(Self { ctx, verifier, state: KexState::SendingInit, init: Some(init), output: None })
    }

    /// Current state of the exchange.
    pub fn state(&self) -> KexState {
        self.state
    }

    /// Returns the next message that should be sent to the server, if any.
    pub fn send_packet(&mut self) -> Result<Option<(u8, WireBuf)>> {
        if self.state != KexState::SendingInit {
            return Ok(None)
        }
        let init = self.init.take().ok_or(Error::Internal("kex init is missing"))?;
        self.state = KexState::AwaitingPeerPubkey;
        Ok(Some((msg::KEXDH_INIT, init)))
    }

    /// Processes a message from the server.
    pub fn recv_packet(&mut self, msg_id: u8, payload: &mut WireBuf) -> Result<()> {
        if self.state != KexState::AwaitingPeerPubkey || msg_id != msg::KEXDH_REPLY {
            return Err(self.abort(Error::UnexpectedPacket(msg_id)))
        }

        match self.process_reply(payload) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.abort(err)),
        }
    }

    fn process_reply(&mut self, payload: &mut WireBuf) -> Result<()> {
        let kex_algo = self.ctx.kex_algo()?;
        let hostkey_algo = self.ctx.hostkey_algo()?;
        let eph = self.ctx.eph.take()
            .ok_or(Error::Internal("ephemeral keypair is missing"))?;

        let server_hostkey = payload.get_bytes()?;
        let server_eph_pubkey = eph.decode_peer_pubkey(payload)?;
        let signature = payload.get_bytes()?;
        payload.ensure_end()?;

        let server_pubkey = Pubkey::decode(server_hostkey.clone())?;
        if !server_pubkey.supports_algo(hostkey_algo) {
            return Err(Error::Protocol("server host key does not match the negotiated algorithm"))
        }

        self.state = KexState::ComputingSecret;
        let client_eph_pubkey = eph.our_pubkey();
        let shared_secret = eph.compute_shared_secret(&server_eph_pubkey)?;
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

        hostkey_algo.verify(&server_pubkey, exchange_hash.as_bytes(), signature)?;
        if !self.verifier.accept(&server_pubkey) {
            log::info!("server host key {} was not accepted", server_pubkey);
            return Err(Error::HostKeyRejected)
        }

        let session_id = self.ctx.bind_session_id(&exchange_hash).clone();
        self.output = Some(KexOutput {
            kex_algo, shared_secret: Some(shared_secret), exchange_hash, session_id, server_pubkey,
        });
        self.state = KexState::Done;
        Ok(())
    }

    /// Returns the result of the finished exchange.
    pub fn finish(mut self) -> Result<KexOutput> {
        if self.state != KexState::Done {
            return Err(Error::InvalidArgument("key exchange has not finished"))
        }
        self.output.take().ok_or(Error::Internal("kex output is missing"))
    }

    fn abort(&mut self, err: Error) -> Error {
        log::debug!("client kex aborted: {}", err);
        self.state = KexState::Aborted;
        self.ctx.destroy_ephemeral();
        self.init = None;
        self.output = None;
        err
    }
}

impl Drop for KexClient<'_> {
    fn drop(&mut self) {
        self.ctx.destroy_ephemeral();
    }
}

/// Runs one complete key exchange on the client side.
///
/// This is the counterpart of [`run_server()`][super::run_server]. On a fatal error, we try to
/// send `SSH_MSG_DISCONNECT` to the server before returning the error.
pub fn run_client(
    ctx: &mut KexContext,
    transport: &mut dyn Transport,
    config: &ClientConfig,
    verifier: &dyn VerifyHostKey,
    rng: &mut dyn CryptoRngCore,
) -> Result<(KexOutput, NewKeys)> {
    let res = run_client_exchange(ctx, transport, config, verifier, rng);
    if let Err(err) = &res {
        disconnect_on_error(transport, err);
    }
    res
}

fn run_client_exchange(
    ctx: &mut KexContext,
    transport: &mut dyn Transport,
    config: &ClientConfig,
    verifier: &dyn VerifyHostKey,
    rng: &mut dyn CryptoRngCore,
) -> Result<(KexOutput, NewKeys)> {
    let our_kex_init = KexInit::new(rng, &config.kex_algos, &config.server_pubkey_algos)?;
    let our_payload = our_kex_init.encode()?;
    let peer_payload = exchange_kex_init(transport, &our_payload)?;
    let peer_kex_init = KexInit::decode(&peer_payload)?;

    let negotiated = negotiate(
        &config.kex_algos, &config.server_pubkey_algos, &our_kex_init, &peer_kex_init)?;
    ctx.begin_exchange(our_payload, peer_payload, negotiated.kex, negotiated.hostkey);

    let mut kex = KexClient::start(ctx, verifier, rng)?;
    while let Some((msg_id, init)) = kex.send_packet()? {
        transport.send(msg_id, init)?;
    }
    let mut payload = transport.recv_expecting(msg::KEXDH_REPLY)?;
    kex.recv_packet(msg::KEXDH_REPLY, &mut payload)?;
    let mut output = kex.finish()?;

    transport.send(msg::NEWKEYS, WireBuf::new())?;
    transport.recv_expecting(msg::NEWKEYS)?.ensure_end()?;

    let new_keys = output.derive_keys(ctx.key_lens())?;
    log::info!("client kex {:?} finished, session {:?}", output.kex_algo.name, output.session_id);
    Ok((output, new_keys))
}
