use bytes::Bytes;
use kagi::auth::{
    authenticate_client, AuthOutcome, KeySources, NoRevocation, RevocationCheck, RevokedKeys,
    RsaAuth, StandardOptionsPolicy,
};
use kagi::codes::{disconnect, msg};
use kagi::hostkey::LocalHostKeys;
use kagi::kex::{self, DirectionLens, KeyLens, KexContext, KexOutput, NewKeys, Role, SessionId};
use kagi::pubkey::{Ed25519Privkey, Privkey, Pubkey, RsaPrivkey};
use kagi::transport::{memory_pair, MemoryTransport, Transport as _};
use kagi::{ClientConfig, Error, ServerConfig};
use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::thread;

const CLIENT_IDENT: &[u8] = b"SSH-2.0-kagi_test_client";
const SERVER_IDENT: &[u8] = b"SSH-2.0-kagi_test_server";

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn key_lens() -> KeyLens {
    let lens = DirectionLens { iv_len: 16, key_len: 32, mac_len: 64 };
    KeyLens { client_to_server: lens, server_to_client: lens }
}

struct Peers {
    client_ctx: KexContext,
    server_ctx: KexContext,
    client_transport: MemoryTransport,
    server_transport: MemoryTransport,
}

impl Peers {
    fn new() -> Self {
        let (client_transport, server_transport) = memory_pair();
        let mut client_ctx = KexContext::new(Role::Client, CLIENT_IDENT, SERVER_IDENT);
        let mut server_ctx = KexContext::new(Role::Server, CLIENT_IDENT, SERVER_IDENT);
        client_ctx.set_key_lens(key_lens());
        server_ctx.set_key_lens(key_lens());
        Peers { client_ctx, server_ctx, client_transport, server_transport }
    }

    /// Runs one key exchange with the server on another thread.
    fn exchange(
        &mut self,
        server_config: &ServerConfig,
        client_config: &ClientConfig,
        host_keys: &LocalHostKeys,
        accept: &dyn Fn(&Pubkey) -> bool,
        seed: u64,
    ) -> (kagi::Result<(KexOutput, NewKeys)>, kagi::Result<(KexOutput, NewKeys)>) {
        let Peers { client_ctx, server_ctx, client_transport, server_transport } = self;
        thread::scope(|s| {
            let server = s.spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                kex::run_server(server_ctx, server_transport, server_config, host_keys, &mut rng)
            });

            let mut rng = ChaCha8Rng::seed_from_u64(seed + 1000);
            let client_res = kex::run_client(
                client_ctx, client_transport, client_config, &accept, &mut rng);
            (client_res, server.join().unwrap())
        })
    }
}

fn ed25519_host_keys(seed: u64) -> (LocalHostKeys, Pubkey) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let privkey = Privkey::Ed25519(Ed25519Privkey::random(&mut rng));
    let pubkey = privkey.pubkey();
    (LocalHostKeys::new(vec![privkey]), pubkey)
}

fn check_agreement(
    client: &(KexOutput, NewKeys),
    server: &(KexOutput, NewKeys),
    expected_pubkey: &Pubkey,
) {
    let (client_output, client_keys) = client;
    let (server_output, server_keys) = server;
    assert_eq!(client_output.kex_algo.name, server_output.kex_algo.name);
    assert_eq!(client_output.exchange_hash.as_bytes(), server_output.exchange_hash.as_bytes());
    assert_eq!(client_output.session_id, server_output.session_id);
    assert_eq!(&client_output.server_pubkey, expected_pubkey);
    assert_eq!(client_keys, server_keys);
    assert_eq!(client_keys.client_to_server.key.len(), 32);
    assert_eq!(client_keys.server_to_client.mac_key.len(), 64);
    assert_ne!(client_keys.client_to_server.key, client_keys.server_to_client.key);
}

#[test]
fn test_kex_curve25519_ed25519() {
    init_log();
    let (host_keys, host_pubkey) = ed25519_host_keys(1);

    let mut peers = Peers::new();
    let (client, server) = peers.exchange(
        &ServerConfig::default(), &ClientConfig::default(), &host_keys, &|_| true, 10);
    let (client, server) = (client.unwrap(), server.unwrap());

    check_agreement(&client, &server, &host_pubkey);
    assert_eq!(client.0.kex_algo.name, "curve25519-sha256");
    assert_eq!(client.0.session_id.as_bytes(), client.0.exchange_hash.as_bytes());
    assert_eq!(peers.client_ctx.session_id(), Some(&client.0.session_id));
    assert_eq!(peers.server_ctx.session_id(), Some(&server.0.session_id));
}

#[test]
fn test_kex_dh_group14_rsa() {
    init_log();
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let privkey = Privkey::Rsa(RsaPrivkey::random(&mut rng, 1024).unwrap());
    let host_pubkey = privkey.pubkey();
    let host_keys = LocalHostKeys::new(vec![privkey]);

    let client_config = ClientConfig::default().with(|c| {
        c.kex_algos = vec![&kex::DIFFIE_HELLMAN_GROUP14_SHA256];
        c.server_pubkey_algos = vec![&kagi::pubkey::RSA_SHA2_256];
    });

    let mut peers = Peers::new();
    let (client, server) = peers.exchange(
        &ServerConfig::default(), &client_config, &host_keys, &|_| true, 20);
    let (client, server) = (client.unwrap(), server.unwrap());

    check_agreement(&client, &server, &host_pubkey);
    assert_eq!(client.0.kex_algo.name, "diffie-hellman-group14-sha256");
}

#[test]
fn test_kex_ecdh_nistp() {
    init_log();
    let (host_keys, host_pubkey) = ed25519_host_keys(6);

    for (i, kex_algo) in [&kex::ECDH_SHA2_NISTP256, &kex::ECDH_SHA2_NISTP384].into_iter().enumerate() {
        let client_config = ClientConfig::default().with(|c| c.kex_algos = vec![kex_algo]);
        let mut peers = Peers::new();
        let (client, server) = peers.exchange(
            &ServerConfig::default(), &client_config, &host_keys, &|_| true, 60 + i as u64);
        let (client, server) = (client.unwrap(), server.unwrap());

        check_agreement(&client, &server, &host_pubkey);
        assert_eq!(client.0.kex_algo.name, kex_algo.name);
        assert_eq!(client.0.exchange_hash.as_bytes().len(), kex_algo.hash.output_len());
    }
}

#[test]
fn test_rekey_keeps_session_id() {
    init_log();
    let (host_keys, host_pubkey) = ed25519_host_keys(3);
    let server_config = ServerConfig::default();
    let client_config = ClientConfig::default();
    let mut peers = Peers::new();

    let (first, _) = peers.exchange(&server_config, &client_config, &host_keys, &|_| true, 30);
    let first = first.unwrap();

    let (client, server) = peers.exchange(&server_config, &client_config, &host_keys, &|_| true, 31);
    let (client, server) = (client.unwrap(), server.unwrap());
    check_agreement(&client, &server, &host_pubkey);

    assert_ne!(client.0.exchange_hash.as_bytes(), first.0.exchange_hash.as_bytes());
    assert_eq!(client.0.session_id, first.0.session_id);
    assert_ne!(client.1, first.1);
}

#[test]
fn test_host_key_rejected() {
    init_log();
    let (host_keys, _) = ed25519_host_keys(4);
    let (_, other_pubkey) = ed25519_host_keys(5);

    let mut peers = Peers::new();
    let (client, server) = peers.exchange(
        &ServerConfig::default(), &ClientConfig::default(), &host_keys,
        &|pubkey| *pubkey == other_pubkey, 40);

    assert!(matches!(client, Err(Error::HostKeyRejected)), "{:?}", client.map(|_| ()));
    match server {
        Err(Error::PeerDisconnected(err)) =>
            assert_eq!(err.reason_code, disconnect::HOST_KEY_NOT_VERIFIABLE),
        res => panic!("expected disconnect, got {:?}", res.map(|_| ())),
    }
    assert!(peers.client_ctx.session_id().is_none());
}

#[test]
fn test_kex_no_common_algo() {
    init_log();
    let (host_keys, _) = ed25519_host_keys(6);
    let server_config = ServerConfig::default().with(|c| {
        c.kex_algos = vec![&kex::DIFFIE_HELLMAN_GROUP14_SHA256];
    });
    let client_config = ClientConfig::default().with(|c| {
        c.kex_algos = vec![&kex::CURVE25519_SHA256];
    });

    let mut peers = Peers::new();
    let (client, server) = peers.exchange(&server_config, &client_config, &host_keys, &|_| true, 50);
    assert!(matches!(client, Err(Error::AlgoNegotiate(_))));
    assert!(matches!(server, Err(Error::AlgoNegotiate(_))));
}

struct AuthSetup {
    config: ServerConfig,
    sources: HashMap<String, Bytes>,
}

impl AuthSetup {
    fn new(lines: &[String]) -> Self {
        let mut sources = HashMap::new();
        sources.insert(".ssh/authorized_keys".to_string(), Bytes::from(lines.join("\n")));
        AuthSetup { config: ServerConfig::default(), sources }
    }

    /// Runs one authentication attempt with the server on another thread.
    fn attempt(
        &self,
        revocation: &(dyn RevocationCheck + Sync),
        server_session: &SessionId,
        client_key: &RsaPrivkey,
        client_session: &SessionId,
    ) -> (AuthOutcome, bool) {
        let (mut client_transport, mut server_transport) = memory_pair();
        thread::scope(|s| {
            let server = s.spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(100);
                let policy = StandardOptionsPolicy::default();
                let sources: &dyn KeySources = &self.sources;
                let auth = RsaAuth::new(&self.config, sources, revocation, &policy);
                let mut request = server_transport.recv_expecting(msg::CMSG_AUTH_RSA).unwrap();
                auth.authenticate(server_session, &mut server_transport, &mut request, &mut rng)
            });

            let accepted = authenticate_client(client_key, client_session, &mut client_transport)
                .unwrap();
            (server.join().unwrap().unwrap(), accepted)
        })
    }
}

fn rsa_key(seed: u64, bits: usize) -> RsaPrivkey {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    RsaPrivkey::random(&mut rng, bits).unwrap()
}

fn key_line(privkey: &RsaPrivkey, comment: &str) -> String {
    let pubkey = privkey.pubkey();
    format!("{} {} {} {}", pubkey.bits(), pubkey.e(), pubkey.n(), comment)
}

fn session_id(byte: u8) -> SessionId {
    SessionId::from(&[byte; 32][..])
}

#[test]
fn test_rsa_auth_accepted() {
    init_log();
    let alice = rsa_key(60, 1024);
    let setup = AuthSetup::new(&[
        "# alice".into(),
        format!("no-pty {}", key_line(&alice, "alice@example.com")),
    ]);

    let sid = session_id(0x11);
    let (outcome, accepted) = setup.attempt(&NoRevocation, &sid, &alice, &sid);
    assert!(accepted);
    match outcome {
        AuthOutcome::Accepted(key) => {
            assert_eq!(key.record.line(), 2);
            assert_eq!(key.record.comment(), Some("alice@example.com"));
            assert!(key.options.no_pty);
        },
        AuthOutcome::Rejected => panic!("expected the key to be accepted"),
    }
}

#[test]
fn test_rsa_auth_wrong_session() {
    init_log();
    let alice = rsa_key(61, 1024);
    let setup = AuthSetup::new(&[key_line(&alice, "alice")]);

    let (outcome, accepted) = setup.attempt(&NoRevocation, &session_id(0x21), &alice, &session_id(0x22));
    assert!(!accepted);
    assert!(matches!(outcome, AuthOutcome::Rejected));
}

#[test]
fn test_rsa_auth_unknown_key() {
    init_log();
    let alice = rsa_key(62, 1024);
    let mallory = rsa_key(63, 1024);
    let setup = AuthSetup::new(&[key_line(&alice, "alice")]);

    let sid = session_id(0x31);
    let (outcome, accepted) = setup.attempt(&NoRevocation, &sid, &mallory, &sid);
    assert!(!accepted);
    assert!(matches!(outcome, AuthOutcome::Rejected));
}

#[test]
fn test_rsa_auth_revoked_key() {
    init_log();
    let alice = rsa_key(64, 1024);
    let setup = AuthSetup::new(&[key_line(&alice, "alice")]);
    let revoked = RevokedKeys::new(vec![alice.pubkey()]);

    let sid = session_id(0x41);
    let (outcome, accepted) = setup.attempt(&revoked, &sid, &alice, &sid);
    assert!(!accepted);
    assert!(matches!(outcome, AuthOutcome::Rejected));
}

#[test]
fn test_rsa_auth_small_modulus() {
    init_log();
    let alice = rsa_key(65, 1024);
    let mut setup = AuthSetup::new(&[key_line(&alice, "alice")]);
    setup.config.rsa_min_modulus_bits = 2048;

    let sid = session_id(0x51);
    let (outcome, accepted) = setup.attempt(&NoRevocation, &sid, &alice, &sid);
    assert!(!accepted);
    assert!(matches!(outcome, AuthOutcome::Rejected));
}

#[test]
fn test_rsa_auth_sources_in_order() {
    init_log();
    let alice = rsa_key(66, 1024);
    let mut setup = AuthSetup::new(&[]);
    setup.config.authorized_keys_files = vec![
        "none".into(), "missing".into(), "first".into(), "second".into(),
    ];
    setup.sources.insert("first".into(), Bytes::from(format!(
        "from=\"*.example.com\" {}", key_line(&alice, "restricted"))));
    setup.sources.insert("second".into(), Bytes::from(key_line(&alice, "unrestricted")));

    let sid = session_id(0x61);
    let (outcome, accepted) = setup.attempt(&NoRevocation, &sid, &alice, &sid);
    assert!(accepted);
    match outcome {
        AuthOutcome::Accepted(key) => {
            assert_eq!(key.record.source(), "second");
            assert_eq!(key.record.comment(), Some("unrestricted"));
        },
        AuthOutcome::Rejected => panic!("expected the key to be accepted"),
    }
}

#[test]
fn test_rsa_auth_after_kex() {
    init_log();
    let (host_keys, _) = ed25519_host_keys(7);
    let alice = rsa_key(67, 1024);
    let setup = AuthSetup::new(&[key_line(&alice, "alice")]);

    let mut peers = Peers::new();
    let (client, server) = peers.exchange(
        &ServerConfig::default(), &ClientConfig::default(), &host_keys, &|_| true, 70);
    let (client, server) = (client.unwrap(), server.unwrap());

    let (outcome, accepted) = setup.attempt(
        &NoRevocation, &server.0.session_id, &alice, &client.0.session_id);
    assert!(accepted);
    assert!(matches!(outcome, AuthOutcome::Accepted(_)));
}
