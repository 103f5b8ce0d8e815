//! Shared helpers for handshake integration tests.
//!
//! This file has no `#[test]` functions; Cargo compiles it as a no-op binary.
//! Import it from other test files via `mod handshake_common;`.

#![allow(unused)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dtls_handshake::message::*;
use dtls_handshake::*;
use sha2::{Digest, Sha256};
use tinyvec::ArrayVec;

/// One record as handed out by `poll_output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub epoch: u16,
    pub content_type: ContentType,
    pub payload: Vec<u8>,
}

impl Record {
    /// Header of the handshake fragment in this record.
    pub fn header(&self) -> Option<Header> {
        if self.content_type != ContentType::Handshake {
            return None;
        }
        Header::parse(&self.payload).ok().map(|(_, h)| h)
    }

    pub fn msg_type(&self) -> Option<MessageType> {
        self.header().map(|h| h.msg_type)
    }
}

/// Which way a batch of records travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToServer,
    ToClient,
}

/// Drain all output. Returns the records, whether `Connected` was among
/// them, and the next deadline.
pub fn drain(h: &mut Handshaker, now: Instant) -> (Vec<Record>, bool, Instant) {
    let mut buf = vec![0; 2048];
    let mut records = Vec::new();
    let mut connected = false;

    loop {
        match h.poll_output(&mut buf, now) {
            Output::Record {
                epoch,
                content_type,
                payload,
            } => records.push(Record {
                epoch,
                content_type,
                payload: payload.to_vec(),
            }),
            Output::Connected => connected = true,
            Output::Timeout(t) => return (records, connected, t),
        }
    }
}

/// Only the records, for tests that drive a single side.
pub fn collect_records(h: &mut Handshaker, now: Instant) -> Vec<Record> {
    drain(h, now).0
}

/// Feed handshake records. ChangeCipherSpec belongs to the record layer and
/// is skipped. Non-fatal errors are logged and swallowed.
pub fn deliver(to: &mut Handshaker, records: &[Record]) -> Result<(), Error> {
    for r in records {
        if r.content_type != ContentType::Handshake {
            continue;
        }
        if let Err(e) = to.handle_record(r.epoch, &r.payload) {
            if e.is_fatal() {
                return Err(e);
            }
            log::debug!("Non-fatal: {}", e);
        }
    }
    Ok(())
}

pub fn handshake_message(seq: u16, body: Body) -> Vec<u8> {
    Handshake::new(seq, body).marshal().expect("marshal")
}

pub fn self_signed_der() -> Vec<u8> {
    rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("generate cert")
        .serialize_der()
        .expect("serialize cert")
}

pub fn verify_data(label: &[u8], transcript: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(label);
    hasher.update(transcript);
    hasher.finalize()[..12].to_vec()
}

fn finished_label(is_client: bool) -> &'static [u8] {
    if is_client {
        b"client finished"
    } else {
        b"server finished"
    }
}

pub fn client_hello(random: Random, cookie: Cookie) -> ClientHello {
    let mut suites = ArrayVec::new();
    suites.push(CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256);
    let mut compression = ArrayVec::new();
    compression.push(CompressionMethod::Null);

    ClientHello::new(
        ProtocolVersion::DTLS1_2,
        random,
        SessionId::empty(),
        cookie,
        suites,
        compression,
    )
}

/// Peer flights handed to `accept`, by message type.
#[derive(Debug, Clone, Default)]
pub struct Seen(Arc<Mutex<Vec<Vec<MessageType>>>>);

impl Seen {
    pub fn flights(&self) -> Vec<Vec<MessageType>> {
        self.0.lock().unwrap().clone()
    }
}

/// Negotiator with fixed content. Finished carries a SHA-256 over the
/// transcript so both sides must agree on it byte for byte.
pub struct TestNegotiator {
    role: Role,
    rng: SeededRng,
    certificate: Option<Asn1Cert>,
    request_client_certificate: bool,
    tamper_finished: bool,
    seen: Seen,
}

impl TestNegotiator {
    /// A server comes with a certificate, a client without.
    pub fn new(role: Role) -> Self {
        let certificate = match role {
            Role::Server => Some(Asn1Cert::try_new(self_signed_der()).expect("cert")),
            Role::Client => None,
        };
        TestNegotiator {
            role,
            rng: SeededRng::new(Some(7)),
            certificate,
            request_client_certificate: false,
            tamper_finished: false,
            seen: Seen::default(),
        }
    }

    pub fn with_certificate(mut self) -> Self {
        self.certificate = Some(Asn1Cert::try_new(self_signed_der()).expect("cert"));
        self
    }

    pub fn with_certificate_der(mut self, der: Vec<u8>) -> Self {
        self.certificate = Some(Asn1Cert::try_new(der).expect("cert"));
        self
    }

    pub fn request_client_certificate(mut self) -> Self {
        self.request_client_certificate = true;
        self
    }

    pub fn tamper_finished(mut self) -> Self {
        self.tamper_finished = true;
        self
    }

    pub fn seen(&self) -> Seen {
        self.seen.clone()
    }

    fn signed(&self, data: &[u8]) -> DigitallySigned {
        DigitallySigned::new(
            SignatureAndHashAlgorithm::new(HashAlgorithm::SHA256, SignatureAlgorithm::ECDSA),
            Sha256::digest(data).to_vec(),
        )
    }
}

impl Negotiator for TestNegotiator {
    fn compose(
        &mut self,
        ctx: &FlightContext<'_>,
        msg_type: MessageType,
    ) -> Result<Option<Body>, Error> {
        let body = match msg_type {
            MessageType::ClientHello => {
                // A resent hello keeps its random.
                let random = match ctx.sent(MessageType::ClientHello).map(|h| &h.body) {
                    Some(Body::ClientHello(ch)) => ch.random,
                    _ => Random::new(&mut self.rng),
                };
                Body::ClientHello(client_hello(random, Cookie::empty()))
            }
            MessageType::ServerHello => Body::ServerHello(ServerHello::new(
                ProtocolVersion::DTLS1_2,
                Random::new(&mut self.rng),
                SessionId::empty(),
                CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
                CompressionMethod::Null,
                None,
            )),
            MessageType::Certificate => {
                let Some(cert) = self.certificate.clone() else {
                    return Ok(None);
                };
                if self.role == Role::Client
                    && ctx.received(MessageType::CertificateRequest).is_none()
                {
                    return Ok(None);
                }
                Body::Certificate(Certificate::new(vec![cert]))
            }
            MessageType::ServerKeyExchange => {
                let public_key = vec![4; 65];
                let signed = self.signed(&public_key);
                Body::ServerKeyExchange(ServerKeyExchange::new(ServerKeyExchangeParams::Ecdh(
                    EcdhParams::new(NamedCurve::Secp256r1, public_key, Some(signed)),
                )))
            }
            MessageType::CertificateRequest => {
                if !self.request_client_certificate {
                    return Ok(None);
                }
                let mut types = ArrayVec::new();
                types.push(ClientCertificateType::ECDSA_SIGN);
                let mut algs = ArrayVec::new();
                algs.push(SignatureAndHashAlgorithm::new(
                    HashAlgorithm::SHA256,
                    SignatureAlgorithm::ECDSA,
                ));
                Body::CertificateRequest(CertificateRequest::new(types, algs, vec![]))
            }
            MessageType::ServerHelloDone => Body::ServerHelloDone,
            MessageType::ClientKeyExchange => {
                Body::ClientKeyExchange(ClientKeyExchange::new(ExchangeKeys::Ecdh(vec![4; 65])))
            }
            MessageType::CertificateVerify => {
                if ctx.sent(MessageType::Certificate).is_none() {
                    return Ok(None);
                }
                Body::CertificateVerify(CertificateVerify::new(self.signed(&ctx.transcript())))
            }
            MessageType::Finished => {
                let mut data = verify_data(finished_label(self.role.is_client()), &ctx.transcript());
                if self.tamper_finished {
                    data[0] ^= 0xFF;
                }
                Body::Finished(Finished::new(data))
            }
            other => {
                return Err(Error::Negotiation(format!("cannot compose {:?}", other)));
            }
        };
        Ok(Some(body))
    }

    fn accept(&mut self, ctx: &FlightContext<'_>, messages: &[Handshake]) -> Result<(), Error> {
        self.seen
            .0
            .lock()
            .unwrap()
            .push(messages.iter().map(|m| m.msg_type()).collect());

        let peer_is_client = !self.role.is_client();
        for m in messages {
            let Body::Finished(finished) = &m.body else {
                continue;
            };
            let transcript = ctx
                .digest_before(peer_is_client, m.message_seq())
                .ok_or_else(|| Error::Negotiation("Finished not in transcript".into()))?;
            let expected = verify_data(finished_label(peer_is_client), &transcript);
            if finished.verify_data != expected {
                return Err(Error::Negotiation("bad verify_data".into()));
            }
        }
        Ok(())
    }
}

pub fn default_config() -> Config {
    Config::builder().rng_seed(42).build().expect("config")
}

/// A client and a server wired together through a lossy, controllable link.
pub struct Pair {
    pub client: Handshaker,
    pub server: Handshaker,
    pub client_seen: Seen,
    pub server_seen: Seen,
    pub client_connected: usize,
    pub server_connected: usize,
    pub now: Instant,
}

impl Pair {
    pub fn new(client_config: Config, server_config: Config) -> Pair {
        Pair::with_negotiators(
            client_config,
            server_config,
            TestNegotiator::new(Role::Client),
            TestNegotiator::new(Role::Server),
        )
    }

    pub fn with_negotiators(
        client_config: Config,
        server_config: Config,
        client: TestNegotiator,
        server: TestNegotiator,
    ) -> Pair {
        Pair::with_verifiers(
            client_config,
            server_config,
            client,
            server,
            Box::new(WellFormed),
            Box::new(WellFormed),
        )
    }

    pub fn with_verifiers(
        client_config: Config,
        server_config: Config,
        client: TestNegotiator,
        server: TestNegotiator,
        client_verifier: Box<dyn CertVerifier>,
        server_verifier: Box<dyn CertVerifier>,
    ) -> Pair {
        let _ = env_logger::try_init();

        let client_seen = client.seen();
        let server_seen = server.seen();

        Pair {
            client: Handshaker::new(
                Arc::new(client_config),
                Role::Client,
                Box::new(client),
                client_verifier,
            ),
            server: Handshaker::new(
                Arc::new(server_config),
                Role::Server,
                Box::new(server),
                server_verifier,
            ),
            client_seen,
            server_seen,
            client_connected: 0,
            server_connected: 0,
            now: Instant::now(),
        }
    }

    pub fn both_connected(&self) -> bool {
        self.client_connected > 0 && self.server_connected > 0
    }

    /// Run up to `rounds` exchanges over a perfect link.
    pub fn run(&mut self, rounds: usize) -> Result<(), Error> {
        self.run_with(rounds, |_, records| records)
    }

    /// Run up to `rounds` exchanges. `link` decides what arrives of each
    /// batch. When a round moves nothing, time jumps to the next deadline.
    pub fn run_with<F>(&mut self, rounds: usize, mut link: F) -> Result<(), Error>
    where
        F: FnMut(Direction, Vec<Record>) -> Vec<Record>,
    {
        for _ in 0..rounds {
            self.client.handle_timeout(self.now)?;
            self.server.handle_timeout(self.now)?;

            let (to_server, c_conn, c_next) = drain(&mut self.client, self.now);
            let (to_client, s_conn, s_next) = drain(&mut self.server, self.now);
            self.client_connected += c_conn as usize;
            self.server_connected += s_conn as usize;

            if self.both_connected() {
                return Ok(());
            }

            let idle = to_server.is_empty() && to_client.is_empty();

            deliver(&mut self.server, &link(Direction::ToServer, to_server))?;
            deliver(&mut self.client, &link(Direction::ToClient, to_client))?;

            if idle {
                self.now = c_next.min(s_next).max(self.now);
            }
        }
        Ok(())
    }

    /// Further rounds after completion, collecting the Connected count.
    pub fn settle(&mut self, rounds: usize) -> Result<(), Error> {
        for _ in 0..rounds {
            self.client.handle_timeout(self.now)?;
            self.server.handle_timeout(self.now)?;
            let (to_server, c_conn, _) = drain(&mut self.client, self.now);
            let (to_client, s_conn, _) = drain(&mut self.server, self.now);
            self.client_connected += c_conn as usize;
            self.server_connected += s_conn as usize;
            deliver(&mut self.server, &to_server)?;
            deliver(&mut self.client, &to_client)?;
            self.now += Duration::from_millis(100);
        }
        Ok(())
    }
}
