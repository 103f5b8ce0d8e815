#![no_main]

//! Fuzz target for handshake record handling.
//!
//! Feeds arbitrary bytes to the message decoder and, as a handshake record
//! payload, to a server and a client. Malformed input must surface as an
//! error, never as a panic.

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::time::Instant;

use dtls_handshake::message::{
    Body, ClientHello, Cookie, Handshake, MessageType, ProtocolVersion, Random, SessionId,
};
use dtls_handshake::{
    AcceptAll, Config, Error, FlightContext, Handshaker, Negotiator, Output, Role,
};

/// Composes a bare ClientHello and nothing else. Enough to get either side
/// into a waiting state.
struct Refuse;

impl Negotiator for Refuse {
    fn compose(
        &mut self,
        _ctx: &FlightContext<'_>,
        msg_type: MessageType,
    ) -> Result<Option<Body>, Error> {
        match msg_type {
            MessageType::ClientHello => Ok(Some(Body::ClientHello(ClientHello::new(
                ProtocolVersion::DTLS1_2,
                Random::default(),
                SessionId::empty(),
                Cookie::empty(),
                Default::default(),
                Default::default(),
            )))),
            _ => Err(Error::Negotiation(format!("{:?}", msg_type))),
        }
    }

    fn accept(&mut self, _ctx: &FlightContext<'_>, _messages: &[Handshake]) -> Result<(), Error> {
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    if let Ok(h) = Handshake::unmarshal(data) {
        // Whatever decodes must encode again.
        let _ = h.marshal();
    }

    let config = Arc::new(
        Config::builder()
            .rng_seed(0)
            .build()
            .expect("default config"),
    );
    let now = Instant::now();
    let mut buf = vec![0u8; 2048];

    for role in [Role::Server, Role::Client] {
        let mut hs = Handshaker::new(
            Arc::clone(&config),
            role,
            Box::new(Refuse),
            Box::new(AcceptAll),
        );
        let _ = hs.handle_timeout(now);

        // Drain with a limit to prevent infinite loops
        for _ in 0..16 {
            match hs.poll_output(&mut buf, now) {
                Output::Timeout(_) => break,
                _ => continue,
            }
        }

        let _ = hs.handle_record(0, data);
        let _ = hs.handle_record(1, data);
    }
});
