use std::sync::Arc;
use std::time::Instant;

use crate::cache::PullRule;
use crate::certificate::CertVerifier;
use crate::engine::Engine;
use crate::flight::Slot;
use crate::message::{Body, Cookie, Handshake, HelloVerifyRequest, MessageType, ProtocolVersion};
use crate::negotiator::{FlightContext, Negotiator};
use crate::types::{AlertLevel, ALERT_CLOSE_NOTIFY};
use crate::{Config, Error, Flight, Output, Role, UnexpectedMessagePolicy};

const COOKIE_LEN: usize = 20;

/// Where the handshake is at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// About to send the current flight.
    Preparing,
    /// Flight sent, waiting for the peer's.
    Waiting,
    /// Handshake complete.
    Finished,
    /// Ended by an error or a fatal alert.
    Failed,
    /// Closed by the caller or by close_notify.
    Closed,
}

/// One side of a DTLS 1.2 handshake.
///
/// Sans-IO: feed it handshake record payloads with [`handle_record`],
/// time with [`handle_timeout`], and drain what it wants to send with
/// [`poll_output`]. Nothing happens until the first call to either
/// `handle_timeout` or `handle_record`.
///
/// [`handle_record`]: Handshaker::handle_record
/// [`handle_timeout`]: Handshaker::handle_timeout
/// [`poll_output`]: Handshaker::poll_output
pub struct Handshaker {
    engine: Engine,
    role: Role,
    flight: Flight,
    state: HandshakeState,
    negotiator: Box<dyn Negotiator>,
    verifier: Box<dyn CertVerifier>,

    /// Server: the cookie we hand out. Client: the cookie we got.
    cookie: Option<Cookie>,

    /// Sequence of the ClientHello the server is answering.
    client_hello_seq: u16,

    /// Connected is emitted once, after the last records.
    connected_pending: bool,
}

impl Handshaker {
    pub fn new(
        config: Arc<Config>,
        role: Role,
        negotiator: Box<dyn Negotiator>,
        verifier: Box<dyn CertVerifier>,
    ) -> Handshaker {
        let mut engine = Engine::new(config, role.is_client());

        let cookie = match role {
            Role::Server => Some(Cookie::random(COOKIE_LEN, &mut engine.rng)),
            Role::Client => None,
        };

        Handshaker {
            engine,
            role,
            flight: Flight::initial(role),
            state: HandshakeState::Preparing,
            negotiator,
            verifier,
            cookie,
            client_hello_seq: 0,
            connected_pending: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn flight(&self) -> Flight {
        self.flight
    }

    pub fn is_connected(&self) -> bool {
        self.state == HandshakeState::Finished
    }

    /// Transcript of the handshake so far.
    pub fn transcript(&self) -> Vec<u8> {
        self.engine.cache.transcript()
    }

    /// Feed the payload of one handshake record.
    ///
    /// Errors from malformed peer input are returned but leave the session
    /// running, see [`Error::is_fatal`].
    pub fn handle_record(&mut self, epoch: u16, payload: &[u8]) -> Result<(), Error> {
        self.check_usable()?;

        let received = self.engine.handle_handshake_record(epoch, payload);
        if let Err(e) = &received {
            if e.is_fatal() {
                return Err(self.fail(e.clone()));
            }
        }

        if let Err(e) = self.process_input() {
            return Err(self.fail(e));
        }

        received
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        self.check_usable()?;

        if let Err(e) = self.process_input() {
            return Err(self.fail(e));
        }

        if let Err(e) = self.engine.handle_timeout(now) {
            return Err(self.fail(e));
        }

        Ok(())
    }

    /// Next thing to do: send a record, report the connection, or wait
    /// until a deadline.
    ///
    /// Panics if `buf` cannot hold a record of the configured MTU.
    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8], now: Instant) -> Output<'a> {
        if !self.engine.has_pending_output() && self.connected_pending {
            self.connected_pending = false;
            return Output::Connected;
        }

        self.engine.poll_output(buf, now)
    }

    /// An alert from the peer.
    pub fn handle_alert(&mut self, level: AlertLevel, description: u8) -> Result<(), Error> {
        if description == ALERT_CLOSE_NOTIFY {
            debug!("Peer sent close_notify");
            self.close();
            return Ok(());
        }

        match level {
            AlertLevel::Fatal => Err(self.fail(Error::Alert(description))),
            _ => {
                warn!("Ignore warning alert {}", description);
                Ok(())
            }
        }
    }

    /// Stop the handshake and drop all its state.
    pub fn close(&mut self) {
        debug!("Close handshake in flight {}", self.flight.number());
        self.engine.close();
        self.connected_pending = false;
        self.state = HandshakeState::Closed;
    }

    fn check_usable(&self) -> Result<(), Error> {
        match self.state {
            HandshakeState::Failed => Err(Error::Failed),
            HandshakeState::Closed => Err(Error::Closed),
            _ => Ok(()),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        warn!(
            "Handshake failed in flight {}: {}",
            self.flight.number(),
            error
        );
        self.engine.flight_stop_resend_timers();
        self.state = HandshakeState::Failed;
        error
    }

    fn process_input(&mut self) -> Result<(), Error> {
        loop {
            let prev = (self.state, self.flight);
            self.do_process_input()?;
            if prev == (self.state, self.flight) {
                break;
            }
        }
        Ok(())
    }

    fn do_process_input(&mut self) -> Result<(), Error> {
        match self.state {
            HandshakeState::Preparing => self.prepare_flight(),
            HandshakeState::Waiting => self.check_peer_flight(),
            _ => Ok(()),
        }
    }

    fn initial_epoch(&self) -> u16 {
        self.engine.config().initial_epoch()
    }

    fn epoch_of(&self, slot: &Slot) -> u16 {
        if slot.next_epoch {
            self.initial_epoch() + 1
        } else {
            self.initial_epoch()
        }
    }

    fn prepare_flight(&mut self) -> Result<(), Error> {
        self.engine.flight_begin(self.flight);

        match self.flight {
            Flight::Flight0 => {}
            Flight::Flight2 => self.send_hello_verify_request()?,
            _ => {
                if self.flight == Flight::Flight4 {
                    self.engine.set_next_handshake_seq_no(self.client_hello_seq);
                }
                for slot in self.flight.sends() {
                    self.send_slot(slot)?;
                }
            }
        }

        if self.flight.is_last_send_flight() {
            self.finish();
        } else {
            self.state = HandshakeState::Waiting;
        }

        Ok(())
    }

    fn send_hello_verify_request(&mut self) -> Result<(), Error> {
        let cookie = self.cookie.unwrap_or_default();
        let hvr = HelloVerifyRequest::new(ProtocolVersion::DTLS1_0, cookie);

        self.engine.set_next_handshake_seq_no(self.client_hello_seq);
        self.engine
            .create_handshake(self.initial_epoch(), Body::HelloVerifyRequest(hvr))?;

        // The client retransmits its ClientHello, which triggers a resend
        // (RFC 6347 4.2.1).
        self.engine.flight_stop_resend_timer();

        Ok(())
    }

    fn send_slot(&mut self, slot: &Slot) -> Result<(), Error> {
        let epoch = self.epoch_of(slot);

        let composed = {
            let ctx = FlightContext::new(
                self.flight,
                self.role,
                self.initial_epoch(),
                &self.engine.cache,
            );
            self.negotiator.compose(&ctx, slot.msg_type)?
        };

        let mut body = match composed {
            Some(b) => b,
            None if slot.optional => {
                trace!("Skip optional {:?}", slot.msg_type);
                return Ok(());
            }
            None => return Err(Error::MissingMessage(slot.msg_type)),
        };

        if body.message_type() != slot.msg_type {
            return Err(Error::Negotiation(format!(
                "composed {:?} in place of {:?}",
                body.message_type(),
                slot.msg_type
            )));
        }

        if let (Body::ClientHello(ch), Some(cookie)) = (&mut body, self.cookie) {
            ch.cookie = cookie;
        }

        if slot.next_epoch {
            self.engine.create_change_cipher_spec(self.initial_epoch())?;
        }

        self.engine.create_handshake(epoch, body)
    }

    fn check_peer_flight(&mut self) -> Result<(), Error> {
        let peer_is_client = !self.role.is_client();
        let start = self.engine.peer_handshake_seq_no();

        for expected in self.flight.expects() {
            let rules: Vec<PullRule> = expected
                .iter()
                .map(|slot| PullRule {
                    msg_type: slot.msg_type,
                    epoch: self.epoch_of(slot),
                    is_client: peer_is_client,
                    optional: slot.optional,
                })
                .collect();

            if let Some((next_seq, messages)) = self.engine.cache.full_pull(start, &rules) {
                return self.handle_peer_flight(next_seq, messages);
            }
        }

        self.check_unexpected(start)
    }

    fn check_unexpected(&mut self, start: u16) -> Result<(), Error> {
        let peer_is_client = !self.role.is_client();
        let expected = self.flight.expects();

        let unexpected: Vec<(u16, MessageType)> = self
            .engine
            .cache
            .from_side(peer_is_client, start)
            .filter(|e| {
                !expected
                    .iter()
                    .flat_map(|f| f.iter())
                    .any(|s| s.msg_type == e.msg_type())
            })
            .map(|e| (e.message_seq, e.msg_type()))
            .collect();

        for (seq, msg_type) in unexpected {
            match self.engine.config().unexpected_message() {
                UnexpectedMessagePolicy::Abort => {
                    return Err(Error::UnexpectedMessage(format!(
                        "{:?} (message_seq {}) in flight {}",
                        msg_type,
                        seq,
                        self.flight.number()
                    )));
                }
                UnexpectedMessagePolicy::Ignore => {
                    warn!(
                        "Ignore unexpected {:?} (message_seq {}) in flight {}",
                        msg_type,
                        seq,
                        self.flight.number()
                    );
                    self.engine.cache.ignore(peer_is_client, seq);
                    if seq == self.engine.peer_handshake_seq_no() {
                        self.engine.set_peer_handshake_seq_no(seq.wrapping_add(1));
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_peer_flight(&mut self, next_seq: u16, messages: Vec<Handshake>) -> Result<(), Error> {
        let Some(first) = messages.first() else {
            return Ok(());
        };
        let first_type = first.msg_type();
        let first_seq = first.message_seq();

        debug!(
            "Flight {} got peer flight {:?}",
            self.flight.number(),
            messages.iter().map(|m| m.msg_type()).collect::<Vec<_>>()
        );

        match (self.flight, &first.body) {
            (Flight::Flight0 | Flight::Flight2, Body::ClientHello(ch)) => {
                let cookie_ok =
                    !self.engine.config().with_hello_verify() || Some(ch.cookie) == self.cookie;

                self.client_hello_seq = first_seq;
                self.engine.set_peer_handshake_seq_no(next_seq);

                if !cookie_ok {
                    if self.flight == Flight::Flight2 {
                        return Err(Error::CookieMismatch);
                    }
                    debug!("ClientHello without valid cookie");
                    return self.transition(Flight::Flight2);
                }
            }
            (Flight::Flight1, Body::HelloVerifyRequest(hvr)) => {
                debug!("Got cookie of {} bytes", hvr.cookie.len());
                self.cookie = Some(hvr.cookie);
                self.engine.set_peer_handshake_seq_no(next_seq);
                return self.transition(Flight::Flight3);
            }
            _ => {
                self.engine.set_peer_handshake_seq_no(next_seq);
            }
        }

        for m in &messages {
            if let Body::Certificate(c) = &m.body {
                self.verifier
                    .verify_certificate_chain(&c.certificate_list)
                    .map_err(Error::CertificateError)?;
            }
        }

        {
            let ctx = FlightContext::new(
                self.flight,
                self.role,
                self.initial_epoch(),
                &self.engine.cache,
            );
            self.negotiator.accept(&ctx, &messages)?;
        }

        match self.flight.next(first_type) {
            Some(next) => self.transition(next),
            None => {
                self.finish();
                // Nothing left to answer with.
                self.engine.flight_clear_resends();
                Ok(())
            }
        }
    }

    fn transition(&mut self, next: Flight) -> Result<(), Error> {
        debug!(
            "Flight {} -> {}",
            self.flight.number(),
            next.number()
        );
        self.flight = next;
        self.state = HandshakeState::Preparing;
        Ok(())
    }

    fn finish(&mut self) {
        debug!("Handshake complete in flight {}", self.flight.number());
        self.engine.flight_stop_resend_timers();
        self.state = HandshakeState::Finished;
        self.connected_pending = true;
    }
}
