//! The seam to whatever produces handshake content.
//!
//! The handshake core frames, sequences, caches and retransmits messages. It
//! does not pick cipher suites, run key exchanges or compute Finished. A
//! [`Negotiator`] does that, one message at a time.

use crate::cache::HandshakeCache;
use crate::message::{Body, Handshake, MessageType};
use crate::{Error, Flight, Role};

/// Read access to the session while composing or accepting a flight.
pub struct FlightContext<'a> {
    flight: Flight,
    role: Role,
    epoch: u16,
    cache: &'a HandshakeCache,
}

impl<'a> FlightContext<'a> {
    pub(crate) fn new(flight: Flight, role: Role, epoch: u16, cache: &'a HandshakeCache) -> Self {
        FlightContext {
            flight,
            role,
            epoch,
            cache,
        }
    }

    /// The flight being composed, or the one waiting when accepting.
    pub fn flight(&self) -> Flight {
        self.flight
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Epoch of the unencrypted part of the handshake. Finished goes in
    /// the one after.
    pub fn epoch(&self) -> u16 {
        self.epoch
    }

    /// Latest message of a kind received from the peer.
    pub fn received(&self, msg_type: MessageType) -> Option<&'a Handshake> {
        self.cache
            .latest(!self.role.is_client(), msg_type)
            .map(|e| &e.handshake)
    }

    /// Latest message of a kind we sent.
    pub fn sent(&self, msg_type: MessageType) -> Option<&'a Handshake> {
        self.cache
            .latest(self.role.is_client(), msg_type)
            .map(|e| &e.handshake)
    }

    /// Transcript up to and including a message.
    pub fn digest(&self, is_client: bool, up_to_seq: u16) -> Option<Vec<u8>> {
        self.cache.digest(is_client, up_to_seq)
    }

    /// Transcript preceding a message.
    pub fn digest_before(&self, is_client: bool, seq: u16) -> Option<Vec<u8>> {
        self.cache.digest_before(is_client, seq)
    }

    /// Everything exchanged so far, in transcript order.
    pub fn transcript(&self) -> Vec<u8> {
        self.cache.transcript()
    }
}

/// Produces our messages and judges the peer's.
pub trait Negotiator {
    /// Body of the next message of our flight.
    ///
    /// `Ok(None)` skips an optional message. For a mandatory one it fails
    /// the handshake with [`Error::MissingMessage`]. The cookie of a
    /// ClientHello is filled in by the core.
    fn compose(
        &mut self,
        ctx: &FlightContext<'_>,
        msg_type: MessageType,
    ) -> Result<Option<Body>, Error>;

    /// A complete peer flight, in order. An error fails the handshake.
    fn accept(&mut self, ctx: &FlightContext<'_>, messages: &[Handshake]) -> Result<(), Error>;
}
