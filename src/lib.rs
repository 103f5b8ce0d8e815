//! Sans-IO DTLS 1.2 handshake core.
//!
//! This crate covers the part of DTLS that makes a TLS style handshake
//! survive a datagram transport: the handshake message codec, fragmentation
//! and reassembly, and the flight state machine with its retransmissions
//! (RFC 6347). Record protection, key exchange arithmetic and certificate
//! validation stay outside. They plug in through [`Negotiator`] and
//! [`CertVerifier`], and through whatever carries the records.
//!
//! A session is one [`Handshaker`]. It never blocks and never reads a clock:
//!
//! * [`Handshaker::handle_record`] takes the payload of a handshake record.
//! * [`Handshaker::handle_timeout`] takes the current time.
//! * [`Handshaker::poll_output`] hands out records to send, reports
//!   [`Output::Connected`] once, and otherwise the next deadline.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Instant;
//! # use dtls_handshake::*;
//! # fn run(negotiator: Box<dyn Negotiator>) -> Result<(), Error> {
//! let config = Arc::new(Config::default());
//! let mut client = Handshaker::new(config, Role::Client, negotiator, Box::new(AcceptAll));
//!
//! let mut buf = vec![0; 1500];
//! client.handle_timeout(Instant::now())?;
//! loop {
//!     match client.poll_output(&mut buf, Instant::now()) {
//!         Output::Record { epoch, content_type, payload } => {
//!             // hand to the record layer
//!         }
//!         Output::Connected => break,
//!         Output::Timeout(_) => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

use std::time::Instant;

mod cache;
mod certificate;
mod config;
mod engine;
mod error;
pub mod fragment;
mod flight;
mod handshaker;
pub mod message;
mod negotiator;
mod queue;
mod rng;
mod timer;
mod types;
mod util;

pub use cache::{CacheEntry, HandshakeCache, PullRule};
pub use certificate::{
    AcceptAll, CertVerifier, CertificateInfo, PublicKeyAlgorithm, SignatureScheme, WellFormed,
};
pub use config::{Config, ConfigBuilder, UnexpectedMessagePolicy};
pub use error::Error;
pub use flight::{Flight, Role, Slot};
pub use handshaker::{HandshakeState, Handshaker};
pub use negotiator::{FlightContext, Negotiator};
pub use rng::SeededRng;
pub use types::{AlertLevel, ContentType};

/// What the handshake wants done next.
#[derive(Debug, PartialEq, Eq)]
pub enum Output<'a> {
    /// Send this payload in a record of `content_type` and `epoch`.
    Record {
        epoch: u16,
        content_type: ContentType,
        payload: &'a [u8],
    },
    /// The handshake completed. Emitted once.
    Connected,
    /// Call `handle_timeout` at this instant.
    Timeout(Instant),
}
