use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::HandshakeCache;
use crate::fragment::{fragment, FragmentBuffer, Reassembled};
use crate::message::{Body, Handshake, Header, HANDSHAKE_HEADER_LEN};
use crate::queue::{OutRecord, QueueTx};
use crate::timer::ExponentialBackoff;
use crate::{Config, ContentType, Error, Flight, Output, SeededRng};

/// Transport side of one handshake session.
///
/// Owns everything between the flight logic and the record layer: the
/// outbound queue, the records of the current flight for resends, the
/// retransmission timers, handshake sequence numbers, reassembly and the
/// message cache.
pub(crate) struct Engine {
    config: Arc<Config>,

    /// Seedable random number generator for deterministic testing
    pub(crate) rng: SeededRng,

    /// Queue of outgoing records.
    queue_tx: QueueTx,

    /// Whether this engine is for a client (true) or server (false)
    is_client: bool,

    /// Expected peer handshake sequence number
    peer_handshake_seq_no: u16,

    /// Next handshake message sequence number for sending
    next_handshake_seq_no: u16,

    /// Reassembly of inbound fragments.
    fragments: FragmentBuffer,

    /// Every complete message, sent or received.
    pub(crate) cache: HandshakeCache,

    /// The records that have been sent in the current flight.
    flight_saved_records: Vec<Entry>,

    /// Flight backoff
    flight_backoff: ExponentialBackoff,

    /// Timeout for the current flight
    flight_timeout: Timeout,

    /// Global timeout for the entire handshake.
    connect_timeout: Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timeout {
    Disabled,
    Unarmed,
    Armed(Instant),
}

#[derive(Debug)]
struct Entry {
    content_type: ContentType,
    epoch: u16,
    payload: Vec<u8>,
}

impl Engine {
    pub fn new(config: Arc<Config>, is_client: bool) -> Self {
        let mut rng = SeededRng::new(config.rng_seed());

        let flight_backoff = ExponentialBackoff::new(
            config.flight_start_rto(),
            config.flight_max_rto(),
            config.flight_retries(),
            &mut rng,
        );

        let fragments = FragmentBuffer::new(config.max_fragment_buffer());

        Self {
            config,
            rng,
            queue_tx: QueueTx::new(),
            is_client,
            peer_handshake_seq_no: 0,
            next_handshake_seq_no: 0,
            fragments,
            cache: HandshakeCache::new(),
            flight_saved_records: Vec::new(),
            flight_backoff,
            flight_timeout: Timeout::Unarmed,
            connect_timeout: Timeout::Unarmed,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn peer_handshake_seq_no(&self) -> u16 {
        self.peer_handshake_seq_no
    }

    pub fn set_peer_handshake_seq_no(&mut self, seq: u16) {
        self.peer_handshake_seq_no = seq;
    }

    #[cfg(test)]
    pub fn next_handshake_seq_no(&self) -> u16 {
        self.next_handshake_seq_no
    }

    /// The server answers each ClientHello with the ClientHello's sequence
    /// number (RFC 6347 4.2.2).
    pub fn set_next_handshake_seq_no(&mut self, seq: u16) {
        self.next_handshake_seq_no = seq;
    }

    /// Feed one handshake record payload.
    ///
    /// All fragments in the payload are processed. Complete messages end up
    /// in the cache. The first error met along the way is returned after
    /// the rest of the payload was handled.
    pub fn handle_handshake_record(&mut self, epoch: u16, payload: &[u8]) -> Result<(), Error> {
        let mut first_error = None;
        let mut dupe_resend = false;
        let mut input = payload;

        while !input.is_empty() {
            let (rest, (header, bytes)) = match Header::parse_fragment(input) {
                Ok(v) => v,
                Err(e) => {
                    let err = Error::from(e);
                    warn!("Drop rest of handshake record: {}", err);
                    first_error.get_or_insert(err);
                    break;
                }
            };
            input = rest;

            // A fragment of an already consumed peer flight means our answer
            // was lost.
            if header.message_seq < self.peer_handshake_seq_no {
                if header.dupe_triggers_resend() {
                    dupe_resend = true;
                }
                trace!("Drop old handshake fragment {:?}", header);
                continue;
            }

            if let Err(e) = self.handle_fragment(epoch, header, bytes) {
                first_error.get_or_insert(e);
            }
        }

        if dupe_resend && !self.flight_saved_records.is_empty() {
            self.flight_resend("dupe triggers resend")?;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn handle_fragment(&mut self, epoch: u16, header: Header, bytes: &[u8]) -> Result<(), Error> {
        let completed = match self.fragments.push(epoch, header, bytes)? {
            Reassembled::Pending | Reassembled::Duplicate(_) => return Ok(()),
            Reassembled::Complete(c) => c,
        };

        let handshake = match Handshake::unmarshal(&completed.raw) {
            Ok(h) => h,
            Err(e) => {
                // Let a retransmission complete it again.
                self.fragments.forget(completed.header.message_seq);
                warn!(
                    "Failed to decode {:?} message_seq {}: {}",
                    completed.header.msg_type, completed.header.message_seq, e
                );
                return Err(e);
            }
        };

        debug!(
            "Received {:?} message_seq {} epoch {}",
            handshake.msg_type(),
            handshake.message_seq(),
            completed.epoch
        );

        self.cache
            .push(completed.epoch, !self.is_client, completed.raw, handshake);

        Ok(())
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        if self.connect_timeout == Timeout::Unarmed {
            debug!(
                "Handshake timeout in: {:.03}s",
                self.config.handshake_timeout().as_secs_f32()
            );
            let timeout = now + self.config.handshake_timeout();
            self.connect_timeout = Timeout::Armed(timeout);
        }
        if self.flight_timeout == Timeout::Unarmed {
            if self.flight_saved_records.is_empty() {
                // Nothing of ours to resend.
                self.flight_timeout = Timeout::Disabled;
            } else {
                debug!(
                    "Flight timeout in: {:.03}s",
                    self.flight_backoff.rto().as_secs_f32()
                );
                let timeout = now + self.flight_backoff.rto();
                self.flight_timeout = Timeout::Armed(timeout);
            }
        }

        if let Timeout::Armed(connect_timeout) = self.connect_timeout {
            if now >= connect_timeout {
                return Err(Error::Timeout("handshake"));
            }
        }

        let Timeout::Armed(flight_timeout) = self.flight_timeout else {
            return Ok(());
        };

        if now >= flight_timeout {
            if self.flight_backoff.can_retry() {
                self.flight_backoff.attempt(&mut self.rng);
                debug!(
                    "Re-arm flight timeout due to resend in {}",
                    self.flight_backoff.rto().as_secs_f32()
                );
                let timeout = now + self.flight_backoff.rto();
                self.flight_timeout = Timeout::Armed(timeout);
                self.flight_resend("flight timeout")?;
            } else {
                return Err(Error::Timeout("flight"));
            }
        }

        Ok(())
    }

    /// Next queued record, copied into `buf`.
    ///
    /// Panics if `buf` is smaller than the record. Records never exceed the
    /// configured MTU.
    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8], now: Instant) -> Output<'a> {
        let Some(record) = self.queue_tx.pop_front() else {
            return Output::Timeout(self.poll_timeout(now));
        };

        let len = record.payload.len();
        assert!(
            len <= buf.len(),
            "Output buffer too small for record {} > {}",
            len,
            buf.len()
        );
        buf[..len].copy_from_slice(&record.payload);

        Output::Record {
            epoch: record.epoch,
            content_type: record.content_type,
            payload: &buf[..len],
        }
    }

    fn poll_timeout(&self, now: Instant) -> Instant {
        // No timeouts, return a distant future
        if self.connect_timeout == Timeout::Disabled && self.flight_timeout == Timeout::Disabled {
            const DISTANT_FUTURE: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);
            return now + DISTANT_FUTURE;
        }

        match (self.connect_timeout, self.flight_timeout) {
            (Timeout::Armed(c), Timeout::Armed(f)) => c.min(f),
            (Timeout::Armed(c), _) => c,
            (_, Timeout::Armed(f)) => f,
            // Unarmed timers are armed by the next handle_timeout.
            _ => now,
        }
    }

    pub fn has_pending_output(&self) -> bool {
        !self.queue_tx.is_empty()
    }

    pub fn flight_begin(&mut self, flight: Flight) {
        debug!("Begin flight {}", flight.number());
        self.flight_backoff.reset(&mut self.rng);
        self.flight_clear_resends();
        self.flight_timeout = Timeout::Unarmed;
    }

    /// Keep the saved flight for dupe triggered resends, but stop
    /// resending on timeout.
    pub fn flight_stop_resend_timer(&mut self) {
        debug!("Stop flight timeout");
        self.flight_timeout = Timeout::Disabled;
    }

    pub fn flight_stop_resend_timers(&mut self) {
        debug!("Stop handshake and flight timeouts");
        self.flight_timeout = Timeout::Disabled;
        self.connect_timeout = Timeout::Disabled;
    }

    pub fn flight_clear_resends(&mut self) {
        self.flight_saved_records.clear();
    }

    fn flight_resend(&mut self, reason: &str) -> Result<(), Error> {
        debug!("Resending flight due to {}", reason);
        // For lifetime issues, we take the entries out of self
        let records = mem::take(&mut self.flight_saved_records);

        let result = records.iter().try_for_each(|entry| {
            self.create_record(entry.content_type, entry.epoch, false, entry.payload.clone())
        });

        // Put the entries back into self
        self.flight_saved_records = records;

        result
    }

    /// Queue a record, saving it for resends if `save` is set.
    pub fn create_record(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        save: bool,
        payload: Vec<u8>,
    ) -> Result<(), Error> {
        if self.queue_tx.len() >= self.config.max_queue_tx() {
            warn!(
                "Transmit queue full (max {}): {:?}",
                self.config.max_queue_tx(),
                self.queue_tx
            );
            return Err(Error::TransmitQueueFull);
        }

        if save {
            self.flight_saved_records.push(Entry {
                content_type,
                epoch,
                payload: payload.clone(),
            });
        }

        self.queue_tx.push_back(OutRecord {
            epoch,
            content_type,
            payload,
        });

        Ok(())
    }

    /// Encode, cache and queue a handshake message with the next sequence
    /// number, fragmented to fit the MTU.
    pub fn create_handshake(&mut self, epoch: u16, body: Body) -> Result<(), Error> {
        let handshake = Handshake::new(self.next_handshake_seq_no, body);
        let raw = handshake.marshal()?;
        let header = handshake.header;

        debug!(
            "Send {:?} message_seq {} epoch {} ({} bytes)",
            header.msg_type,
            header.message_seq,
            epoch,
            raw.len()
        );

        self.cache.push(epoch, self.is_client, raw.clone(), handshake);
        self.next_handshake_seq_no = self.next_handshake_seq_no.wrapping_add(1);

        let max = self.config.max_fragment_len(epoch);
        for (h, bytes) in fragment(header, &raw[HANDSHAKE_HEADER_LEN..], max) {
            let mut payload = Vec::with_capacity(HANDSHAKE_HEADER_LEN + bytes.len());
            h.serialize(&mut payload);
            payload.extend_from_slice(bytes);
            self.create_record(ContentType::Handshake, epoch, true, payload)?;
        }

        Ok(())
    }

    pub fn create_change_cipher_spec(&mut self, epoch: u16) -> Result<(), Error> {
        self.create_record(ContentType::ChangeCipherSpec, epoch, true, vec![1])
    }

    /// Drop everything held for the session.
    pub fn close(&mut self) {
        self.flight_stop_resend_timers();
        self.flight_clear_resends();
        self.queue_tx.clear();
        self.fragments.clear();
        self.cache.clear();
    }
}
