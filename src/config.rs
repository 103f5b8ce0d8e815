use std::time::Duration;

use crate::message::HANDSHAKE_HEADER_LEN;
use crate::Error;

/// What to do with a complete handshake message that is not part of the
/// flight we are waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnexpectedMessagePolicy {
    /// Log and drop the message.
    Ignore,
    /// Fail the handshake.
    #[default]
    Abort,
}

/// Handshake configuration
#[derive(Debug, Clone)]
pub struct Config {
    mtu: usize,
    record_overhead: usize,
    encryption_overhead: usize,
    max_queue_tx: usize,
    flight_start_rto: Duration,
    flight_max_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    max_fragment_buffer: usize,
    unexpected_message: UnexpectedMessagePolicy,
    with_hello_verify: bool,
    initial_epoch: u16,
    rng_seed: Option<u64>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            mtu: 1150,
            record_overhead: 13,
            encryption_overhead: 24,
            max_queue_tx: 64,
            flight_start_rto: Duration::from_secs(1),
            flight_max_rto: Duration::from_secs(60),
            flight_retries: 4,
            handshake_timeout: Duration::from_secs(40),
            max_fragment_buffer: 2_000_000,
            unexpected_message: UnexpectedMessagePolicy::Abort,
            with_hello_verify: true,
            initial_epoch: 0,
            rng_seed: None,
        }
    }

    /// Max transmission unit.
    ///
    /// The largest datagram the record layer will produce. Handshake
    /// messages are fragmented so that each record fits.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Bytes the record layer adds in front of every record.
    #[inline(always)]
    pub fn record_overhead(&self) -> usize {
        self.record_overhead
    }

    /// Additional bytes per record once the record layer encrypts.
    #[inline(always)]
    pub fn encryption_overhead(&self) -> usize {
        self.encryption_overhead
    }

    /// Max amount of outgoing records to buffer.
    #[inline(always)]
    pub fn max_queue_tx(&self) -> usize {
        self.max_queue_tx
    }

    /// Time of first retry.
    ///
    /// Every flight restarts with this value.
    /// Doubled for every retry with a ±25% jitter.
    #[inline(always)]
    pub fn flight_start_rto(&self) -> Duration {
        self.flight_start_rto
    }

    /// Upper bound for the doubled retry timeout.
    #[inline(always)]
    pub fn flight_max_rto(&self) -> Duration {
        self.flight_max_rto
    }

    /// Max number of retries per flight.
    #[inline(always)]
    pub fn flight_retries(&self) -> usize {
        self.flight_retries
    }

    /// Timeout for the entire handshake, regardless of flights.
    #[inline(always)]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Max bytes held by partially reassembled messages.
    #[inline(always)]
    pub fn max_fragment_buffer(&self) -> usize {
        self.max_fragment_buffer
    }

    #[inline(always)]
    pub fn unexpected_message(&self) -> UnexpectedMessagePolicy {
        self.unexpected_message
    }

    /// For a server, whether to answer the first ClientHello with a
    /// HelloVerifyRequest cookie exchange.
    #[inline(always)]
    pub fn with_hello_verify(&self) -> bool {
        self.with_hello_verify
    }

    /// Epoch of the unprotected handshake records. Finished goes out in
    /// the epoch after this one.
    #[inline(always)]
    pub fn initial_epoch(&self) -> u16 {
        self.initial_epoch
    }

    /// Seed for the non-cryptographic randomness (jitter, cookies).
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    /// Largest handshake fragment body that fits a record in `epoch`.
    pub(crate) fn max_fragment_len(&self, epoch: u16) -> usize {
        let mut overhead = self.record_overhead + HANDSHAKE_HEADER_LEN;
        if epoch > self.initial_epoch {
            overhead += self.encryption_overhead;
        }
        self.mtu.saturating_sub(overhead).max(1)
    }
}

/// Builder for handshake configuration.
pub struct ConfigBuilder {
    mtu: usize,
    record_overhead: usize,
    encryption_overhead: usize,
    max_queue_tx: usize,
    flight_start_rto: Duration,
    flight_max_rto: Duration,
    flight_retries: usize,
    handshake_timeout: Duration,
    max_fragment_buffer: usize,
    unexpected_message: UnexpectedMessagePolicy,
    with_hello_verify: bool,
    initial_epoch: u16,
    rng_seed: Option<u64>,
}

impl ConfigBuilder {
    /// Set the max transmission unit (MTU).
    ///
    /// Defaults to 1150.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the per-record overhead of the record layer.
    ///
    /// Defaults to 13, the DTLS 1.2 record header.
    pub fn record_overhead(mut self, overhead: usize) -> Self {
        self.record_overhead = overhead;
        self
    }

    /// Set the per-record overhead of encryption.
    ///
    /// Defaults to 24 (explicit nonce and GCM tag).
    pub fn encryption_overhead(mut self, overhead: usize) -> Self {
        self.encryption_overhead = overhead;
        self
    }

    /// Set the max amount of outgoing records to buffer.
    ///
    /// Defaults to 64.
    pub fn max_queue_tx(mut self, max_queue_tx: usize) -> Self {
        self.max_queue_tx = max_queue_tx;
        self
    }

    /// Set the time of first retry.
    ///
    /// Defaults to 1 second.
    pub fn flight_start_rto(mut self, rto: Duration) -> Self {
        self.flight_start_rto = rto;
        self
    }

    /// Set the cap for the retry timeout.
    ///
    /// Defaults to 60 seconds.
    pub fn flight_max_rto(mut self, rto: Duration) -> Self {
        self.flight_max_rto = rto;
        self
    }

    /// Set the max number of retries per flight.
    ///
    /// Defaults to 4.
    pub fn flight_retries(mut self, retries: usize) -> Self {
        self.flight_retries = retries;
        self
    }

    /// Set the timeout for the entire handshake, regardless of flights.
    ///
    /// Defaults to 40 seconds.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the max bytes held by partially reassembled messages.
    ///
    /// Defaults to 2 000 000.
    pub fn max_fragment_buffer(mut self, max: usize) -> Self {
        self.max_fragment_buffer = max;
        self
    }

    /// Set the policy for messages outside the expected flight.
    ///
    /// Defaults to [`UnexpectedMessagePolicy::Abort`].
    pub fn unexpected_message(mut self, policy: UnexpectedMessagePolicy) -> Self {
        self.unexpected_message = policy;
        self
    }

    /// Set whether a server performs the HelloVerifyRequest exchange.
    ///
    /// Defaults to true.
    pub fn with_hello_verify(mut self, enabled: bool) -> Self {
        self.with_hello_verify = enabled;
        self
    }

    /// Set the epoch of the unprotected handshake.
    ///
    /// Defaults to 0.
    pub fn initial_epoch(mut self, epoch: u16) -> Self {
        self.initial_epoch = epoch;
        self
    }

    /// Seed the non-cryptographic randomness for deterministic runs.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::Config` if the MTU cannot carry a single byte of
    /// handshake body, or the timers are inconsistent.
    pub fn build(self) -> Result<Config, Error> {
        let min_mtu =
            self.record_overhead + self.encryption_overhead + HANDSHAKE_HEADER_LEN + 1;
        if self.mtu < min_mtu {
            return Err(Error::Config(format!(
                "mtu {} below minimum {}",
                self.mtu, min_mtu
            )));
        }

        if self.flight_start_rto.is_zero() || self.flight_max_rto < self.flight_start_rto {
            return Err(Error::Config(format!(
                "flight rto {:?} must be non-zero and at most {:?}",
                self.flight_start_rto, self.flight_max_rto
            )));
        }

        if self.initial_epoch == u16::MAX {
            return Err(Error::Config("initial epoch leaves no room".into()));
        }

        Ok(Config {
            mtu: self.mtu,
            record_overhead: self.record_overhead,
            encryption_overhead: self.encryption_overhead,
            max_queue_tx: self.max_queue_tx,
            flight_start_rto: self.flight_start_rto,
            flight_max_rto: self.flight_max_rto,
            flight_retries: self.flight_retries,
            handshake_timeout: self.handshake_timeout,
            max_fragment_buffer: self.max_fragment_buffer,
            unexpected_message: self.unexpected_message,
            with_hello_verify: self.with_hello_verify,
            initial_epoch: self.initial_epoch,
            rng_seed: self.rng_seed,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder()
            .build()
            .expect("Default config should always validate")
    }
}
