//! Every handshake message sent or received, kept for flight assembly and
//! as the transcript basis of Finished.

use std::fmt;

use crate::message::{Handshake, MessageType};

/// One cached message.
#[derive(Clone)]
pub struct CacheEntry {
    pub message_seq: u16,
    pub is_client: bool,
    pub epoch: u16,
    /// Exact bytes as sent or reassembled, header included.
    pub raw: Vec<u8>,
    pub handshake: Handshake,
}

impl CacheEntry {
    pub fn msg_type(&self) -> MessageType {
        self.handshake.msg_type()
    }

    // Position in the RFC 6347 flight sequence. HelloVerifyRequest sorts
    // before the server's flight but never makes it into a digest.
    fn flight_rank(&self) -> u8 {
        use MessageType::*;
        match (self.msg_type(), self.is_client) {
            (ClientHello, _) => 1,
            (HelloVerifyRequest, _) => 2,
            (Finished, false) => 6,
            (_, false) => 4,
            (_, true) => 5,
        }
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("message_seq", &self.message_seq)
            .field("is_client", &self.is_client)
            .field("epoch", &self.epoch)
            .field("msg_type", &self.msg_type())
            .field("raw_len", &self.raw.len())
            .finish()
    }
}

/// Selects a cached message by kind, epoch and sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullRule {
    pub msg_type: MessageType,
    pub epoch: u16,
    pub is_client: bool,
    pub optional: bool,
}

impl PullRule {
    fn matches(&self, entry: &CacheEntry) -> bool {
        entry.msg_type() == self.msg_type
            && entry.epoch == self.epoch
            && entry.is_client == self.is_client
    }
}

#[derive(Debug, Default)]
pub struct HandshakeCache {
    entries: Vec<CacheEntry>,
    // (is_client, message_seq) of messages dropped as unexpected.
    ignored: Vec<(bool, u16)>,
}

impl HandshakeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a message. Returns false, leaving the cache untouched, if a
    /// message with the same sequence from the same side is present.
    pub fn push(&mut self, epoch: u16, is_client: bool, raw: Vec<u8>, handshake: Handshake) -> bool {
        let message_seq = handshake.message_seq();

        if self.get(is_client, message_seq).is_some() {
            trace!(
                "Cache already holds message_seq {} (client: {})",
                message_seq,
                is_client
            );
            return false;
        }

        self.entries.push(CacheEntry {
            message_seq,
            is_client,
            epoch,
            raw,
            handshake,
        });

        true
    }

    pub fn get(&self, is_client: bool, message_seq: u16) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .find(|e| e.is_client == is_client && e.message_seq == message_seq)
    }

    /// Latest message of a kind from one side.
    pub fn latest(&self, is_client: bool, msg_type: MessageType) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_client == is_client && e.msg_type() == msg_type)
            .max_by_key(|e| e.message_seq)
    }

    /// Drop one message, for instance one that was ignored as unexpected.
    pub fn remove(&mut self, is_client: bool, message_seq: u16) -> Option<CacheEntry> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.is_client == is_client && e.message_seq == message_seq)?;
        Some(self.entries.remove(idx))
    }

    /// Drop an unexpected message and let [`full_pull`](Self::full_pull)
    /// step over its sequence number.
    pub fn ignore(&mut self, is_client: bool, message_seq: u16) -> Option<CacheEntry> {
        if !self.is_ignored(is_client, message_seq) {
            self.ignored.push((is_client, message_seq));
        }
        self.remove(is_client, message_seq)
    }

    fn is_ignored(&self, is_client: bool, message_seq: u16) -> bool {
        self.ignored.contains(&(is_client, message_seq))
    }

    fn skip_ignored(&self, is_client: bool, mut seq: u16) -> u16 {
        while self.is_ignored(is_client, seq) {
            seq = seq.wrapping_add(1);
        }
        seq
    }

    /// Messages from one side at or after `from_seq`.
    pub fn from_side(&self, is_client: bool, from_seq: u16) -> impl Iterator<Item = &CacheEntry> {
        self.entries
            .iter()
            .filter(move |e| e.is_client == is_client && e.message_seq >= from_seq)
    }

    /// The latest message per rule, skipping rules with no match.
    pub fn pull(&self, rules: &[PullRule]) -> Vec<&CacheEntry> {
        rules
            .iter()
            .filter_map(|rule| {
                self.entries
                    .iter()
                    .filter(|e| rule.matches(e))
                    .max_by_key(|e| e.message_seq)
            })
            .collect()
    }

    /// Assemble a whole flight starting at `start_seq`.
    ///
    /// Rules are matched in order against consecutive sequence numbers, an
    /// optional rule may be skipped, as may the sequence numbers of ignored
    /// messages. Returns the next sequence number after the flight, or
    /// `None` while a mandatory message is missing.
    pub fn full_pull(&self, start_seq: u16, rules: &[PullRule]) -> Option<(u16, Vec<Handshake>)> {
        let mut seq = start_seq;
        let mut out = Vec::with_capacity(rules.len());

        for rule in rules {
            seq = self.skip_ignored(rule.is_client, seq);
            let found = self
                .entries
                .iter()
                .find(|e| e.message_seq == seq && rule.matches(e));

            match found {
                Some(entry) => {
                    out.push(entry.handshake.clone());
                    seq = seq.wrapping_add(1);
                }
                None if rule.optional => {}
                None => return None,
            }
        }

        if let Some(last) = rules.last() {
            seq = self.skip_ignored(last.is_client, seq);
        }

        Some((seq, out))
    }

    /// Transcript bytes up to and including the given message.
    pub fn digest(&self, is_client: bool, up_to_seq: u16) -> Option<Vec<u8>> {
        self.digest_until(is_client, up_to_seq, true)
    }

    /// Transcript bytes preceding the given message.
    pub fn digest_before(&self, is_client: bool, seq: u16) -> Option<Vec<u8>> {
        self.digest_until(is_client, seq, false)
    }

    /// All transcript bytes cached so far.
    pub fn transcript(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for e in self.ordered() {
            out.extend_from_slice(&e.raw);
        }
        out
    }

    fn digest_until(&self, is_client: bool, seq: u16, inclusive: bool) -> Option<Vec<u8>> {
        let mut out = Vec::new();

        for e in self.ordered() {
            let target = e.is_client == is_client && e.message_seq == seq;
            if target && !inclusive {
                return Some(out);
            }
            out.extend_from_slice(&e.raw);
            if target {
                return Some(out);
            }
        }

        None
    }

    // Flight order, then sequence. A resent ClientHello supersedes the first.
    fn ordered(&self) -> Vec<&CacheEntry> {
        let last_client_hello = self
            .entries
            .iter()
            .filter(|e| e.msg_type() == MessageType::ClientHello)
            .map(|e| e.message_seq)
            .max();

        let mut v: Vec<_> = self
            .entries
            .iter()
            .filter(|e| match e.msg_type() {
                MessageType::HelloVerifyRequest => false,
                MessageType::ClientHello => Some(e.message_seq) == last_client_hello,
                _ => true,
            })
            .collect();

        v.sort_by_key(|e| (e.flight_rank(), e.message_seq));
        v
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.ignored.clear();
    }
}
