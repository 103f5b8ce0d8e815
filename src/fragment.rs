//! Splitting handshake messages into fragments and putting them back together.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;

use nom::error::ErrorKind;

use crate::message::{Header, MessageType, HANDSHAKE_HEADER_LEN};
use crate::Error;

/// Split a message body into fragments of at most `max` bytes.
///
/// Every fragment carries the sequence number and total length of `header`.
/// A body that fits is one fragment spanning the whole message, an empty body
/// is a single zero length fragment.
pub fn fragment<'a>(
    header: Header,
    body: &'a [u8],
    max: usize,
) -> impl Iterator<Item = (Header, &'a [u8])> + 'a {
    let max = max.max(1);
    let count = body.len().div_ceil(max).max(1);

    (0..count).map(move |i| {
        let start = i * max;
        let end = (start + max).min(body.len());
        let header = Header {
            length: body.len() as u32,
            fragment_offset: start as u32,
            fragment_length: (end - start) as u32,
            ..header
        };
        (header, &body[start..end])
    })
}

/// Outcome of pushing one fragment.
#[derive(Debug, PartialEq, Eq)]
pub enum Reassembled {
    /// More fragments are needed.
    Pending,
    /// The fragment completed a message.
    Complete(Completed),
    /// The message this fragment belongs to was already completed.
    Duplicate(Header),
}

/// A reassembled message, with a header as if it was never fragmented.
#[derive(Clone, PartialEq, Eq)]
pub struct Completed {
    /// Epoch of the first fragment received.
    pub epoch: u16,
    pub header: Header,
    /// Header and body.
    pub raw: Vec<u8>,
}

impl Completed {
    pub fn body(&self) -> &[u8] {
        &self.raw[HANDSHAKE_HEADER_LEN..]
    }
}

impl fmt::Debug for Completed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completed")
            .field("epoch", &self.epoch)
            .field("header", &self.header)
            .field("raw_len", &self.raw.len())
            .finish()
    }
}

struct Partial {
    epoch: u16,
    msg_type: MessageType,
    length: u32,
    /// Sorted, merged, non-adjacent.
    covered: Vec<Range<u32>>,
    data: Vec<u8>,
}

impl Partial {
    fn is_complete(&self) -> bool {
        match self.covered.as_slice() {
            [] => self.length == 0,
            [only] => only.start == 0 && only.end == self.length,
            _ => false,
        }
    }

    /// Merge `bytes` at `offset`. Already covered bytes are kept, returns
    /// the first offset where a differing copy was seen.
    fn merge(&mut self, offset: u32, bytes: &[u8]) -> Option<u32> {
        let end = offset + bytes.len() as u32;
        let mut conflict = None;
        let mut gaps = Vec::new();
        let mut cursor = offset;

        for r in &self.covered {
            if r.end <= cursor || r.start >= end {
                continue;
            }

            if r.start > cursor {
                gaps.push(cursor..r.start);
            }

            let overlap = r.start.max(cursor)..r.end.min(end);
            let ours = &self.data[overlap.start as usize..overlap.end as usize];
            let theirs =
                &bytes[(overlap.start - offset) as usize..(overlap.end - offset) as usize];
            if conflict.is_none() && ours != theirs {
                let at = ours.iter().zip(theirs).position(|(a, b)| a != b).unwrap_or(0);
                conflict = Some(overlap.start + at as u32);
            }

            cursor = cursor.max(r.end);
        }

        if cursor < end {
            gaps.push(cursor..end);
        }

        for gap in gaps {
            self.copy(offset, bytes, gap);
        }

        if end > offset {
            self.insert_range(offset..end);
        }

        conflict
    }

    fn copy(&mut self, offset: u32, bytes: &[u8], range: Range<u32>) {
        let src = &bytes[(range.start - offset) as usize..(range.end - offset) as usize];
        self.data[range.start as usize..range.end as usize].copy_from_slice(src);
    }

    fn insert_range(&mut self, range: Range<u32>) {
        self.covered.push(range);
        self.covered.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<u32>> = Vec::with_capacity(self.covered.len());
        for r in self.covered.drain(..) {
            match merged.last_mut() {
                Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
                _ => merged.push(r),
            }
        }
        self.covered = merged;
    }
}

/// Receive side reassembly, keyed by message sequence.
pub struct FragmentBuffer {
    pending: BTreeMap<u16, Partial>,
    completed: BTreeSet<u16>,
    buffered: usize,
    max_size: usize,
}

impl FragmentBuffer {
    pub fn new(max_size: usize) -> Self {
        FragmentBuffer {
            pending: BTreeMap::new(),
            completed: BTreeSet::new(),
            buffered: 0,
            max_size,
        }
    }

    /// Add one fragment.
    ///
    /// Overlapping bytes keep the copy that arrived first. A fragment whose
    /// overlap differs from what is held is merged (for its new bytes) and
    /// then reported as [`Error::ReassemblyConflict`], unless it completed
    /// the message.
    pub fn push(&mut self, epoch: u16, header: Header, bytes: &[u8]) -> Result<Reassembled, Error> {
        let seq = header.message_seq;
        let offset = header.fragment_offset;

        if bytes.len() != header.fragment_length as usize
            || offset as u64 + header.fragment_length as u64 > header.length as u64
        {
            return Err(Error::Decode(ErrorKind::LengthValue));
        }

        if self.completed.contains(&seq) {
            trace!("Fragment of completed message_seq {} dropped", seq);
            return Ok(Reassembled::Duplicate(header));
        }

        if !self.pending.contains_key(&seq) {
            let size = self.buffered + header.length as usize;
            if size > self.max_size {
                warn!(
                    "Fragment buffer full, drop message_seq {} ({} > {})",
                    seq, size, self.max_size
                );
                return Err(Error::FragmentBufferOverflow {
                    size,
                    max: self.max_size,
                });
            }
            self.buffered = size;
            self.pending.insert(
                seq,
                Partial {
                    epoch,
                    msg_type: header.msg_type,
                    length: header.length,
                    covered: Vec::new(),
                    data: vec![0; header.length as usize],
                },
            );
        }

        let Some(partial) = self.pending.get_mut(&seq) else {
            return Ok(Reassembled::Pending);
        };

        if partial.length != header.length || partial.msg_type != header.msg_type {
            warn!(
                "Fragment of message_seq {} disagrees on type/length: {:?}/{} vs {:?}/{}",
                seq, header.msg_type, header.length, partial.msg_type, partial.length
            );
            return Err(Error::ReassemblyConflict {
                message_seq: seq,
                offset,
            });
        }

        let conflict = partial.merge(offset, bytes);
        trace!(
            "Fragment message_seq {} {}..{} of {}",
            seq,
            offset,
            offset + header.fragment_length,
            header.length
        );

        if let Some(at) = conflict {
            warn!(
                "Conflicting bytes for message_seq {} at offset {}, keeping first copy",
                seq, at
            );
        }

        if !partial.is_complete() {
            return match conflict {
                Some(at) => Err(Error::ReassemblyConflict {
                    message_seq: seq,
                    offset: at,
                }),
                None => Ok(Reassembled::Pending),
            };
        }

        let Some(partial) = self.pending.remove(&seq) else {
            return Ok(Reassembled::Pending);
        };
        self.buffered -= partial.length as usize;
        self.completed.insert(seq);

        let header = Header {
            msg_type: partial.msg_type,
            length: partial.length,
            message_seq: seq,
            fragment_offset: 0,
            fragment_length: partial.length,
        };
        let mut raw = Vec::with_capacity(HANDSHAKE_HEADER_LEN + partial.data.len());
        header.serialize(&mut raw);
        raw.extend_from_slice(&partial.data);

        Ok(Reassembled::Complete(Completed {
            epoch: partial.epoch,
            header,
            raw,
        }))
    }

    /// Open `seq` for reassembly again.
    pub fn forget(&mut self, seq: u16) {
        self.completed.remove(&seq);
        if let Some(p) = self.pending.remove(&seq) {
            self.buffered -= p.length as usize;
        }
    }

    pub fn is_completed(&self, seq: u16) -> bool {
        self.completed.contains(&seq)
    }

    /// Bytes held by incomplete messages.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.completed.clear();
        self.buffered = 0;
    }
}

impl fmt::Debug for FragmentBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentBuffer")
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .field("completed", &self.completed.len())
            .field("buffered", &self.buffered)
            .finish()
    }
}
