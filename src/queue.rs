//! Outbound queue wrapper with a safe Debug implementation.
//!
//! The Debug output only shows metadata, never payload bytes.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::ContentType;

/// A record payload waiting for the record layer.
pub(crate) struct OutRecord {
    pub epoch: u16,
    pub content_type: ContentType,
    pub payload: Vec<u8>,
}

pub(crate) struct QueueTx(VecDeque<OutRecord>);

impl QueueTx {
    pub fn new() -> Self {
        Self(VecDeque::new())
    }
}

impl Deref for QueueTx {
    type Target = VecDeque<OutRecord>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for QueueTx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Debug for QueueTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handshake = 0;
        let mut ccs = 0;
        let mut other = 0;

        for r in &self.0 {
            match r.content_type {
                ContentType::Handshake => handshake += 1,
                ContentType::ChangeCipherSpec => ccs += 1,
                _ => other += 1,
            }
        }

        let total_bytes: usize = self.0.iter().map(|r| r.payload.len()).sum();

        f.debug_struct("QueueTx")
            .field("records", &self.0.len())
            .field("handshake", &handshake)
            .field("ccs", &ccs)
            .field("other", &other)
            .field("total_bytes", &total_bytes)
            .finish()
    }
}
