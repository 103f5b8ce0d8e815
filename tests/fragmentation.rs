//! Handshakes where messages are split across records.

#![allow(unused)]

mod handshake_common;

use dtls_handshake::message::{Header, MessageType};
use dtls_handshake::*;
use handshake_common::*;

const MTU: usize = 200;

fn small_mtu() -> Config {
    Config::builder().mtu(MTU).rng_seed(42).build().unwrap()
}

#[test]
fn small_mtu_fragments_certificate() {
    let mut pair = Pair::new(small_mtu(), small_mtu());

    let mut headers: Vec<(u16, usize, Header)> = Vec::new();
    pair.run_with(20, |_, records| {
        for r in &records {
            if let Some(h) = r.header() {
                headers.push((r.epoch, r.payload.len(), h));
            }
        }
        records
    })
    .expect("handshake");

    assert!(pair.both_connected());

    let cert_fragments = headers
        .iter()
        .filter(|(_, _, h)| h.msg_type == MessageType::Certificate)
        .count();
    assert!(cert_fragments > 1);
    assert!(headers.iter().any(|(_, _, h)| h.is_fragment()));

    for (epoch, len, h) in &headers {
        let overhead = if *epoch > 0 { 13 + 24 } else { 13 };
        assert!(len + overhead <= MTU, "{:?} in {} bytes", h, len);
        assert_eq!(*len, 12 + h.fragment_length as usize);
    }

    assert_eq!(pair.client.transcript(), pair.server.transcript());
}

#[test]
fn reversed_records() {
    let mut pair = Pair::new(small_mtu(), small_mtu());

    pair.run_with(20, |_, mut records| {
        records.reverse();
        records
    })
    .expect("handshake");

    assert!(pair.both_connected());
    assert_eq!(pair.client.transcript(), pair.server.transcript());
}

#[test]
fn duplicated_fragments() {
    let mut pair = Pair::new(small_mtu(), small_mtu());

    let mut doubled = 0;
    pair.run_with(20, |_, records| {
        let mut out = Vec::new();
        for r in records {
            // Duplicates that would trigger a resend are covered elsewhere.
            let quiet = r.header().map(|h| !h.dupe_triggers_resend()).unwrap_or(false);
            if quiet {
                doubled += 1;
                out.push(r.clone());
            }
            out.push(r);
        }
        out
    })
    .expect("handshake");

    assert!(doubled > 2);
    assert!(pair.both_connected());
    assert_eq!(pair.client.transcript(), pair.server.transcript());
}
