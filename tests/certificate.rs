//! Certificate message with a fixed ECDSA certificate.

mod handshake_common;

use dtls_handshake::message::{Asn1Cert, Body, Certificate, Handshake};
use dtls_handshake::*;
use handshake_common::*;

// Certificate message body: u24 list length, u24 entry length, then one
// version 1 certificate signed with ecdsa-with-SHA256.
const RAW_CERTIFICATE: &[u8] = &[
    0x00, 0x01, 0x8c, 0x00, 0x01, 0x89, 0x30, 0x82, 0x01, 0x85, 0x30, 0x82,
    0x01, 0x2b, 0x02, 0x14, 0x7d, 0x00, 0xcf, 0x07, 0xfc, 0xe2, 0xb6, 0xb8,
    0x3f, 0x72, 0xeb, 0x11, 0x36, 0x1b, 0xf6, 0x39, 0xf1, 0x3c, 0x33, 0x41,
    0x30, 0x0a, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02,
    0x30, 0x45, 0x31, 0x0b, 0x30, 0x09, 0x06, 0x03, 0x55, 0x04, 0x06, 0x13,
    0x02, 0x41, 0x55, 0x31, 0x13, 0x30, 0x11, 0x06, 0x03, 0x55, 0x04, 0x08,
    0x0c, 0x0a, 0x53, 0x6f, 0x6d, 0x65, 0x2d, 0x53, 0x74, 0x61, 0x74, 0x65,
    0x31, 0x21, 0x30, 0x1f, 0x06, 0x03, 0x55, 0x04, 0x0a, 0x0c, 0x18, 0x49,
    0x6e, 0x74, 0x65, 0x72, 0x6e, 0x65, 0x74, 0x20, 0x57, 0x69, 0x64, 0x67,
    0x69, 0x74, 0x73, 0x20, 0x50, 0x74, 0x79, 0x20, 0x4c, 0x74, 0x64, 0x30,
    0x1e, 0x17, 0x0d, 0x31, 0x38, 0x31, 0x30, 0x32, 0x35, 0x30, 0x38, 0x35,
    0x31, 0x31, 0x32, 0x5a, 0x17, 0x0d, 0x31, 0x39, 0x31, 0x30, 0x32, 0x35,
    0x30, 0x38, 0x35, 0x31, 0x31, 0x32, 0x5a, 0x30, 0x45, 0x31, 0x0b, 0x30,
    0x09, 0x06, 0x03, 0x55, 0x04, 0x06, 0x13, 0x02, 0x41, 0x55, 0x31, 0x13,
    0x30, 0x11, 0x06, 0x03, 0x55, 0x04, 0x08, 0x0c, 0x0a, 0x53, 0x6f, 0x6d,
    0x65, 0x2d, 0x53, 0x74, 0x61, 0x74, 0x65, 0x31, 0x21, 0x30, 0x1f, 0x06,
    0x03, 0x55, 0x04, 0x0a, 0x0c, 0x18, 0x49, 0x6e, 0x74, 0x65, 0x72, 0x6e,
    0x65, 0x74, 0x20, 0x57, 0x69, 0x64, 0x67, 0x69, 0x74, 0x73, 0x20, 0x50,
    0x74, 0x79, 0x20, 0x4c, 0x74, 0x64, 0x30, 0x59, 0x30, 0x13, 0x06, 0x07,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08, 0x2a, 0x86, 0x48,
    0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00, 0x04, 0xf9, 0xb1, 0x62,
    0xd6, 0x07, 0xae, 0xc3, 0x36, 0x34, 0xf5, 0xa3, 0x09, 0x39, 0x86, 0xe7,
    0x3b, 0x59, 0xf7, 0x4a, 0x1d, 0xf4, 0x97, 0x4f, 0x91, 0x40, 0x56, 0x1b,
    0x3d, 0x6c, 0x5a, 0x38, 0x10, 0x15, 0x58, 0xf5, 0xa4, 0xcc, 0xdf, 0xd5,
    0xf5, 0x4a, 0x35, 0x40, 0x0f, 0x9f, 0x54, 0xb7, 0xe9, 0xe2, 0xae, 0x63,
    0x83, 0x6a, 0x4c, 0xfc, 0xc2, 0x5f, 0x78, 0xa0, 0xbb, 0x46, 0x54, 0xa4,
    0xda, 0x30, 0x0a, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03,
    0x02, 0x03, 0x48, 0x00, 0x30, 0x45, 0x02, 0x20, 0x47, 0x1a, 0x5f, 0x58,
    0x2a, 0x74, 0x33, 0x6d, 0xed, 0xac, 0x37, 0x21, 0xfa, 0x76, 0x5a, 0x4d,
    0x78, 0x68, 0x1a, 0xdd, 0x80, 0xa4, 0xd4, 0xb7, 0x7f, 0x7d, 0x78, 0xb3,
    0xfb, 0xf3, 0x95, 0xfb, 0x02, 0x21, 0x00, 0xc0, 0x73, 0x30, 0xda, 0x2b,
    0xc0, 0x0c, 0x9e, 0xb2, 0x25, 0x0d, 0x46, 0xb0, 0xbc, 0x66, 0x7f, 0x71,
    0x66, 0xbf, 0x16, 0xb3, 0x80, 0x78, 0xd0, 0x0c, 0xef, 0xcc, 0xf5, 0xc1,
    0x15, 0x0f, 0x58,
];

// Offset of the DER inside the message.
const DER: usize = 6;

#[test]
fn parse_fixed_certificate() {
    let (rest, parsed) = Certificate::parse(RAW_CERTIFICATE).expect("parse");
    assert!(rest.is_empty());
    assert_eq!(parsed.certificate_list.len(), 1);

    let cert = &parsed.certificate_list[0];
    assert_eq!(&cert[..], &RAW_CERTIFICATE[DER..]);

    let info = cert.info().expect("certificate info");
    assert_eq!(&cert[info.tbs_certificate.clone()], &RAW_CERTIFICATE[10..313]);
    assert_eq!(
        &cert[info.subject_public_key_info.clone()],
        &RAW_CERTIFICATE[222..313]
    );
    // Self-issued: subject and issuer hold the same name.
    assert_eq!(&cert[info.issuer.clone()], &RAW_CERTIFICATE[48..119]);
    assert_eq!(&cert[info.subject.clone()], &RAW_CERTIFICATE[48..119]);
    assert_eq!(&cert[info.signature.clone()], &RAW_CERTIFICATE[328..]);

    assert_eq!(info.tbs_certificate, 4..307);
    assert_eq!(info.version, 1);
    assert_eq!(info.signature_scheme, SignatureScheme::EcdsaWithSha256);
    assert_eq!(info.public_key_algorithm, PublicKeyAlgorithm::Ecdsa);

    assert!(WellFormed
        .verify_certificate_chain(&parsed.certificate_list)
        .is_ok());
}

#[test]
fn serialize_fixed_certificate() {
    let (_, parsed) = Certificate::parse(RAW_CERTIFICATE).expect("parse");

    let mut out = Vec::new();
    parsed.serialize(&mut out);
    assert_eq!(out, RAW_CERTIFICATE);

    let message = handshake_message(2, Body::Certificate(parsed.clone()));
    assert_eq!(message.len(), 12 + RAW_CERTIFICATE.len());
    assert_eq!(&message[12..], RAW_CERTIFICATE);

    let decoded = Handshake::unmarshal(&message).expect("unmarshal");
    assert_eq!(decoded.message_seq(), 2);
    assert_eq!(decoded.body, Body::Certificate(parsed));
}

#[test]
fn malformed_lengths() {
    // Outer length one past the data.
    let mut raw = RAW_CERTIFICATE.to_vec();
    raw[2] += 1;
    assert!(Certificate::parse(&raw).is_err());

    // Entry shorter than the list leaves a partial entry behind.
    let mut raw = RAW_CERTIFICATE.to_vec();
    raw[5] -= 1;
    assert!(Certificate::parse(&raw).is_err());

    // Entry running past the list.
    let mut raw = RAW_CERTIFICATE.to_vec();
    raw[5] += 1;
    assert!(Certificate::parse(&raw).is_err());

    let mut raw = RAW_CERTIFICATE.to_vec();
    raw[5] += 1;
    let mut message = vec![11, 0, 0x01, 0x8f, 0, 0, 0, 0, 0, 0, 0x01, 0x8f];
    message.extend_from_slice(&raw);
    let err = Handshake::unmarshal(&message).unwrap_err();
    assert!(err.is_decode());
    assert!(!err.is_fatal());
}

#[test]
fn truncated_der_is_an_error() {
    let cert = Asn1Cert::try_new(RAW_CERTIFICATE[DER..RAW_CERTIFICATE.len() - 10].to_vec())
        .expect("wrap");
    assert!(cert.info().is_err());
    assert!(WellFormed.verify_certificate_chain(&[cert]).is_err());
}

#[test]
fn generated_chain_through_handshake() {
    let chain = vec![
        Asn1Cert::try_new(self_signed_der()).unwrap(),
        Asn1Cert::try_new(self_signed_der()).unwrap(),
    ];
    let message = handshake_message(4, Body::Certificate(Certificate::new(chain.clone())));

    let decoded = Handshake::unmarshal(&message).expect("unmarshal");
    let Body::Certificate(c) = decoded.body else {
        panic!("expected Certificate");
    };
    assert_eq!(c.certificate_list, chain);
    for cert in &c.certificate_list {
        let info = cert.info().expect("info");
        assert_eq!(info.version, 3);
        assert_eq!(info.signature.end, cert.len());
    }
}
