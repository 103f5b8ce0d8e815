//! Certificate inspection and the chain validation seam.
//!
//! Certificates travel as opaque DER through the handshake. For logging and
//! for verifiers that want to look inside, [`CertificateInfo`] locates the
//! interesting parts of one certificate without copying it.

use std::ops::Range;

use der::asn1::AnyRef;
use der::{Decode, Reader, SliceReader, Tag, TagNumber, Tagged};
use spki::ObjectIdentifier;

use crate::message::Asn1Cert;

const TAG_VERSION: Tag = Tag::ContextSpecific {
    constructed: true,
    number: TagNumber::N0,
};

const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const ECDSA_WITH_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// Signature algorithm of a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    EcdsaWithSha256,
    EcdsaWithSha384,
    EcdsaWithSha512,
    Sha1WithRsa,
    Sha256WithRsa,
    Sha384WithRsa,
    Sha512WithRsa,
    Ed25519,
    Unknown(ObjectIdentifier),
}

impl From<ObjectIdentifier> for SignatureScheme {
    fn from(oid: ObjectIdentifier) -> Self {
        const KNOWN: &[(ObjectIdentifier, SignatureScheme)] = &[
            (ECDSA_WITH_SHA256, SignatureScheme::EcdsaWithSha256),
            (ECDSA_WITH_SHA384, SignatureScheme::EcdsaWithSha384),
            (ECDSA_WITH_SHA512, SignatureScheme::EcdsaWithSha512),
            (SHA1_WITH_RSA, SignatureScheme::Sha1WithRsa),
            (SHA256_WITH_RSA, SignatureScheme::Sha256WithRsa),
            (SHA384_WITH_RSA, SignatureScheme::Sha384WithRsa),
            (SHA512_WITH_RSA, SignatureScheme::Sha512WithRsa),
            (ED25519, SignatureScheme::Ed25519),
        ];

        KNOWN
            .iter()
            .find(|(known, _)| *known == oid)
            .map(|(_, scheme)| *scheme)
            .unwrap_or(SignatureScheme::Unknown(oid))
    }
}

/// Algorithm of the subject public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyAlgorithm {
    Ecdsa,
    Rsa,
    Ed25519,
    Unknown(ObjectIdentifier),
}

impl From<ObjectIdentifier> for PublicKeyAlgorithm {
    fn from(oid: ObjectIdentifier) -> Self {
        if oid == EC_PUBLIC_KEY {
            PublicKeyAlgorithm::Ecdsa
        } else if oid == RSA_ENCRYPTION {
            PublicKeyAlgorithm::Rsa
        } else if oid == ED25519 {
            PublicKeyAlgorithm::Ed25519
        } else {
            PublicKeyAlgorithm::Unknown(oid)
        }
    }
}

/// Byte ranges into a DER certificate plus a few decoded fields.
///
/// Ranges index the certificate bytes (the `Asn1Cert` content). `issuer`,
/// `subject` and `subject_public_key_info` include their DER headers,
/// `signature` is the BIT STRING content after the unused-bits octet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub tbs_certificate: Range<usize>,
    pub issuer: Range<usize>,
    pub subject: Range<usize>,
    pub subject_public_key_info: Range<usize>,
    pub signature: Range<usize>,
    /// 1 for v1, 3 for v3.
    pub version: u8,
    pub signature_scheme: SignatureScheme,
    pub public_key_algorithm: PublicKeyAlgorithm,
}

/// One DER element and where it sits in the certificate.
struct Element<'a> {
    range: Range<usize>,
    content: &'a [u8],
    content_start: usize,
}

/// Consecutive DER elements, with offsets relative to the whole certificate.
struct Elements<'a> {
    reader: SliceReader<'a>,
    base: usize,
}

impl<'a> Elements<'a> {
    fn new(input: &'a [u8], base: usize) -> der::Result<Self> {
        Ok(Elements {
            reader: SliceReader::new(input)?,
            base,
        })
    }

    fn inside(element: &Element<'a>) -> der::Result<Self> {
        Self::new(element.content, element.content_start)
    }

    fn offset(&self) -> usize {
        self.base + u32::from(self.reader.position()) as usize
    }

    fn peek_tag(&self) -> der::Result<Tag> {
        self.reader.peek_tag()
    }

    fn expect(&mut self, tag: Tag) -> der::Result<Element<'a>> {
        let start = self.offset();
        let any = AnyRef::decode(&mut self.reader)?;
        any.tag().assert_eq(tag)?;
        let end = self.offset();
        let content = any.value();

        Ok(Element {
            range: start..end,
            content,
            content_start: end - content.len(),
        })
    }

    fn decode<T: Decode<'a>>(&mut self) -> der::Result<T> {
        T::decode(&mut self.reader)
    }

    fn finish(self) -> der::Result<()> {
        self.reader.finish(())
    }
}

fn algorithm_oid(algorithm_identifier: &Element<'_>) -> der::Result<ObjectIdentifier> {
    Elements::inside(algorithm_identifier)?.decode()
}

impl CertificateInfo {
    pub fn parse(der: &[u8]) -> Result<CertificateInfo, crate::Error> {
        let mut outer = Elements::new(der, 0)?;
        let cert = outer.expect(Tag::Sequence)?;
        outer.finish()?;

        let mut parts = Elements::inside(&cert)?;
        let tbs = parts.expect(Tag::Sequence)?;
        let signature_algorithm = parts.expect(Tag::Sequence)?;
        let signature = parts.expect(Tag::BitString)?;
        parts.finish()?;
        if signature.content.is_empty() {
            return Err(crate::Error::CertificateError("empty signature".into()));
        }

        let mut fields = Elements::inside(&tbs)?;
        let mut version = 1;
        if fields.peek_tag()? == TAG_VERSION {
            let explicit = fields.expect(TAG_VERSION)?;
            let mut inner = Elements::inside(&explicit)?;
            let value: u8 = inner.decode()?;
            inner.finish()?;
            version = match value {
                0..=2 => value + 1,
                _ => {
                    return Err(crate::Error::CertificateError(format!(
                        "unsupported version {}",
                        value
                    )))
                }
            };
        }

        let _serial = fields.expect(Tag::Integer)?;
        let _signature = fields.expect(Tag::Sequence)?;
        let issuer = fields.expect(Tag::Sequence)?;
        let _validity = fields.expect(Tag::Sequence)?;
        let subject = fields.expect(Tag::Sequence)?;
        let spki = fields.expect(Tag::Sequence)?;
        let spki_algorithm = Elements::inside(&spki)?.expect(Tag::Sequence)?;

        Ok(CertificateInfo {
            tbs_certificate: tbs.range,
            issuer: issuer.range,
            subject: subject.range,
            subject_public_key_info: spki.range,
            signature: signature.content_start + 1..signature.range.end,
            version,
            signature_scheme: algorithm_oid(&signature_algorithm)?.into(),
            public_key_algorithm: algorithm_oid(&spki_algorithm)?.into(),
        })
    }
}

impl Asn1Cert {
    /// Locate the parts of this certificate.
    pub fn info(&self) -> Result<CertificateInfo, crate::Error> {
        CertificateInfo::parse(self)
    }

    /// Fully decode the certificate.
    pub fn decode(&self) -> Result<x509_cert::Certificate, crate::Error> {
        x509_cert::Certificate::from_der(self)
            .map_err(|e| crate::Error::CertificateError(e.to_string()))
    }
}

/// Validates the peer's certificate chain.
///
/// Called once per received Certificate message, with the chain leaf
/// first. An empty chain is passed on as is; whether that is acceptable is
/// the verifier's call.
pub trait CertVerifier {
    fn verify_certificate_chain(&self, chain: &[Asn1Cert]) -> Result<(), String>;
}

/// Accepts every chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl CertVerifier for AcceptAll {
    fn verify_certificate_chain(&self, _chain: &[Asn1Cert]) -> Result<(), String> {
        Ok(())
    }
}

/// Accepts a non-empty chain where every entry decodes as X.509.
///
/// No signature, time or trust checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct WellFormed;

impl CertVerifier for WellFormed {
    fn verify_certificate_chain(&self, chain: &[Asn1Cert]) -> Result<(), String> {
        if chain.is_empty() {
            return Err("empty certificate chain".into());
        }
        for (i, cert) in chain.iter().enumerate() {
            let decoded = cert.decode().map_err(|e| format!("entry {}: {}", i, e))?;
            trace!(
                "Certificate {} subject: {}",
                i,
                decoded.tbs_certificate.subject
            );
        }
        Ok(())
    }
}
