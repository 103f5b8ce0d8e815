use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u24;
use nom::{Err, IResult};

use crate::message::Asn1Cert;
use crate::util::{put_u24, MAX_U24};

/// An ordered certificate chain, leaf first. Each entry is kept as opaque
/// DER.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Certificate {
    pub certificate_list: Vec<Asn1Cert>,
}

impl Certificate {
    pub fn new(certificate_list: Vec<Asn1Cert>) -> Self {
        Certificate { certificate_list }
    }

    /// Parse the chain.
    ///
    /// The outer length must be covered exactly by the nested entries. An
    /// entry that runs past the outer length, or a partial entry header at
    /// the end, fails with `ErrorKind::LengthValue`.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Certificate> {
        let (input, total_len) = be_u24(input)?;
        let (input, mut list) = take(total_len as usize)(input)?;

        let mut certificate_list = Vec::new();
        while !list.is_empty() {
            if list.len() < 3 {
                debug!("Certificate list truncated: {} trailing bytes", list.len());
                return Err(Err::Failure(Error::new(list, ErrorKind::LengthValue)));
            }
            let (rest, cert_len) = be_u24(list)?;
            if cert_len as usize > rest.len() {
                debug!(
                    "Certificate list overrun: entry of {} with {} left",
                    cert_len,
                    rest.len()
                );
                return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
            }
            let (rest, cert_data) = take(cert_len as usize)(rest)?;
            // Bound by MAX_U24 through the u24 prefix.
            certificate_list.push(Asn1Cert::try_new(cert_data.to_vec()).map_err(|_| {
                Err::Failure(Error::new(rest, ErrorKind::TooLarge))
            })?);
            list = rest;
        }

        Ok((input, Certificate { certificate_list }))
    }

    pub fn encoded_len(&self) -> usize {
        self.certificate_list.iter().map(|cert| 3 + cert.len()).sum()
    }

    pub fn check(&self) -> Result<(), crate::Error> {
        if self.encoded_len() > MAX_U24 {
            return Err(crate::Error::Encode(format!(
                "certificate list of {} bytes too long",
                self.encoded_len()
            )));
        }
        Ok(())
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        put_u24(output, self.encoded_len());
        for cert in &self.certificate_list {
            cert.serialize(output);
        }
    }
}
