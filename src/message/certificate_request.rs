use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;
use tinyvec::ArrayVec;

use super::{ClientCertificateType, DistinguishedName, SignatureAndHashAlgorithm};
use crate::util::{all_consumed, many0, many1};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub certificate_types: ArrayVec<[ClientCertificateType; 8]>,
    pub supported_signature_algorithms: ArrayVec<[SignatureAndHashAlgorithm; 64]>,
    pub certificate_authorities: Vec<DistinguishedName>,
}

impl CertificateRequest {
    pub fn new(
        certificate_types: ArrayVec<[ClientCertificateType; 8]>,
        supported_signature_algorithms: ArrayVec<[SignatureAndHashAlgorithm; 64]>,
        certificate_authorities: Vec<DistinguishedName>,
    ) -> Self {
        CertificateRequest {
            certificate_types,
            supported_signature_algorithms,
            certificate_authorities,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateRequest> {
        let (input, cert_types_len) = be_u8(input)?;
        let (input, input_type) = take(cert_types_len)(input)?;
        let (rest, certificate_types) = many1(ClientCertificateType::parse)(input_type)?;
        all_consumed(rest)?;

        let (input, sig_algs_len) = be_u16(input)?;
        let (input, input_sigs) = take(sig_algs_len)(input)?;
        let (rest, supported_signature_algorithms) =
            many0(SignatureAndHashAlgorithm::parse)(input_sigs)?;
        all_consumed(rest)?;

        let (input, cert_auths_len) = be_u16(input)?;
        let (input, mut input_auths) = take(cert_auths_len)(input)?;
        let mut certificate_authorities = Vec::new();
        while !input_auths.is_empty() {
            let (rest, name) = DistinguishedName::parse(input_auths)?;
            certificate_authorities.push(name);
            input_auths = rest;
        }

        Ok((
            input,
            CertificateRequest {
                certificate_types,
                supported_signature_algorithms,
                certificate_authorities,
            },
        ))
    }

    pub fn check(&self) -> Result<(), crate::Error> {
        let len = self.authorities_len();
        if len > 0xFFFF {
            return Err(crate::Error::Encode(format!(
                "certificate authorities of {} bytes too long",
                len
            )));
        }
        Ok(())
    }

    fn authorities_len(&self) -> usize {
        self.certificate_authorities
            .iter()
            .map(|name| 2 + name.len())
            .sum()
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.certificate_types.len() as u8);
        for cert_type in &self.certificate_types {
            output.push(cert_type.as_u8());
        }

        let sig_algs_len = (self.supported_signature_algorithms.len() * 2) as u16;
        output.extend_from_slice(&sig_algs_len.to_be_bytes());
        for sig_alg in &self.supported_signature_algorithms {
            output.extend_from_slice(&sig_alg.as_u16().to_be_bytes());
        }

        output.extend_from_slice(&(self.authorities_len() as u16).to_be_bytes());
        for name in &self.certificate_authorities {
            name.serialize(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use tinyvec::array_vec;

    use super::*;
    use crate::message::{HashAlgorithm, SignatureAlgorithm};

    const MESSAGE: &[u8] = &[
        0x02, // Certificate types length
        0x40, // ClientCertificateType::ECDSA_SIGN
        0x01, // ClientCertificateType::RSA_SIGN
        0x00, 0x04, // Signature algorithms length
        0x04, 0x03, // SHA256 + ECDSA
        0x04, 0x01, // SHA256 + RSA
        0x00, 0x06, // Certificate authorities length
        0x00, 0x04, // Distinguished name length
        0x30, 0x02, 0x31, 0x00, // Distinguished name
    ];

    #[test]
    fn roundtrip() {
        let request = CertificateRequest::new(
            array_vec![
                ClientCertificateType::ECDSA_SIGN,
                ClientCertificateType::RSA_SIGN
            ],
            array_vec![
                SignatureAndHashAlgorithm::new(HashAlgorithm::SHA256, SignatureAlgorithm::ECDSA),
                SignatureAndHashAlgorithm::new(HashAlgorithm::SHA256, SignatureAlgorithm::RSA)
            ],
            vec![DistinguishedName::try_new(&MESSAGE[13..]).unwrap()],
        );

        let mut serialized = Vec::new();
        request.serialize(&mut serialized);
        assert_eq!(serialized, MESSAGE);

        let (rest, parsed) = CertificateRequest::parse(&serialized).unwrap();
        assert_eq!(parsed, request);
        assert!(rest.is_empty());
    }

    #[test]
    fn distinguished_name_overrun() {
        let mut message = MESSAGE.to_vec();
        message[12] = 0x05;

        assert!(CertificateRequest::parse(&message).is_err());
    }
}
