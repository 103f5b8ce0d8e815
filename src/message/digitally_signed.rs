use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::message::SignatureAndHashAlgorithm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned {
    pub algorithm: SignatureAndHashAlgorithm,
    pub signature: Vec<u8>,
}

impl DigitallySigned {
    pub fn new(algorithm: SignatureAndHashAlgorithm, signature: impl Into<Vec<u8>>) -> Self {
        DigitallySigned {
            algorithm,
            signature: signature.into(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], DigitallySigned> {
        let (input, algorithm) = SignatureAndHashAlgorithm::parse(input)?;
        let (input, signature_len) = be_u16(input)?;
        let (input, signature) = take(signature_len)(input)?;
        Ok((input, DigitallySigned::new(algorithm, signature)))
    }

    pub fn check(&self) -> Result<(), crate::Error> {
        if self.signature.len() > 0xFFFF {
            return Err(crate::Error::Encode("signature too long".into()));
        }
        Ok(())
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.algorithm.as_u16().to_be_bytes());
        output.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        output.extend_from_slice(&self.signature);
    }
}
