use super::DigitallySigned;
use nom::IResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub signed: DigitallySigned,
}

impl CertificateVerify {
    pub fn new(signed: DigitallySigned) -> Self {
        CertificateVerify { signed }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateVerify> {
        let (input, signed) = DigitallySigned::parse(input)?;
        Ok((input, CertificateVerify { signed }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.signed.serialize(output);
    }
}
