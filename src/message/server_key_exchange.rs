use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

use super::{CurveType, DigitallySigned, NamedCurve};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub params: ServerKeyExchangeParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerKeyExchangeParams {
    /// PSK identity hint (RFC 4279).
    Psk { identity_hint: Vec<u8> },
    /// Ephemeral ECDH public value, optionally signed.
    Ecdh(EcdhParams),
}

impl ServerKeyExchange {
    pub fn new(params: ServerKeyExchangeParams) -> Self {
        ServerKeyExchange { params }
    }

    /// Parse without knowing the negotiated cipher suite.
    ///
    /// ECDH parameters consuming the whole body win. Otherwise a `u16`
    /// length spanning the body is a PSK identity hint. A hint of 768 bytes
    /// or more whose bytes happen to form complete ECDH parameters is read
    /// as ECDH.
    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerKeyExchange> {
        let ecdh = EcdhParams::parse(input);
        if let Ok((rest, params)) = &ecdh {
            if rest.is_empty() {
                let params = ServerKeyExchangeParams::Ecdh(params.clone());
                return Ok((*rest, ServerKeyExchange { params }));
            }
        }

        if input.len() >= 2 {
            let hint_len = u16::from_be_bytes([input[0], input[1]]) as usize;
            if hint_len == input.len() - 2 {
                let (input, _) = be_u16(input)?;
                let (input, identity_hint) = take(hint_len)(input)?;
                let params = ServerKeyExchangeParams::Psk {
                    identity_hint: identity_hint.to_vec(),
                };
                return Ok((input, ServerKeyExchange { params }));
            }
        }

        let (input, ecdh) = ecdh?;
        Ok((input, ServerKeyExchange::new(ServerKeyExchangeParams::Ecdh(ecdh))))
    }

    pub fn signature(&self) -> Option<&DigitallySigned> {
        match &self.params {
            ServerKeyExchangeParams::Ecdh(ecdh_params) => ecdh_params.signature.as_ref(),
            ServerKeyExchangeParams::Psk { .. } => None,
        }
    }

    pub fn check(&self) -> Result<(), crate::Error> {
        match &self.params {
            ServerKeyExchangeParams::Psk { identity_hint } if identity_hint.len() > 0xFFFF => {
                Err(crate::Error::Encode("identity hint too long".into()))
            }
            ServerKeyExchangeParams::Ecdh(ecdh) if ecdh.public_key.len() > 0xFF => {
                Err(crate::Error::Encode("ECDH public key too long".into()))
            }
            ServerKeyExchangeParams::Ecdh(EcdhParams {
                signature: Some(signature),
                ..
            }) => signature.check(),
            _ => Ok(()),
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match &self.params {
            ServerKeyExchangeParams::Psk { identity_hint } => {
                output.extend_from_slice(&(identity_hint.len() as u16).to_be_bytes());
                output.extend_from_slice(identity_hint);
            }
            ServerKeyExchangeParams::Ecdh(ecdh_params) => ecdh_params.serialize(output),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdhParams {
    pub curve_type: CurveType,
    pub named_curve: NamedCurve,
    pub public_key: Vec<u8>,
    pub signature: Option<DigitallySigned>,
}

impl EcdhParams {
    pub fn new(
        named_curve: NamedCurve,
        public_key: impl Into<Vec<u8>>,
        signature: Option<DigitallySigned>,
    ) -> Self {
        EcdhParams {
            curve_type: CurveType::NamedCurve,
            named_curve,
            public_key: public_key.into(),
            signature,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], EcdhParams> {
        let (input, curve_type) = CurveType::parse(input)?;
        if curve_type != CurveType::NamedCurve {
            return Err(Err::Failure(Error::new(input, ErrorKind::Tag)));
        }
        let (input, named_curve) = NamedCurve::parse(input)?;

        let (input, public_key_len) = be_u8(input)?;
        let (input, public_key) = take(public_key_len as usize)(input)?;

        let (input, signature) = if !input.is_empty() {
            let (rest, signed) = DigitallySigned::parse(input)?;
            (rest, Some(signed))
        } else {
            (input, None)
        };

        Ok((
            input,
            EcdhParams {
                curve_type,
                named_curve,
                public_key: public_key.to_vec(),
                signature,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.curve_type.as_u8());
        output.extend_from_slice(&self.named_curve.as_u16().to_be_bytes());
        output.push(self.public_key.len() as u8);
        output.extend_from_slice(&self.public_key);

        if let Some(signed) = &self.signature {
            signed.serialize(output);
        }
    }
}
