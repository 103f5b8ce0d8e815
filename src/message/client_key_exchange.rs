use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyExchange {
    pub exchange_keys: ExchangeKeys,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeKeys {
    /// PSK identity, `u16` prefixed.
    Psk(Vec<u8>),
    /// ECDH public value, `u8` prefixed.
    Ecdh(Vec<u8>),
}

impl ClientKeyExchange {
    pub fn new(exchange_keys: ExchangeKeys) -> Self {
        ClientKeyExchange { exchange_keys }
    }

    /// Parse without knowing the negotiated cipher suite. The length
    /// prefix that spans the whole body decides the variant.
    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientKeyExchange> {
        if input.len() >= 2 && u16::from_be_bytes([input[0], input[1]]) as usize == input.len() - 2
        {
            let (input, len) = be_u16(input)?;
            let (input, identity) = take(len)(input)?;
            return Ok((input, Self::new(ExchangeKeys::Psk(identity.to_vec()))));
        }

        if !input.is_empty() && input[0] as usize == input.len() - 1 {
            let (input, len) = be_u8(input)?;
            let (input, public_key) = take(len)(input)?;
            return Ok((input, Self::new(ExchangeKeys::Ecdh(public_key.to_vec()))));
        }

        Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)))
    }

    pub fn check(&self) -> Result<(), crate::Error> {
        match &self.exchange_keys {
            ExchangeKeys::Psk(identity) if identity.len() > 0xFFFF => {
                Err(crate::Error::Encode("PSK identity too long".into()))
            }
            ExchangeKeys::Ecdh(public_key) if public_key.len() > 0xFF => {
                Err(crate::Error::Encode("ECDH public key too long".into()))
            }
            _ => Ok(()),
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match &self.exchange_keys {
            ExchangeKeys::Psk(identity) => {
                output.extend_from_slice(&(identity.len() as u16).to_be_bytes());
                output.extend_from_slice(identity);
            }
            ExchangeKeys::Ecdh(public_key) => {
                output.push(public_key.len() as u8);
                output.extend_from_slice(public_key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_public_key() {
        let message: &[u8] = &[0x04, 0x01, 0x02, 0x03, 0x04];
        let (rest, parsed) = ClientKeyExchange::parse(message).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.exchange_keys, ExchangeKeys::Ecdh(vec![1, 2, 3, 4]));

        let mut serialized = Vec::new();
        parsed.serialize(&mut serialized);
        assert_eq!(serialized, message);
    }

    #[test]
    fn psk_identity() {
        let message: &[u8] = &[0x00, 0x03, 0x61, 0x62, 0x63];
        let (_, parsed) = ClientKeyExchange::parse(message).unwrap();
        assert_eq!(parsed.exchange_keys, ExchangeKeys::Psk(b"abc".to_vec()));
    }

    #[test]
    fn length_mismatch() {
        let message: &[u8] = &[0x07, 0x01, 0x02];
        assert!(ClientKeyExchange::parse(message).is_err());
        assert!(ClientKeyExchange::parse(&[]).is_err());
    }
}
