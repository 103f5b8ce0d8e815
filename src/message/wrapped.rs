use std::fmt;
use std::ops::Deref;

use nom::bytes::complete::take;
use nom::IResult;

macro_rules! wrapped_bytes {
    ($name:ident, $len:ident, $max:expr) => {
        /// Opaque bytes with a length prefix on the wire.
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub const MAX_LEN: usize = $max;

            pub fn try_new(data: impl Into<Vec<u8>>) -> Result<Self, crate::Error> {
                let data = data.into();
                if data.len() > Self::MAX_LEN {
                    return Err(crate::Error::Encode(format!(
                        "{} of {} bytes exceeds {}",
                        stringify!($name),
                        data.len(),
                        Self::MAX_LEN
                    )));
                }
                Ok(Self(data))
            }

            pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
                let (input, len) = nom::number::complete::$len(input)?;
                let (input, data) = take(len as usize)(input)?;
                Ok((input, Self(data.to_vec())))
            }

            pub fn into_inner(self) -> Vec<u8> {
                self.0
            }
        }

        impl Deref for $name {
            type Target = [u8];

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({} bytes)", stringify!($name), self.0.len())
            }
        }
    };
}

wrapped_bytes!(Asn1Cert, be_u24, crate::util::MAX_U24);
wrapped_bytes!(DistinguishedName, be_u16, 0xFFFF);

impl Asn1Cert {
    pub fn serialize(&self, output: &mut Vec<u8>) {
        crate::util::put_u24(output, self.0.len());
        output.extend_from_slice(&self.0);
    }
}

impl DistinguishedName {
    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&(self.0.len() as u16).to_be_bytes());
        output.extend_from_slice(&self.0);
    }
}
