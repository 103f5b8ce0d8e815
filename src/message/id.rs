use std::fmt;
use std::ops::Deref;

use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u8;
use nom::{Err, IResult};

use crate::SeededRng;

/// A variable length id did not fit its bounds.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct InvalidLength {
    name: &'static str,
    min: usize,
    max: usize,
    len: usize,
}

impl fmt::Debug for InvalidLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl std::error::Error for InvalidLength {}

impl fmt::Display for InvalidLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Incorrect {} length: {} <= {} <= {}",
            self.name, self.min, self.len, self.max
        )
    }
}

impl From<InvalidLength> for crate::Error {
    fn from(value: InvalidLength) -> Self {
        crate::Error::Encode(value.to_string())
    }
}

macro_rules! var_array {
    ($name:ident, $min:expr, $max:expr) => {
        /// Opaque byte string with a one byte length prefix.
        #[derive(Clone, Copy)]
        pub struct $name([u8; $max], usize);

        impl $name {
            pub fn try_new(data: &[u8]) -> Result<Self, InvalidLength> {
                #[allow(unused_comparisons)]
                if data.len() < $min || data.len() > $max {
                    return Err(InvalidLength {
                        name: stringify!($name),
                        min: $min,
                        max: $max,
                        len: data.len(),
                    });
                }
                let mut arr = [0; $max];
                arr[..data.len()].copy_from_slice(data);
                Ok(Self(arr, data.len()))
            }

            pub fn empty() -> Self {
                Self([0; $max], 0)
            }

            /// `len` random bytes, clamped to the allowed size.
            pub fn random(len: usize, rng: &mut SeededRng) -> Self {
                let len = len.clamp($min, $max);
                let mut arr = [0; $max];
                rng.fill(&mut arr[..len]);
                Self(arr, len)
            }

            pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
                let (input, len) = be_u8(input)?;
                #[allow(unused_comparisons)]
                if (len as usize) < $min || (len as usize) > $max {
                    return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
                }
                let (input, data) = take(len as usize)(input)?;
                let instance = Self::try_new(data)
                    .map_err(|_| Err::Failure(Error::new(input, ErrorKind::LengthValue)))?;
                Ok((input, instance))
            }

            pub fn serialize(&self, output: &mut Vec<u8>) {
                output.push(self.1 as u8);
                output.extend_from_slice(self);
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:02x?})", stringify!($name), &self.0[..self.1])
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.deref() == other.deref()
            }
        }

        impl Eq for $name {}

        impl Deref for $name {
            type Target = [u8];

            fn deref(&self) -> &Self::Target {
                &self.0[..self.1]
            }
        }

        impl<'a> TryFrom<&'a [u8]> for $name {
            type Error = InvalidLength;

            fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
                Self::try_new(value)
            }
        }
    };
}

var_array!(SessionId, 0, 32);
var_array!(Cookie, 0, 255);
