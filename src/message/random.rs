use std::time::{SystemTime, UNIX_EPOCH};

use nom::bytes::complete::take;
use nom::number::complete::be_u32;
use nom::IResult;

use crate::SeededRng;

/// The 32 byte hello random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Random {
    pub gmt_unix_time: u32,
    pub random_bytes: [u8; 28],
}

impl Random {
    pub fn new(rng: &mut SeededRng) -> Self {
        // Valid until 2106.
        let gmt_unix_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();

        let mut random_bytes = [0; 28];
        rng.fill(&mut random_bytes);

        Self {
            gmt_unix_time,
            random_bytes,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        let (input, gmt_unix_time) = be_u32(input)?;
        let (input, input_rand) = take(28_usize)(input)?;
        let mut random_bytes = [0u8; 28];
        random_bytes.copy_from_slice(input_rand);

        Ok((
            input,
            Random {
                gmt_unix_time,
                random_bytes,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.gmt_unix_time.to_be_bytes());
        output.extend_from_slice(&self.random_bytes);
    }
}
