use nom::IResult;

/// The verify data is whatever the body holds. Its length depends on the
/// cipher suite, which the codec does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    pub fn new(verify_data: impl Into<Vec<u8>>) -> Self {
        Finished {
            verify_data: verify_data.into(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Finished> {
        Ok((&input[input.len()..], Finished::new(input)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.verify_data);
    }
}
