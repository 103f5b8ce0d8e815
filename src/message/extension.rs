use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

/// A hello extension. The handshake core does not interpret the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extension_type: ExtensionType,
    pub extension_data: Vec<u8>,
}

impl Extension {
    pub fn new(extension_type: ExtensionType, extension_data: impl Into<Vec<u8>>) -> Self {
        Extension {
            extension_type,
            extension_data: extension_data.into(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Extension> {
        let (input, extension_type) = ExtensionType::parse(input)?;
        let (input, extension_length) = be_u16(input)?;
        let (input, extension_data) = take(extension_length)(input)?;

        Ok((
            input,
            Extension {
                extension_type,
                extension_data: extension_data.to_vec(),
            },
        ))
    }

    /// Parse a `u16` prefixed extension block, if present.
    ///
    /// No bytes at all means no block. A present but empty block is kept as
    /// `Some(vec![])` so it encodes back to the same two bytes.
    pub fn parse_block(input: &[u8]) -> IResult<&[u8], Option<Vec<Extension>>> {
        if input.is_empty() {
            return Ok((input, None));
        }

        let (input, len) = be_u16(input)?;
        let (input, mut block) = take(len)(input)?;

        let mut extensions = Vec::new();
        while !block.is_empty() {
            let (rest, extension) = Extension::parse(block)?;
            extensions.push(extension);
            block = rest;
        }

        Ok((input, Some(extensions)))
    }

    pub fn serialize_block(extensions: &Option<Vec<Extension>>, output: &mut Vec<u8>) {
        let Some(extensions) = extensions else {
            return;
        };
        let len: usize = extensions.iter().map(Extension::encoded_len).sum();
        output.extend_from_slice(&(len as u16).to_be_bytes());
        for ext in extensions {
            ext.serialize(output);
        }
    }

    /// Check that a block fits its `u16` prefixes.
    pub fn check_block(extensions: &Option<Vec<Extension>>) -> Result<(), crate::Error> {
        let Some(extensions) = extensions else {
            return Ok(());
        };
        for ext in extensions {
            if ext.extension_data.len() > 0xFFFF {
                return Err(crate::Error::Encode(format!(
                    "extension {:?} data too long",
                    ext.extension_type
                )));
            }
        }
        let len: usize = extensions.iter().map(Extension::encoded_len).sum();
        if len > 0xFFFF {
            return Err(crate::Error::Encode(format!(
                "extension block of {} bytes too long",
                len
            )));
        }
        Ok(())
    }

    pub fn encoded_len(&self) -> usize {
        4 + self.extension_data.len()
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.extension_type.as_u16().to_be_bytes());
        output.extend_from_slice(&(self.extension_data.len() as u16).to_be_bytes());
        output.extend_from_slice(&self.extension_data);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionType {
    ServerName,
    SupportedGroups,
    EcPointFormats,
    SignatureAlgorithms,
    UseSrtp,
    ApplicationLayerProtocolNegotiation,
    EncryptThenMac,
    ExtendedMasterSecret,
    SessionTicket,
    RenegotiationInfo,
    Unknown(u16),
}

impl ExtensionType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0000 => ExtensionType::ServerName,
            0x000A => ExtensionType::SupportedGroups,
            0x000B => ExtensionType::EcPointFormats,
            0x000D => ExtensionType::SignatureAlgorithms,
            0x000E => ExtensionType::UseSrtp,
            0x0010 => ExtensionType::ApplicationLayerProtocolNegotiation,
            0x0016 => ExtensionType::EncryptThenMac,
            0x0017 => ExtensionType::ExtendedMasterSecret,
            0x0023 => ExtensionType::SessionTicket,
            0xFF01 => ExtensionType::RenegotiationInfo,
            _ => ExtensionType::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ExtensionType::ServerName => 0x0000,
            ExtensionType::SupportedGroups => 0x000A,
            ExtensionType::EcPointFormats => 0x000B,
            ExtensionType::SignatureAlgorithms => 0x000D,
            ExtensionType::UseSrtp => 0x000E,
            ExtensionType::ApplicationLayerProtocolNegotiation => 0x0010,
            ExtensionType::EncryptThenMac => 0x0016,
            ExtensionType::ExtendedMasterSecret => 0x0017,
            ExtensionType::SessionTicket => 0x0023,
            ExtensionType::RenegotiationInfo => 0xFF01,
            ExtensionType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ExtensionType> {
        let (input, value) = be_u16(input)?;
        Ok((input, ExtensionType::from_u16(value)))
    }
}
