use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::{Err, IResult};

use super::{
    Certificate, CertificateRequest, CertificateVerify, ClientHello, ClientKeyExchange, Finished,
    HelloVerifyRequest, ServerHello, ServerKeyExchange,
};
use crate::util::{put_u24, MAX_U24};

/// Length of the handshake header on the wire.
pub const HANDSHAKE_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl Header {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Header> {
        let (input, msg_type) = MessageType::parse(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;

        Ok((
            input,
            Header {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.msg_type.as_u8());
        put_u24(output, self.length as usize);
        output.extend_from_slice(&self.message_seq.to_be_bytes());
        put_u24(output, self.fragment_offset as usize);
        put_u24(output, self.fragment_length as usize);
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset > 0 || self.fragment_length != self.length
    }

    /// Parse a header plus its fragment bytes, as found in a record.
    pub fn parse_fragment(input: &[u8]) -> IResult<&[u8], (Header, &[u8])> {
        let (input, header) = Header::parse(input)?;
        let end = header.fragment_offset as usize + header.fragment_length as usize;
        if end > header.length as usize {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (input, fragment) = take(header.fragment_length as usize)(input)?;
        Ok((input, (header, fragment)))
    }

    // These are handshakes that, when received as duplicates of an already
    // consumed peer flight, trigger a resend of our current flight.
    pub fn dupe_triggers_resend(&self) -> bool {
        // Only the first fragment, so one fragmented dupe gives one resend.
        if self.fragment_offset != 0 {
            return false;
        }

        matches!(
            self.msg_type,
            MessageType::ClientHello |        // flight 1 and 3
            MessageType::HelloVerifyRequest | // flight 2
            MessageType::ServerHelloDone |    // flight 4
            MessageType::ClientKeyExchange |  // flight 5
            MessageType::Finished // flight 5 and 6
        )
    }
}

/// A complete (not fragmented) handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub header: Header,
    pub body: Body,
}

impl Handshake {
    /// Create a message with `length` and `fragment_length` set from the
    /// encoded body.
    pub fn new(message_seq: u16, body: Body) -> Self {
        let mut buf = Vec::new();
        body.serialize(&mut buf);
        let length = buf.len() as u32;

        Handshake {
            header: Header {
                msg_type: body.message_type(),
                length,
                message_seq,
                fragment_offset: 0,
                fragment_length: length,
            },
            body,
        }
    }

    pub fn msg_type(&self) -> MessageType {
        self.header.msg_type
    }

    pub fn message_seq(&self) -> u16 {
        self.header.message_seq
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Handshake> {
        let (input, header) = Header::parse(input)?;

        if header.is_fragment() {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }

        let (input, body_bytes) = take(header.length as usize)(input)?;
        let (rest, body) = Body::parse(body_bytes, header.msg_type)?;
        if !rest.is_empty() {
            return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
        }

        Ok((input, Handshake { header, body }))
    }

    /// Decode exactly one complete message.
    pub fn unmarshal(input: &[u8]) -> Result<Handshake, crate::Error> {
        if let Some(&tag) = input.first() {
            if let MessageType::Unknown(value) = MessageType::from_u8(tag) {
                return Err(crate::Error::UnknownMessageType(value));
            }
        }

        let (rest, handshake) = Self::parse(input)?;
        if !rest.is_empty() {
            return Err(crate::Error::Decode(ErrorKind::LengthValue));
        }

        Ok(handshake)
    }

    /// Encode the message, header included.
    ///
    /// Fails when a length-prefixed field outgrows its prefix or the header
    /// does not describe the body.
    pub fn marshal(&self) -> Result<Vec<u8>, crate::Error> {
        self.body.check()?;

        let mut body = Vec::new();
        self.body.serialize(&mut body);
        if body.len() > MAX_U24 {
            return Err(crate::Error::Encode(format!(
                "body of {} bytes too long",
                body.len()
            )));
        }
        if self.header.msg_type != self.body.message_type() {
            return Err(crate::Error::Encode(format!(
                "header type {:?} does not match body {:?}",
                self.header.msg_type,
                self.body.message_type()
            )));
        }

        let header = Header {
            length: body.len() as u32,
            fragment_offset: 0,
            fragment_length: body.len() as u32,
            ..self.header
        };

        let mut output = Vec::with_capacity(HANDSHAKE_HEADER_LEN + body.len());
        header.serialize(&mut output);
        output.extend_from_slice(&body);
        Ok(output)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.header.serialize(output);
        self.body.serialize(output);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone, // empty
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    Unknown(u8),
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            3 => MessageType::HelloVerifyRequest,
            11 => MessageType::Certificate,
            12 => MessageType::ServerKeyExchange,
            13 => MessageType::CertificateRequest,
            14 => MessageType::ServerHelloDone,
            15 => MessageType::CertificateVerify,
            16 => MessageType::ClientKeyExchange,
            20 => MessageType::Finished,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::HelloVerifyRequest => 3,
            MessageType::Certificate => 11,
            MessageType::ServerKeyExchange => 12,
            MessageType::CertificateRequest => 13,
            MessageType::ServerHelloDone => 14,
            MessageType::CertificateVerify => 15,
            MessageType::ClientKeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], MessageType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Body {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    HelloVerifyRequest(HelloVerifyRequest),
    Certificate(Certificate),
    ServerKeyExchange(ServerKeyExchange),
    CertificateRequest(CertificateRequest),
    ServerHelloDone,
    CertificateVerify(CertificateVerify),
    ClientKeyExchange(ClientKeyExchange),
    Finished(Finished),
}

impl Body {
    pub fn message_type(&self) -> MessageType {
        match self {
            Body::ClientHello(_) => MessageType::ClientHello,
            Body::ServerHello(_) => MessageType::ServerHello,
            Body::HelloVerifyRequest(_) => MessageType::HelloVerifyRequest,
            Body::Certificate(_) => MessageType::Certificate,
            Body::ServerKeyExchange(_) => MessageType::ServerKeyExchange,
            Body::CertificateRequest(_) => MessageType::CertificateRequest,
            Body::ServerHelloDone => MessageType::ServerHelloDone,
            Body::CertificateVerify(_) => MessageType::CertificateVerify,
            Body::ClientKeyExchange(_) => MessageType::ClientKeyExchange,
            Body::Finished(_) => MessageType::Finished,
        }
    }

    pub fn parse(input: &[u8], m: MessageType) -> IResult<&[u8], Body> {
        match m {
            MessageType::ClientHello => {
                let (input, client_hello) = ClientHello::parse(input)?;
                Ok((input, Body::ClientHello(client_hello)))
            }
            MessageType::ServerHello => {
                let (input, server_hello) = ServerHello::parse(input)?;
                Ok((input, Body::ServerHello(server_hello)))
            }
            MessageType::HelloVerifyRequest => {
                let (input, hello_verify_request) = HelloVerifyRequest::parse(input)?;
                Ok((input, Body::HelloVerifyRequest(hello_verify_request)))
            }
            MessageType::Certificate => {
                let (input, certificate) = Certificate::parse(input)?;
                Ok((input, Body::Certificate(certificate)))
            }
            MessageType::ServerKeyExchange => {
                let (input, server_key_exchange) = ServerKeyExchange::parse(input)?;
                Ok((input, Body::ServerKeyExchange(server_key_exchange)))
            }
            MessageType::CertificateRequest => {
                let (input, certificate_request) = CertificateRequest::parse(input)?;
                Ok((input, Body::CertificateRequest(certificate_request)))
            }
            MessageType::ServerHelloDone => Ok((input, Body::ServerHelloDone)),
            MessageType::CertificateVerify => {
                let (input, certificate_verify) = CertificateVerify::parse(input)?;
                Ok((input, Body::CertificateVerify(certificate_verify)))
            }
            MessageType::ClientKeyExchange => {
                let (input, client_key_exchange) = ClientKeyExchange::parse(input)?;
                Ok((input, Body::ClientKeyExchange(client_key_exchange)))
            }
            MessageType::Finished => {
                let (input, finished) = Finished::parse(input)?;
                Ok((input, Body::Finished(finished)))
            }
            MessageType::Unknown(_) => Err(Err::Failure(Error::new(input, ErrorKind::Tag))),
        }
    }

    /// Check length-prefixed fields against their prefix width.
    pub fn check(&self) -> Result<(), crate::Error> {
        match self {
            Body::ClientHello(m) => super::Extension::check_block(&m.extensions),
            Body::ServerHello(m) => super::Extension::check_block(&m.extensions),
            Body::Certificate(m) => m.check(),
            Body::ServerKeyExchange(m) => m.check(),
            Body::CertificateRequest(m) => m.check(),
            Body::CertificateVerify(m) => m.signed.check(),
            Body::ClientKeyExchange(m) => m.check(),
            Body::HelloVerifyRequest(_) | Body::ServerHelloDone | Body::Finished(_) => Ok(()),
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match self {
            Body::ClientHello(client_hello) => client_hello.serialize(output),
            Body::ServerHello(server_hello) => server_hello.serialize(output),
            Body::HelloVerifyRequest(hello_verify_request) => {
                hello_verify_request.serialize(output)
            }
            Body::Certificate(certificate) => certificate.serialize(output),
            Body::ServerKeyExchange(server_key_exchange) => server_key_exchange.serialize(output),
            Body::CertificateRequest(certificate_request) => certificate_request.serialize(output),
            Body::ServerHelloDone => {}
            Body::CertificateVerify(certificate_verify) => certificate_verify.serialize(output),
            Body::ClientKeyExchange(client_key_exchange) => client_key_exchange.serialize(output),
            Body::Finished(finished) => finished.serialize(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use tinyvec::array_vec;

    use super::*;
    use crate::message::{
        Asn1Cert, CipherSuite, CompressionMethod, Cookie, ProtocolVersion, Random, SessionId,
    };

    const MESSAGE: &[u8] = &[
        0x01, // MessageType::ClientHello
        0x00, 0x00, 0x2E, // length
        0x00, 0x00, // message_seq
        0x00, 0x00, 0x00, // fragment_offset
        0x00, 0x00, 0x2E, // fragment_length
        // ClientHello
        0xFE, 0xFD, // ProtocolVersion::DTLS1_2
        // Random
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E,
        0x1F, 0x20, //
        0x01, // SessionId length
        0xAA, // SessionId
        0x01, // Cookie length
        0xBB, // Cookie
        0x00, 0x04, // CipherSuites length
        0xC0, 0x2B, // CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256
        0xC0, 0x2F, // CipherSuite::ECDHE_RSA_AES128_GCM_SHA256
        0x01, // CompressionMethods length
        0x00, // CompressionMethod::Null
    ];

    fn client_hello() -> Handshake {
        let client_hello = ClientHello::new(
            ProtocolVersion::DTLS1_2,
            Random::parse(&MESSAGE[14..46]).unwrap().1,
            SessionId::try_new(&[0xAA]).unwrap(),
            Cookie::try_new(&[0xBB]).unwrap(),
            array_vec![
                CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
                CipherSuite::ECDHE_RSA_AES128_GCM_SHA256
            ],
            array_vec![[CompressionMethod; 8] => CompressionMethod::Null],
        );
        Handshake::new(0, Body::ClientHello(client_hello))
    }

    #[test]
    fn handshake_size() {
        let h = Handshake::new(0, Body::ServerHelloDone);
        assert_eq!(h.marshal().unwrap().len(), HANDSHAKE_HEADER_LEN);
    }

    #[test]
    fn roundtrip() {
        let handshake = client_hello();
        assert_eq!(handshake.header.length, 0x2E);

        let serialized = handshake.marshal().unwrap();
        assert_eq!(serialized, MESSAGE);

        let parsed = Handshake::unmarshal(&serialized).unwrap();
        assert_eq!(parsed, handshake);
    }

    #[test]
    fn unknown_type() {
        let mut message = MESSAGE.to_vec();
        message[0] = 0x63;
        assert_eq!(
            Handshake::unmarshal(&message),
            Err(crate::Error::UnknownMessageType(0x63))
        );
    }

    #[test]
    fn fragment_is_not_a_message() {
        let mut message = MESSAGE.to_vec();
        message[11] = 0x10; // fragment_length shorter than length
        assert!(Handshake::unmarshal(&message).is_err());
    }

    #[test]
    fn truncated_body() {
        let err = Handshake::unmarshal(&MESSAGE[..30]).unwrap_err();
        assert!(err.is_decode());
        assert!(!err.is_fatal());
    }

    #[test]
    fn trailing_bytes_in_body() {
        let mut message = Handshake::new(3, Body::ServerHelloDone).marshal().unwrap();
        message[3] = 1; // length
        message[11] = 1; // fragment_length
        message.push(0xFF);
        assert_eq!(
            Handshake::unmarshal(&message),
            Err(crate::Error::Decode(ErrorKind::LengthValue))
        );
    }

    #[test]
    fn trailing_bytes_after_message() {
        let mut message = MESSAGE.to_vec();
        message.push(0x00);
        assert!(Handshake::unmarshal(&message).is_err());
    }

    #[test]
    fn certificate_message() {
        let handshake = Handshake::new(
            2,
            Body::Certificate(Certificate::new(vec![
                Asn1Cert::try_new(vec![0x30, 0x00]).unwrap()
            ])),
        );
        let bytes = handshake.marshal().unwrap();
        assert_eq!(
            &bytes[..HANDSHAKE_HEADER_LEN],
            &[
                0x0B, // MessageType::Certificate
                0x00, 0x00, 0x08, // length
                0x00, 0x02, // message_seq
                0x00, 0x00, 0x00, // fragment_offset
                0x00, 0x00, 0x08, // fragment_length
            ]
        );
        assert_eq!(Handshake::unmarshal(&bytes).unwrap(), handshake);
    }

    #[test]
    fn parse_fragment_checks_bounds() {
        let header = Header {
            msg_type: MessageType::Finished,
            length: 4,
            message_seq: 5,
            fragment_offset: 2,
            fragment_length: 3,
        };
        let mut bytes = Vec::new();
        header.serialize(&mut bytes);
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(Header::parse_fragment(&bytes).is_err());
    }

    #[test]
    fn dupe_trigger_only_first_fragment() {
        let mut header = client_hello().header;
        assert!(header.dupe_triggers_resend());
        header.fragment_offset = 10;
        assert!(!header.dupe_triggers_resend());
        header.fragment_offset = 0;
        header.msg_type = MessageType::Certificate;
        assert!(!header.dupe_triggers_resend());
    }
}
