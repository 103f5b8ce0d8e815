// DTLS 1.2 flights (RFC 6347 4.2.4):
//
//   Client                                          Server
//   ------                                          ------
//                                                   0 (await ClientHello)
//   1 ClientHello             -------->
//
//                             <--------   2 HelloVerifyRequest
//
//   3 ClientHello (cookie)    -------->
//
//                                         4 ServerHello
//                                           Certificate*
//                                           ServerKeyExchange*
//                                           CertificateRequest*
//                             <--------     ServerHelloDone
//
//   5 Certificate*
//     ClientKeyExchange
//     CertificateVerify*
//     [ChangeCipherSpec]
//     Finished                -------->
//
//                                         6 [ChangeCipherSpec]
//                             <--------     Finished
//
// Flights 2 and 3 only happen when the server asks for a cookie.

use crate::message::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn is_client(&self) -> bool {
        *self == Role::Client
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flight {
    Flight0,
    Flight1,
    Flight2,
    Flight3,
    Flight4,
    Flight5,
    Flight6,
}

/// One message slot in a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub msg_type: MessageType,
    pub optional: bool,
    /// Sent in the epoch after the initial one, behind a ChangeCipherSpec.
    pub next_epoch: bool,
}

const fn slot(msg_type: MessageType) -> Slot {
    Slot {
        msg_type,
        optional: false,
        next_epoch: false,
    }
}

const fn optional(msg_type: MessageType) -> Slot {
    Slot {
        msg_type,
        optional: true,
        next_epoch: false,
    }
}

const fn finished() -> Slot {
    Slot {
        msg_type: MessageType::Finished,
        optional: false,
        next_epoch: true,
    }
}

const CLIENT_HELLO: &[Slot] = &[slot(MessageType::ClientHello)];

const HELLO_VERIFY: &[Slot] = &[slot(MessageType::HelloVerifyRequest)];

const SERVER_HELLO: &[Slot] = &[
    slot(MessageType::ServerHello),
    optional(MessageType::Certificate),
    optional(MessageType::ServerKeyExchange),
    optional(MessageType::CertificateRequest),
    slot(MessageType::ServerHelloDone),
];

const CLIENT_FINISHED: &[Slot] = &[
    optional(MessageType::Certificate),
    slot(MessageType::ClientKeyExchange),
    optional(MessageType::CertificateVerify),
    finished(),
];

const SERVER_FINISHED: &[Slot] = &[finished()];

impl Flight {
    pub fn initial(role: Role) -> Flight {
        match role {
            Role::Client => Flight::Flight1,
            Role::Server => Flight::Flight0,
        }
    }

    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Whether the client sends this flight. Flight 0 is the server's
    /// empty starting point.
    pub fn is_client(&self) -> bool {
        self.number() % 2 == 1
    }

    /// Messages we send in this flight, in order.
    pub fn sends(&self) -> &'static [Slot] {
        match self {
            Flight::Flight0 => &[],
            Flight::Flight1 | Flight::Flight3 => CLIENT_HELLO,
            Flight::Flight2 => HELLO_VERIFY,
            Flight::Flight4 => SERVER_HELLO,
            Flight::Flight5 => CLIENT_FINISHED,
            Flight::Flight6 => SERVER_FINISHED,
        }
    }

    /// Peer flights that complete this one. More than one means the first
    /// to be assembled wins.
    pub fn expects(&self) -> &'static [&'static [Slot]] {
        match self {
            Flight::Flight0 | Flight::Flight2 => &[CLIENT_HELLO],
            Flight::Flight1 => &[HELLO_VERIFY, SERVER_HELLO],
            Flight::Flight3 => &[SERVER_HELLO],
            Flight::Flight4 => &[CLIENT_FINISHED],
            Flight::Flight5 => &[SERVER_FINISHED],
            Flight::Flight6 => &[],
        }
    }

    /// The flight we move to once the peer flight starting with `first`
    /// is complete. `None` means the handshake is done.
    ///
    /// The server's choice between flight 2 and 4 depends on the cookie
    /// and is not made here.
    pub fn next(&self, first: MessageType) -> Option<Flight> {
        match (self, first) {
            (Flight::Flight1, MessageType::HelloVerifyRequest) => Some(Flight::Flight3),
            (Flight::Flight1 | Flight::Flight3, _) => Some(Flight::Flight5),
            (Flight::Flight0 | Flight::Flight2, _) => Some(Flight::Flight4),
            (Flight::Flight4, _) => Some(Flight::Flight6),
            (Flight::Flight5 | Flight::Flight6, _) => None,
        }
    }

    /// Last flight we send. Nothing more is expected from the peer.
    pub fn is_last_send_flight(&self) -> bool {
        *self == Flight::Flight6
    }
}
