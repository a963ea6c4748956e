//! SECS-II message envelope and HSMS control messages.
//!
//! A [`DataMessage`] wraps a root [`Item`] with the stream/function codes,
//! wait bit, direction, and (optionally) the HSMS session id and system
//! bytes. A [`ControlMessage`] is a fully constructed 10-byte HSMS header
//! with an empty body. Both are immutable; the setter-style operations
//! return new values.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::item::{Item, ItemError};
use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message name cannot contain whitespace")]
    NameContainsWhitespace,
    #[error("stream code {0} out of range [0, 128)")]
    StreamOutOfRange(u8),
    #[error("wait bit cannot be true for a reply message")]
    WaitBitOnReply,
    #[error("wait bit must be resolved before HSMS conversion")]
    UnresolvedWaitBit,
    #[error("data item still contains variables")]
    VariablesRemain,
    #[error("expected a {0} message")]
    WrongControlKind(ControlKind),
    #[error("reject.req reason code cannot be zero")]
    ZeroReasonCode,
    #[error(transparent)]
    Item(#[from] ItemError),
}

/// Wait bit state of a data message. `Optional` means the SML source used
/// `[W]` and the bit has not been pinned yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitBit {
    False,
    True,
    Optional,
}

impl fmt::Display for WaitBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WaitBit::False => "false",
            WaitBit::True => "true",
            WaitBit::Optional => "optional",
        })
    }
}

/// Direction of a message between the host and the equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToEquipment,
    EquipmentToHost,
    Bidirectional,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::HostToEquipment => "H->E",
            Direction::EquipmentToHost => "H<-E",
            Direction::Bidirectional => "H<->E",
        })
    }
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Direction, ()> {
        match s {
            "H->E" => Ok(Direction::HostToEquipment),
            "H<-E" => Ok(Direction::EquipmentToHost),
            "H<->E" => Ok(Direction::Bidirectional),
            _ => Err(()),
        }
    }
}

/// An immutable SECS-II data message.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    name: String,
    stream: u8,
    function: u8,
    wait_bit: WaitBit,
    direction: Direction,
    item: Item,
    session_id: Option<u16>,
    system_bytes: [u8; 4],
}

impl DataMessage {
    /// Creates a data message without HSMS addressing; the session id and
    /// system bytes must be set before the message can be serialized.
    ///
    /// The name must not contain whitespace, the stream code must be below
    /// 128, and the wait bit cannot be `True` on an even (reply) function.
    pub fn new(
        name: &str,
        stream: u8,
        function: u8,
        wait_bit: WaitBit,
        direction: Direction,
        item: Item,
    ) -> Result<DataMessage, MessageError> {
        if name.chars().any(char::is_whitespace) {
            return Err(MessageError::NameContainsWhitespace);
        }
        if stream >= 128 {
            return Err(MessageError::StreamOutOfRange(stream));
        }
        if wait_bit == WaitBit::True && function % 2 == 0 {
            return Err(MessageError::WaitBitOnReply);
        }
        Ok(DataMessage {
            name: name.to_string(),
            stream,
            function,
            wait_bit,
            direction,
            item,
            session_id: None,
            system_bytes: [0; 4],
        })
    }

    /// Creates a message that is immediately HSMS-serializable: the wait bit
    /// must be resolved and the item must not contain variables.
    #[allow(clippy::too_many_arguments)]
    pub fn hsms(
        name: &str,
        stream: u8,
        function: u8,
        wait_bit: WaitBit,
        direction: Direction,
        item: Item,
        session_id: u16,
        system_bytes: [u8; 4],
    ) -> Result<DataMessage, MessageError> {
        if wait_bit == WaitBit::Optional {
            return Err(MessageError::UnresolvedWaitBit);
        }
        if !item.variables().is_empty() {
            return Err(MessageError::VariablesRemain);
        }
        let mut message = DataMessage::new(name, stream, function, wait_bit, direction, item)?;
        message.session_id = Some(session_id);
        message.system_bytes = system_bytes;
        Ok(message)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream(&self) -> u8 {
        self.stream
    }

    pub fn function(&self) -> u8 {
        self.function
    }

    pub fn wait_bit(&self) -> WaitBit {
        self.wait_bit
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    pub fn session_id(&self) -> Option<u16> {
        self.session_id
    }

    pub fn system_bytes(&self) -> [u8; 4] {
        self.system_bytes
    }

    /// Variable names in the message's item tree, in positional order.
    pub fn variables(&self) -> Vec<String> {
        self.item.variables()
    }

    /// Pins an optional wait bit. The first call decides the value; on a
    /// message whose wait bit is already resolved this is a no-op.
    pub fn with_wait_bit(&self, wait_bit: bool) -> Result<DataMessage, MessageError> {
        if self.wait_bit != WaitBit::Optional {
            return Ok(self.clone());
        }
        if wait_bit && self.function % 2 == 0 {
            return Err(MessageError::WaitBitOnReply);
        }
        let mut message = self.clone();
        message.wait_bit = if wait_bit {
            WaitBit::True
        } else {
            WaitBit::False
        };
        Ok(message)
    }

    /// Returns a copy with the HSMS session id and system bytes set.
    pub fn with_session(&self, session_id: u16, system_bytes: [u8; 4]) -> DataMessage {
        let mut message = self.clone();
        message.session_id = Some(session_id);
        message.system_bytes = system_bytes;
        message
    }

    /// Returns a copy with the given variables filled into the item tree.
    pub fn fill(&self, values: &HashMap<String, Value>) -> Result<DataMessage, MessageError> {
        let mut message = self.clone();
        message.item = self.item.fill(values)?;
        Ok(message)
    }

    /// Header line, e.g. `S6F11 W H<-E MessageName`.
    pub fn header(&self) -> String {
        let mut header = format!("S{}F{}", self.stream, self.function);
        match self.wait_bit {
            WaitBit::True => header.push_str(" W"),
            WaitBit::Optional => header.push_str(" [W]"),
            WaitBit::False => {}
        }
        header.push(' ');
        header.push_str(&self.direction.to_string());
        if !self.name.is_empty() {
            header.push(' ');
            header.push_str(&self.name);
        }
        header
    }

    /// HSMS byte representation: 4-byte length prefix, 10-byte header, item
    /// payload. Empty when the message is not serializable, i.e. the wait
    /// bit is optional, variables remain, or no session id is set.
    pub fn to_bytes(&self) -> Vec<u8> {
        let session_id = match self.session_id {
            Some(id) => id,
            None => return Vec::new(),
        };
        if self.wait_bit == WaitBit::Optional || !self.variables().is_empty() {
            return Vec::new();
        }

        let item_bytes = self.item.to_bytes();
        let mut out = Vec::with_capacity(item_bytes.len() + 14);
        let length = (item_bytes.len() + 10) as u32;
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&session_id.to_be_bytes());
        let mut header_byte2 = self.stream;
        if self.wait_bit == WaitBit::True {
            header_byte2 |= 0x80;
        }
        out.push(header_byte2);
        out.push(self.function);
        out.push(0); // PType: SECS-II
        out.push(0); // SType: data message
        out.extend_from_slice(&self.system_bytes);
        out.extend_from_slice(&item_bytes);
        out
    }
}

impl fmt::Display for DataMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.item == Item::Empty {
            return write!(f, "{}\n.", self.header());
        }
        write!(f, "{}\n{}\n.", self.header(), self.item)
    }
}

const STYPE_SELECT_REQ: u8 = 1;
const STYPE_SELECT_RSP: u8 = 2;
const STYPE_DESELECT_REQ: u8 = 3;
const STYPE_DESELECT_RSP: u8 = 4;
const STYPE_LINKTEST_REQ: u8 = 5;
const STYPE_LINKTEST_RSP: u8 = 6;
const STYPE_REJECT_REQ: u8 = 7;
const STYPE_SEPARATE_REQ: u8 = 9;

/// Subtype of an HSMS control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    SelectReq,
    SelectRsp,
    DeselectReq,
    DeselectRsp,
    LinktestReq,
    LinktestRsp,
    RejectReq,
    SeparateReq,
    Undefined,
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlKind::SelectReq => "select.req",
            ControlKind::SelectRsp => "select.rsp",
            ControlKind::DeselectReq => "deselect.req",
            ControlKind::DeselectRsp => "deselect.rsp",
            ControlKind::LinktestReq => "linktest.req",
            ControlKind::LinktestRsp => "linktest.rsp",
            ControlKind::RejectReq => "reject.req",
            ControlKind::SeparateReq => "separate.req",
            ControlKind::Undefined => "undefined",
        })
    }
}

/// An immutable HSMS control message: a 10-byte header and no body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    header: [u8; 10],
}

impl ControlMessage {
    fn stamped(session_id: u16, s_type: u8, system_bytes: [u8; 4]) -> ControlMessage {
        let mut header = [0u8; 10];
        header[0..2].copy_from_slice(&session_id.to_be_bytes());
        header[5] = s_type;
        header[6..10].copy_from_slice(&system_bytes);
        ControlMessage { header }
    }

    /// Select.req: connection establishment request.
    pub fn select_req(session_id: u16, system_bytes: [u8; 4]) -> ControlMessage {
        ControlMessage::stamped(session_id, STYPE_SELECT_REQ, system_bytes)
    }

    /// Select.rsp for the given select.req. Status 0 means the connection is
    /// established; nonzero values are failure codes.
    pub fn select_rsp(
        select_req: &ControlMessage,
        status: u8,
    ) -> Result<ControlMessage, MessageError> {
        if select_req.kind() != ControlKind::SelectReq {
            return Err(MessageError::WrongControlKind(ControlKind::SelectReq));
        }
        let mut message = ControlMessage::stamped(
            select_req.session_id(),
            STYPE_SELECT_RSP,
            select_req.system_bytes(),
        );
        message.header[3] = status;
        Ok(message)
    }

    /// Deselect.req: graceful connection release request.
    pub fn deselect_req(session_id: u16, system_bytes: [u8; 4]) -> ControlMessage {
        ControlMessage::stamped(session_id, STYPE_DESELECT_REQ, system_bytes)
    }

    /// Deselect.rsp for the given deselect.req. Status 0 means the
    /// connection ended; nonzero values are failure codes.
    pub fn deselect_rsp(
        deselect_req: &ControlMessage,
        status: u8,
    ) -> Result<ControlMessage, MessageError> {
        if deselect_req.kind() != ControlKind::DeselectReq {
            return Err(MessageError::WrongControlKind(ControlKind::DeselectReq));
        }
        let mut message = ControlMessage::stamped(
            deselect_req.session_id(),
            STYPE_DESELECT_RSP,
            deselect_req.system_bytes(),
        );
        message.header[3] = status;
        Ok(message)
    }

    /// Linktest.req: connection liveness probe. The session id is always
    /// 0xFFFF.
    pub fn linktest_req(system_bytes: [u8; 4]) -> ControlMessage {
        ControlMessage::stamped(0xFFFF, STYPE_LINKTEST_REQ, system_bytes)
    }

    /// Linktest.rsp for the given linktest.req.
    pub fn linktest_rsp(linktest_req: &ControlMessage) -> Result<ControlMessage, MessageError> {
        if linktest_req.kind() != ControlKind::LinktestReq {
            return Err(MessageError::WrongControlKind(ControlKind::LinktestReq));
        }
        Ok(ControlMessage::stamped(
            0xFFFF,
            STYPE_LINKTEST_RSP,
            linktest_req.system_bytes(),
        ))
    }

    /// Reject.req for a received message; session id, PType, SType, and
    /// system bytes are taken from the message being rejected. Reason 1
    /// rejects an unsupported SType, 2 an unsupported PType, 3 a response
    /// without an open transaction, 4 a data message outside the SELECTED
    /// state; zero is not a valid reason.
    ///
    /// Header byte 2 carries the rejected PType for reason 2 and the
    /// rejected SType otherwise.
    pub fn reject_req(
        session_id: u16,
        p_type: u8,
        s_type: u8,
        system_bytes: [u8; 4],
        reason: u8,
    ) -> Result<ControlMessage, MessageError> {
        if reason == 0 {
            return Err(MessageError::ZeroReasonCode);
        }
        let mut message = ControlMessage::stamped(session_id, STYPE_REJECT_REQ, system_bytes);
        message.header[2] = if reason == 2 { p_type } else { s_type };
        message.header[3] = reason;
        Ok(message)
    }

    /// Separate.req: immediate connection termination.
    pub fn separate_req(session_id: u16, system_bytes: [u8; 4]) -> ControlMessage {
        ControlMessage::stamped(session_id, STYPE_SEPARATE_REQ, system_bytes)
    }

    pub(crate) fn from_header(header: [u8; 10]) -> ControlMessage {
        ControlMessage { header }
    }

    /// Classifies the message from its header: a nonzero PType or an SType
    /// outside the defined set is `Undefined`.
    pub fn kind(&self) -> ControlKind {
        if self.header[4] != 0 {
            return ControlKind::Undefined;
        }
        match self.header[5] {
            STYPE_SELECT_REQ => ControlKind::SelectReq,
            STYPE_SELECT_RSP => ControlKind::SelectRsp,
            STYPE_DESELECT_REQ => ControlKind::DeselectReq,
            STYPE_DESELECT_RSP => ControlKind::DeselectRsp,
            STYPE_LINKTEST_REQ => ControlKind::LinktestReq,
            STYPE_LINKTEST_RSP => ControlKind::LinktestRsp,
            STYPE_REJECT_REQ => ControlKind::RejectReq,
            STYPE_SEPARATE_REQ => ControlKind::SeparateReq,
            _ => ControlKind::Undefined,
        }
    }

    pub fn session_id(&self) -> u16 {
        u16::from_be_bytes([self.header[0], self.header[1]])
    }

    pub fn system_bytes(&self) -> [u8; 4] {
        [
            self.header[6],
            self.header[7],
            self.header[8],
            self.header[9],
        ]
    }

    /// Status byte of a response message; the reason code of a reject.req.
    pub fn status(&self) -> u8 {
        self.header[3]
    }

    /// HSMS byte representation: the length prefix (always 10) and the
    /// header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(14);
        out.extend_from_slice(&[0, 0, 0, 10]);
        out.extend_from_slice(&self.header);
        out
    }
}
