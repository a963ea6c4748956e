//! HSMS binary codec: encode data/control messages to single-frame byte
//! sequences and decode frames back, demultiplexing on the SType byte.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};
use tracing::{debug, trace};

use crate::item::{Item, ItemError};
use crate::message::{ControlMessage, DataMessage, Direction, MessageError, WaitBit};
use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated frame: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame length field {declared} does not match input length {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("message length {0} is shorter than the 10-byte header")]
    HeaderTooShort(usize),
    #[error("unsupported PType {0}, not a SECS-II message")]
    UnsupportedPType(u8),
    #[error("undefined SType {0}")]
    UndefinedSType(u8),
    #[error("item header has zero length bytes")]
    ZeroLengthBytes,
    #[error("unknown item format code {0:#o}")]
    UnknownFormat(u8),
    #[error("item length {length} is not a multiple of the element width {width}")]
    UnalignedLength { length: usize, width: usize },
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// A decoded HSMS message: SECS-II data (SType 0) or one of the control
/// subtypes.
#[derive(Debug, Clone, PartialEq)]
pub enum HsmsMessage {
    Data(DataMessage),
    Control(ControlMessage),
}

impl HsmsMessage {
    /// HSMS byte representation; delegates to the wrapped message. Empty
    /// when a data message is not serializable.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            HsmsMessage::Data(msg) => msg.to_bytes(),
            HsmsMessage::Control(msg) => msg.to_bytes(),
        }
    }
}

impl From<DataMessage> for HsmsMessage {
    fn from(msg: DataMessage) -> HsmsMessage {
        HsmsMessage::Data(msg)
    }
}

impl From<ControlMessage> for HsmsMessage {
    fn from(msg: ControlMessage) -> HsmsMessage {
        HsmsMessage::Control(msg)
    }
}

/// Decodes the bytes of exactly one HSMS message.
///
/// The input must contain the 4-byte length prefix and precisely as many
/// bytes as it declares. Decoded data messages carry no name and the
/// `H<->E` direction; the optional wait bit never appears on the wire.
pub fn decode(input: &[u8]) -> Result<HsmsMessage, DecodeError> {
    debug!(len = input.len(), "decoding HSMS frame");
    let mut r = Cursor::new(input);
    let declared = r.read_u32::<BigEndian>()? as usize;
    if input.len() != declared + 4 {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: input.len().saturating_sub(4),
        });
    }
    if declared < 10 {
        return Err(DecodeError::HeaderTooShort(declared));
    }

    let mut header = [0u8; 10];
    r.read_exact(&mut header)?;
    if header[4] != 0 {
        return Err(DecodeError::UnsupportedPType(header[4]));
    }

    match header[5] {
        0 => {
            let session_id = u16::from_be_bytes([header[0], header[1]]);
            let wait_bit = if header[2] & 0x80 != 0 {
                WaitBit::True
            } else {
                WaitBit::False
            };
            let stream = header[2] & 0x7F;
            let function = header[3];
            let system_bytes = [header[6], header[7], header[8], header[9]];
            let item = if declared == 10 {
                Item::Empty
            } else {
                decode_item(&mut r)?
            };
            trace!(stream, function, "decoded data message");
            let msg = DataMessage::hsms(
                "",
                stream,
                function,
                wait_bit,
                Direction::Bidirectional,
                item,
                session_id,
                system_bytes,
            )?;
            Ok(HsmsMessage::Data(msg))
        }
        1..=7 | 9 => {
            trace!(s_type = header[5], "decoded control message");
            Ok(HsmsMessage::Control(ControlMessage::from_header(header)))
        }
        s_type => Err(DecodeError::UndefinedSType(s_type)),
    }
}

/// Decodes one SECS-II item at the cursor: format byte, big-endian length,
/// payload; lists recurse on their child count.
fn decode_item(r: &mut Cursor<&[u8]>) -> Result<Item, DecodeError> {
    let format_byte = r.read_u8()?;
    let format_code = format_byte >> 2;
    let length_bytes = (format_byte & 0b11) as usize;
    if length_bytes == 0 {
        return Err(DecodeError::ZeroLengthBytes);
    }
    let mut length = 0usize;
    for _ in 0..length_bytes {
        length = (length << 8) | r.read_u8()? as usize;
    }

    match format_code {
        0o00 => {
            // Each child needs at least one format byte; a hostile length
            // field must not drive the allocation.
            let mut values = Vec::with_capacity(length.min(remaining(r)));
            for _ in 0..length {
                values.push(Value::Item(decode_item(r)?));
            }
            Ok(Item::list(values)?)
        }
        0o20 => {
            let bytes = read_payload(r, length)?;
            let text = String::from_utf8(bytes).map_err(|_| ItemError::NonAscii)?;
            Ok(Item::ascii(&text)?)
        }
        0o10 => {
            let bytes = read_payload(r, length)?;
            Ok(Item::binary(bytes.into_iter().map(Value::from).collect())?)
        }
        0o11 => {
            let bytes = read_payload(r, length)?;
            Ok(Item::boolean(
                bytes.into_iter().map(|b| Value::Bool(b != 0)).collect(),
            )?)
        }
        0o31 => decode_ints(r, 1, length),
        0o32 => decode_ints(r, 2, length),
        0o34 => decode_ints(r, 4, length),
        0o30 => decode_ints(r, 8, length),
        0o51 => decode_uints(r, 1, length),
        0o52 => decode_uints(r, 2, length),
        0o54 => decode_uints(r, 4, length),
        0o50 => decode_uints(r, 8, length),
        0o44 => decode_floats(r, 4, length),
        0o40 => decode_floats(r, 8, length),
        other => Err(DecodeError::UnknownFormat(other)),
    }
}

fn remaining(r: &Cursor<&[u8]>) -> usize {
    r.get_ref().len().saturating_sub(r.position() as usize)
}

fn read_payload(r: &mut Cursor<&[u8]>, length: usize) -> Result<Vec<u8>, DecodeError> {
    if length > remaining(r) {
        return Err(DecodeError::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }
    let mut buf = vec![0u8; length];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn check_alignment(byte_size: u8, length: usize) -> Result<usize, DecodeError> {
    let width = byte_size as usize;
    if length % width != 0 {
        return Err(DecodeError::UnalignedLength { length, width });
    }
    Ok(length / width)
}

fn decode_ints(r: &mut Cursor<&[u8]>, byte_size: u8, length: usize) -> Result<Item, DecodeError> {
    let count = check_alignment(byte_size, length)?;
    let mut values = Vec::with_capacity(count.min(remaining(r)));
    for _ in 0..count {
        let v = match byte_size {
            1 => r.read_i8()? as i64,
            2 => r.read_i16::<BigEndian>()? as i64,
            4 => r.read_i32::<BigEndian>()? as i64,
            _ => r.read_i64::<BigEndian>()?,
        };
        values.push(Value::Int(v));
    }
    Ok(Item::int(byte_size, values)?)
}

fn decode_uints(r: &mut Cursor<&[u8]>, byte_size: u8, length: usize) -> Result<Item, DecodeError> {
    let count = check_alignment(byte_size, length)?;
    let mut values = Vec::with_capacity(count.min(remaining(r)));
    for _ in 0..count {
        let v = match byte_size {
            1 => r.read_u8()? as u64,
            2 => r.read_u16::<BigEndian>()? as u64,
            4 => r.read_u32::<BigEndian>()? as u64,
            _ => r.read_u64::<BigEndian>()?,
        };
        values.push(Value::Uint(v));
    }
    Ok(Item::uint(byte_size, values)?)
}

fn decode_floats(r: &mut Cursor<&[u8]>, byte_size: u8, length: usize) -> Result<Item, DecodeError> {
    let count = check_alignment(byte_size, length)?;
    let mut values = Vec::with_capacity(count.min(remaining(r)));
    for _ in 0..count {
        let v = if byte_size == 4 {
            r.read_f32::<BigEndian>()? as f64
        } else {
            r.read_f64::<BigEndian>()?
        };
        values.push(Value::Float(v));
    }
    Ok(Item::float(byte_size, values)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_frames() {
        // Too short for the length prefix and header.
        assert!(decode(&[0, 0, 0, 10]).is_err());
        // Declared length disagrees with the input length.
        assert!(decode(&[0, 0, 0, 11, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
        // Shorter than a header.
        assert!(decode(&[0, 0, 0, 4, 1, 2, 3, 4]).is_err());
        // Nonzero PType.
        assert!(matches!(
            decode(&[0, 0, 0, 10, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0]),
            Err(DecodeError::UnsupportedPType(1))
        ));
        // Undefined SType.
        assert!(matches!(
            decode(&[0, 0, 0, 10, 0, 0, 0, 0, 0, 8, 0, 0, 0, 0]),
            Err(DecodeError::UndefinedSType(8))
        ));
    }

    #[test]
    fn rejects_malformed_items() {
        // Zero length bytes in the format byte.
        let frame = [0, 0, 0, 11, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0o25 << 2];
        assert!(matches!(decode(&frame), Err(DecodeError::ZeroLengthBytes)));
        // U2 payload of 3 bytes.
        let frame = [
            0, 0, 0, 15, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, (0o52 << 2) | 1, 3, 1, 2, 3,
        ];
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::UnalignedLength {
                length: 3,
                width: 2
            })
        ));
        // Unknown format code.
        let frame = [
            0, 0, 0, 12, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, (0o07 << 2) | 1, 0,
        ];
        assert!(matches!(decode(&frame), Err(DecodeError::UnknownFormat(0o07))));
        // Non-ASCII byte inside an A item.
        let frame = [
            0, 0, 0, 13, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, (0o20 << 2) | 1, 1, 0x80,
        ];
        assert!(decode(&frame).is_err());
    }
}
