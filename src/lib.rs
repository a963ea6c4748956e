//! # secsml — SECS-II message model and HSMS/SML codecs
//!
//! An in-memory representation of SEMI SECS-II data messages and HSMS
//! control messages, with two codecs: the HSMS binary framing (10-byte
//! header plus SECS-II item payload) and the SML text notation (parsed with
//! a hand-written lexer and recursive descent parser, printed back by the
//! item tree's `Display`).
//!
//! ## Data model
//!
//! - [`Item`]: immutable tree of typed data items — `L`, `A`, `B`,
//!   `BOOLEAN`, `I1`/`I2`/`I4`/`I8`, `U1`/`U2`/`U4`/`U8`, `F4`/`F8` — with
//!   named variable placeholders and the `...` repetition marker in lists
//! - [`DataMessage`]: stream/function envelope around a root item, with
//!   wait bit, direction, and optional HSMS session id and system bytes
//! - [`ControlMessage`]: the eight HSMS control subtypes (select, deselect,
//!   linktest, reject, separate)
//!
//! ## Example SML
//!
//! ```text
//! S2F41 W H->E RemoteCommand
//! <L[2]
//!   <A "START">
//!   <L[2]
//!     <A "LOTID">
//!     <A LotID[..16]>
//!   >
//! >
//! .
//! ```
//!
//! ## Usage
//!
//! [`parse`] turns SML text into [`DataMessage`]s (plus error and warning
//! diagnostics); `to_bytes` on a message produces the HSMS frame; [`decode`]
//! turns a frame back into a data or control message. All values are
//! immutable; `fill` and the setter-style operations return new values.

pub mod codec;
pub mod item;
mod lexer;
pub mod message;
pub mod parser;
pub mod value;

pub use codec::{decode, DecodeError, HsmsMessage};
pub use item::{Item, ItemError, MAX_BYTE_SIZE};
pub use message::{
    ControlKind, ControlMessage, DataMessage, Direction, MessageError, WaitBit,
};
pub use parser::{parse, Diagnostic, ParseOutput};
pub use value::Value;
