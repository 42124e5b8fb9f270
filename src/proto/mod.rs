//! STUN/TURN wire protocol: message model, attribute codec, frame
//! decoder/encoder.
//!
//! Implements the framing layer of RFC 5389 (STUN) and the ChannelData
//! framing of RFC 5766 (TURN) as consumed by the relay proxy.

pub mod attribute;
pub mod decoder;
pub mod encoder;
pub mod message;

pub use attribute::{Attribute, AttributeRegistry, AttributeValue, CredentialMode, ExtensionCodec};
pub use decoder::{DecodeOutcome, FrameDecoder};
pub use encoder::FrameEncoder;
pub use message::{ChannelDataFrame, Message, MessageClass, Method, TransactionId};

/// STUN magic cookie as defined in RFC 5389
pub const MAGIC_COOKIE: u32 = 0x2112A442;

/// STUN header size (20 bytes)
pub const HEADER_SIZE: usize = 20;

/// Attribute header size (type + length)
pub const ATTR_HEADER_SIZE: usize = 4;

/// ChannelData header size (channel number + length)
pub const CHANNEL_DATA_HEADER_SIZE: usize = 4;

/// First valid TURN channel number (RFC 5766 Section 11)
pub const CHANNEL_NUMBER_MIN: u16 = 0x4000;

/// Last valid TURN channel number
pub const CHANNEL_NUMBER_MAX: u16 = 0x7FFF;

/// Bit mask selecting the message class from the leading 16 bits
pub const CLASS_MASK: u16 = 0x0110;

/// Padding needed to align `len` value bytes to the next 4-byte boundary
pub(crate) fn padding_len(len: usize) -> usize {
    (4 - (len % 4)) % 4
}
