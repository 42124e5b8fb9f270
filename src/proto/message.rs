use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use rand::rngs::OsRng;
use rand::RngCore;

use super::attribute::{Attribute, AttributeValue};
use super::{CHANNEL_NUMBER_MAX, CHANNEL_NUMBER_MIN, CLASS_MASK};

/// STUN transaction ID (96 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId([u8; 12]);

impl TransactionId {
    /// Generate a new random transaction ID with a cryptographically secure RNG
    pub fn new() -> Self {
        let mut id = [0u8; 12];
        OsRng.fill_bytes(&mut id);
        Self(id)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get as raw bytes
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", general_purpose::STANDARD.encode(self.0))
    }
}

/// STUN message class (RFC 5389 Section 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl MessageClass {
    /// Class bits within the leading 16 bits of the header
    pub fn bits(self) -> u16 {
        match self {
            Self::Request => 0x0000,
            Self::Indication => 0x0010,
            Self::SuccessResponse => 0x0100,
            Self::ErrorResponse => 0x0110,
        }
    }

    /// Extract the class from the leading 16 bits
    pub fn from_bits(raw: u16) -> Self {
        match raw & CLASS_MASK {
            0x0000 => Self::Request,
            0x0010 => Self::Indication,
            0x0100 => Self::SuccessResponse,
            0x0110 => Self::ErrorResponse,
            _ => unreachable!(),
        }
    }
}

/// STUN/TURN methods handled by the proxy (RFC 5389, RFC 5766)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Method {
    Reserved = 0x000,
    Binding = 0x001,
    Allocate = 0x003,
    Refresh = 0x004,
    Send = 0x006,
    Data = 0x007,
    CreatePermission = 0x008,
    ChannelBind = 0x009,
}

impl Method {
    /// All supported methods, for exhaustive table checks
    pub const ALL: [Method; 8] = [
        Method::Reserved,
        Method::Binding,
        Method::Allocate,
        Method::Refresh,
        Method::Send,
        Method::Data,
        Method::CreatePermission,
        Method::ChannelBind,
    ];

    /// Look up a method by its 12-bit code
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x000 => Some(Self::Reserved),
            0x001 => Some(Self::Binding),
            0x003 => Some(Self::Allocate),
            0x004 => Some(Self::Refresh),
            0x006 => Some(Self::Send),
            0x007 => Some(Self::Data),
            0x008 => Some(Self::CreatePermission),
            0x009 => Some(Self::ChannelBind),
            _ => None,
        }
    }

    /// The 12-bit method code
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Method bits as laid out in the leading 16 bits (RFC 5389 Section 3):
    /// M0-3 stay in place, M4-6 shift past the C0 class bit, M7-11 past C1.
    pub fn wire_bits(self) -> u16 {
        let m = self as u16;
        (m & 0x000F) | ((m & 0x0070) << 1) | ((m & 0x0F80) << 2)
    }

    /// Recover the 12-bit method code from the leading 16 bits
    pub fn code_from_wire(raw: u16) -> u16 {
        (raw & 0x000F) | ((raw & 0x00E0) >> 1) | ((raw & 0x3E00) >> 2)
    }
}

/// A decoded STUN message
///
/// Attribute order is preserved from the wire; where a type occurs more than
/// once the first occurrence is authoritative. The wire length is always
/// derived from the attributes at encode time, never stored.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message class
    pub class: MessageClass,
    /// Message method
    pub method: Method,
    /// Transaction ID correlating request and response
    pub transaction_id: TransactionId,
    /// Ordered attribute sequence
    pub attributes: Vec<Attribute>,
    modified: bool,
    username: Option<String>,
}

impl Message {
    /// Create a new message with no attributes
    pub fn new(class: MessageClass, method: Method, transaction_id: TransactionId) -> Self {
        Self {
            class,
            method,
            transaction_id,
            attributes: Vec::new(),
            modified: false,
            username: None,
        }
    }

    /// Synthesized 400 "Bad Request" error response carrying the original
    /// transaction id, used to recover locally from malformed attribute data.
    pub fn bad_request(method: Method, transaction_id: TransactionId) -> Self {
        let mut msg = Self::new(MessageClass::ErrorResponse, method, transaction_id);
        msg.add_attribute(Attribute::error_code(400, "Bad Request"));
        msg
    }

    /// Append an attribute
    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// First attribute of the given type, if any
    pub fn get_attribute(&self, raw_type: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.raw_type() == raw_type)
    }

    /// First USERNAME attribute value, if any
    pub fn username_attribute(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a.value() {
            AttributeValue::Username(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Whether a pipeline stage has rewritten this message, requiring a fresh
    /// encode instead of a byte-identical relay of the original input
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Flag the message as rewritten by a pipeline stage
    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Username correlated from a prior inbound transaction, for downstream
    /// integrity-hash computation
    pub fn correlated_username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Attach a correlated username
    pub fn set_correlated_username(&mut self, username: String) {
        self.username = Some(username);
    }
}

/// TURN ChannelData frame (RFC 5766 Section 11.4)
///
/// Relayed payload framing on the post-allocation fast path; the payload is
/// opaque and never attribute-parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDataFrame {
    /// Channel number (top 2 bits fixed at 01)
    pub number: u16,
    /// Opaque relayed payload
    pub payload: Bytes,
}

impl ChannelDataFrame {
    /// Create a new frame
    pub fn new(number: u16, payload: Bytes) -> Self {
        Self { number, payload }
    }

    /// Whether the channel number falls in the valid 0x4000-0x7FFF range
    pub fn has_valid_number(&self) -> bool {
        (CHANNEL_NUMBER_MIN..=CHANNEL_NUMBER_MAX).contains(&self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_randomness() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_transaction_id_display_is_base64() {
        let tid = TransactionId::from_bytes([0u8; 12]);
        assert_eq!(tid.to_string(), "AAAAAAAAAAAAAAAA");
    }

    #[test]
    fn test_class_bits_round_trip() {
        for class in [
            MessageClass::Request,
            MessageClass::Indication,
            MessageClass::SuccessResponse,
            MessageClass::ErrorResponse,
        ] {
            assert_eq!(MessageClass::from_bits(class.bits()), class);
        }
    }

    #[test]
    fn test_method_wire_bits_round_trip() {
        for method in Method::ALL {
            let raw = method.wire_bits();
            assert_eq!(Method::code_from_wire(raw), method.code());
            assert_eq!(Method::from_code(Method::code_from_wire(raw)), Some(method));
        }
    }

    #[test]
    fn test_wire_bits_never_touch_class_positions() {
        for method in Method::ALL {
            assert_eq!(method.wire_bits() & CLASS_MASK, 0);
        }
    }

    #[test]
    fn test_first_duplicate_attribute_wins() {
        let mut msg = Message::new(MessageClass::Request, Method::Binding, TransactionId::new());
        msg.add_attribute(Attribute::username("first"));
        msg.add_attribute(Attribute::username("second"));
        assert_eq!(msg.username_attribute(), Some("first"));
    }

    #[test]
    fn test_channel_number_range() {
        assert!(ChannelDataFrame::new(0x4000, Bytes::new()).has_valid_number());
        assert!(ChannelDataFrame::new(0x7FFF, Bytes::new()).has_valid_number());
        assert!(!ChannelDataFrame::new(0x3FFF, Bytes::new()).has_valid_number());
        assert!(!ChannelDataFrame::new(0x8000, Bytes::new()).has_valid_number());
    }
}
