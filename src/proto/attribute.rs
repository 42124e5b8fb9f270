//! STUN/TURN attribute codec (RFC 5389 Section 15, RFC 5766 Section 14)
//!
//! Decoding and encoding dispatch on the 16-bit type code, parameterized by
//! the credential mode. Unrecognized types fall through to an opaque variant
//! that preserves the raw value bytes verbatim, so extension attributes
//! re-encode byte-identically without the registry knowing them.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::message::TransactionId;
use super::MAGIC_COOKIE;
use crate::error::StunError;

/// MAPPED-ADDRESS attribute type
pub const MAPPED_ADDRESS: u16 = 0x0001;
/// USERNAME attribute type
pub const USERNAME: u16 = 0x0006;
/// MESSAGE-INTEGRITY attribute type
pub const MESSAGE_INTEGRITY: u16 = 0x0008;
/// ERROR-CODE attribute type
pub const ERROR_CODE: u16 = 0x0009;
/// XOR-PEER-ADDRESS attribute type (TURN)
pub const XOR_PEER_ADDRESS: u16 = 0x0012;
/// XOR-RELAYED-ADDRESS attribute type (TURN)
pub const XOR_RELAYED_ADDRESS: u16 = 0x0016;
/// EVEN-PORT attribute type (TURN)
pub const EVEN_PORT: u16 = 0x0018;
/// XOR-MAPPED-ADDRESS attribute type
pub const XOR_MAPPED_ADDRESS: u16 = 0x0020;
/// RESERVATION-TOKEN attribute type (TURN)
pub const RESERVATION_TOKEN: u16 = 0x0022;
/// FINGERPRINT attribute type
pub const FINGERPRINT: u16 = 0x8028;

/// Credential mode the registry operates under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    /// Short-term credentials (RFC 5389 Section 10.1)
    ShortTerm,
    /// Long-term credentials (RFC 5389 Section 10.2)
    LongTerm,
}

impl Default for CredentialMode {
    fn default() -> Self {
        Self::ShortTerm
    }
}

/// Decoded STUN attribute values
///
/// XOR address variants store the decoded (un-XORed) address and port; the
/// XOR transform is re-applied on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    MappedAddress(SocketAddr),
    XorMappedAddress(SocketAddr),
    XorPeerAddress(SocketAddr),
    XorRelayedAddress(SocketAddr),
    /// Raw EVEN-PORT octet; bit 7 is the reserve flag
    EvenPort(u8),
    /// 8-byte reservation token
    ReservationToken(Bytes),
    /// 20-byte HMAC-SHA1 value, carried opaquely (short-term mode only)
    MessageIntegrity(Bytes),
    Fingerprint(u32),
    Username(String),
    ErrorCode { code: u16, reason: String },
    /// Unrecognized type: raw value bytes preserved verbatim
    Opaque(Bytes),
}

impl AttributeValue {
    /// Reserve flag of an EVEN-PORT value
    pub fn even_port_reserve(&self) -> Option<bool> {
        match self {
            Self::EvenPort(octet) => Some(octet & 0x80 != 0),
            _ => None,
        }
    }
}

/// A single attribute: type code, decoded value, and the padding bytes
/// captured from the wire
///
/// Padding is kept exactly as read rather than assumed zero, since those
/// bytes may feed a later integrity calculation when the attribute is relayed
/// unmodified. Attributes constructed fresh carry no captured padding and are
/// zero-padded on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    raw_type: u16,
    value: AttributeValue,
    padding: Bytes,
}

impl Attribute {
    /// Create a fresh attribute (zero-filled padding on encode)
    pub fn new(raw_type: u16, value: AttributeValue) -> Self {
        Self {
            raw_type,
            value,
            padding: Bytes::new(),
        }
    }

    pub(crate) fn with_padding(raw_type: u16, value: AttributeValue, padding: Bytes) -> Self {
        Self {
            raw_type,
            value,
            padding,
        }
    }

    /// MAPPED-ADDRESS attribute
    pub fn mapped_address(addr: SocketAddr) -> Self {
        Self::new(MAPPED_ADDRESS, AttributeValue::MappedAddress(addr))
    }

    /// XOR-MAPPED-ADDRESS attribute
    pub fn xor_mapped_address(addr: SocketAddr) -> Self {
        Self::new(XOR_MAPPED_ADDRESS, AttributeValue::XorMappedAddress(addr))
    }

    /// XOR-PEER-ADDRESS attribute
    pub fn xor_peer_address(addr: SocketAddr) -> Self {
        Self::new(XOR_PEER_ADDRESS, AttributeValue::XorPeerAddress(addr))
    }

    /// XOR-RELAYED-ADDRESS attribute
    pub fn xor_relayed_address(addr: SocketAddr) -> Self {
        Self::new(XOR_RELAYED_ADDRESS, AttributeValue::XorRelayedAddress(addr))
    }

    /// USERNAME attribute
    pub fn username(name: &str) -> Self {
        Self::new(USERNAME, AttributeValue::Username(name.to_string()))
    }

    /// ERROR-CODE attribute
    pub fn error_code(code: u16, reason: &str) -> Self {
        Self::new(
            ERROR_CODE,
            AttributeValue::ErrorCode {
                code,
                reason: reason.to_string(),
            },
        )
    }

    /// Opaque pass-through attribute
    pub fn opaque(raw_type: u16, value: Bytes) -> Self {
        Self::new(raw_type, AttributeValue::Opaque(value))
    }

    /// The 16-bit attribute type code
    pub fn raw_type(&self) -> u16 {
        self.raw_type
    }

    /// Decoded value
    pub fn value(&self) -> &AttributeValue {
        &self.value
    }

    /// Mutable access for pipeline transforms
    pub fn value_mut(&mut self) -> &mut AttributeValue {
        &mut self.value
    }

    /// Padding bytes captured from the wire (0-3 bytes)
    pub fn padding(&self) -> &Bytes {
        &self.padding
    }
}

/// Externally registered codec for an extension attribute type
#[derive(Clone, Copy)]
pub struct ExtensionCodec {
    /// Decode the raw value bytes into an attribute value
    pub decode: fn(Bytes, &TransactionId) -> Result<AttributeValue, StunError>,
    /// Encode the attribute value back into wire bytes
    pub encode: fn(&AttributeValue, &mut BytesMut, &TransactionId),
}

/// Type-code dispatch table for attribute decode/encode, parameterized by
/// credential mode, with an extension point for caller-registered codecs
pub struct AttributeRegistry {
    mode: CredentialMode,
    extensions: HashMap<u16, ExtensionCodec>,
}

impl AttributeRegistry {
    /// Create a registry for the given credential mode
    pub fn new(mode: CredentialMode) -> Self {
        Self {
            mode,
            extensions: HashMap::new(),
        }
    }

    /// Active credential mode
    pub fn mode(&self) -> CredentialMode {
        self.mode
    }

    /// Register an extension codec for a type code, overriding the built-in
    /// handling for that code
    pub fn register(&mut self, raw_type: u16, codec: ExtensionCodec) {
        self.extensions.insert(raw_type, codec);
    }

    /// Decode the value bytes of one attribute
    pub fn decode_value(
        &self,
        raw_type: u16,
        value: Bytes,
        tid: &TransactionId,
    ) -> Result<AttributeValue, StunError> {
        if let Some(ext) = self.extensions.get(&raw_type) {
            return (ext.decode)(value, tid);
        }

        let mut buf = value;
        match raw_type {
            MAPPED_ADDRESS => Ok(AttributeValue::MappedAddress(decode_address(
                &mut buf, false, tid,
            )?)),
            XOR_MAPPED_ADDRESS => Ok(AttributeValue::XorMappedAddress(decode_address(
                &mut buf, true, tid,
            )?)),
            XOR_PEER_ADDRESS => Ok(AttributeValue::XorPeerAddress(decode_address(
                &mut buf, true, tid,
            )?)),
            XOR_RELAYED_ADDRESS => Ok(AttributeValue::XorRelayedAddress(decode_address(
                &mut buf, true, tid,
            )?)),
            EVEN_PORT => {
                if buf.remaining() != 1 {
                    return Err(attr_err(raw_type, "EVEN-PORT must be 1 byte"));
                }
                Ok(AttributeValue::EvenPort(buf.get_u8()))
            }
            RESERVATION_TOKEN => {
                if buf.remaining() != 8 {
                    return Err(attr_err(raw_type, "RESERVATION-TOKEN must be 8 bytes"));
                }
                Ok(AttributeValue::ReservationToken(buf))
            }
            MESSAGE_INTEGRITY => match self.mode {
                CredentialMode::ShortTerm => {
                    if buf.remaining() != 20 {
                        return Err(attr_err(raw_type, "MESSAGE-INTEGRITY must be 20 bytes"));
                    }
                    Ok(AttributeValue::MessageIntegrity(buf))
                }
                CredentialMode::LongTerm => Err(StunError::NotImplemented(
                    "MESSAGE-INTEGRITY under long-term credentials",
                )),
            },
            FINGERPRINT => {
                if buf.remaining() != 4 {
                    return Err(attr_err(raw_type, "FINGERPRINT must be 4 bytes"));
                }
                Ok(AttributeValue::Fingerprint(buf.get_u32()))
            }
            USERNAME => {
                let name = String::from_utf8(buf.to_vec())
                    .map_err(|e| attr_err(raw_type, &format!("invalid UTF-8: {}", e)))?;
                Ok(AttributeValue::Username(name))
            }
            ERROR_CODE => {
                if buf.remaining() < 4 {
                    return Err(attr_err(raw_type, "ERROR-CODE too short"));
                }
                buf.advance(2); // reserved
                let class = buf.get_u8() as u16;
                let number = buf.get_u8() as u16;
                let reason = String::from_utf8(buf.to_vec())
                    .map_err(|e| attr_err(raw_type, &format!("invalid reason: {}", e)))?;
                Ok(AttributeValue::ErrorCode {
                    code: class * 100 + number,
                    reason,
                })
            }
            _ => Ok(AttributeValue::Opaque(buf)),
        }
    }

    /// Encode one attribute value into `buf` (value bytes only, no header or
    /// padding)
    pub fn encode_value(
        &self,
        raw_type: u16,
        value: &AttributeValue,
        buf: &mut BytesMut,
        tid: &TransactionId,
    ) {
        if let Some(ext) = self.extensions.get(&raw_type) {
            (ext.encode)(value, buf, tid);
            return;
        }

        match value {
            AttributeValue::MappedAddress(addr) => encode_address(buf, addr, false, tid),
            AttributeValue::XorMappedAddress(addr)
            | AttributeValue::XorPeerAddress(addr)
            | AttributeValue::XorRelayedAddress(addr) => encode_address(buf, addr, true, tid),
            AttributeValue::EvenPort(octet) => buf.put_u8(*octet),
            AttributeValue::ReservationToken(token) => buf.put_slice(token),
            AttributeValue::MessageIntegrity(hash) => buf.put_slice(hash),
            AttributeValue::Fingerprint(crc) => buf.put_u32(*crc),
            AttributeValue::Username(name) => buf.put_slice(name.as_bytes()),
            AttributeValue::ErrorCode { code, reason } => {
                buf.put_u16(0); // reserved
                buf.put_u8((code / 100) as u8);
                buf.put_u8((code % 100) as u8);
                buf.put_slice(reason.as_bytes());
            }
            AttributeValue::Opaque(data) => buf.put_slice(data),
        }
    }
}

fn attr_err(attr_type: u16, reason: &str) -> StunError {
    StunError::AttributeParseError {
        attr_type,
        reason: reason.to_string(),
    }
}

/// Encode an address value: reserved octet, family, port, address bytes
/// (RFC 5389 Section 15.1/15.2)
fn encode_address(buf: &mut BytesMut, addr: &SocketAddr, xor: bool, tid: &TransactionId) {
    buf.put_u8(0); // reserved

    match addr {
        SocketAddr::V4(v4) => {
            buf.put_u8(0x01);
            let port = if xor {
                v4.port() ^ (MAGIC_COOKIE >> 16) as u16
            } else {
                v4.port()
            };
            buf.put_u16(port);

            let octets = v4.ip().octets();
            if xor {
                let magic = MAGIC_COOKIE.to_be_bytes();
                for i in 0..4 {
                    buf.put_u8(octets[i] ^ magic[i]);
                }
            } else {
                buf.put_slice(&octets);
            }
        }
        SocketAddr::V6(v6) => {
            buf.put_u8(0x02);
            let port = if xor {
                v6.port() ^ (MAGIC_COOKIE >> 16) as u16
            } else {
                v6.port()
            };
            buf.put_u16(port);

            let octets = v6.ip().octets();
            if xor {
                let magic = MAGIC_COOKIE.to_be_bytes();
                let tid_bytes = tid.as_bytes();
                for i in 0..4 {
                    buf.put_u8(octets[i] ^ magic[i]);
                }
                // Tail beyond the cookie is XORed with the transaction id
                for i in 0..12 {
                    buf.put_u8(octets[i + 4] ^ tid_bytes[i]);
                }
            } else {
                buf.put_slice(&octets);
            }
        }
    }
}

/// Decode an address value; the family octet selects 4 or 16 address bytes
fn decode_address(
    buf: &mut Bytes,
    xor: bool,
    tid: &TransactionId,
) -> Result<SocketAddr, StunError> {
    if buf.remaining() < 8 {
        return Err(StunError::ParseError("address attribute too short".into()));
    }

    buf.advance(1); // reserved
    let family = buf.get_u8();
    let raw_port = buf.get_u16();
    let port = if xor {
        raw_port ^ (MAGIC_COOKIE >> 16) as u16
    } else {
        raw_port
    };

    match family {
        0x01 => {
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);

            if xor {
                let magic = MAGIC_COOKIE.to_be_bytes();
                for i in 0..4 {
                    octets[i] ^= magic[i];
                }
            }

            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        0x02 => {
            if buf.remaining() < 16 {
                return Err(StunError::ParseError(
                    "IPv6 address attribute too short".into(),
                ));
            }

            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);

            if xor {
                let magic = MAGIC_COOKIE.to_be_bytes();
                let tid_bytes = tid.as_bytes();
                for i in 0..4 {
                    octets[i] ^= magic[i];
                }
                for i in 0..12 {
                    octets[i + 4] ^= tid_bytes[i];
                }
            }

            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        other => Err(StunError::InvalidAddressFamily(other)),
    }
}
