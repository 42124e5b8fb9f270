use std::io;
use thiserror::Error;

/// Top-level error type for the relay-proxy engine
#[derive(Debug, Error)]
pub enum ProxyError {
    /// STUN/TURN protocol errors
    #[error("STUN error: {0}")]
    Stun(#[from] StunError),

    /// Network I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// STUN/TURN framing and attribute errors following RFC 5389 / RFC 5766
#[derive(Debug, Error)]
pub enum StunError {
    /// Leading bit pattern is neither STUN (00) nor ChannelData (01)
    #[error("Invalid leading bit pattern in byte 0x{0:02X}")]
    ProtocolViolation(u8),

    /// Invalid magic cookie
    #[error("Invalid magic cookie: expected 0x2112A442, got 0x{0:08X}")]
    InvalidMagicCookie(u32),

    /// Method code outside the supported set
    #[error("Unknown method code: 0x{0:03X}")]
    UnknownMethod(u16),

    /// Message parsing error
    #[error("Failed to parse STUN message: {0}")]
    ParseError(String),

    /// Attribute parsing error
    #[error("Failed to parse attribute 0x{attr_type:04X}: {reason}")]
    AttributeParseError { attr_type: u16, reason: String },

    /// Invalid address family
    #[error("Invalid address family: {0}")]
    InvalidAddressFamily(u8),

    /// Feature recognized but not supported in the active mode
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
