//! Stateful stream decoder for STUN messages and TURN ChannelData frames
//!
//! One instance per connection. Input arrives in arbitrary chunks; the
//! decoder reassembles them in an internal buffer and attempts to decode
//! exactly one unit per call. Incomplete units consume nothing, so the
//! decoded result is independent of chunk boundaries.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use super::attribute::{Attribute, AttributeRegistry};
use super::message::{ChannelDataFrame, Message, MessageClass, Method, TransactionId};
use super::{padding_len, ATTR_HEADER_SIZE, CHANNEL_DATA_HEADER_SIZE, HEADER_SIZE, MAGIC_COOKIE};
use crate::error::{ProxyResult, StunError};
use crate::session::{RelayState, SessionContext};

/// Result of one decode attempt
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A complete STUN message
    Message(Message),
    /// A complete ChannelData frame
    ChannelData(ChannelDataFrame),
    /// Opaque bytes relayed without parsing (fast-relay mode)
    Passthrough(Bytes),
    /// Not enough bytes buffered for one unit; retry after the next arrival
    NeedMoreData,
}

/// Per-connection stream decoder
pub struct FrameDecoder {
    registry: Arc<AttributeRegistry>,
    buf: BytesMut,
}

impl FrameDecoder {
    /// Create a decoder backed by the given attribute registry
    pub fn new(registry: Arc<AttributeRegistry>) -> Self {
        Self {
            registry,
            buf: BytesMut::new(),
        }
    }

    /// Append a newly received chunk to the reassembly buffer
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes currently buffered and not yet consumed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Attempt to decode exactly one unit from the buffered bytes
    ///
    /// Once the session reports a completed TURN allocation the decoder stops
    /// interpreting bytes entirely and hands them through as an opaque slice.
    pub fn decode_next(&mut self, session: &SessionContext) -> ProxyResult<DecodeOutcome> {
        if session.relay_state() == RelayState::Allocated {
            if self.buf.is_empty() {
                return Ok(DecodeOutcome::NeedMoreData);
            }
            let passthrough = self.buf.split().freeze();
            trace!(conn = %session.id(), len = passthrough.len(), "fast-relay passthrough");
            return Ok(DecodeOutcome::Passthrough(passthrough));
        }

        let Some(&lead) = self.buf.first() else {
            return Ok(DecodeOutcome::NeedMoreData);
        };
        match lead & 0xC0 {
            0x00 => self.decode_stun(session),
            0x40 => self.decode_channel_data(session),
            _ => Err(StunError::ProtocolViolation(lead).into()),
        }
    }

    fn decode_stun(&mut self, session: &SessionContext) -> ProxyResult<DecodeOutcome> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(DecodeOutcome::NeedMoreData);
        }

        let raw_type = u16::from_be_bytes([self.buf[0], self.buf[1]]);
        let declared_len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        let cookie = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]);
        if cookie != MAGIC_COOKIE {
            return Err(StunError::InvalidMagicCookie(cookie).into());
        }

        if self.buf.len() < HEADER_SIZE + declared_len {
            trace!(
                conn = %session.id(),
                have = self.buf.len(),
                need = HEADER_SIZE + declared_len,
                "deferring incomplete STUN message"
            );
            return Ok(DecodeOutcome::NeedMoreData);
        }

        let unit = self.buf.split_to(HEADER_SIZE + declared_len).freeze();
        let mut tid_bytes = [0u8; 12];
        tid_bytes.copy_from_slice(&unit[8..HEADER_SIZE]);
        let tid = TransactionId::from_bytes(tid_bytes);

        let class = MessageClass::from_bits(raw_type);
        let method_code = Method::code_from_wire(raw_type);
        let method =
            Method::from_code(method_code).ok_or(StunError::UnknownMethod(method_code))?;

        let message = match self.decode_attributes(unit.slice(HEADER_SIZE..), &tid) {
            Ok(attributes) => {
                let mut message = Message::new(class, method, tid);
                message.attributes = attributes;
                message
            }
            // Unsupported-mode failures surface to the caller; everything
            // else is malformed input and resolves into an in-band 400.
            Err(StunError::NotImplemented(what)) => {
                return Err(StunError::NotImplemented(what).into())
            }
            Err(err) => {
                warn!(conn = %session.id(), %err, "malformed attribute data, answering 400");
                Message::bad_request(method, tid)
            }
        };

        debug!(
            conn = %session.id(),
            class = ?message.class,
            method = ?message.method,
            tid = %message.transaction_id,
            attrs = message.attributes.len(),
            "decoded STUN message"
        );
        Ok(DecodeOutcome::Message(message))
    }

    fn decode_attributes(
        &self,
        bytes: Bytes,
        tid: &TransactionId,
    ) -> Result<Vec<Attribute>, StunError> {
        let mut buf = bytes;
        let mut attributes = Vec::new();

        while buf.has_remaining() {
            if buf.remaining() < ATTR_HEADER_SIZE {
                return Err(StunError::ParseError("truncated attribute header".into()));
            }
            let raw_type = buf.get_u16();
            let len = buf.get_u16() as usize;
            if buf.remaining() < len {
                return Err(StunError::ParseError(
                    "attribute value overruns message length".into(),
                ));
            }

            let value = buf.copy_to_bytes(len);
            let decoded = self.registry.decode_value(raw_type, value, tid)?;

            let pad = padding_len(len);
            if buf.remaining() < pad {
                return Err(StunError::ParseError(
                    "attribute padding overruns message length".into(),
                ));
            }
            let padding = buf.copy_to_bytes(pad);

            attributes.push(Attribute::with_padding(raw_type, decoded, padding));
        }

        Ok(attributes)
    }

    fn decode_channel_data(&mut self, session: &SessionContext) -> ProxyResult<DecodeOutcome> {
        if self.buf.len() < CHANNEL_DATA_HEADER_SIZE {
            return Ok(DecodeOutcome::NeedMoreData);
        }

        let number = u16::from_be_bytes([self.buf[0], self.buf[1]]);
        let length = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        if self.buf.len() < CHANNEL_DATA_HEADER_SIZE + length {
            return Ok(DecodeOutcome::NeedMoreData);
        }

        let mut unit = self.buf.split_to(CHANNEL_DATA_HEADER_SIZE + length).freeze();
        unit.advance(CHANNEL_DATA_HEADER_SIZE);
        trace!(conn = %session.id(), channel = number, len = length, "decoded ChannelData frame");
        Ok(DecodeOutcome::ChannelData(ChannelDataFrame::new(number, unit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use crate::proto::attribute::{AttributeValue, CredentialMode};
    use bytes::BufMut;

    fn decoder() -> FrameDecoder {
        FrameDecoder::new(Arc::new(AttributeRegistry::new(CredentialMode::ShortTerm)))
    }

    fn stun_header(raw_type: u16, len: u16, tid: &TransactionId) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + len as usize);
        buf.put_u16(raw_type);
        buf.put_u16(len);
        buf.put_u32(MAGIC_COOKIE);
        buf.put_slice(tid.as_bytes());
        buf
    }

    #[test]
    fn test_binding_request_no_attributes() {
        let tid = TransactionId::new();
        let wire = stun_header(0x0001, 0, &tid);

        let mut dec = decoder();
        dec.push(&wire);
        let out = dec.decode_next(&SessionContext::new()).unwrap();
        match out {
            DecodeOutcome::Message(msg) => {
                assert_eq!(msg.class, MessageClass::Request);
                assert_eq!(msg.method, Method::Binding);
                assert_eq!(msg.transaction_id, tid);
                assert!(msg.attributes.is_empty());
            }
            other => panic!("expected message, got {:?}", other),
        }
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn test_channel_data_sliced_without_parsing() {
        let mut wire = BytesMut::new();
        wire.put_u16(0x4001);
        wire.put_u16(4);
        wire.put_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let mut dec = decoder();
        dec.push(&wire);
        let out = dec.decode_next(&SessionContext::new()).unwrap();
        match out {
            DecodeOutcome::ChannelData(frame) => {
                assert_eq!(frame.number, 0x4001);
                assert_eq!(frame.payload.as_ref(), &[0xDE, 0xAD, 0xBE, 0xEF]);
                assert!(frame.has_valid_number());
            }
            other => panic!("expected channel data, got {:?}", other),
        }
    }

    #[test]
    fn test_short_declared_length_defers() {
        let tid = TransactionId::new();
        // Declares an 8-byte attribute section but delivers only 4
        let mut wire = stun_header(0x0001, 8, &tid);
        wire.put_slice(&[0u8; 4]);

        let mut dec = decoder();
        dec.push(&wire);
        let session = SessionContext::new();
        assert!(matches!(
            dec.decode_next(&session).unwrap(),
            DecodeOutcome::NeedMoreData
        ));
        // Buffer untouched; completing the unit succeeds
        dec.push(&[0x80, 0x00, 0x00, 0x00]);
        assert!(matches!(
            dec.decode_next(&session).unwrap(),
            DecodeOutcome::Message(_)
        ));
    }

    #[test]
    fn test_invalid_leading_bits_fatal() {
        let mut dec = decoder();
        dec.push(&[0x80, 0x00]);
        let err = dec.decode_next(&SessionContext::new()).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Stun(StunError::ProtocolViolation(0x80))
        ));
    }

    #[test]
    fn test_bad_magic_cookie_fatal() {
        let tid = TransactionId::new();
        let mut wire = BytesMut::new();
        wire.put_u16(0x0001);
        wire.put_u16(0);
        wire.put_u32(0xDEADBEEF);
        wire.put_slice(tid.as_bytes());

        let mut dec = decoder();
        dec.push(&wire);
        let err = dec.decode_next(&SessionContext::new()).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Stun(StunError::InvalidMagicCookie(0xDEADBEEF))
        ));
    }

    #[test]
    fn test_attribute_overrun_synthesizes_400() {
        let tid = TransactionId::new();
        // Attribute declares 8 value bytes but the message length leaves 4
        let mut wire = stun_header(0x0001, 8, &tid);
        wire.put_u16(0x0006);
        wire.put_u16(8);
        wire.put_slice(&[0u8; 4]);

        let mut dec = decoder();
        dec.push(&wire);
        let out = dec.decode_next(&SessionContext::new()).unwrap();
        match out {
            DecodeOutcome::Message(msg) => {
                assert_eq!(msg.class, MessageClass::ErrorResponse);
                assert_eq!(msg.transaction_id, tid);
                match msg.attributes[0].value() {
                    AttributeValue::ErrorCode { code, reason } => {
                        assert_eq!(*code, 400);
                        assert_eq!(reason, "Bad Request");
                    }
                    other => panic!("expected error code, got {:?}", other),
                }
            }
            other => panic!("expected message, got {:?}", other),
        }
        // The malformed unit was consumed; the connection continues
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn test_fast_relay_passthrough() {
        let session = SessionContext::new();
        session.mark_allocated();

        let mut dec = decoder();
        dec.push(&[0x80, 0x01, 0x02, 0x03]); // would be fatal in full-parse mode
        match dec.decode_next(&session).unwrap() {
            DecodeOutcome::Passthrough(bytes) => {
                assert_eq!(bytes.as_ref(), &[0x80, 0x01, 0x02, 0x03]);
            }
            other => panic!("expected passthrough, got {:?}", other),
        }
        assert!(matches!(
            dec.decode_next(&session).unwrap(),
            DecodeOutcome::NeedMoreData
        ));
    }

    #[test]
    fn test_long_term_integrity_surfaces_not_implemented() {
        let tid = TransactionId::new();
        let mut wire = stun_header(0x0001, 24, &tid);
        wire.put_u16(0x0008);
        wire.put_u16(20);
        wire.put_slice(&[0u8; 20]);

        let mut dec = FrameDecoder::new(Arc::new(AttributeRegistry::new(CredentialMode::LongTerm)));
        dec.push(&wire);
        let err = dec.decode_next(&SessionContext::new()).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Stun(StunError::NotImplemented(_))
        ));
    }
}
