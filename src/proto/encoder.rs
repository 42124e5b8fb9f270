//! Serializer producing exact RFC 5389 / RFC 5766 wire bytes
//!
//! The attribute-section length and each attribute's value length are written
//! as placeholders and backfilled after the value bytes are known, so lengths
//! are always derived and never stored redundantly.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::attribute::AttributeRegistry;
use super::message::{ChannelDataFrame, Message};
use super::{padding_len, CHANNEL_DATA_HEADER_SIZE, HEADER_SIZE, MAGIC_COOKIE};

/// Serializes messages and frames back to wire format
pub struct FrameEncoder {
    registry: Arc<AttributeRegistry>,
}

impl FrameEncoder {
    /// Create an encoder backed by the given attribute registry
    pub fn new(registry: Arc<AttributeRegistry>) -> Self {
        Self { registry }
    }

    /// Serialize a STUN message
    ///
    /// Attributes decoded from the wire replay their captured padding bytes;
    /// attributes constructed fresh are zero-padded.
    pub fn encode_message(&self, message: &Message) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + 64);

        buf.put_u16(message.method.wire_bits() | message.class.bits());
        buf.put_u16(0); // attribute-section length, backfilled below
        buf.put_u32(MAGIC_COOKIE);
        buf.put_slice(message.transaction_id.as_bytes());

        for attr in &message.attributes {
            let start = buf.len();
            buf.put_u16(attr.raw_type());
            buf.put_u16(0); // value length, backfilled below
            self.registry.encode_value(
                attr.raw_type(),
                attr.value(),
                &mut buf,
                &message.transaction_id,
            );

            let value_len = buf.len() - start - 4;
            buf[start + 2..start + 4].copy_from_slice(&(value_len as u16).to_be_bytes());

            let pad = padding_len(value_len);
            if attr.padding().len() == pad {
                buf.put_slice(attr.padding());
            } else {
                for _ in 0..pad {
                    buf.put_u8(0);
                }
            }
        }

        let section_len = buf.len() - HEADER_SIZE;
        buf[2..4].copy_from_slice(&(section_len as u16).to_be_bytes());

        buf.freeze()
    }

    /// Serialize a ChannelData frame
    pub fn encode_channel_data(&self, frame: &ChannelDataFrame) -> Bytes {
        let mut buf = BytesMut::with_capacity(CHANNEL_DATA_HEADER_SIZE + frame.payload.len());
        buf.put_u16(frame.number);
        buf.put_u16(frame.payload.len() as u16);
        buf.put_slice(&frame.payload);
        buf.freeze()
    }

    /// Relay an opaque slice unchanged (fast-relay path)
    pub fn encode_passthrough(&self, bytes: Bytes) -> Bytes {
        bytes
    }
}
