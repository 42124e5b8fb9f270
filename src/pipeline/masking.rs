//! NAT-address masking across the proxy trust boundary
//!
//! Peer and relay addresses crossing the proxy are XORed with a configured
//! 48-bit mask so intermediaries on the far side never see the real values.
//! XOR is self-inverse: applying the stage twice with the same mask recovers
//! the original address and port.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tracing::trace;

use super::ProxyStage;
use crate::config::MaskingConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::proto::attribute::AttributeValue;
use crate::proto::message::Message;

/// 48-bit mask split into its address and port halves
///
/// The 32-bit half applies directly to IPv4 addresses and is tiled 4x over
/// IPv6's 16 bytes; the low 16 bits mask the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressMask {
    addr: u32,
    port: u16,
}

impl AddressMask {
    /// Split a 48-bit mask value; the top 16 bits must be zero
    pub fn from_mask48(mask: u64) -> ProxyResult<Self> {
        if mask >> 48 != 0 {
            return Err(ProxyError::Configuration(format!(
                "address mask 0x{:X} exceeds 48 bits",
                mask
            )));
        }
        Ok(Self {
            addr: (mask >> 16) as u32,
            port: mask as u16,
        })
    }

    /// Apply the mask to an address and port
    pub fn apply(&self, addr: SocketAddr) -> SocketAddr {
        let port = addr.port() ^ self.port;
        let ip = match addr.ip() {
            IpAddr::V4(v4) => {
                let masked = u32::from(v4) ^ self.addr;
                IpAddr::V4(Ipv4Addr::from(masked))
            }
            IpAddr::V6(v6) => {
                let mut octets = v6.octets();
                let mask = self.addr.to_be_bytes();
                for (i, octet) in octets.iter_mut().enumerate() {
                    *octet ^= mask[i % 4];
                }
                IpAddr::V6(Ipv6Addr::from(octets))
            }
        };
        SocketAddr::new(ip, port)
    }
}

/// Pipeline stage masking XOR-PEER-ADDRESS (inbound) and XOR-RELAYED-ADDRESS
/// (outbound) attributes
///
/// Holds only immutable configuration; safe to share read-only across all
/// connections.
pub struct AddressMaskingStage {
    mask: AddressMask,
}

impl AddressMaskingStage {
    /// Create a stage with the given mask
    pub fn new(mask: AddressMask) -> Self {
        Self { mask }
    }

    /// Create a stage from configuration
    pub fn from_config(config: &MaskingConfig) -> ProxyResult<Self> {
        Ok(Self::new(AddressMask::from_mask48(config.mask)?))
    }

    fn finish(&self, message: &mut Message, masked: usize) {
        if masked > 0 {
            message.mark_modified();
            trace!(tid = %message.transaction_id, masked, "masked relay-boundary addresses");
        }
    }
}

impl ProxyStage for AddressMaskingStage {
    fn process_inbound(&self, message: &mut Message) {
        let mut masked = 0usize;
        for attr in &mut message.attributes {
            if let AttributeValue::XorPeerAddress(addr) = attr.value_mut() {
                *addr = self.mask.apply(*addr);
                masked += 1;
            }
        }
        self.finish(message, masked);
    }

    fn process_outbound(&self, message: &mut Message) {
        let mut masked = 0usize;
        for attr in &mut message.attributes {
            if let AttributeValue::XorRelayedAddress(addr) = attr.value_mut() {
                *addr = self.mask.apply(*addr);
                masked += 1;
            }
        }
        self.finish(message, masked);
    }
}
