//! Turngate Protocol Library (lib.rs)
//!
//! TURN/STUN relay-proxy protocol engine: streaming decoder and encoder for
//! STUN messages and TURN ChannelData frames, with proxy-side NAT-address
//! masking and per-transaction username correlation.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core protocol modules
pub mod config;
pub mod error;
pub mod pipeline;
pub mod proto;
pub mod session;

// Re-export main types
pub use config::{MaskingConfig, ProxyConfig, UsernameCacheConfig};
pub use error::{ProxyError, ProxyResult, StunError};
pub use pipeline::{
    AddressMask, AddressMaskingStage, Pipeline, ProxyStage, TransactionUsernameStage,
};
pub use proto::{
    Attribute, AttributeRegistry, AttributeValue, ChannelDataFrame, CredentialMode, DecodeOutcome,
    FrameDecoder, FrameEncoder, Message, MessageClass, Method, TransactionId,
};
pub use session::{Outbound, RelayState, SessionContext};

/// Protocol engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging system with custom configuration
///
/// # Arguments
/// * `level` - Log level (trace/debug/info/warn/error)
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
        // Reduce verbosity of some dependencies
        .add_directive("tokio=warn".parse().unwrap())
        .add_directive("runtime=warn".parse().unwrap());

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(true),
        )
        .with(filter)
        .init();
}
