//! Proxy-side message transforms
//!
//! Stages mutate decoded messages in place between the decoder and the
//! encoder. Every hook is synchronous and non-blocking; malformed input never
//! reaches a stage because the decoder already resolved it into an error
//! response.

pub mod masking;
pub mod username;

use std::sync::Arc;

use crate::proto::message::Message;

pub use masking::{AddressMask, AddressMaskingStage};
pub use username::TransactionUsernameStage;

/// A transform applied to decoded messages flowing through the proxy
pub trait ProxyStage: Send + Sync {
    /// Called for messages arriving from the relay/peer side
    fn process_inbound(&self, message: &mut Message);

    /// Called for messages heading to the client side, after processing
    fn process_outbound(&self, message: &mut Message);
}

/// Ordered composite of proxy stages
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn ProxyStage>>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage; stages run in registration order
    pub fn push(&mut self, stage: Arc<dyn ProxyStage>) {
        self.stages.push(stage);
    }

    /// Run all inbound hooks
    pub fn inbound(&self, message: &mut Message) {
        for stage in &self.stages {
            stage.process_inbound(message);
        }
    }

    /// Run all outbound hooks
    pub fn outbound(&self, message: &mut Message) {
        for stage in &self.stages {
            stage.process_outbound(message);
        }
    }
}
