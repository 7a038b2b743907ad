//! Relay Configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Messages queued per connection before new ones are dropped
    pub outbound_buffer: usize,
    /// Largest inbound frame accepted (bytes)
    pub max_message_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 1000,
            // Signaling frames are small; the websocket default of 64MB is excessive
            max_message_size: 64 * 1024,
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.outbound_buffer == 0 {
            errors.push("relay.outbound_buffer must be greater than 0".to_string());
        }
        if self.max_message_size == 0 {
            errors.push("relay.max_message_size must be greater than 0".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
