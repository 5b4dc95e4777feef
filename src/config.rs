//! Relay configuration from the environment.

use canvas::config::env_parse;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_MAX_FRAME_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub channel_capacity: usize,
    /// Inbound text frames larger than this are rejected.
    pub max_frame_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            channel_capacity: env_parse("RELAY_CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY).max(1),
            max_frame_bytes: env_parse("RELAY_MAX_FRAME_BYTES", DEFAULT_MAX_FRAME_BYTES),
        }
    }
}
