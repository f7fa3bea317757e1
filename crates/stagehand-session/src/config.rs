//! Session configuration.

use serde::Deserialize;

use crate::PacketTrace;

fn default_send_queue_capacity() -> usize {
    20
}

/// Per-session settings, shared by every connection.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Bound of the outbound queue. Direct replies wait for room;
    /// broadcasts are dropped when the queue is full.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,

    /// Optional per-packet trace logging.
    #[serde(default)]
    pub trace: PacketTrace,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: default_send_queue_capacity(),
            trace: PacketTrace::default(),
        }
    }
}
