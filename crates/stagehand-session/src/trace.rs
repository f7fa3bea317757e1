//! Optional packet trace logging.

use serde::Deserialize;

fn default_max_hexdump_len() -> usize {
    256
}

/// Which directions get a `trace`-level line per packet group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PacketTrace {
    #[serde(default)]
    pub log_inbound: bool,
    #[serde(default)]
    pub log_outbound: bool,
    /// Hex dumps are cut after this many bytes.
    #[serde(default = "default_max_hexdump_len")]
    pub max_hexdump_len: usize,
}

impl Default for PacketTrace {
    fn default() -> Self {
        Self {
            log_inbound: false,
            log_outbound: false,
            max_hexdump_len: default_max_hexdump_len(),
        }
    }
}

/// Formats up to `max` bytes as space-separated hex, marking truncation.
pub fn hexdump(data: &[u8], max: usize) -> String {
    let shown = &data[..data.len().min(max)];
    let mut out: Vec<String> = shown.iter().map(|b| format!("{b:02x}")).collect();
    if data.len() > max {
        out.push(format!("... ({} more)", data.len() - max));
    }
    out.join(" ")
}
