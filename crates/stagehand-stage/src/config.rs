//! Stage and semaphore settings.
//!
//! Both structs deserialize from the `[stage]` and `[semaphore]` tables
//! of the channel config file. Every field has a default, so an empty
//! table (or no table at all) gives the stock behavior.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// StageConfig
// ---------------------------------------------------------------------------

/// Settings shared by every stage on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Reservation capacity for stages created without an explicit count.
    pub default_max_players: u16,

    /// Number of object ID slots per stage. Slot 0 is never handed out,
    /// so the usable IDs are `1..=object_pool_size`.
    pub object_pool_size: u8,

    /// Stages that exist from startup (town hubs and the like).
    pub preset_stages: Vec<String>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            default_max_players: 4,
            object_pool_size: 127,
            preset_stages: vec![
                "sl1Ns200p0a0u0".to_string(),
                "sl1Ns211p0a0u0".to_string(),
                "sl1Ns260p0a0u0".to_string(),
                "sl1Ns262p0a0u0".to_string(),
                "sl1Ns263p0a0u0".to_string(),
                "sl2Ns379p0a0u0".to_string(),
                "sl1Ns462p0a0u0".to_string(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// SemaphoreConfig
// ---------------------------------------------------------------------------

/// Settings for the semaphore registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SemaphoreConfig {
    /// Capacity of an ordinary semaphore.
    pub default_capacity: u16,

    /// IDs starting with this prefix are the well-known event semaphores.
    pub well_known_prefix: String,

    /// Capacity of a well-known semaphore.
    pub well_known_capacity: u16,

    /// First wire ID handed to an ordinary semaphore. Lower values are
    /// taken by the well-known ones.
    pub first_wire_id: u32,
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self {
            default_capacity: 1,
            well_known_prefix: "hs_l0u3B5".to_string(),
            well_known_capacity: 127,
            first_wire_id: 7,
        }
    }
}

impl SemaphoreConfig {
    /// Whether `id` names a well-known semaphore.
    pub fn is_well_known(&self, id: &str) -> bool {
        !self.well_known_prefix.is_empty() && id.starts_with(&self.well_known_prefix)
    }
}
