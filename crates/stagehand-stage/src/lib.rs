//! Stages and semaphores for the Stagehand channel server.
//!
//! Everything a channel shares between sessions lives here:
//!
//! - [`Stage`]: a named room of members, reservations, dynamic objects
//!   and opaque stage binaries
//! - [`ObjectIdAllocator`]: the per-stage pool of object wire IDs
//! - [`StageRegistry`]: every stage on the channel
//! - [`SemaphoreRegistry`]: capacity-bounded event reservations
//!
//! # Locking
//!
//! Registries and entities are locked separately. Always take them in
//! this order, never the reverse:
//!
//! ```text
//! registry lock → stage / semaphore lock → session lock
//! ```
//!
//! Registry locks are only held to look up, insert or remove an entry.
//! Stage methods snapshot what they need and release the stage lock
//! before queueing any packet.

mod allocator;
mod config;
mod error;
mod registry;
mod semaphore;
mod stage;

pub use allocator::ObjectIdAllocator;
pub use config::{SemaphoreConfig, StageConfig};
pub use error::StageError;
pub use registry::StageRegistry;
pub use semaphore::{AcquireOutcome, DrainedHook, Semaphore, SemaphoreRegistry};
pub use stage::{BinaryKey, ReserveOutcome, Stage, StageInfo, StageObject};
