//! # Stagehand
//!
//! The stage and session sync core of a game channel server.
//!
//! Clients connect over TCP, log in, and then move between *stages*:
//! named rooms with reservation slots, dynamic objects and opaque binary
//! blobs. The server keeps every member's view of its stage in sync by
//! replaying the stage on join and broadcasting each change.
//!
//! ## Layers
//!
//! ```text
//! stagehand            ← sessions, dispatch, handlers, server (this crate)
//! stagehand-stage      ← Stage, object IDs, semaphores, registries
//! stagehand-session    ← outbound queue, send loop, auth hook, log keys
//! stagehand-protocol   ← opcodes, packet layouts, acks
//! stagehand-transport  ← packet-group framing over TCP
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stagehand::prelude::*;
//!
//! # async fn run() -> Result<(), ChannelError> {
//! let config = ChannelConfig::load("stagehand.toml")?;
//! let server = ChannelServer::builder().config(config).start().await?;
//! println!("listening on {}", server.local_addr());
//! # Ok(())
//! # }
//! ```

mod config;
mod dispatch;
mod error;
pub mod handlers;
mod server;
mod session;
pub mod telemetry;

pub use config::{ChannelConfig, ConfigError, LoggingConfig};
pub use dispatch::{DispatchTable, GroupOutcome};
pub use error::ChannelError;
pub use server::{ChannelServer, ChannelServerBuilder, ServerState};
pub use session::{Session, SessionState};

/// Convenient imports for running a server.
pub mod prelude {
    pub use crate::{
        ChannelConfig, ChannelError, ChannelServer, ChannelServerBuilder,
        ServerState, Session,
    };
    pub use stagehand_protocol::{Ack, CharId, ClientContext, Opcode};
    pub use stagehand_session::{
        Authenticator, CharacterProfile, SessionError, TrustingAuthenticator,
    };
    pub use stagehand_stage::{StageConfig, StageError, SemaphoreConfig};
    pub use stagehand_transport::{Cipher, NullCipher};
}
