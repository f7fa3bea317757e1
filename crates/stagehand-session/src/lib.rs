//! Per-connection session support for Stagehand.
//!
//! This crate holds the pieces of a session that don't depend on stages:
//!
//! 1. **Outbound queue**: [`Outbox`] and [`run_send_loop`], the bounded
//!    queue every reply and broadcast goes through
//! 2. **Identity**: the [`Authenticator`] hook and the random [`LogKey`]
//! 3. **Navigation**: the [`MoveStack`] of previously visited stages
//! 4. **Lifecycle**: the [`SessionPhase`] state machine
//!
//! # How it fits in the stack
//!
//! ```text
//! Channel server (above)  ← owns Session, dispatches packets
//!     ↕
//! Stage layer             ← holds an Outbox per member for broadcasts
//!     ↕
//! Session support (this crate)
//!     ↕
//! Protocol / Transport (below)
//! ```

mod auth;
mod config;
mod error;
mod log_key;
mod move_stack;
mod outbox;
mod session;
mod trace;

pub use auth::{Authenticator, CharacterProfile, TrustingAuthenticator};
pub use config::SessionConfig;
pub use error::SessionError;
pub use log_key::LogKey;
pub use move_stack::MoveStack;
pub use outbox::{Outbound, Outbox, run_send_loop};
pub use session::SessionPhase;
pub use trace::{PacketTrace, hexdump};
