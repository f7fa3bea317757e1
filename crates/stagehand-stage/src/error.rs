//! Error types for the stage layer.

use stagehand_protocol::CharId;
use stagehand_session::SessionError;

/// Errors that can occur during stage and semaphore operations.
///
/// None of these close a connection. Handlers turn them into negative
/// acks and carry on.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// No stage with this ID is registered.
    #[error("stage {0} not found")]
    NotFound(String),

    /// A stage with this ID is already registered.
    #[error("stage {0} already exists")]
    AlreadyExists(String),

    /// Every reservation slot is taken.
    #[error("stage {stage_id} is full ({max_players} players)")]
    StageFull { stage_id: String, max_players: u16 },

    /// The stage is password protected and the caller's pass is wrong.
    #[error("wrong password for stage {0}")]
    PasswordMismatch(String),

    /// The character holds no reservation in this stage.
    #[error("{char_id} has no reservation in stage {stage_id}")]
    NotReserved { stage_id: String, char_id: CharId },

    /// All object ID slots of the stage are in use.
    #[error("object pool of stage {0} is exhausted")]
    ObjectPoolExhausted(String),

    /// No live object has this wire ID.
    #[error("object {obj_id} not found in stage {stage_id}")]
    ObjectNotFound { stage_id: String, obj_id: u32 },

    /// The object exists but belongs to another character.
    #[error("object {obj_id} is not owned by {char_id}")]
    ObjectNotOwned { obj_id: u32, char_id: CharId },

    /// No semaphore with this ID is registered.
    #[error("semaphore {0} not found")]
    SemaphoreNotFound(String),

    /// Every slot of the semaphore is held.
    #[error("semaphore {name} is full ({capacity} holders)")]
    SemaphoreFull { name: String, capacity: u16 },

    /// Delivering the join replay to the new member failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}
