//! Stage navigation history for `BACK_STAGE`.

use crate::SessionError;

/// A LIFO stack of stage IDs the session has moved away from.
#[derive(Debug, Clone, Default)]
pub struct MoveStack {
    stages: Vec<String>,
}

impl MoveStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage_id: impl Into<String>) {
        self.stages.push(stage_id.into());
    }

    /// Pops the most recent stage.
    ///
    /// # Errors
    /// [`SessionError::EmptyMoveStack`] when there is nothing to go back to.
    pub fn pop(&mut self) -> Result<String, SessionError> {
        self.stages.pop().ok_or(SessionError::EmptyMoveStack)
    }

    #[cfg(test)]
    pub(crate) fn peek(&self) -> Option<&str> {
        self.stages.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
