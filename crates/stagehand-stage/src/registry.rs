//! The channel's stage registry.
//!
//! Two lock tiers: the registry lock guards only which stages exist, and
//! each [`Stage`] guards its own internals. The registry lock is never
//! held while a stage method runs. Lookups clone the `Arc` out and let go.

use std::collections::HashMap;
use std::sync::Arc;

use stagehand_protocol::CharId;
use stagehand_protocol::packets::StageDestruct;
use stagehand_session::Outbox;
use tokio::sync::RwLock;

use crate::{Stage, StageConfig, StageError, StageInfo};

/// All stages on one channel, keyed by stage ID.
#[derive(Debug)]
pub struct StageRegistry {
    stages: RwLock<HashMap<String, Arc<Stage>>>,
    config: StageConfig,
}

impl StageRegistry {
    /// Creates a registry holding the configured preset stages.
    pub fn new(config: StageConfig) -> Self {
        let stages = config
            .preset_stages
            .iter()
            .map(|id| {
                let stage = Stage::new(
                    id.clone(),
                    config.default_max_players,
                    config.object_pool_size,
                );
                (id.clone(), Arc::new(stage))
            })
            .collect();
        Self {
            stages: RwLock::new(stages),
            config,
        }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Registers a new empty stage.
    ///
    /// `max_players` of 0 uses the configured default.
    ///
    /// # Errors
    /// [`StageError::AlreadyExists`] if the ID is taken. Existing stages
    /// are never overwritten.
    pub async fn create(
        &self,
        id: &str,
        max_players: u16,
    ) -> Result<Arc<Stage>, StageError> {
        let mut stages = self.stages.write().await;
        if stages.contains_key(id) {
            return Err(StageError::AlreadyExists(id.to_string()));
        }
        let stage = Arc::new(self.new_stage(id, max_players));
        stages.insert(id.to_string(), Arc::clone(&stage));
        tracing::info!(stage_id = %id, max_players, "stage created");
        Ok(stage)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Stage>> {
        self.stages.read().await.get(id).cloned()
    }

    /// Looks up a stage, re-creating it empty if it is gone.
    ///
    /// Clients sometimes move to a stage the server no longer has. The
    /// transfer goes ahead on a fresh stage, and the re-creation is
    /// logged at `warn` so the lifecycle gap stays visible.
    pub async fn get_or_recreate(&self, id: &str) -> Arc<Stage> {
        if let Some(stage) = self.get(id).await {
            return stage;
        }
        let mut stages = self.stages.write().await;
        // Another session may have re-created it while we waited.
        if let Some(stage) = stages.get(id) {
            return Arc::clone(stage);
        }
        tracing::warn!(stage_id = %id, "stage missing on transfer, re-creating");
        let stage = Arc::new(self.new_stage(id, 0));
        stages.insert(id.to_string(), Arc::clone(&stage));
        stage
    }

    /// Removes a stage, sending `STAGE_DESTRUCT` to every character that
    /// still holds a reservation in it.
    ///
    /// `lookup` maps a character to its session's outbox. Characters it
    /// can't find are skipped.
    pub async fn destroy<F>(
        &self,
        id: &str,
        lookup: F,
    ) -> Result<Arc<Stage>, StageError>
    where
        F: Fn(CharId) -> Option<Outbox>,
    {
        let stage = self
            .stages
            .write()
            .await
            .remove(id)
            .ok_or_else(|| StageError::NotFound(id.to_string()))?;

        let mut notified = 0;
        for char_id in stage.reserved_chars(None).await {
            if let Some(outbox) = lookup(char_id) {
                if outbox.try_send_packet(&StageDestruct) {
                    notified += 1;
                }
            }
        }
        tracing::info!(stage_id = %id, notified, "stage destroyed");
        Ok(stage)
    }

    /// Summaries of the stages a client may see in a listing.
    ///
    /// A stage is listed when its ID contains `prefix`, it has at least
    /// one reservation or member, and it hasn't departed. Sorted by ID.
    pub async fn enumerate(&self, prefix: &str) -> Vec<StageInfo> {
        let candidates: Vec<Arc<Stage>> = {
            let stages = self.stages.read().await;
            stages
                .iter()
                .filter(|(id, _)| id.contains(prefix))
                .map(|(_, stage)| Arc::clone(stage))
                .collect()
        };

        let mut infos = Vec::with_capacity(candidates.len());
        for stage in candidates {
            let info = stage.info().await;
            if (info.reserved > 0 || info.members > 0) && !info.departed {
                infos.push(info);
            }
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Drops `char_id`'s reservation in every stage. Used on disconnect.
    ///
    /// Returns how many reservations were dropped.
    pub async fn unreserve_everywhere(&self, char_id: CharId) -> usize {
        let stages: Vec<Arc<Stage>> =
            self.stages.read().await.values().cloned().collect();
        let mut dropped = 0;
        for stage in stages {
            if stage.unreserve(char_id).await {
                tracing::debug!(stage_id = %stage.id(), %char_id, "reservation dropped");
                dropped += 1;
            }
        }
        dropped
    }

    pub async fn len(&self) -> usize {
        self.stages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.stages.read().await.is_empty()
    }

    /// All registered stage IDs, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> =
            self.stages.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn new_stage(&self, id: &str, max_players: u16) -> Stage {
        let max_players = match max_players {
            0 => self.config.default_max_players,
            n => n,
        };
        Stage::new(id, max_players, self.config.object_pool_size)
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new(StageConfig::default())
    }
}
