//! Semaphores: capacity-bounded reservations keyed by string ID.
//!
//! Semaphores live beside stages, not inside them. The client uses them
//! to gate special events, such as a raid that only so many hunters may
//! join at once.
//!
//! Each semaphore has two IDs:
//!
//! - the **name** the client sends (`"hs_l0u3B51J9k3"`), used as the
//!   registry key
//! - the **wire ID**, a `u32` the server hands back in acks and the
//!   client later uses to delete it
//!
//! Well-known semaphores (names starting with the configured prefix)
//! get a large capacity and a fixed wire ID derived from their last
//! digit. When the last holder leaves one, the registry fires the
//! drained hook so the event state can be reset.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use stagehand_protocol::CharId;
use tokio::sync::{Mutex, RwLock};

use crate::SemaphoreConfig;

/// Called with the semaphore name when a well-known semaphore empties.
pub type DrainedHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Result of [`SemaphoreRegistry::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// A new slot was taken.
    Acquired,
    /// The character already held a slot.
    AlreadyHeld,
    /// No slots left.
    Full,
}

// ---------------------------------------------------------------------------
// Semaphore
// ---------------------------------------------------------------------------

/// One semaphore and its holders.
#[derive(Debug)]
pub struct Semaphore {
    name: String,
    wire_id: u32,
    capacity: u16,
    well_known: bool,
    holders: Mutex<HashSet<CharId>>,
}

impl Semaphore {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wire_id(&self) -> u32 {
        self.wire_id
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn is_well_known(&self) -> bool {
        self.well_known
    }

    pub async fn holder_count(&self) -> usize {
        self.holders.lock().await.len()
    }

    pub async fn is_held_by(&self, char_id: CharId) -> bool {
        self.holders.lock().await.contains(&char_id)
    }

    async fn try_acquire(&self, char_id: CharId) -> AcquireOutcome {
        let mut holders = self.holders.lock().await;
        if holders.contains(&char_id) {
            AcquireOutcome::AlreadyHeld
        } else if holders.len() < usize::from(self.capacity) {
            holders.insert(char_id);
            AcquireOutcome::Acquired
        } else {
            AcquireOutcome::Full
        }
    }

    /// Removes a holder. Returns `Some(now_empty)` if it was one.
    async fn remove(&self, char_id: CharId) -> Option<bool> {
        let mut holders = self.holders.lock().await;
        holders.remove(&char_id).then(|| holders.is_empty())
    }
}

// ---------------------------------------------------------------------------
// SemaphoreRegistry
// ---------------------------------------------------------------------------

/// All semaphores on one channel, keyed by name.
///
/// Same two-tier locking as the stage registry: the map lock is only held
/// to find or insert a semaphore, never while its holders are touched.
pub struct SemaphoreRegistry {
    semaphores: RwLock<HashMap<String, Arc<Semaphore>>>,
    next_wire_id: AtomicU32,
    config: SemaphoreConfig,
    on_drained: DrainedHook,
}

impl fmt::Debug for SemaphoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemaphoreRegistry")
            .field("next_wire_id", &self.next_wire_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SemaphoreRegistry {
    /// Creates a registry whose drained hook just logs.
    pub fn new(config: SemaphoreConfig) -> Self {
        Self::with_drained_hook(
            config,
            Arc::new(|name: &str| {
                tracing::info!(semaphore = %name, "well-known semaphore drained");
            }),
        )
    }

    pub fn with_drained_hook(config: SemaphoreConfig, on_drained: DrainedHook) -> Self {
        Self {
            semaphores: RwLock::new(HashMap::new()),
            next_wire_id: AtomicU32::new(config.first_wire_id),
            config,
            on_drained,
        }
    }

    /// Takes a slot in the semaphore `name`, creating it if needed.
    ///
    /// Returns the semaphore alongside the outcome so the caller can ack
    /// with its wire ID.
    pub async fn acquire(
        &self,
        name: &str,
        char_id: CharId,
    ) -> (Arc<Semaphore>, AcquireOutcome) {
        let semaphore = self.get_or_create(name).await;
        let outcome = semaphore.try_acquire(char_id).await;
        tracing::debug!(semaphore = %name, %char_id, ?outcome, "semaphore acquire");
        (semaphore, outcome)
    }

    /// Takes a slot in an existing semaphore. `None` if there is no
    /// semaphore called `name`.
    pub async fn acquire_existing(
        &self,
        name: &str,
        char_id: CharId,
    ) -> Option<(Arc<Semaphore>, AcquireOutcome)> {
        let semaphore = self.get(name).await?;
        let outcome = semaphore.try_acquire(char_id).await;
        Some((semaphore, outcome))
    }

    /// Gives up `char_id`'s slot in `name`.
    ///
    /// Returns `true` if the character held one. Emptying a well-known
    /// semaphore fires the drained hook.
    pub async fn release(&self, name: &str, char_id: CharId) -> bool {
        match self.get(name).await {
            Some(semaphore) => self.release_from(&semaphore, char_id).await,
            None => false,
        }
    }

    /// Releases `char_id` from every semaphore. Used on disconnect.
    ///
    /// Returns how many slots were freed.
    pub async fn remove_character_from_all(&self, char_id: CharId) -> usize {
        let mut released = 0;
        for semaphore in self.snapshot().await {
            if self.release_from(&semaphore, char_id).await {
                released += 1;
            }
        }
        released
    }

    /// Removes every ordinary semaphore with no holders. Well-known
    /// semaphores stay registered. Returns how many were removed.
    pub async fn destroy_empty(&self) -> usize {
        let mut empty = Vec::new();
        for semaphore in self.snapshot().await {
            if !semaphore.well_known && semaphore.holder_count().await == 0 {
                empty.push(semaphore.name.clone());
            }
        }

        let mut semaphores = self.semaphores.write().await;
        let mut removed = 0;
        for name in empty {
            // Re-check under the map lock: someone may have acquired it
            // since the snapshot.
            let still_empty = match semaphores.get(&name) {
                Some(s) => s.holders.try_lock().is_ok_and(|h| h.is_empty()),
                None => false,
            };
            if still_empty {
                semaphores.remove(&name);
                tracing::debug!(semaphore = %name, "destroyed empty semaphore");
                removed += 1;
            }
        }
        removed
    }

    /// Handles a client delete by wire ID.
    ///
    /// Empty ordinary semaphores are cleaned up first. Then, if the ID
    /// names a well-known semaphore, `char_id` is released from it;
    /// otherwise the semaphore is removed outright. Returns `true` if a
    /// semaphore with this wire ID was found.
    pub async fn delete_by_wire_id(&self, wire_id: u32, char_id: CharId) -> bool {
        self.destroy_empty().await;

        let Some(semaphore) = self
            .snapshot()
            .await
            .into_iter()
            .find(|s| s.wire_id == wire_id)
        else {
            return false;
        };

        if semaphore.well_known {
            self.release_from(&semaphore, char_id).await;
        } else {
            self.semaphores.write().await.remove(&semaphore.name);
            tracing::debug!(semaphore = %semaphore.name, wire_id, "deleted semaphore");
        }
        true
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Semaphore>> {
        self.semaphores.read().await.get(name).cloned()
    }

    /// Whether a semaphore called `name` exists.
    pub async fn check(&self, name: &str) -> bool {
        self.semaphores.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.semaphores.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.semaphores.read().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<Arc<Semaphore>> {
        self.semaphores.read().await.values().cloned().collect()
    }

    async fn get_or_create(&self, name: &str) -> Arc<Semaphore> {
        if let Some(semaphore) = self.get(name).await {
            return semaphore;
        }
        let mut semaphores = self.semaphores.write().await;
        if let Some(semaphore) = semaphores.get(name) {
            return Arc::clone(semaphore);
        }

        let well_known = self.config.is_well_known(name);
        let (capacity, wire_id) = if well_known {
            (self.config.well_known_capacity, self.well_known_wire_id(name))
        } else {
            (
                self.config.default_capacity,
                self.next_wire_id.fetch_add(1, Ordering::Relaxed),
            )
        };
        let semaphore = Arc::new(Semaphore {
            name: name.to_string(),
            wire_id,
            capacity,
            well_known,
            holders: Mutex::new(HashSet::new()),
        });
        semaphores.insert(name.to_string(), Arc::clone(&semaphore));
        tracing::debug!(semaphore = %name, wire_id, capacity, "semaphore created");
        semaphore
    }

    /// Last digit of the name plus one. Names that don't end in a digit
    /// fall back to the counter.
    fn well_known_wire_id(&self, name: &str) -> u32 {
        match name.chars().last().and_then(|c| c.to_digit(10)) {
            Some(digit) => digit + 1,
            None => self.next_wire_id.fetch_add(1, Ordering::Relaxed),
        }
    }

    async fn release_from(&self, semaphore: &Semaphore, char_id: CharId) -> bool {
        match semaphore.remove(char_id).await {
            Some(now_empty) => {
                if now_empty && semaphore.well_known {
                    (self.on_drained)(&semaphore.name);
                }
                true
            }
            None => false,
        }
    }
}

impl Default for SemaphoreRegistry {
    fn default() -> Self {
        Self::new(SemaphoreConfig::default())
    }
}
