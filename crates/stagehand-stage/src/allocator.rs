//! Per-stage object ID pool.
//!
//! A stage hands out small integer slots to the dynamic objects its
//! members create. The slot number *is* the wire ID: the low byte carries
//! the slot and the upper three bytes stay zero, which is the layout the
//! client expects.
//!
//! ```text
//! wire id  0x00 00 00 7F
//!                      └─ slot 127
//! ```
//!
//! Allocation scans from the highest slot down and takes the first free
//! one. Slot 0 is never used. Freed slots are reused straight away, so a
//! character that leaves and a character that arrives right after will
//! see the same IDs.

use stagehand_protocol::CharId;

/// Fixed-size table of object slots, each either free or owned by a
/// character.
///
/// Not synchronized on its own. The owning [`Stage`](crate::Stage) keeps
/// it behind the stage lock.
#[derive(Debug, Clone)]
pub struct ObjectIdAllocator {
    /// Index 0 is the unused slot 0.
    owners: Vec<Option<CharId>>,
}

impl ObjectIdAllocator {
    /// Creates a pool with slots `1..=pool_size`.
    pub fn new(pool_size: u8) -> Self {
        Self {
            owners: vec![None; usize::from(pool_size) + 1],
        }
    }

    /// Number of usable slots.
    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.owners.len() - 1
    }

    /// Number of slots currently owned.
    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        self.owners.iter().filter(|o| o.is_some()).count()
    }

    /// Takes the highest free slot for `owner` and returns its wire ID.
    ///
    /// Returns `None` when every slot is taken.
    pub fn allocate(&mut self, owner: CharId) -> Option<u32> {
        let slot = (1..self.owners.len())
            .rev()
            .find(|&slot| self.owners[slot].is_none())?;
        self.owners[slot] = Some(owner);
        Some(slot as u32)
    }

    /// Frees one slot by wire ID. Returns `true` if it was owned.
    pub fn free(&mut self, obj_id: u32) -> bool {
        match self.slot_mut(obj_id) {
            Some(owner) => owner.take().is_some(),
            None => false,
        }
    }

    /// Frees every slot owned by `owner`. Returns how many were freed.
    pub fn recycle(&mut self, owner: CharId) -> usize {
        let mut freed = 0;
        for slot in self.owners.iter_mut().skip(1) {
            if *slot == Some(owner) {
                *slot = None;
                freed += 1;
            }
        }
        freed
    }

    /// The character owning `obj_id`, if the slot is in use.
    #[cfg(test)]
    pub(crate) fn owner_of(&self, obj_id: u32) -> Option<CharId> {
        let slot = Self::slot_index(obj_id)?;
        self.owners.get(slot).copied().flatten()
    }

    fn slot_mut(&mut self, obj_id: u32) -> Option<&mut Option<CharId>> {
        let slot = Self::slot_index(obj_id)?;
        self.owners.get_mut(slot)
    }

    /// Maps a wire ID back to a slot index. IDs with any upper byte set,
    /// and ID 0, do not belong to the pool.
    fn slot_index(obj_id: u32) -> Option<usize> {
        match obj_id {
            1..=0xFF => Some(obj_id as usize),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: CharId = CharId(1);
    const BOB: CharId = CharId(2);

    #[test]
    fn test_allocate_scans_from_high_end() {
        let mut pool = ObjectIdAllocator::new(127);

        assert_eq!(pool.allocate(ALICE), Some(127));
        assert_eq!(pool.allocate(ALICE), Some(126));
        assert_eq!(pool.allocate(BOB), Some(125));
        assert_eq!(pool.live_count(), 3);
    }

    #[test]
    fn test_allocate_exhausted_pool_returns_none() {
        let mut pool = ObjectIdAllocator::new(2);

        assert_eq!(pool.allocate(ALICE), Some(2));
        assert_eq!(pool.allocate(ALICE), Some(1));
        assert_eq!(pool.allocate(ALICE), None);
    }

    #[test]
    fn test_allocate_never_hands_out_slot_zero() {
        let mut pool = ObjectIdAllocator::new(1);

        assert_eq!(pool.allocate(ALICE), Some(1));
        assert_eq!(pool.allocate(ALICE), None);
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn test_recycle_frees_only_owner_slots() {
        let mut pool = ObjectIdAllocator::new(127);
        pool.allocate(ALICE);
        pool.allocate(BOB);
        pool.allocate(ALICE);

        assert_eq!(pool.recycle(ALICE), 2);
        assert_eq!(pool.owner_of(126), Some(BOB));
        assert_eq!(pool.allocate(BOB), Some(127));
    }

    #[test]
    fn test_free_releases_single_slot() {
        let mut pool = ObjectIdAllocator::new(127);
        let id = pool.allocate(ALICE).unwrap();

        assert!(pool.free(id));
        assert!(!pool.free(id));
        assert_eq!(pool.owner_of(id), None);
    }

    #[test]
    fn test_free_foreign_wire_id_is_ignored() {
        let mut pool = ObjectIdAllocator::new(127);

        assert!(!pool.free(0));
        assert!(!pool.free(0x0100_007F));
    }
}
