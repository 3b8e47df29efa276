//! Per-board cache of previously-scored dart masks (spec §3 `BoardCache`,
//! §9 "the only mutable long-lived state").
//!
//! Grounded on the teacher's `ResourceManager`: a registry guarded by
//! `parking_lot` locks, handles borrowed for the minimum necessary
//! scope, no async. Unlike `ResourceManager`'s LRU eviction, board
//! caches live until an explicit `clear_board` — turns are bounded (at
//! most 3 darts) so there is nothing to evict.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::motion::Mask;
use crate::types::{BoardId, CameraId};

/// Binary masks of every previously-scored dart in the current turn,
/// per camera, in scoring order.
#[derive(Debug, Default)]
struct BoardCacheEntry {
    prev_dart_masks_by_camera: HashMap<CameraId, Vec<Arc<Mask>>>,
}

impl BoardCacheEntry {
    fn masks_for(&self, camera_id: &str) -> &[Arc<Mask>] {
        self.prev_dart_masks_by_camera
            .get(camera_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn add_mask(&mut self, camera_id: &str, mask: Arc<Mask>) {
        self.prev_dart_masks_by_camera
            .entry(camera_id.to_string())
            .or_default()
            .push(mask);
    }

    fn dart_count(&self, camera_id: &str) -> usize {
        self.prev_dart_masks_by_camera
            .get(camera_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    fn clear(&mut self) {
        self.prev_dart_masks_by_camera.clear();
    }
}

/// Registry of board caches, keyed by `board_id`. One exclusive guard
/// per board (spec §5 "each board cache has an exclusive guard covering
/// both read and write"); distinct boards never contend with each other
/// because the outer `RwLock` is held only long enough to look up or
/// insert the per-board entry, never across a whole `detect` call.
#[derive(Debug, Default)]
pub struct BoardCacheRegistry {
    boards: RwLock<HashMap<BoardId, Arc<RwLock<BoardCacheEntry>>>>,
}

impl BoardCacheRegistry {
    pub fn new() -> Self {
        BoardCacheRegistry::default()
    }

    fn entry(&self, board_id: &str) -> Arc<RwLock<BoardCacheEntry>> {
        if let Some(e) = self.boards.read().get(board_id) {
            return Arc::clone(e);
        }
        let mut w = self.boards.write();
        Arc::clone(
            w.entry(board_id.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(BoardCacheEntry::default()))),
        )
    }

    /// Returns the masks of every previously-scored dart on this board's
    /// camera this turn. Unrecognized `board_id` lazily creates a fresh
    /// (empty) cache, per spec §4.1 error semantics.
    pub fn masks_for(&self, board_id: &str, camera_id: &str) -> Vec<Arc<Mask>> {
        self.entry(board_id).read().masks_for(camera_id).to_vec()
    }

    /// Stores a newly-scored dart's mask under `(board_id, camera_id)`.
    pub fn add_mask(&self, board_id: &str, camera_id: &str, mask: Arc<Mask>) {
        self.entry(board_id).write().add_mask(camera_id, mask);
    }

    pub fn dart_count(&self, board_id: &str, camera_id: &str) -> usize {
        self.entry(board_id).read().dart_count(camera_id)
    }

    /// Resets `board_id`'s cache, creating the entry if absent.
    /// Idempotent (spec §8).
    pub fn init_board(&self, board_id: &str) {
        let entry = self.entry(board_id);
        entry.write().clear();
    }

    /// Removes `board_id`'s cache entirely. Idempotent (spec §8).
    pub fn clear_board(&self, board_id: &str) {
        self.boards.write().remove(board_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::Mask;

    fn mask(w: u32, h: u32) -> Arc<Mask> {
        Arc::new(Mask::empty(w, h))
    }

    #[test]
    fn isolation_between_boards() {
        let reg = BoardCacheRegistry::new();
        reg.add_mask("board_a", "cam0", mask(4, 4));
        assert_eq!(reg.dart_count("board_a", "cam0"), 1);
        assert_eq!(reg.dart_count("board_b", "cam0"), 0);
    }

    #[test]
    fn clear_board_is_idempotent() {
        let reg = BoardCacheRegistry::new();
        reg.add_mask("board_a", "cam0", mask(4, 4));
        reg.clear_board("board_a");
        assert_eq!(reg.dart_count("board_a", "cam0"), 0);
        // second clear on an already-absent board is a no-op, not an error.
        reg.clear_board("board_a");
        assert_eq!(reg.dart_count("board_a", "cam0"), 0);
    }

    #[test]
    fn init_board_resets_without_removing() {
        let reg = BoardCacheRegistry::new();
        reg.add_mask("board_a", "cam0", mask(4, 4));
        reg.init_board("board_a");
        assert_eq!(reg.dart_count("board_a", "cam0"), 0);
        reg.init_board("board_a");
        assert_eq!(reg.dart_count("board_a", "cam0"), 0);
    }

    #[test]
    fn masks_accumulate_per_camera() {
        let reg = BoardCacheRegistry::new();
        reg.add_mask("board_a", "cam0", mask(4, 4));
        reg.add_mask("board_a", "cam0", mask(4, 4));
        reg.add_mask("board_a", "cam1", mask(4, 4));
        assert_eq!(reg.dart_count("board_a", "cam0"), 2);
        assert_eq!(reg.dart_count("board_a", "cam1"), 1);
    }
}
