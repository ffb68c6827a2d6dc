//! Fixed-capacity ring buffer of the most recent encoded plies.

use std::sync::Arc;

use crate::game_state::chess_rules::HISTORY_CAPACITY;
use crate::game_state::chess_types::ChessMove;
use crate::inputs::feature_planes::EncodedPosition;

/// One ply of history: the position reached, the move that reached it and
/// whether that position had already occurred.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub encoded: Arc<EncodedPosition>,
    pub mv: ChessMove,
    pub repeat: bool,
}

/// Overwrite-oldest ring buffer; `front` is the oldest slot.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    slots: [Option<HistoryEntry>; HISTORY_CAPACITY],
    front: usize,
    len: usize,
}

impl Default for PositionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionHistory {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            front: 0,
            len: 0,
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        HISTORY_CAPACITY
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.len < HISTORY_CAPACITY {
            let slot = (self.front + self.len) % HISTORY_CAPACITY;
            self.slots[slot] = Some(entry);
            self.len += 1;
        } else {
            self.slots[self.front] = Some(entry);
            self.front = (self.front + 1) % HISTORY_CAPACITY;
        }
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&HistoryEntry> {
        if self.len == 0 {
            return None;
        }
        self.slots[(self.front + self.len - 1) % HISTORY_CAPACITY].as_ref()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> + '_ {
        (0..self.len).filter_map(move |i| self.slots[(self.front + i) % HISTORY_CAPACITY].as_ref())
    }

    /// Newest to oldest.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.iter().rev()
    }

    pub fn moves(&self) -> Vec<ChessMove> {
        self.iter().map(|e| e.mv).collect()
    }
}
