use std::collections::VecDeque;

use crate::types::Notice;

/// Oldest notices are dropped once the host falls this far behind.
pub const MAX_PENDING_NOTICES: usize = 1_000;

/// Fire-and-forget delivery of player-facing messages.
pub trait Notifier {
    fn notify(&mut self, notice: Notice);
}

/// Bounded queue the host drains with `take_notices`.
///
/// Notices are best effort: they live on the heap only and are not carried
/// across upgrades.
#[derive(Debug, Default)]
pub struct NoticeQueue {
    pending: VecDeque<Notice>,
    dropped: u64,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self, limit: usize) -> Vec<Notice> {
        let n = limit.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Notifier for NoticeQueue {
    fn notify(&mut self, notice: Notice) {
        if self.pending.len() >= MAX_PENDING_NOTICES {
            self.pending.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
        self.pending.push_back(notice);
    }
}
