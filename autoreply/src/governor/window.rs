//! Exact sliding-window counter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamp log of events inside a rolling window. Each entry carries the
/// id of the reservation that created it so it can be released again.
#[derive(Debug)]
pub(crate) struct SlidingWindow {
    span: Duration,
    entries: VecDeque<(u64, Instant)>,
}

impl SlidingWindow {
    pub(crate) fn new(span: Duration) -> Self {
        Self {
            span,
            entries: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&(_, at)) = self.entries.front() {
            if now.saturating_duration_since(at) >= self.span {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub(crate) fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.entries.len()
    }

    pub(crate) fn has_room(&mut self, now: Instant, cap: usize) -> bool {
        self.count(now) < cap
    }

    pub(crate) fn push(&mut self, id: u64, now: Instant) {
        self.entries.push_back((id, now));
    }

    pub(crate) fn release(&mut self, id: u64) {
        if let Some(pos) = self.entries.iter().rposition(|(entry, _)| *entry == id) {
            self.entries.remove(pos);
        }
    }

    pub(crate) fn is_empty(&mut self, now: Instant) -> bool {
        self.count(now) == 0
    }
}
