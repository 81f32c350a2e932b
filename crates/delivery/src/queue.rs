//! Dual-lane delivery queue
//!
//! Plain data structure; the channel wraps it in a lock and owns event
//! emission. The normal lane is bounded drop-newest; the priority lane
//! ignores the bound and goes ahead of every normal entry while staying
//! FIFO among itself, so operational series get through in order even
//! when a destination is backed up.

use std::collections::VecDeque;

use metro_protocol::QueueEntry;

/// What happened to a normal-lane push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    /// Entry accepted
    Queued,
    /// Entry dropped at the bound; `first_of_episode` is true only for the
    /// first drop since the queue was last below the low watermark
    Dropped { first_of_episode: bool },
}

#[derive(Debug)]
pub(crate) struct DeliveryQueue {
    entries: VecDeque<QueueEntry>,
    max_size: usize,
    low_watermark: usize,
    /// True from the first drop until the queue drains below the watermark
    full_episode: bool,
    /// Entries at the front still belonging to the priority lane
    priority_pending: usize,
    dropped_total: u64,
}

impl DeliveryQueue {
    pub(crate) fn new(max_size: usize, low_watermark: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_size,
            low_watermark,
            full_episode: false,
            priority_pending: 0,
            dropped_total: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    /// Push on the normal lane, dropping the newest entry at the bound
    pub(crate) fn push(&mut self, entry: QueueEntry) -> PushOutcome {
        if self.entries.len() >= self.max_size {
            self.dropped_total += 1;
            let first = !self.full_episode;
            self.full_episode = true;
            return PushOutcome::Dropped {
                first_of_episode: first,
            };
        }
        self.entries.push_back(entry);
        PushOutcome::Queued
    }

    /// Push on the priority lane, exempt from the bound
    ///
    /// Inserts behind pending priority entries but ahead of every normal
    /// one, so the lane stays FIFO among itself.
    pub(crate) fn push_priority(&mut self, entry: QueueEntry) {
        self.entries.insert(self.priority_pending, entry);
        self.priority_pending += 1;
    }

    /// Put a failed batch back at the head, preserving its order
    ///
    /// The batch was popped from the head, so it precedes anything queued
    /// since, priority entries included.
    pub(crate) fn requeue_front(&mut self, batch: Vec<QueueEntry>) {
        self.priority_pending += batch.len();
        for entry in batch.into_iter().rev() {
            self.entries.push_front(entry);
        }
    }

    /// Pop up to `max` entries FIFO
    ///
    /// Returns the batch and whether this pop ended a full episode by
    /// draining below the low watermark.
    pub(crate) fn pop_batch(&mut self, max: usize) -> (Vec<QueueEntry>, bool) {
        let take = max.min(self.entries.len());
        let batch: Vec<QueueEntry> = self.entries.drain(..take).collect();
        self.priority_pending = self.priority_pending.saturating_sub(take);

        let episode_ended = self.full_episode && self.entries.len() < self.low_watermark;
        if episode_ended {
            self.full_episode = false;
        }
        (batch, episode_ended)
    }
}
