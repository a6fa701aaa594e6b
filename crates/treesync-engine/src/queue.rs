//! Batched reconciliation action queue
//!
//! Event handlers do not reconcile directly; they enqueue one of four
//! action tags and move on. The queue collapses a tag that is already
//! pending, so a burst of a hundred file creations costs one add-nodes
//! pass instead of a hundred. A single consumer drains tags in FIFO order.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::{debug, warn};

/// The four kinds of reconciliation work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Persist and upload everything the working set gained
    AddNodes,
    /// Persist, watch, and mirror new watch roots
    AddWatchlist,
    /// Delete persisted nodes the working set no longer has
    DeleteNodes,
    /// Delete persisted roots the working set no longer has
    DeleteWatchlist,
}

impl Action {
    /// Stable name used in log output
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::AddNodes => "add-nodes",
            Action::AddWatchlist => "add-watchlist",
            Action::DeleteNodes => "delete-nodes",
            Action::DeleteWatchlist => "delete-watchlist",
        }
    }
}

/// Bounded FIFO of pending action tags with duplicate collapsing
pub struct ActionQueue {
    pending: Mutex<VecDeque<Action>>,
    notify: Notify,
    capacity: usize,
}

impl ActionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueues an action unless the same tag is already pending
    pub fn submit(&self, action: Action) {
        {
            let mut pending = self.lock();
            if pending.contains(&action) {
                debug!(action = action.as_str(), "Action already pending, collapsed");
                return;
            }
            if pending.len() >= self.capacity {
                // Cannot happen with four distinct tags unless capacity is
                // configured below 4; drop rather than block the handler
                warn!(action = action.as_str(), "Action queue full, dropping");
                return;
            }
            pending.push_back(action);
            debug!(action = action.as_str(), depth = pending.len(), "Action enqueued");
        }
        self.notify.notify_one();
    }

    /// Waits for and removes the oldest pending action
    pub async fn recv(&self) -> Action {
        loop {
            if let Some(action) = self.lock().pop_front() {
                return action;
            }
            self.notify.notified().await;
        }
    }

    /// Removes the oldest pending action without waiting
    pub fn try_recv(&self) -> Option<Action> {
        self.lock().pop_front()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Action>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = ActionQueue::new(16);
        queue.submit(Action::AddWatchlist);
        queue.submit(Action::AddNodes);

        assert_eq!(queue.try_recv(), Some(Action::AddWatchlist));
        assert_eq!(queue.try_recv(), Some(Action::AddNodes));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn test_duplicate_tags_collapse() {
        let queue = ActionQueue::new(16);
        queue.submit(Action::AddNodes);
        queue.submit(Action::AddNodes);
        queue.submit(Action::AddNodes);

        assert_eq!(queue.try_recv(), Some(Action::AddNodes));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn test_collapse_is_per_tag() {
        let queue = ActionQueue::new(16);
        queue.submit(Action::AddNodes);
        queue.submit(Action::DeleteNodes);
        queue.submit(Action::AddNodes);

        assert_eq!(queue.try_recv(), Some(Action::AddNodes));
        assert_eq!(queue.try_recv(), Some(Action::DeleteNodes));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn test_tag_can_requeue_after_drain() {
        let queue = ActionQueue::new(16);
        queue.submit(Action::AddNodes);
        assert_eq!(queue.try_recv(), Some(Action::AddNodes));

        queue.submit(Action::AddNodes);
        assert_eq!(queue.try_recv(), Some(Action::AddNodes));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_submit() {
        let queue = Arc::new(ActionQueue::new(16));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.submit(Action::DeleteWatchlist);

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, Action::DeleteWatchlist);
    }
}
