//! Multi-producer/multi-consumer FIFO of pending work with completion tracking.
//!
//! Every enqueued item must be dequeued exactly once and then marked done
//! exactly once. `join` returns only after the unfinished count reaches zero,
//! which is what lets the progress sink know that in-flight symbols are
//! finished and not merely dequeued.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct QueueState<T> {
    items: VecDeque<T>,
    unfinished: usize,
}

pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    all_done: Condvar,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                unfinished: 0,
            }),
            all_done: Condvar::new(),
        }
    }

    pub fn enqueue(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        state.items.push_back(item);
        state.unfinished += 1;
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        let mut state = self.state.lock().unwrap();
        for item in items {
            state.items.push_back(item);
            state.unfinished += 1;
        }
    }

    /// Non-blocking. `None` means the queue is empty right now.
    pub fn try_dequeue(&self) -> Option<T> {
        self.state.lock().unwrap().items.pop_front()
    }

    /// Record that one previously dequeued item has been fully handled.
    pub fn mark_done(&self) {
        let mut state = self.state.lock().unwrap();
        if state.unfinished == 0 {
            tracing::warn!("mark_done called more times than items were enqueued");
            return;
        }
        state.unfinished -= 1;
        if state.unfinished == 0 {
            self.all_done.notify_all();
        }
    }

    /// Block until every enqueued item has been marked done.
    pub fn join(&self) {
        let state = self.state.lock().unwrap();
        let _state = self
            .all_done
            .wait_while(state, |s| s.unfinished > 0)
            .unwrap();
    }

    /// Like [`join`](Self::join) with a deadline. Returns `true` when all
    /// items are done.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap();
        let (state, _) = self
            .all_done
            .wait_timeout_while(state, timeout, |s| s.unfinished > 0)
            .unwrap();
        state.unfinished == 0
    }

    /// Items waiting to be dequeued (in-flight items are not counted).
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items enqueued but not yet marked done.
    pub fn unfinished(&self) -> usize {
        self.state.lock().unwrap().unfinished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order() {
        let q = TaskQueue::new();
        q.extend(["A", "B", "C"]);
        assert_eq!(q.len(), 3);
        assert_eq!(q.try_dequeue(), Some("A"));
        assert_eq!(q.try_dequeue(), Some("B"));
        assert_eq!(q.try_dequeue(), Some("C"));
        assert_eq!(q.try_dequeue(), None);
        assert_eq!(q.unfinished(), 3);
    }

    #[test]
    fn join_on_empty_queue_returns_immediately() {
        let q: TaskQueue<u32> = TaskQueue::new();
        q.join();
        assert!(q.join_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn join_blocks_until_last_mark_done() {
        let q = Arc::new(TaskQueue::new());
        q.extend([1, 2, 3, 4, 5]);
        let joined = Arc::new(AtomicBool::new(false));

        let handle = {
            let q = q.clone();
            let joined = joined.clone();
            thread::spawn(move || {
                q.join();
                joined.store(true, Ordering::SeqCst);
            })
        };

        for _ in 0..5 {
            q.try_dequeue().unwrap();
        }
        for _ in 0..4 {
            q.mark_done();
        }
        assert_eq!(q.unfinished(), 1);
        thread::sleep(Duration::from_millis(50));
        assert!(!joined.load(Ordering::SeqCst), "join returned with one item outstanding");
        assert!(!q.join_timeout(Duration::from_millis(10)));

        q.mark_done();
        handle.join().unwrap();
        assert!(joined.load(Ordering::SeqCst));
    }

    #[test]
    fn extra_mark_done_is_ignored() {
        let q: TaskQueue<u32> = TaskQueue::new();
        q.mark_done();
        q.enqueue(1);
        assert_eq!(q.unfinished(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn every_item_dequeued_exactly_once(n in 0usize..400, consumers in 1usize..8) {
            let q = Arc::new(TaskQueue::new());
            q.extend(0..n);

            let handles: Vec<_> = (0..consumers)
                .map(|_| {
                    let q = q.clone();
                    thread::spawn(move || {
                        let mut seen = Vec::new();
                        while let Some(item) = q.try_dequeue() {
                            seen.push(item);
                            q.mark_done();
                        }
                        seen
                    })
                })
                .collect();

            let mut all = Vec::new();
            for h in handles {
                all.extend(h.join().unwrap());
            }
            q.join();

            let unique: HashSet<usize> = all.iter().copied().collect();
            prop_assert_eq!(all.len(), n);
            prop_assert_eq!(unique.len(), n);
            prop_assert_eq!(q.unfinished(), 0);
        }
    }
}
