//! Single-flight FIFO command queue.
//!
//! Any thread may push. Draining is guarded by an atomic flag checked before the state lock is
//! taken, so a producer that finds a drain in progress returns at once and leaves its command to
//! the active drainer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A queued item tagged with its position in arrival order.
#[derive(Debug)]
pub struct Queued<T> {
    pub seq: u64,
    pub item: T,
}

#[derive(Debug)]
struct Pending<T> {
    next_seq: u64,
    items: VecDeque<Queued<T>>,
}

impl<T> Pending<T> {
    fn append(&mut self, item: T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push_back(Queued { seq, item });
        seq
    }
}

#[derive(Debug)]
pub struct CommandQueue<T> {
    pending: Mutex<Pending<T>>,
    draining: AtomicBool,
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> CommandQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Pending {
                next_seq: 0,
                items: VecDeque::new(),
            }),
            draining: AtomicBool::new(false),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Pending<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `item` and returns its sequence number.
    pub fn push(&self, item: T) -> u64 {
        let mut pending = self.pending();
        pending.append(item)
    }

    /// Takes the next item from `take` and appends it with the queue locked, so items pulled by
    /// racing callers keep the order `take` yielded them in. Returns `None` once `take` does.
    pub fn push_with(&self, take: impl FnOnce() -> Option<T>) -> Option<u64> {
        let mut pending = self.pending();
        let item = take()?;
        Some(pending.append(item))
    }

    fn pop(&self) -> Option<Queued<T>> {
        self.pending().items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().items.is_empty()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Drops every queued item without processing it. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending();
        let dropped = pending.items.len();
        pending.items.clear();
        dropped
    }

    /// Processes queued items in arrival order with `state` locked for the whole pass.
    ///
    /// Returns immediately with 0 if another drain is running. Returns the number of items this
    /// call processed.
    pub fn drain_with<S>(&self, state: &Mutex<S>, mut process: impl FnMut(&mut S, Queued<T>)) -> usize {
        let mut processed = 0;
        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                return processed;
            }
            {
                let _guard = DrainGuard(&self.draining);
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                while let Some(cmd) = self.pop() {
                    process(&mut state, cmd);
                    processed += 1;
                }
            }
            // A push that landed between the last pop and the flag clearing saw the drain as
            // active and left its item for us.
            if self.is_empty() {
                return processed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn drains_in_push_order() {
        let q = CommandQueue::new();
        for i in 0..5 {
            assert_eq!(q.push(i * 10), i as u64);
        }
        let seen = Mutex::new(Vec::new());
        let n = q.drain_with(&seen, |seen, cmd| seen.push((cmd.seq, cmd.item)));
        assert_eq!(n, 5);
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![(0, 0), (1, 10), (2, 20), (3, 30), (4, 40)]
        );
        assert!(q.is_empty());
        assert!(!q.is_draining());
    }

    #[test]
    fn concurrent_drain_defers_to_active_drainer() {
        let q = Arc::new(CommandQueue::new());
        let state = Arc::new(Mutex::new(Vec::new()));
        let (entered_tx, entered_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel::<()>();

        q.push("first");
        let drainer = {
            let q = Arc::clone(&q);
            let state = Arc::clone(&state);
            thread::spawn(move || {
                q.drain_with(&state, |seen, cmd| {
                    if cmd.item == "first" {
                        entered_tx.send(()).unwrap();
                        resume_rx.recv().unwrap();
                    }
                    seen.push(cmd.item);
                })
            })
        };

        entered_rx.recv().unwrap();
        assert!(q.is_draining());
        q.push("second");
        // Must not block on the state lock held by the drainer.
        assert_eq!(q.drain_with(&state, |_, _| unreachable!()), 0);
        resume_tx.send(()).unwrap();

        assert_eq!(drainer.join().unwrap(), 2);
        assert_eq!(*state.lock().unwrap(), vec!["first", "second"]);
        assert!(!q.is_draining());
    }

    #[test]
    fn push_with_keeps_source_order_across_threads() {
        let q = Arc::new(CommandQueue::new());
        let source = Arc::new(Mutex::new((0..200).collect::<VecDeque<u32>>()));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                let source = Arc::clone(&source);
                thread::spawn(move || {
                    while q
                        .push_with(|| source.lock().unwrap().pop_front())
                        .is_some()
                    {
                        thread::yield_now();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let seen = Mutex::new(Vec::new());
        assert_eq!(q.drain_with(&seen, |seen, cmd| seen.push(cmd.item)), 200);
        assert_eq!(seen.into_inner().unwrap(), (0..200).collect::<Vec<_>>());
        assert_eq!(q.push_with(|| None), None);
    }

    #[test]
    fn clear_discards_without_processing() {
        let q = CommandQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.clear(), 3);
        let state = Mutex::new(0);
        assert_eq!(q.drain_with(&state, |n, _| *n += 1), 0);
        assert_eq!(q.push(4), 3);
    }

    #[test]
    fn panic_in_processing_releases_the_drain() {
        let q = Arc::new(CommandQueue::new());
        let state = Arc::new(Mutex::new(()));
        q.push(1);
        let result = {
            let q = Arc::clone(&q);
            let state = Arc::clone(&state);
            thread::spawn(move || q.drain_with(&state, |_, _| panic!("boom"))).join()
        };
        assert!(result.is_err());
        assert!(!q.is_draining());
        q.push(2);
        assert_eq!(q.drain_with(&state, |_, _| {}), 1);
    }
}
