//! Fan-in for a batch of independent completions

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Collects per-file results and resolves once, after the last of `total`
/// completions, whatever order they arrive in.
pub struct BatchCompletion<T> {
    total: usize,
    remaining: AtomicUsize,
    results: Mutex<HashMap<String, T>>,
    done: Mutex<Option<oneshot::Sender<HashMap<String, T>>>>,
}

impl<T> BatchCompletion<T> {
    /// Counter for `total` completions and the receiver of the collected results
    pub fn new(total: usize) -> (Arc<Self>, oneshot::Receiver<HashMap<String, T>>) {
        let (tx, rx) = oneshot::channel();
        let completion = Arc::new(Self {
            total,
            remaining: AtomicUsize::new(total),
            results: Mutex::new(HashMap::with_capacity(total)),
            done: Mutex::new(Some(tx)),
        });

        if total == 0 {
            completion.fire();
        }
        (completion, rx)
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Record one result. Returns true for the call that resolved the batch.
    pub fn complete(&self, name: impl Into<String>, result: T) -> bool {
        let name = name.into();
        self.results.lock().insert(name.clone(), result);

        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => {
                self.fire();
                true
            }
            Ok(left) => {
                debug!(file = %name, remaining = left - 1, "Batch item completed");
                false
            }
            Err(_) => {
                warn!(file = %name, "Completion after batch already resolved");
                false
            }
        }
    }

    fn fire(&self) {
        let results = std::mem::take(&mut *self.results.lock());
        if let Some(tx) = self.done.lock().take() {
            debug!(total = self.total, "Batch resolved");
            // Receiver may have been dropped by a caller that stopped waiting
            let _ = tx.send(results);
        }
    }
}

impl<T> Drop for BatchCompletion<T> {
    // Every holder is gone without the count reaching zero: hand over
    // whatever was collected instead of leaving the receiver hanging.
    fn drop(&mut self) {
        if self.done.get_mut().is_some() {
            warn!(
                total = self.total,
                remaining = *self.remaining.get_mut(),
                "Batch dropped before all completions"
            );
            self.fire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot::error::TryRecvError;

    #[test]
    fn test_fires_only_after_last_completion() {
        let (completion, mut rx) = BatchCompletion::new(5);

        for i in [3, 1, 4, 0] {
            assert!(!completion.complete(format!("{}.jpg", i), i));
            assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        }
        assert_eq!(completion.remaining(), 1);

        assert!(completion.complete("2.jpg", 2));
        let results = rx.try_recv().unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results["4.jpg"], 4);
    }

    #[test]
    fn test_extra_completion_does_not_fire_again() {
        let (completion, rx) = BatchCompletion::new(1);
        assert!(completion.complete("a.jpg", ()));
        assert!(!completion.complete("b.jpg", ()));
        assert_eq!(rx.blocking_recv().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_batch_resolves_immediately() {
        let (_completion, mut rx) = BatchCompletion::<u8>::new(0);
        assert!(rx.try_recv().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_batch_hands_over_partial_results() {
        let (completion, mut rx) = BatchCompletion::new(3);
        completion.complete("a.jpg", 1);
        drop(completion);

        let results = rx.try_recv().unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_five_concurrent_completions_fire_once() {
        let (completion, rx) = BatchCompletion::new(5);
        // Later-spawned tasks finish first
        let tasks: Vec<_> = (0..5u64)
            .map(|i| {
                let completion = completion.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(50 - i * 10)).await;
                    completion.complete(format!("{}.jpg", i), i)
                })
            })
            .collect();
        drop(completion);

        let mut fired = 0;
        for task in tasks {
            if task.await.unwrap() {
                fired += 1;
            }
        }

        assert_eq!(fired, 1);
        let results = rx.await.unwrap();
        assert_eq!(results.len(), 5);
        assert!((0..5u64).all(|i| results[&format!("{}.jpg", i)] == i));
    }
}
