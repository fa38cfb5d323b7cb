//! Centralized sense-reversing barrier: a single atomic counter plus a
//! per-participant "sense" flag, avoiding the lock/condvar wakeup latency
//! of a generic barrier for the tight build/SpMV dispatch loop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

struct Inner {
    nr_threads: usize,
    count: AtomicUsize,
    sense: AtomicBool,
}

/// A barrier for a fixed set of `nr_threads` participants. Clone (or share
/// via `Arc`) to hand one participant to each worker; every clone refers
/// to the same underlying counter.
#[derive(Clone)]
pub struct Barrier {
    inner: Arc<Inner>,
}

/// Per-participant state: the sense this participant is waiting to see
/// next. Not `Sync` on purpose — each worker thread owns exactly one.
pub struct Participant {
    barrier: Arc<Inner>,
    local_sense: bool,
}

impl Barrier {
    pub fn new(nr_threads: usize) -> Self {
        Self { inner: Arc::new(Inner { nr_threads, count: AtomicUsize::new(0), sense: AtomicBool::new(false) }) }
    }

    pub fn nr_threads(&self) -> usize {
        self.inner.nr_threads
    }

    /// Hands out a fresh [`Participant`] handle. Callers create one per
    /// worker thread before spawning it.
    pub fn participant(&self) -> Participant {
        Participant { barrier: Arc::clone(&self.inner), local_sense: false }
    }
}

impl Participant {
    /// Blocks until every one of the barrier's `nr_threads` participants
    /// has called `wait`. The last arriver flips the shared sense and
    /// releases everyone spinning on the old value.
    pub fn wait(&mut self) {
        self.local_sense = !self.local_sense;
        let arrived = self.barrier.count.fetch_add(1, Ordering::AcqRel) + 1;
        if arrived == self.barrier.nr_threads {
            self.barrier.count.store(0, Ordering::Release);
            self.barrier.sense.store(self.local_sense, Ordering::Release);
        } else {
            while self.barrier.sense.load(Ordering::Acquire) != self.local_sense {
                std::hint::spin_loop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering as Ord_;
    use std::thread;

    #[test]
    fn all_threads_cross_before_any_proceeds() {
        let barrier = Barrier::new(4);
        let crossed = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mut p = barrier.participant();
                let crossed = Arc::clone(&crossed);
                thread::spawn(move || {
                    p.wait();
                    crossed.fetch_add(1, Ord_::SeqCst);
                    p.wait();
                    assert_eq!(crossed.load(Ord_::SeqCst), 4);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
