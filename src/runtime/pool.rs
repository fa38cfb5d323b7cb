//! Worker pool: a fixed-size fork-join pool where the calling thread
//! doubles as worker 0, generalizing the `std::thread`-per-chunk +
//! barrier-style dispatch the original engine uses for the build and SpMV
//! phases.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use super::affinity::CorePlan;
use super::barrier::Barrier;
use crate::error::Error;

type Job = Arc<dyn Fn(usize) + Send + Sync>;

/// `nr_threads` workers, of which worker 0 is the thread that calls
/// [`WorkerPool::dispatch`] (no OS thread of its own); workers `1..nr_threads`
/// are spawned once at construction and parked on the dispatch barrier
/// between jobs.
pub struct WorkerPool {
    nr_threads: usize,
    job: Arc<Mutex<Option<Job>>>,
    dispatch_barrier: Barrier,
    done_barrier: Barrier,
    shutdown: Arc<AtomicBool>,
    main_dispatch: std::cell::RefCell<super::barrier::Participant>,
    main_done: std::cell::RefCell<super::barrier::Participant>,
    threads: Vec<JoinHandle<()>>,
}

// SAFETY: the only non-`Sync` fields are the `RefCell<Participant>`s used
// exclusively by the dispatching thread (worker 0) via `&self` through
// `dispatch`, which takes `&self` but never concurrently from two threads
// in this crate's usage (one dispatcher at a time, matching the original
// engine's single producer/fork-join model).
unsafe impl Sync for WorkerPool {}

impl WorkerPool {
    /// Spawns `nr_threads - 1` worker threads, optionally pinned per
    /// `affinity`.
    pub fn new(nr_threads: usize, affinity: Option<CorePlan>) -> Result<Self, Error> {
        if nr_threads == 0 {
            return Err(Error::InvalidConfig("worker pool needs at least one thread".into()));
        }
        let job: Arc<Mutex<Option<Job>>> = Arc::new(Mutex::new(None));
        let dispatch_barrier = Barrier::new(nr_threads);
        let done_barrier = Barrier::new(nr_threads);
        let shutdown = Arc::new(AtomicBool::new(false));

        let main_dispatch = dispatch_barrier.participant();
        let main_done = done_barrier.participant();

        let mut threads = Vec::with_capacity(nr_threads - 1);
        for worker in 1..nr_threads {
            let job = Arc::clone(&job);
            let mut dispatch_p = dispatch_barrier.participant();
            let mut done_p = done_barrier.participant();
            let shutdown = Arc::clone(&shutdown);
            let affinity = affinity.clone();
            let handle = std::thread::Builder::new()
                .name(format!("csx-worker-{worker}"))
                .spawn(move || {
                    if let Some(plan) = &affinity {
                        let _ = plan.pin_current_thread(worker);
                    }
                    loop {
                        dispatch_p.wait();
                        if shutdown.load(Ordering::Acquire) {
                            return;
                        }
                        let f = job.lock().expect("worker pool job mutex poisoned").clone();
                        if let Some(f) = f {
                            f(worker);
                        }
                        done_p.wait();
                    }
                })
                .expect("failed to spawn worker thread");
            threads.push(handle);
        }

        Ok(Self {
            nr_threads,
            job,
            dispatch_barrier,
            done_barrier,
            shutdown,
            main_dispatch: std::cell::RefCell::new(main_dispatch),
            main_done: std::cell::RefCell::new(main_done),
            threads,
        })
    }

    pub fn nr_threads(&self) -> usize {
        self.nr_threads
    }

    /// Runs `f(worker_id)` on every worker, including `0` on the calling
    /// thread, and blocks until all have returned.
    pub fn dispatch<F>(&self, f: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        *self.job.lock().expect("worker pool job mutex poisoned") = Some(Arc::new(f));
        self.main_dispatch.borrow_mut().wait();
        if let Some(job) = self.job.lock().expect("worker pool job mutex poisoned").clone() {
            job(0);
        }
        self.main_done.borrow_mut().wait();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.main_dispatch.borrow_mut().wait();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        let _ = &self.dispatch_barrier;
        let _ = &self.done_barrier;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dispatch_runs_every_worker_once() {
        let pool = WorkerPool::new(4, None).unwrap();
        let total = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let total = Arc::clone(&total);
            pool.dispatch(move |_worker| {
                total.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(total.load(Ordering::SeqCst), 12);
    }
}
