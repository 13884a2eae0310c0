//! A fixed pool of scoped workers pulling items off a shared list.
//!
//! Workers claim the next unclaimed item with a relaxed compare-and-swap on a shared cursor.  The calling thread
//! doesn't do work itself; it polls the completion counter and reports progress until every item is done or every
//! worker has exited.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use atomic_refcell::AtomicRefCell;
use crossbeam::utils::CachePadded;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Queue<T> {
    items: Vec<AtomicRefCell<T>>,
    next: CachePadded<AtomicUsize>,
    done: CachePadded<AtomicUsize>,
    live: CachePadded<AtomicUsize>,
}

impl<T> Queue<T> {
    /// Claim the next item, if any remain.
    fn claim(&self) -> Option<usize> {
        let mut index = self.next.load(Ordering::Relaxed);
        loop {
            if index >= self.items.len() {
                return None;
            }
            match self
                .next
                .compare_exchange_weak(index, index + 1, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Some(index),
                Err(current) => index = current,
            }
        }
    }
}

/// Decrements the live worker count however the worker exits, panics included.
struct LiveGuard<'a>(&'a AtomicUsize);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Release);
    }
}

/// Run `work` over every item on `threads` workers.
///
/// Each worker gets its own state from `make_state`.  `progress(done, total)` is called from the calling thread
/// after each poll.  A panic in a worker is resumed on the calling thread once the pool has wound down.
pub fn run_pool<T, S>(
    items: Vec<T>,
    threads: usize,
    make_state: impl Fn() -> S + Sync,
    work: impl Fn(&mut S, &mut T) + Sync,
    mut progress: impl FnMut(usize, usize),
) where
    T: Send + Sync,
{
    let total = items.len();
    if total == 0 {
        return;
    }
    let threads = threads.clamp(1, total);

    let queue = Queue {
        items: items.into_iter().map(AtomicRefCell::new).collect(),
        next: CachePadded::new(AtomicUsize::new(0)),
        done: CachePadded::new(AtomicUsize::new(0)),
        live: CachePadded::new(AtomicUsize::new(threads)),
    };

    let result = crossbeam::scope(|s| {
        for _ in 0..threads {
            s.spawn(|_| {
                let _guard = LiveGuard(&queue.live);
                let mut state = make_state();
                while let Some(index) = queue.claim() {
                    let mut item = queue.items[index].borrow_mut();
                    work(&mut state, &mut *item);
                    queue.done.fetch_add(1, Ordering::Release);
                }
            });
        }

        loop {
            std::thread::sleep(POLL_INTERVAL);
            let done = queue.done.load(Ordering::Acquire);
            progress(done, total);
            if done >= total || queue.live.load(Ordering::Acquire) == 0 {
                break;
            }
        }
    });

    if let Err(panic) = result {
        std::panic::resume_unwind(panic);
    }
}
