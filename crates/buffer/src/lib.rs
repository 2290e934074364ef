//! Page buffer: a fixed-capacity LRU residency set with simulated fetch
//! latency.
//!
//! The buffer models disk I/O for benchmarking. Admitting a page busy-waits
//! for the configured fetch delay and evicts the least-recently-used
//! resident; touching a resident page just promotes it. Pages themselves
//! live in the [`storage`] page store whether or not they are resident, so
//! eviction is silent and correctness never depends on residency — a page
//! evicted between two scans is simply re-admitted (and re-charged) on the
//! next access.
//!
//! The delay is the contract, not the mechanism: it must block the calling
//! thread for at least `page_fetch` measured on a monotonic clock, and must
//! not be optimized away or scheduled off-thread.


use common::PageId;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::trace;

/// LRU set of buffer-resident page ids.
#[derive(Debug)]
pub struct PageBuffer {
    resident: LruCache<PageId, ()>,
    fetch_delay: Duration,
    hits: u64,
    misses: u64,
}

impl PageBuffer {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, fetch_delay: Duration) -> Self {
        assert!(capacity > 0, "buffer capacity must be > 0");
        Self {
            resident: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
            fetch_delay,
            hits: 0,
            misses: 0,
        }
    }

    /// Peek residency without touching LRU order.
    pub fn has_page(&self, page: PageId) -> bool {
        self.resident.peek(&page).is_some()
    }

    /// Make `page` resident, charging the fetch delay on a miss. A hit
    /// promotes the page to most-recently-used.
    pub fn ensure(&mut self, page: PageId) {
        if self.resident.get(&page).is_some() {
            self.hits += 1;
            return;
        }
        self.misses += 1;
        trace!(page = page.0, "buffer miss, fetching");
        busy_wait(self.fetch_delay);
        self.resident.push(page, ());
    }

    /// Forget a page without charging anything (table drop).
    pub fn evict(&mut self, page: PageId) {
        self.resident.pop(&page);
    }

    /// Resident page ids, most-recently-used first.
    pub fn resident_pages(&self) -> Vec<PageId> {
        self.resident.iter().map(|(page, _)| *page).collect()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn fetch_delay(&self) -> Duration {
        self.fetch_delay
    }
}

/// Block for at least `delay` on the monotonic clock.
fn busy_wait(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    let start = Instant::now();
    while start.elapsed() < delay {
        std::hint::spin_loop();
    }
}
