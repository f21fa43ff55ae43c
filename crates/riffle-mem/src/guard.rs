//! Concrete page budget with RAII guards.
//!
//! A pool has a fixed page capacity. Acquiring checks pages out of the pool
//! and hands back a guard; dropping the guard returns them, so an early
//! return or panic can never strand budget. The pool also keeps a high-water
//! mark of the pages in use, readable through `peak_pages`, which is how
//! tests and embedders observe that operators stayed inside their budgets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use riffle_core::budget::{PageBudget, PageGuard};

/// State shared between a pool handle and the guards it has issued.
struct Pool {
    capacity: usize,
    used: AtomicUsize,
    peak: AtomicUsize,
}

impl Pool {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Check `pages` out of the pool, refusing rather than blocking when the
    /// remainder cannot cover them. Updates the high-water mark on success.
    fn reserve(&self, pages: usize) -> bool {
        let claimed = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |used| {
                used.checked_add(pages).filter(|&next| next <= self.capacity)
            });
        match claimed {
            Ok(before) => {
                self.note_peak(before + pages);
                true
            }
            Err(_) => false,
        }
    }

    fn give_back(&self, pages: usize) {
        self.used.fetch_sub(pages, Ordering::AcqRel);
    }

    /// Raise the recorded high-water mark to at least `used`.
    fn note_peak(&self, used: usize) {
        let _ = self
            .peak
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |peak| {
                (used > peak).then_some(used)
            });
        tracing::trace!(used, capacity = self.capacity, "pages reserved");
    }
}

/// Page pool shared by all operators of a plan. Cheap to clone.
#[derive(Clone)]
pub struct PageBudgetImpl {
    pool: Arc<Pool>,
}

impl PageBudgetImpl {
    pub fn new(capacity_pages: usize) -> Self {
        Self {
            pool: Arc::new(Pool::new(capacity_pages)),
        }
    }

    /// Highest page usage observed over the pool's lifetime.
    pub fn peak_pages(&self) -> usize {
        self.pool.peak.load(Ordering::Relaxed)
    }
}

impl PageBudget for PageBudgetImpl {
    type Guard = PageGuardImpl;

    fn try_acquire(&self, pages: usize, tag: &'static str) -> Option<Self::Guard> {
        if pages > 0 && !self.pool.reserve(pages) {
            return None;
        }
        Some(PageGuardImpl {
            pool: Arc::clone(&self.pool),
            pages,
            tag,
        })
    }

    fn capacity_pages(&self) -> usize {
        self.pool.capacity
    }

    fn used_pages(&self) -> usize {
        self.pool.used.load(Ordering::Relaxed)
    }
}

/// Pages checked out of a pool; returned on drop.
pub struct PageGuardImpl {
    pool: Arc<Pool>,
    pages: usize,
    tag: &'static str,
}

impl PageGuardImpl {
    /// Grow or shrink this guard's reservation in place.
    ///
    /// Shrinking always succeeds. Growing succeeds only if the pool can
    /// cover the difference; on failure the reservation is left untouched.
    /// The external sort shrinks from B pages to a single input buffer this
    /// way when it moves from merging to streaming.
    pub fn try_resize(&mut self, new_pages: usize) -> bool {
        if new_pages < self.pages {
            self.pool.give_back(self.pages - new_pages);
        } else if new_pages > self.pages && !self.pool.reserve(new_pages - self.pages) {
            return false;
        }
        self.pages = new_pages;
        true
    }
}

impl PageGuard for PageGuardImpl {
    fn pages(&self) -> usize {
        self.pages
    }

    fn tag(&self) -> &'static str {
        self.tag
    }
}

impl Drop for PageGuardImpl {
    fn drop(&mut self) {
        let pages = std::mem::take(&mut self.pages);
        if pages > 0 {
            self.pool.give_back(pages);
        }
    }
}
