//! Shared execution context.
//!
//! The context owns what used to be process-wide state in older engines:
//! the configuration, the page budget, and the spill-file namespace with its
//! monotonic file counter. Operators receive an `Arc<ExecContext>` at
//! construction and draw everything from it.

use std::sync::Arc;

use riffle_core::budget::PageBudget;
use riffle_core::config::EngineConfig;
use riffle_core::schema::Schema;
use riffle_mem::{Codec, PageBudgetImpl, SpillDir};

use crate::traits::{OpError, OpResult};

pub struct ExecContext {
    cfg: EngineConfig,
    spill: SpillDir,
    pages: PageBudgetImpl,
}

impl ExecContext {
    /// Build a context with `pool_pages` of total page budget shared by all
    /// operators of the plan.
    pub fn new(cfg: EngineConfig, pool_pages: usize, codec: Codec) -> OpResult<Arc<Self>> {
        let spill = SpillDir::new(&cfg.spill_dir, codec)?;
        Ok(Arc::new(Self {
            pages: PageBudgetImpl::new(pool_pages),
            cfg,
            spill,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn spill(&self) -> &SpillDir {
        &self.spill
    }

    pub fn pages(&self) -> &PageBudgetImpl {
        &self.pages
    }

    /// Tuples per page for `schema`, or a configuration error when a single
    /// tuple does not fit in a page.
    pub fn page_capacity(&self, schema: &Schema) -> OpResult<usize> {
        let tuple_size = schema.tuple_size();
        if tuple_size == 0 {
            return Err(OpError::Schema("schema has zero tuple size".into()));
        }
        let capacity = self.cfg.page_size / tuple_size;
        if capacity == 0 {
            return Err(OpError::Config(format!(
                "page size {} smaller than tuple size {}",
                self.cfg.page_size, tuple_size
            )));
        }
        Ok(capacity)
    }

    /// Acquire `pages` from the budget or fail with a typed error.
    pub fn acquire_pages(
        &self,
        pages: usize,
        tag: &'static str,
    ) -> OpResult<riffle_mem::PageGuardImpl> {
        self.pages.try_acquire(pages, tag).ok_or_else(|| {
            OpError::Budget(format!(
                "cannot acquire {pages} pages for {tag}: {} of {} in use",
                self.pages.used_pages(),
                self.pages.capacity_pages()
            ))
        })
    }
}
