//! Operator trait + common error type.
//!
//! The planner builds a tree of operators, calls `open` once, pulls pages
//! with `next` until end-of-stream, and `close`s the tree. `get_block`
//! exists for the block-nested join's left side; the default implementation
//! fulfills it by concatenating successive `next` pages.

use riffle_core::batch::Batch;
use riffle_core::schema::Schema;

use thiserror::Error;

pub type OpResult<T> = std::result::Result<T, OpError>;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("page budget error: {0}")]
    Budget(String),

    #[error("execution error: {0}")]
    Exec(String),

    #[error("spill error: {0}")]
    Spill(#[from] riffle_mem::error::Error),

    #[error(transparent)]
    Core(#[from] riffle_core::error::Error),
}

/// Trait that all operators must implement.
///
/// Contract:
/// - `open` is called exactly once before any `next`; it allocates buffers,
///   opens children, and materializes spill files. Setup failures (child
///   failure, page smaller than a tuple, bad key arity, I/O errors) surface
///   here as typed errors and the operator must not be pulled afterwards.
/// - `next` returns the next page of output, or `None` at end-of-stream.
///   Only the final page may be partially filled; an empty page means
///   end-of-stream. Calling `next` on a drained operator returns `None`.
/// - `close` is idempotent, best-effort cleanup: it deletes spill files and
///   swallows delete failures.
pub trait Operator {
    /// Output schema; available from construction, before `open`.
    fn schema(&self) -> &Schema;

    fn open(&mut self) -> OpResult<()>;

    fn next(&mut self) -> OpResult<Option<Batch>>;

    /// Up to `pages` successive pages packed into one oversized batch.
    fn get_block(&mut self, pages: usize) -> OpResult<Option<Batch>> {
        let first = match self.next()? {
            Some(batch) => batch,
            None => return Ok(None),
        };
        let capacity = first.capacity() * pages.max(1);
        let mut block = Batch::from_tuples(capacity, first.into_tuples());
        for _ in 1..pages {
            match self.next()? {
                Some(batch) => {
                    for tuple in batch.into_tuples() {
                        block.push(tuple);
                    }
                }
                None => break,
            }
        }
        Ok(Some(block))
    }

    fn close(&mut self) -> OpResult<()>;
}
