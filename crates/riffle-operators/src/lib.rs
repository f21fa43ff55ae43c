#![forbid(unsafe_code)]
//! riffle-operators: the physical sort and join operators.
//!
//! Design intent:
//! - Strictly single-threaded pull execution (open / next / close, plus
//!   `get_block` for the block-nested join's left side).
//! - Every operator respects a page budget of `num_buff` resident pages,
//!   acquired from the shared `ExecContext` with RAII guards.
//! - All spill traffic goes through `riffle-mem` (framed, checksummed runs).

pub mod context;
pub mod join;
pub mod scan;
pub mod sort;
pub mod traits;

pub use context::ExecContext;
pub use join::{BlockNestedJoin, SortMergeJoin};
pub use scan::MemScan;
pub use sort::{Direction, ExternalSort};
pub use traits::{OpError, OpResult, Operator};
