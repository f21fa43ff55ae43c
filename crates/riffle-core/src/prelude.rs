//! Convenient re-exports for downstream crates.

pub use crate::batch::Batch;
pub use crate::budget::{PageBudget, PageGuard};
pub use crate::condition::{resolve_keys, JoinCondition, JoinType};
pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::types::{compare_at, compare_on, keys_match, Tuple, Value};
