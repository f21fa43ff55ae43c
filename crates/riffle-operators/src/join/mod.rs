//! Equi-join operators.

pub mod block_nested;
pub mod sort_merge;

pub use block_nested::BlockNestedJoin;
pub use sort_merge::SortMergeJoin;
