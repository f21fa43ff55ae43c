//! Join conditions as the planner hands them to the physical operators.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::Schema;

/// Simple join types (only `Inner` is executable today).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

/// One equality predicate `left_attr = right_attr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left: String,
    pub right: String,
}

impl JoinCondition {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// Resolve a condition list to parallel key-index vectors.
///
/// Fails on an empty list, an unknown attribute, or a type mismatch between
/// the paired columns, so the comparator never sees mixed tags afterwards.
pub fn resolve_keys(
    conditions: &[JoinCondition],
    left: &Schema,
    right: &Schema,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if conditions.is_empty() {
        return Err(Error::Schema(
            "join requires at least one equality condition".into(),
        ));
    }
    let mut left_keys = Vec::with_capacity(conditions.len());
    let mut right_keys = Vec::with_capacity(conditions.len());
    for cond in conditions {
        let li = left
            .index_of(&cond.left)
            .ok_or_else(|| Error::Schema(format!("unknown left attribute '{}'", cond.left)))?;
        let ri = right
            .index_of(&cond.right)
            .ok_or_else(|| Error::Schema(format!("unknown right attribute '{}'", cond.right)))?;
        let lt = left.fields[li].data_type;
        let rt = right.fields[ri].data_type;
        if lt != rt {
            return Err(Error::Type(format!(
                "join key type mismatch: {}({:?}) vs {}({:?})",
                cond.left, lt, cond.right, rt
            )));
        }
        left_keys.push(li);
        right_keys.push(ri);
    }
    Ok((left_keys, right_keys))
}
