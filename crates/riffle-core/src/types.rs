//! Tagged scalar values and immutable tuples.
//!
//! Comparison is a total order: same-tag values compare by their natural
//! order (floats with NaN last), and mixed tags fall back to a fixed tag
//! rank so sorting never panics. Operators type-check key columns against
//! their schemas at `open`, so mixed-tag key comparisons cannot occur in a
//! well-formed plan.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    Str(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int32,
            Value::Float(_) => DataType::Float32,
            Value::Str(_) => DataType::Utf8,
        }
    }

    /// Total order on values; ties across tags break by tag rank.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Int(x), Int(y)) => x.cmp(y),
            (Float(x), Float(y)) => {
                if x.is_nan() && y.is_nan() {
                    Ordering::Equal
                } else if x.is_nan() {
                    Ordering::Greater
                } else if y.is_nan() {
                    Ordering::Less
                } else {
                    x.partial_cmp(y).unwrap_or(Ordering::Equal)
                }
            }
            (Str(x), Str(y)) => x.cmp(y),
            _ => value_type_order(self).cmp(&value_type_order(other)),
        }
    }
}

fn value_type_order(v: &Value) -> u8 {
    match v {
        Value::Int(_) => 0,
        Value::Float(_) => 1,
        Value::Str(_) => 2,
    }
}

/// Immutable row: an ordered vector of values addressed by position.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn value(&self, idx: usize) -> &Value {
        &self.values[idx]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }

    /// Concatenation `self ++ other` for join output.
    pub fn join(&self, other: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(self.values.len() + other.values.len());
        values.extend(self.values.iter().cloned());
        values.extend(other.values.iter().cloned());
        Tuple { values }
    }
}

/// Compare two tuples restricted to parallel key-index vectors.
///
/// Positions are compared pairwise in order; the first unequal pair decides.
/// Callers validate index vectors against their schemas at `open`, so
/// indexing here is in range for any tuple produced by a well-formed child.
pub fn compare_on(a: &Tuple, b: &Tuple, a_keys: &[usize], b_keys: &[usize]) -> Ordering {
    debug_assert_eq!(a_keys.len(), b_keys.len());
    for (&i, &j) in a_keys.iter().zip(b_keys.iter()) {
        match a.value(i).total_cmp(b.value(j)) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Single-index convenience form of [`compare_on`].
pub fn compare_at(a: &Tuple, b: &Tuple, a_key: usize, b_key: usize) -> Ordering {
    compare_on(a, b, &[a_key], &[b_key])
}

/// Equality specialization: true iff the tuples agree on all key columns.
pub fn keys_match(a: &Tuple, b: &Tuple, a_keys: &[usize], b_keys: &[usize]) -> bool {
    compare_on(a, b, a_keys, b_keys) == Ordering::Equal
}
