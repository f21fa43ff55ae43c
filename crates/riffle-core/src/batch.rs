//! Page-sized tuple containers.
//!
//! A `Batch` is the unit of I/O and the unit delivered by `next`. Capacity is
//! fixed at construction (`page_size / tuple_size` for a regular page, a
//! multiple of that for the oversized batches `get_block` assembles) and a
//! batch never grows past it.

use crate::types::Tuple;

#[derive(Debug, Clone)]
pub struct Batch {
    capacity: usize,
    tuples: Vec<Tuple>,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            tuples: Vec::with_capacity(capacity),
        }
    }

    /// Build a batch from tuples already at hand; capacity is at least the
    /// tuple count so the capacity invariant holds on re-read paths.
    pub fn from_tuples(capacity: usize, tuples: Vec<Tuple>) -> Self {
        let capacity = capacity.max(tuples.len());
        Self { capacity, tuples }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tuples.len() >= self.capacity
    }

    pub fn push(&mut self, tuple: Tuple) {
        debug_assert!(!self.is_full(), "batch over-full");
        self.tuples.push(tuple);
    }

    pub fn tuple(&self, idx: usize) -> &Tuple {
        &self.tuples[idx]
    }

    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    pub fn into_tuples(self) -> Vec<Tuple> {
        self.tuples
    }
}
