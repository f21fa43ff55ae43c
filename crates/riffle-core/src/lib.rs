#![forbid(unsafe_code)]
//! riffle-core: containers and contracts shared by the whole engine.
//!
//! This crate holds the tuple/page data model, typed comparison on key
//! columns, schemas, join conditions, the page-budget trait, and the engine
//! configuration. It does no I/O; the spill layer lives in `riffle-mem` and
//! the operators in `riffle-operators`.

pub mod batch;
pub mod budget;
pub mod condition;
pub mod config;
pub mod error;
pub mod prelude;
pub mod schema;
pub mod types;
