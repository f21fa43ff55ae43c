//! In-memory leaf scan.
//!
//! Packs a pre-loaded table into page-capacity batches. Used as the leaf of
//! test plans and by embedders that already hold rows in memory; real table
//! scans live outside this crate and only have to honor the `Operator`
//! contract.

use std::sync::Arc;

use riffle_core::batch::Batch;
use riffle_core::schema::Schema;
use riffle_core::types::Tuple;

use crate::context::ExecContext;
use crate::traits::{OpError, OpResult, Operator};

pub struct MemScan {
    ctx: Arc<ExecContext>,
    schema: Schema,
    rows: Vec<Tuple>,
    page_capacity: usize,
    pos: usize,
    opened: bool,
}

impl MemScan {
    pub fn new(ctx: Arc<ExecContext>, schema: Schema, rows: Vec<Tuple>) -> Self {
        Self {
            ctx,
            schema,
            rows,
            page_capacity: 0,
            pos: 0,
            opened: false,
        }
    }
}

impl Operator for MemScan {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn open(&mut self) -> OpResult<()> {
        if self.opened {
            return Err(OpError::Exec("scan opened twice".into()));
        }
        self.page_capacity = self.ctx.page_capacity(&self.schema)?;
        // Rows are type-checked once here so the comparator downstream never
        // sees a tag that disagrees with the schema.
        for (row_idx, row) in self.rows.iter().enumerate() {
            if row.arity() != self.schema.arity() {
                return Err(OpError::Schema(format!(
                    "row {} arity {} does not match schema arity {}",
                    row_idx,
                    row.arity(),
                    self.schema.arity()
                )));
            }
            for (field, value) in self.schema.fields.iter().zip(row.values()) {
                if value.data_type() != field.data_type {
                    return Err(OpError::Schema(format!(
                        "row {} field '{}': {:?} does not match {:?}",
                        row_idx,
                        field.name,
                        value.data_type(),
                        field.data_type
                    )));
                }
            }
        }
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> OpResult<Option<Batch>> {
        if !self.opened {
            return Err(OpError::Exec("next before open".into()));
        }
        if self.pos >= self.rows.len() {
            return Ok(None);
        }
        let end = (self.pos + self.page_capacity).min(self.rows.len());
        let mut batch = Batch::with_capacity(self.page_capacity);
        for row in &self.rows[self.pos..end] {
            batch.push(row.clone());
        }
        self.pos = end;
        Ok(Some(batch))
    }

    fn close(&mut self) -> OpResult<()> {
        self.pos = self.rows.len();
        Ok(())
    }
}
