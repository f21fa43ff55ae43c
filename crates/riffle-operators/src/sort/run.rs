//! Run generation for external sort.
//!
//! Accumulates child pages into a block of up to B batches, sorts the block
//! with a stable comparator on the key columns, re-packs into page-capacity
//! batches, and writes the result to one spill file per run.

use std::path::PathBuf;

use riffle_core::batch::Batch;
use riffle_core::schema::Schema;
use riffle_core::types::{compare_on, Tuple};
use riffle_mem::SpillDir;

use crate::traits::OpResult;

use super::Direction;

pub(crate) struct RunGenerator {
    schema: Schema,
    keys: Vec<usize>,
    direction: Direction,
    page_capacity: usize,
    block_pages: usize,
    block: Vec<Batch>,
    runs: Vec<PathBuf>,
}

impl RunGenerator {
    pub(crate) fn new(
        schema: Schema,
        keys: Vec<usize>,
        direction: Direction,
        page_capacity: usize,
        block_pages: usize,
    ) -> Self {
        Self {
            schema,
            keys,
            direction,
            page_capacity,
            block_pages,
            block: Vec::with_capacity(block_pages),
            runs: Vec::new(),
        }
    }

    /// Add a child page to the block. Flushes a run when the block holds B pages.
    pub(crate) fn add_batch(&mut self, batch: Batch, spill: &SpillDir) -> OpResult<()> {
        self.block.push(batch);
        if self.block.len() >= self.block_pages {
            self.flush_run(spill)?;
        }
        Ok(())
    }

    /// Sort the current block and persist it as one run.
    fn flush_run(&mut self, spill: &SpillDir) -> OpResult<()> {
        if self.block.is_empty() {
            return Ok(());
        }

        let mut tuples: Vec<Tuple> = Vec::new();
        for batch in self.block.drain(..) {
            tuples.extend(batch.into_tuples());
        }
        // Vec::sort_by is stable, so equal keys keep their arrival order.
        tuples.sort_by(|a, b| compare_on(a, b, &self.keys, &self.keys));

        let path = spill.run_path(self.direction.as_str(), spill.next_file_id());
        let mut writer = spill.create(&path, self.schema.clone())?;
        let rows = tuples.len();
        let mut page = Batch::with_capacity(self.page_capacity);
        for tuple in tuples {
            page.push(tuple);
            if page.is_full() {
                writer.write_batch(&page)?;
                page = Batch::with_capacity(self.page_capacity);
            }
        }
        if !page.is_empty() {
            writer.write_batch(&page)?;
        }
        writer.finish()?;

        self.runs.push(path);
        tracing::debug!(
            direction = self.direction.as_str(),
            run = self.runs.len(),
            rows,
            "wrote sorted run"
        );
        Ok(())
    }

    /// Flush any remaining pages and hand back the run files.
    pub(crate) fn finish(mut self, spill: &SpillDir) -> OpResult<Vec<PathBuf>> {
        self.flush_run(spill)?;
        Ok(self.runs)
    }
}
