//! External sort operator: run generation, merge passes, streaming.
//!
//! Phase 1 pulls the child into B-page blocks and spills each as a sorted
//! run. Phase 2 repeatedly merges groups of at most B-1 runs (one output
//! buffer plus B-1 input buffers exactly fills B) until a single run
//! remains. Phase 3 streams that run back a page at a time; the budget
//! guard is shrunk from B pages to 1 when streaming starts.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use riffle_core::batch::Batch;
use riffle_core::schema::Schema;
use riffle_core::types::{Tuple, Value};
use riffle_mem::{PageGuardImpl, RunReader};

use crate::context::ExecContext;
use crate::traits::{OpError, OpResult, Operator};

use super::run::RunGenerator;
use super::Direction;

pub struct ExternalSort {
    ctx: Arc<ExecContext>,
    child: Box<dyn Operator>,
    keys: Vec<usize>,
    num_buff: usize,
    direction: Direction,

    // Runtime state
    page_capacity: usize,
    live_runs: Vec<PathBuf>,
    reader: Option<RunReader>,
    guard: Option<PageGuardImpl>,
    opened: bool,
    drained: bool,
    closed: bool,
}

impl ExternalSort {
    /// `keys` index the child's schema; the planner pre-aligns paired sorts
    /// so both sides of a join use their own key positions.
    pub fn new(
        ctx: Arc<ExecContext>,
        child: Box<dyn Operator>,
        keys: Vec<usize>,
        num_buff: usize,
        direction: Direction,
    ) -> Self {
        Self {
            ctx,
            child,
            keys,
            num_buff,
            direction,
            page_capacity: 0,
            live_runs: Vec::new(),
            reader: None,
            guard: None,
            opened: false,
            drained: false,
            closed: false,
        }
    }

    fn validate(&self) -> OpResult<()> {
        if self.num_buff < 3 {
            return Err(OpError::Config(format!(
                "external sort needs at least 3 buffer pages, got {}",
                self.num_buff
            )));
        }
        if self.keys.is_empty() {
            return Err(OpError::Schema("sort requires at least one key column".into()));
        }
        let arity = self.child.schema().arity();
        for &key in &self.keys {
            if key >= arity {
                return Err(OpError::Schema(format!(
                    "sort key {key} out of range for schema arity {arity}"
                )));
            }
        }
        Ok(())
    }

    /// Merge one group of runs into a single new run, deleting the inputs.
    fn merge_group(&self, group: &[PathBuf], pass: u32) -> OpResult<PathBuf> {
        let schema = self.child.schema().clone();
        let spill = self.ctx.spill();

        let mut cursors = Vec::with_capacity(group.len());
        for path in group {
            cursors.push(MergeCursor::new(spill.open(
                path,
                schema.clone(),
                self.page_capacity,
            )?));
        }

        let out_path = spill.merge_path(self.direction.as_str(), spill.next_file_id(), pass);
        let mut writer = spill.create(&out_path, schema)?;

        let mut heap: BinaryHeap<MergeEntry> = BinaryHeap::new();
        for (src, cursor) in cursors.iter_mut().enumerate() {
            if let Some(tuple) = cursor.pop_tuple()? {
                heap.push(MergeEntry::new(tuple, src, &self.keys));
            }
        }

        let mut page = Batch::with_capacity(self.page_capacity);
        while let Some(entry) = heap.pop() {
            if let Some(tuple) = cursors[entry.src].pop_tuple()? {
                heap.push(MergeEntry::new(tuple, entry.src, &self.keys));
            }
            page.push(entry.tuple);
            if page.is_full() {
                writer.write_batch(&page)?;
                page = Batch::with_capacity(self.page_capacity);
            }
        }
        if !page.is_empty() {
            writer.write_batch(&page)?;
        }
        writer.finish()?;

        for path in group {
            spill.remove(path)?;
        }
        Ok(out_path)
    }
}

impl Operator for ExternalSort {
    fn schema(&self) -> &Schema {
        self.child.schema()
    }

    fn open(&mut self) -> OpResult<()> {
        if self.opened {
            return Err(OpError::Exec("sort opened twice".into()));
        }
        self.validate()?;
        self.child.open()?;
        let schema = self.child.schema().clone();
        self.page_capacity = self.ctx.page_capacity(&schema)?;

        let mut guard = self.ctx.acquire_pages(self.num_buff, "external-sort")?;

        // Phase 1: run generation.
        let mut gen = RunGenerator::new(
            schema,
            self.keys.clone(),
            self.direction,
            self.page_capacity,
            self.num_buff,
        );
        while let Some(batch) = self.child.next()? {
            gen.add_batch(batch, self.ctx.spill())?;
        }
        self.live_runs = gen.finish(self.ctx.spill())?;
        self.child.close()?;

        // Phase 2: merge passes at fan-in B-1. Each pass strictly decreases
        // the run count, so the loop converges.
        let fan_in = self.num_buff - 1;
        let mut pass: u32 = 1;
        while self.live_runs.len() > 1 {
            let groups: Vec<Vec<PathBuf>> = self
                .live_runs
                .chunks(fan_in)
                .map(|c| c.to_vec())
                .collect();
            let mut merged = Vec::with_capacity(groups.len());
            for group in &groups {
                if group.len() == 1 {
                    // A lone trailing run advances to the next pass as-is.
                    merged.push(group[0].clone());
                } else {
                    merged.push(self.merge_group(group, pass)?);
                }
            }
            tracing::debug!(
                direction = self.direction.as_str(),
                pass,
                runs_in = self.live_runs.len(),
                runs_out = merged.len(),
                "merge pass complete"
            );
            self.live_runs = merged;
            pass += 1;
        }

        // Phase 3: leave a stream positioned at the final run; only one
        // input buffer stays resident from here on.
        match self.live_runs.first() {
            Some(path) => {
                guard.try_resize(1);
                self.reader = Some(self.ctx.spill().open(
                    path,
                    self.child.schema().clone(),
                    self.page_capacity,
                )?);
            }
            None => {
                guard.try_resize(0);
                self.drained = true;
            }
        }
        self.guard = Some(guard);
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> OpResult<Option<Batch>> {
        if !self.opened {
            return Err(OpError::Exec("next before open".into()));
        }
        if self.drained {
            return Ok(None);
        }
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| OpError::Exec("sort stream missing".into()))?;
        match reader.next_batch()? {
            Some(batch) => Ok(Some(batch)),
            None => {
                self.drained = true;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> OpResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader = None;
        for path in std::mem::take(&mut self.live_runs) {
            if let Err(e) = self.ctx.spill().remove(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove run file");
            }
        }
        self.guard = None;
        Ok(())
    }
}

/// Per-run read cursor holding at most one page of pending tuples.
struct MergeCursor {
    reader: RunReader,
    pending: VecDeque<Tuple>,
    exhausted: bool,
}

impl MergeCursor {
    fn new(reader: RunReader) -> Self {
        Self {
            reader,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    fn pop_tuple(&mut self) -> OpResult<Option<Tuple>> {
        if self.pending.is_empty() && !self.exhausted {
            match self.reader.next_batch()? {
                Some(batch) => self.pending.extend(batch.into_tuples()),
                None => self.exhausted = true,
            }
        }
        Ok(self.pending.pop_front())
    }
}

/// Entry in the merge heap.
///
/// Ordered by the extracted key columns (reversed for min-heap behavior),
/// with the source index as a deterministic tie-break.
struct MergeEntry {
    key: Vec<Value>,
    tuple: Tuple,
    src: usize,
}

impl MergeEntry {
    fn new(tuple: Tuple, src: usize, keys: &[usize]) -> Self {
        let key = keys.iter().map(|&k| tuple.value(k).clone()).collect();
        Self { key, tuple, src }
    }
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap.
        compare_keys(&other.key, &self.key).then_with(|| other.src.cmp(&self.src))
    }
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}
