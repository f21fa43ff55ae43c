//! Block nested loop join.
//!
//! `open` drains the right child into one spill file. `next` streams the
//! left child in (B-2)-page blocks and, for each block, rescans the spill
//! file a page at a time, emitting every key-matching pair. When the output
//! page fills mid-scan the intra-block cursors are saved raw, so the next
//! call resumes at exactly the following pair regardless of whether the
//! left block, the right batch, both, or neither was at its boundary.

use std::path::PathBuf;
use std::sync::Arc;

use riffle_core::batch::Batch;
use riffle_core::condition::{resolve_keys, JoinCondition, JoinType};
use riffle_core::schema::Schema;
use riffle_core::types::keys_match;
use riffle_mem::{PageGuardImpl, RunReader};

use crate::context::ExecContext;
use crate::traits::{OpError, OpResult, Operator};

pub struct BlockNestedJoin {
    ctx: Arc<ExecContext>,
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    conditions: Vec<JoinCondition>,
    join_type: JoinType,
    num_buff: usize,
    schema: Schema,

    spill_path: Option<PathBuf>,
    st: Option<ScanState>,
    opened: bool,
    drained: bool,
    closed: bool,
}

impl BlockNestedJoin {
    pub fn new(
        ctx: Arc<ExecContext>,
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        conditions: Vec<JoinCondition>,
        join_type: JoinType,
        num_buff: usize,
    ) -> Self {
        let schema = left.schema().join(right.schema());
        Self {
            ctx,
            left,
            right,
            conditions,
            join_type,
            num_buff,
            schema,
            spill_path: None,
            st: None,
            opened: false,
            drained: false,
            closed: false,
        }
    }
}

impl Operator for BlockNestedJoin {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn open(&mut self) -> OpResult<()> {
        if self.opened {
            return Err(OpError::Exec("join opened twice".into()));
        }
        if self.join_type != JoinType::Inner {
            return Err(OpError::Config(format!(
                "block nested join only supports inner joins, got {:?}",
                self.join_type
            )));
        }
        if self.num_buff < 3 {
            return Err(OpError::Config(format!(
                "block nested join needs at least 3 buffer pages, got {}",
                self.num_buff
            )));
        }
        let (lkeys, rkeys) =
            resolve_keys(&self.conditions, self.left.schema(), self.right.schema())?;
        let out_capacity = self.ctx.page_capacity(&self.schema)?;
        let right_schema = self.right.schema().clone();
        let right_page_capacity = self.ctx.page_capacity(&right_schema)?;

        let guard = self.ctx.acquire_pages(self.num_buff, "block-nested-join")?;

        // Materialize the right child to secondary storage.
        let spill = self.ctx.spill();
        let path = spill.nested_path(spill.next_file_id());
        self.spill_path = Some(path.clone());
        self.right.open()?;
        let mut writer = spill.create(&path, right_schema.clone())?;
        let mut right_pages = 0u64;
        while let Some(batch) = self.right.next()? {
            writer.write_batch(&batch)?;
            right_pages += 1;
        }
        writer.finish()?;
        self.right.close()?;
        tracing::debug!(pages = right_pages, path = %path.display(), "materialized right side");

        self.left.open()?;

        self.st = Some(ScanState {
            lkeys,
            rkeys,
            out_capacity,
            right_schema,
            right_page_capacity,
            reader: None,
            lblock: Batch::with_capacity(0),
            lcurs: 0,
            rbatch: Batch::with_capacity(0),
            rcurs: 0,
            need_right_batch: false,
            right_pass_done: true,
            _pages: guard,
        });
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
        let spill_path = self
            .spill_path
            .clone()
            .ok_or_else(|| OpError::Exec("right side not materialized".into()))?;
        let st = self
            .st
            .as_mut()
            .ok_or_else(|| OpError::Exec("join state missing".into()))?;

        let mut out = Batch::with_capacity(st.out_capacity);
        let mut done = false;
        'outer: while !out.is_full() {
            if st.right_pass_done {
                // Pull the next left block and start a fresh pass over the
                // materialized right side.
                match self.left.get_block(self.num_buff - 2)? {
                    Some(block) if !block.is_empty() => {
                        st.lblock = block;
                        st.lcurs = 0;
                        st.rcurs = 0;
                        st.reader = Some(self.ctx.spill().open(
                            &spill_path,
                            st.right_schema.clone(),
                            st.right_page_capacity,
                        )?);
                        st.right_pass_done = false;
                        st.need_right_batch = true;
                    }
                    _ => {
                        done = true;
                        break;
                    }
                }
            }
            if st.need_right_batch {
                let reader = st
                    .reader
                    .as_mut()
                    .ok_or_else(|| OpError::Exec("right pass missing".into()))?;
                match reader.next_batch()? {
                    Some(batch) => {
                        st.rbatch = batch;
                        st.lcurs = 0;
                        st.rcurs = 0;
                        st.need_right_batch = false;
                    }
                    None => {
                        st.right_pass_done = true;
                        st.reader = None;
                        continue 'outer;
                    }
                }
            }

            // Cross-check the current left block against the current right
            // batch, resuming from the saved cursors.
            let mut i = st.lcurs;
            while i < st.lblock.len() {
                let left_tuple = st.lblock.tuple(i);
                let mut j = if i == st.lcurs { st.rcurs } else { 0 };
                while j < st.rbatch.len() {
                    let right_tuple = st.rbatch.tuple(j);
                    if keys_match(left_tuple, right_tuple, &st.lkeys, &st.rkeys) {
                        out.push(left_tuple.join(right_tuple));
                        if out.is_full() {
                            st.lcurs = i;
                            st.rcurs = j + 1;
                            break 'outer;
                        }
                    }
                    j += 1;
                }
                i += 1;
            }
            st.lcurs = 0;
            st.rcurs = 0;
            st.need_right_batch = true;
        }

        if done {
            self.drained = true;
        }
        if out.is_empty() {
            return Ok(None);
        }
        Ok(Some(out))
    }

    fn close(&mut self) -> OpResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.st = None;
        if let Err(e) = self.left.close() {
            tracing::warn!(error = %e, "failed to close left child");
        }
        let _ = self.right.close();
        if let Some(path) = self.spill_path.take() {
            if let Err(e) = self.ctx.spill().remove(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove spill file");
            }
        }
        Ok(())
    }
}

/// Cursor state across `next` calls.
struct ScanState {
    lkeys: Vec<usize>,
    rkeys: Vec<usize>,
    out_capacity: usize,
    right_schema: Schema,
    right_page_capacity: usize,
    reader: Option<RunReader>,
    lblock: Batch,
    lcurs: usize,
    rbatch: Batch,
    rcurs: usize,
    need_right_batch: bool,
    right_pass_done: bool,
    _pages: PageGuardImpl,
}
