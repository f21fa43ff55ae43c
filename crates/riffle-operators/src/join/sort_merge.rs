//! Sort-merge join.
//!
//! Wraps its children in two external sorts tagged `left`/`right`, then
//! advances a merge cursor over the sorted streams. The right side of a key
//! may form a duplicate group that spans page boundaries and must be
//! re-scanned for every matching left tuple, so the join keeps an auxiliary
//! `temp` buffer: whenever the live right batch is exhausted mid-group, its
//! tuples move into `temp` before the next batch is pulled, which keeps
//! indices into the concatenated `temp ++ live_batch` view stable. The
//! saved group-start cursor then supports rewinding across the page seam.
//!
//! `temp` can exceed the nominal page budget for very large duplicate
//! groups; the largest group must fit in memory.

use std::cmp::Ordering;
use std::sync::Arc;

use riffle_core::batch::Batch;
use riffle_core::condition::{resolve_keys, JoinCondition, JoinType};
use riffle_core::schema::Schema;
use riffle_core::types::{compare_on, keys_match, Tuple};
use riffle_mem::PageGuardImpl;

use crate::context::ExecContext;
use crate::sort::{Direction, ExternalSort};
use crate::traits::{OpError, OpResult, Operator};

pub struct SortMergeJoin {
    ctx: Arc<ExecContext>,
    conditions: Vec<JoinCondition>,
    join_type: JoinType,
    num_buff: usize,
    schema: Schema,

    left_child: Option<Box<dyn Operator>>,
    right_child: Option<Box<dyn Operator>>,
    left_sort: Option<ExternalSort>,
    right_sort: Option<ExternalSort>,
    st: Option<MergeState>,
    opened: bool,
    drained: bool,
    closed: bool,
}

impl SortMergeJoin {
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
            conditions,
            join_type,
            num_buff,
            schema,
            left_child: Some(left),
            right_child: Some(right),
            left_sort: None,
            right_sort: None,
            st: None,
            opened: false,
            drained: false,
            closed: false,
        }
    }
}

impl Operator for SortMergeJoin {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn open(&mut self) -> OpResult<()> {
        if self.opened {
            return Err(OpError::Exec("join opened twice".into()));
        }
        if self.join_type != JoinType::Inner {
            return Err(OpError::Config(format!(
                "sort-merge join only supports inner joins, got {:?}",
                self.join_type
            )));
        }
        let left_child = self
            .left_child
            .take()
            .ok_or_else(|| OpError::Exec("left child missing".into()))?;
        let right_child = self
            .right_child
            .take()
            .ok_or_else(|| OpError::Exec("right child missing".into()))?;

        let (lkeys, rkeys) =
            resolve_keys(&self.conditions, left_child.schema(), right_child.schema())?;
        let out_capacity = self.ctx.page_capacity(&self.schema)?;

        // 2 input cursors + 1 output page; the sorts budget their own B.
        let guard = self.ctx.acquire_pages(3, "sort-merge-join")?;

        let mut left_sort = ExternalSort::new(
            Arc::clone(&self.ctx),
            left_child,
            lkeys.clone(),
            self.num_buff,
            Direction::Left,
        );
        let mut right_sort = ExternalSort::new(
            Arc::clone(&self.ctx),
            right_child,
            rkeys.clone(),
            self.num_buff,
            Direction::Right,
        );
        left_sort.open()?;
        right_sort.open()?;

        let (lbatch, ldone) = match left_sort.next()? {
            Some(batch) => (batch, false),
            None => (Batch::with_capacity(0), true),
        };
        let (rbatch, rdone) = match right_sort.next()? {
            Some(batch) => (batch, false),
            None => (Batch::with_capacity(0), true),
        };

        self.st = Some(MergeState {
            lkeys,
            rkeys,
            out_capacity,
            lbatch,
            lpos: 0,
            ldone,
            rbatch,
            rpos: 0,
            rdone,
            temp: Vec::new(),
            group_start: None,
            _pages: guard,
        });
        self.left_sort = Some(left_sort);
        self.right_sort = Some(right_sort);
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> OpResult<Option<Batch>> {
        if !self.opened {
            return Err(OpError::Exec("next before open".into()));
        }
        if self.drained {
            let _ = self.close();
            return Ok(None);
        }

        let st = self
            .st
            .as_mut()
            .ok_or_else(|| OpError::Exec("join state missing".into()))?;
        let left_sort = self
            .left_sort
            .as_mut()
            .ok_or_else(|| OpError::Exec("left sort missing".into()))?;
        let right_sort = self
            .right_sort
            .as_mut()
            .ok_or_else(|| OpError::Exec("right sort missing".into()))?;

        let mut out = Batch::with_capacity(st.out_capacity);
        let mut done = false;
        while !out.is_full() {
            match st.group_start {
                None => {
                    // Between duplicate groups: both cursors chase each other.
                    if st.left_exhausted() || st.right_exhausted() {
                        done = true;
                        break;
                    }
                    match compare_on(st.left_tuple(), st.right_tuple(), &st.lkeys, &st.rkeys) {
                        Ordering::Less => st.advance_left(left_sort)?,
                        Ordering::Greater => st.advance_right_seek(right_sort)?,
                        Ordering::Equal => st.group_start = Some(st.rpos),
                    }
                }
                Some(start) => {
                    let group_over = st.right_at_end()
                        || !keys_match(st.left_tuple(), st.right_tuple(), &st.lkeys, &st.rkeys);
                    if group_over {
                        // Current left tuple is finished with this group.
                        st.advance_left(left_sort)?;
                        if st.left_exhausted() {
                            done = true;
                            break;
                        }
                        let rescan = keys_match(
                            st.left_tuple(),
                            st.right_tuple_at(start),
                            &st.lkeys,
                            &st.rkeys,
                        );
                        if rescan {
                            st.rpos = start;
                        } else {
                            st.end_group();
                        }
                    } else {
                        out.push(st.left_tuple().join(st.right_tuple()));
                        st.advance_right_buffered(right_sort)?;
                    }
                }
            }
        }

        if done {
            self.drained = true;
        }
        if out.is_empty() {
            let _ = self.close();
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
        for sort in [self.left_sort.take(), self.right_sort.take()].into_iter().flatten() {
            let mut sort = sort;
            if let Err(e) = sort.close() {
                tracing::warn!(error = %e, "failed to close child sort");
            }
        }
        for child in [self.left_child.take(), self.right_child.take()]
            .into_iter()
            .flatten()
        {
            let mut child = child;
            let _ = child.close();
        }
        Ok(())
    }
}

/// Cursor state across `next` calls.
///
/// `rpos` indexes the concatenated view `temp ++ rbatch`; `group_start` is
/// the saved position of the current duplicate group within that view, or
/// `None` between groups.
struct MergeState {
    lkeys: Vec<usize>,
    rkeys: Vec<usize>,
    out_capacity: usize,
    lbatch: Batch,
    lpos: usize,
    ldone: bool,
    rbatch: Batch,
    rpos: usize,
    rdone: bool,
    temp: Vec<Tuple>,
    group_start: Option<usize>,
    _pages: PageGuardImpl,
}

impl MergeState {
    fn left_exhausted(&self) -> bool {
        self.lpos >= self.lbatch.len()
    }

    fn right_exhausted(&self) -> bool {
        self.rdone && self.right_at_end()
    }

    fn right_at_end(&self) -> bool {
        self.rpos >= self.temp.len() + self.rbatch.len()
    }

    fn left_tuple(&self) -> &Tuple {
        self.lbatch.tuple(self.lpos)
    }

    fn right_tuple(&self) -> &Tuple {
        self.right_tuple_at(self.rpos)
    }

    /// Unified view over buffered-group tuples and the live batch.
    fn right_tuple_at(&self, idx: usize) -> &Tuple {
        if idx < self.temp.len() {
            &self.temp[idx]
        } else {
            self.rbatch.tuple(idx - self.temp.len())
        }
    }

    fn advance_left(&mut self, sort: &mut ExternalSort) -> OpResult<()> {
        self.lpos += 1;
        if self.lpos >= self.lbatch.len() && !self.ldone {
            match sort.next()? {
                Some(batch) => {
                    self.lbatch = batch;
                    self.lpos = 0;
                }
                None => self.ldone = true,
            }
        }
        Ok(())
    }

    /// Step the right cursor between groups; exhausted batches are dropped.
    fn advance_right_seek(&mut self, sort: &mut ExternalSort) -> OpResult<()> {
        debug_assert!(self.temp.is_empty());
        self.rpos += 1;
        if self.rpos >= self.rbatch.len() && !self.rdone {
            match sort.next()? {
                Some(batch) => {
                    self.rbatch = batch;
                    self.rpos = 0;
                }
                None => self.rdone = true,
            }
        }
        Ok(())
    }

    /// Step the right cursor inside a group; an exhausted batch moves into
    /// `temp` so earlier group tuples stay reachable for the rewind.
    fn advance_right_buffered(&mut self, sort: &mut ExternalSort) -> OpResult<()> {
        self.rpos += 1;
        if self.rpos >= self.temp.len() + self.rbatch.len() && !self.rdone {
            match sort.next()? {
                Some(batch) => {
                    let old = std::mem::replace(&mut self.rbatch, batch);
                    self.temp.extend(old.into_tuples());
                }
                None => self.rdone = true,
            }
        }
        Ok(())
    }

    /// Leave the group: normalize `rpos` back into the live batch and drop
    /// the buffered prefix.
    fn end_group(&mut self) {
        debug_assert!(self.rpos >= self.temp.len());
        self.rpos -= self.temp.len();
        self.temp.clear();
        self.group_start = None;
    }
}
