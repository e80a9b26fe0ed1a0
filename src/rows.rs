//! Row Buffer: eagerly drains an underlying result set into an owned,
//! replayable row vector so a cached entry never outlives — or is mutated
//! by — the driver that produced it.

use crate::value::Value;

/// An eagerly-materialized, independently-cursored result set.
///
/// `clone()` makes a new cursor over the same row data (rows are immutable
/// once buffered, so no copy-on-write bookkeeping is needed).
#[derive(Debug, Clone)]
pub struct RowBuffer {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    cursor: usize,
    /// `false` once a cell outside the closed [`Value`] scalar set was
    /// encountered while draining the driver's result set. The rows are
    /// still fully populated and returned to the caller; only the
    /// per-query cache declines to store this particular key.
    cacheable: bool,
}

/// Returned by [`RowBuffer::next`] once the cursor is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfRows;

impl RowBuffer {
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            cursor: 0,
            cacheable: true,
        }
    }

    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            cursor: 0,
            cacheable: true,
        }
    }

    pub fn mark_uncacheable(&mut self) {
        self.cacheable = false;
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Reset the cursor to the beginning; closing a cached row set just
    /// rewinds it for the next consumer.
    pub fn close(&mut self) {
        self.cursor = 0;
    }

    /// Advance the cursor by one row, writing it into `dest`.
    ///
    /// `dest` must have the same length as [`Self::columns`]. Returns
    /// `Err(EndOfRows)` once exhausted.
    pub fn next(&mut self, dest: &mut [Value]) -> Result<(), EndOfRows> {
        if self.cursor >= self.rows.len() {
            self.cursor = 0;
            return Err(EndOfRows);
        }
        dest.clone_from_slice(&self.rows[self.cursor]);
        self.cursor += 1;
        Ok(())
    }

    /// Concatenate the rows of buffers that share a column schema — used by
    /// the `IN`-fan-out read path to stitch together per-key lookups into
    /// one result set. Ordering across the inputs is not preserved beyond
    /// simple concatenation; callers needing order should add `ORDER BY`.
    pub fn merge(mut buffers: Vec<RowBuffer>) -> Option<RowBuffer> {
        if buffers.is_empty() {
            return None;
        }
        if buffers.len() == 1 {
            return buffers.pop();
        }
        let columns = buffers[0].columns.clone();
        let mut rows = Vec::with_capacity(buffers.iter().map(|b| b.rows.len()).sum());
        for b in buffers {
            rows.extend(b.rows);
        }
        Some(RowBuffer::new(columns, rows))
    }
}
