//! Scoped cursors.
//!
//! A [`ScopedCursor`] streams one statement's result and buffers rows in
//! batches. It counts itself in its session's open-cursor counter for as long
//! as it lives; dropping it, on success or on error, closes it.

use crate::db::params;
use crate::db::session::SessionConn;
use crate::db::shape::Fetch;
use crate::db::types::{DecodeRow, RawRow, decode_row};
use crate::error::{DbError, DbResult};
use crate::models::Statement;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use sqlx::Executor;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// Buffering hints for a cursor.
///
/// `prefetch_rows` are buffered as soon as the statement is executed;
/// afterwards the buffer is refilled `array_size` rows at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTuning {
    pub prefetch_rows: usize,
    pub array_size: usize,
}

impl FetchTuning {
    pub const DEFAULT_PREFETCH: usize = 2;
    pub const BULK_ARRAY_SIZE: usize = 500;

    /// Tuning for a requested cardinality.
    pub fn for_fetch(fetch: Fetch) -> Self {
        match fetch {
            Fetch::Row(_) | Fetch::First | Fetch::Last => Self {
                prefetch_rows: Self::DEFAULT_PREFETCH,
                array_size: 1,
            },
            // One extra row tells whether the result continues past k
            Fetch::Many(k) => Self {
                prefetch_rows: k + 1,
                array_size: k.max(1),
            },
            Fetch::All => Self {
                prefetch_rows: Self::DEFAULT_PREFETCH,
                array_size: Self::BULK_ARRAY_SIZE,
            },
        }
    }
}

/// Registration of one open cursor in a session's counter.
struct CursorLease {
    counter: Arc<AtomicUsize>,
}

impl CursorLease {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for CursorLease {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct ScopedCursor<'c> {
    rows: BoxStream<'c, DbResult<RawRow>>,
    buffer: VecDeque<RawRow>,
    tuning: FetchTuning,
    exhausted: bool,
    _lease: CursorLease,
}

impl<'c> ScopedCursor<'c> {
    /// Execute the statement and prefetch the first rows.
    pub(crate) async fn open(
        conn: &'c mut SessionConn,
        stmt: &'c Statement,
        tuning: FetchTuning,
        counter: Arc<AtomicUsize>,
    ) -> DbResult<Self> {
        let lease = CursorLease::acquire(counter);
        let (sql, args) = (stmt.sql(), stmt.params());
        let rows = match conn {
            SessionConn::MySql(h) => {
                if args.is_empty() {
                    decoded(h.conn().fetch(sql))
                } else {
                    decoded(params::mysql_query(sql, args).fetch(h.conn()))
                }
            }
            SessionConn::Postgres(h) => {
                if args.is_empty() {
                    decoded(h.conn().fetch(sql))
                } else {
                    decoded(params::postgres_query(sql, args).fetch(h.conn()))
                }
            }
            SessionConn::SQLite(h) => {
                if args.is_empty() {
                    decoded(h.conn().fetch(sql))
                } else {
                    decoded(params::sqlite_query(sql, args).fetch(h.conn()))
                }
            }
        };

        let mut cursor = Self {
            rows,
            buffer: VecDeque::with_capacity(tuning.prefetch_rows),
            tuning,
            exhausted: false,
            _lease: lease,
        };
        cursor.fill(tuning.prefetch_rows).await?;
        trace!(buffered = cursor.buffer.len(), "Cursor opened");
        Ok(cursor)
    }

    /// Pull rows from the backend until `target` rows are buffered or the
    /// result is exhausted.
    async fn fill(&mut self, target: usize) -> DbResult<()> {
        while self.buffer.len() < target && !self.exhausted {
            match self.rows.next().await {
                Some(row) => self.buffer.push_back(row?),
                None => self.exhausted = true,
            }
        }
        Ok(())
    }

    pub(crate) async fn next_row(&mut self) -> DbResult<Option<RawRow>> {
        if self.buffer.is_empty() {
            self.fill(self.tuning.array_size).await?;
        }
        Ok(self.buffer.pop_front())
    }

    pub(crate) async fn fetch_one(&mut self) -> DbResult<Option<RawRow>> {
        self.next_row().await
    }

    /// Up to `k` rows from the current position.
    pub(crate) async fn fetch_many(&mut self, k: usize) -> DbResult<Vec<RawRow>> {
        let mut rows = Vec::with_capacity(k.min(self.tuning.array_size));
        while rows.len() < k {
            match self.next_row().await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    pub(crate) async fn fetch_all(&mut self) -> DbResult<Vec<RawRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// The row at 0-indexed position `n` of the result.
    pub(crate) async fn fetch_at(&mut self, n: usize) -> DbResult<RawRow> {
        let mut seen = 0;
        while let Some(row) = self.next_row().await? {
            if seen == n {
                return Ok(row);
            }
            seen += 1;
        }
        Err(DbError::out_of_range(n, seen))
    }

    pub(crate) async fn fetch_last(&mut self) -> DbResult<Option<RawRow>> {
        let mut last = None;
        while let Some(row) = self.next_row().await? {
            last = Some(row);
        }
        Ok(last)
    }

    /// Rows for a requested cardinality.
    ///
    /// `Row`, `First` and `Last` yield at most one row; `Row` past the end
    /// of the result is an error rather than an empty result.
    pub(crate) async fn fetch(&mut self, fetch: Fetch) -> DbResult<Vec<RawRow>> {
        match fetch {
            Fetch::Row(n) => Ok(vec![self.fetch_at(n).await?]),
            Fetch::First => Ok(self.fetch_one().await?.into_iter().collect()),
            Fetch::Last => Ok(self.fetch_last().await?.into_iter().collect()),
            Fetch::Many(k) => self.fetch_many(k).await,
            Fetch::All => self.fetch_all().await,
        }
    }
}

/// Decode a backend row stream, sharing one column-name list across rows.
fn decoded<'c, R, S>(rows: S) -> BoxStream<'c, DbResult<RawRow>>
where
    R: DecodeRow,
    S: Stream<Item = Result<R, sqlx::Error>> + Send + 'c,
{
    let mut columns = None;
    rows.map(move |row| {
        row.map(|row| decode_row(&row, &mut columns))
            .map_err(DbError::from)
    })
    .boxed()
}
