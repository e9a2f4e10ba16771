//! Sorted, paginated row storage
//!
//! Every stage of the pipeline reads its input through a [`SortedTable`]: an
//! append-only table of fixed-shape rows that can be scanned page by page in
//! ascending order of one or more columns, resuming after the last row a
//! previous page returned.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │       join / cleanse / coverage / matchers (algorithms)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  PageReader / RowCursor / BatchSink
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SortedTable<R: Record>                   │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                               │
//!                  ▼                               ▼
//!        ┌──────────────────┐            ┌──────────────────┐
//!        │   SqliteTable    │            │   MemoryTable    │
//!        │ (one file/table) │            │   (tests, demo)  │
//!        └──────────────────┘            └──────────────────┘
//! ```
//!
//! Ordering contract: rows come back sorted by the requested columns (text
//! compares byte-wise), ties broken by insertion order. Callers rely on this
//! and never re-sort.

pub mod export;
pub mod group;
pub mod memory;
pub mod sqlite;
pub mod workspace;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{Error, Result};

pub use export::{export_pairs, ExportSummary, TsvExporter};
pub use group::{count_distinct, group_into, GroupStats};
pub use memory::MemoryTable;
pub use sqlite::SqliteTable;
pub use workspace::Workspace;

// ============================================================================
// Record Schema
// ============================================================================

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
}

/// A named, typed column of a record table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

/// A single stored value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    Text(String),
    Integer(i64),
}

impl Field {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn count(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Integer(_) => None,
        }
    }
}

/// Sequential decoder used by `Record::from_fields` implementations
pub struct FieldReader {
    fields: std::vec::IntoIter<Field>,
    position: usize,
}

impl FieldReader {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields: fields.into_iter(),
            position: 0,
        }
    }

    fn next_field(&mut self) -> std::result::Result<Field, String> {
        let position = self.position;
        self.position += 1;
        self.fields
            .next()
            .ok_or_else(|| format!("missing field at position {position}"))
    }

    pub fn text(&mut self) -> std::result::Result<String, String> {
        match self.next_field()? {
            Field::Text(s) => Ok(s),
            Field::Integer(i) => Err(format!(
                "expected text at position {}, found integer {i}",
                self.position - 1
            )),
        }
    }

    pub fn count(&mut self) -> std::result::Result<u32, String> {
        match self.next_field()? {
            Field::Integer(i) => u32::try_from(i).map_err(|_| {
                format!("count out of range at position {}: {i}", self.position - 1)
            }),
            Field::Text(s) => Err(format!(
                "expected integer at position {}, found text '{s}'",
                self.position - 1
            )),
        }
    }
}

/// A fixed-shape row type that can live in a [`SortedTable`]
pub trait Record: Clone + Send + Sync + 'static {
    /// Column layout, in `to_fields` order
    const COLUMNS: &'static [Column];

    /// Columns whose combined value must be unique within a table
    const UNIQUE_KEY: &'static [&'static str] = &[];

    /// Secondary indexes the on-disk backend creates for sorting and lookups
    const INDEXES: &'static [&'static [&'static str]] = &[];

    fn to_fields(&self) -> Vec<Field>;

    fn from_fields(fields: Vec<Field>) -> std::result::Result<Self, String>;
}

/// Resolve column names to positions in `R::COLUMNS`
pub fn column_positions<R: Record>(table: &str, names: &[&str]) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            R::COLUMNS
                .iter()
                .position(|c| c.name == *name)
                .ok_or_else(|| Error::UnknownColumn {
                    table: table.to_string(),
                    column: (*name).to_string(),
                })
        })
        .collect()
}

// ============================================================================
// Pagination
// ============================================================================

/// Position right after the last row returned by a sorted scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Sort-key values of the last returned row
    pub keys: Vec<Field>,
    /// Insertion sequence of the last returned row (tie breaker)
    pub seq: i64,
}

impl Cursor {
    /// Compare a row position `(keys, seq)` against this cursor
    pub fn cmp_position(&self, keys: &[Field], seq: i64) -> Ordering {
        keys.cmp(self.keys.as_slice()).then(seq.cmp(&self.seq))
    }
}

/// One page of a sorted scan
#[derive(Debug, Clone)]
pub struct Page<R> {
    pub rows: Vec<R>,
    /// Where the next page starts; `None` once the scan returned no rows
    pub cursor: Option<Cursor>,
}

impl<R> Page<R> {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            cursor: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// Batch Writes
// ============================================================================

/// A row that could not be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRow {
    /// Position of the row within the submitted batch
    pub index: usize,
    pub reason: String,
}

/// Result of a batch insert: the successful count plus every rejected row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub failed: Vec<FailedRow>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What a stage does when a batch is only partially written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail the stage with [`Error::BatchRejected`]
    #[default]
    Abort,
    /// Log each rejected row and keep going
    Skip,
}

impl std::str::FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(Error::config(format!(
                "Invalid failure policy '{other}'. Valid options: abort, skip"
            ))),
        }
    }
}

// ============================================================================
// Table Trait
// ============================================================================

/// Append-only table of `R` rows with sorted, resumable scans
pub trait SortedTable<R: Record>: Send + Sync {
    /// Table name (used in logs and errors)
    fn name(&self) -> &str;

    /// Append rows; rejected rows are reported in the outcome, not dropped silently
    fn insert_batch(&self, rows: &[R]) -> Result<BatchOutcome>;

    /// Up to `page_size` rows sorted by `sort_keys`, strictly after `after`
    fn scan_sorted(
        &self,
        sort_keys: &[&str],
        page_size: usize,
        after: Option<&Cursor>,
    ) -> Result<Page<R>>;

    /// First row (in insertion order) whose `key_columns` equal `key_values`
    fn lookup_exact(&self, key_columns: &[&str], key_values: &[Field]) -> Result<Option<R>>;

    /// Number of stored rows
    fn count(&self) -> Result<u64>;

    /// Remove every row
    fn clear(&self) -> Result<()>;
}

/// Page-at-a-time reader over a sorted scan
pub struct PageReader<'a, R: Record> {
    table: &'a dyn SortedTable<R>,
    sort_keys: &'a [&'a str],
    page_size: usize,
    cursor: Option<Cursor>,
    done: bool,
    pages: u64,
}

impl<'a, R: Record> PageReader<'a, R> {
    pub fn new(table: &'a dyn SortedTable<R>, sort_keys: &'a [&'a str], page_size: usize) -> Self {
        Self {
            table,
            sort_keys,
            page_size: page_size.max(1),
            cursor: None,
            done: false,
            pages: 0,
        }
    }

    /// Fetch the next non-empty page, or `None` at the end of the scan
    pub fn next_page(&mut self) -> Result<Option<Vec<R>>> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .table
            .scan_sorted(self.sort_keys, self.page_size, self.cursor.as_ref())?;
        if page.is_empty() {
            self.done = true;
            return Ok(None);
        }
        self.cursor = page.cursor;
        self.pages += 1;
        tracing::trace!(
            table = self.table.name(),
            page = self.pages,
            rows = page.rows.len(),
            "Loaded page"
        );
        Ok(Some(page.rows))
    }

    /// Number of pages loaded so far
    pub fn pages_loaded(&self) -> u64 {
        self.pages
    }
}

/// What happened when a [`RowCursor`] moved forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Still inside the current page
    SamePage,
    /// The current page was exhausted and the next one loaded
    NewPage,
    /// The scan is finished
    End,
}

/// Row-at-a-time cursor over a sorted scan, used by merge joins
pub struct RowCursor<'a, R: Record> {
    reader: PageReader<'a, R>,
    page: Vec<R>,
    index: usize,
}

impl<'a, R: Record> RowCursor<'a, R> {
    pub fn open(
        table: &'a dyn SortedTable<R>,
        sort_keys: &'a [&'a str],
        page_size: usize,
    ) -> Result<Self> {
        let mut reader = PageReader::new(table, sort_keys, page_size);
        let page = reader.next_page()?.unwrap_or_default();
        Ok(Self {
            reader,
            page,
            index: 0,
        })
    }

    /// Current row, `None` once the scan is exhausted
    pub fn peek(&self) -> Option<&R> {
        self.page.get(self.index)
    }

    /// Move to the next row, loading the next page when needed
    pub fn advance(&mut self) -> Result<Advance> {
        if self.index < self.page.len() {
            self.index += 1;
        }
        if self.index < self.page.len() {
            return Ok(Advance::SamePage);
        }
        match self.reader.next_page()? {
            Some(page) => {
                self.page = page;
                self.index = 0;
                Ok(Advance::NewPage)
            }
            None => {
                self.page.clear();
                self.index = 0;
                Ok(Advance::End)
            }
        }
    }
}

/// Buffered writer applying a [`FailurePolicy`] to every batch
pub struct BatchSink<'a, R: Record> {
    table: &'a dyn SortedTable<R>,
    policy: FailurePolicy,
    written: u64,
    rejected: u64,
}

impl<'a, R: Record> BatchSink<'a, R> {
    pub fn new(table: &'a dyn SortedTable<R>, policy: FailurePolicy) -> Self {
        Self {
            table,
            policy,
            written: 0,
            rejected: 0,
        }
    }

    /// Write a batch; empty batches are a no-op
    pub fn write(&mut self, rows: &[R]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let outcome = self.table.insert_batch(rows)?;
        self.written += outcome.inserted as u64;
        if outcome.is_complete() {
            return Ok(());
        }

        self.rejected += outcome.failed.len() as u64;
        match self.policy {
            FailurePolicy::Abort => Err(Error::BatchRejected {
                table: self.table.name().to_string(),
                failed: outcome.failed,
            }),
            FailurePolicy::Skip => {
                for failed in &outcome.failed {
                    tracing::warn!(
                        table = self.table.name(),
                        index = failed.index,
                        reason = %failed.reason,
                        "Skipping rejected row"
                    );
                }
                Ok(())
            }
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
