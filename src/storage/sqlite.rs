//! SQLite-backed sorted table
//!
//! Each table lives in its own database file so a stage can be inspected,
//! copied or deleted on its own. Rows get a monotonically increasing `seq`
//! (the SQLite rowid) that breaks ties between equal sort keys and makes
//! keyset pagination exact: a page is `WHERE (k1, .., seq) > cursor`.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};

use super::{
    column_positions, BatchOutcome, ColumnKind, Cursor, FailedRow, Field, Page, Record,
    SortedTable,
};
use crate::error::{Error, Result};

impl ToSql for Field {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Field::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Field::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
        })
    }
}

/// Table names double as SQL identifiers and file names
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::config(format!(
            "Invalid table name '{name}': use lowercase letters, digits and '_'"
        )))
    }
}

fn quoted(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQLite implementation of [`SortedTable`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteTable<R: Record> {
    name: String,
    conn: Mutex<Connection>,
    select_columns: String,
    insert_sql: String,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> SqliteTable<R> {
    /// Open (or create) a table stored in the database file at `path`
    pub fn open(path: impl AsRef<Path>, name: &str) -> Result<Self> {
        validate_name(name)?;
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let table = Self::with_connection(conn, name);
        table.create_schema()?;

        tracing::debug!(table = name, path = %path.display(), "SQLite table opened");
        Ok(table)
    }

    /// Create in-memory table (for testing)
    pub fn in_memory(name: &str) -> Result<Self> {
        validate_name(name)?;
        let conn = Connection::open_in_memory()?;
        let table = Self::with_connection(conn, name);
        table.create_schema()?;
        Ok(table)
    }

    fn with_connection(conn: Connection, name: &str) -> Self {
        let names: Vec<&str> = R::COLUMNS.iter().map(|c| c.name).collect();
        let placeholders = (1..=names.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            name: name.to_string(),
            conn: Mutex::new(conn),
            select_columns: quoted(&names),
            insert_sql: format!(
                "INSERT INTO \"{name}\" ({}) VALUES ({placeholders})",
                quoted(&names)
            ),
            _record: PhantomData,
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::other(format!("SQLite connection for '{}' poisoned", self.name)))
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        let columns = R::COLUMNS
            .iter()
            .map(|c| {
                let kind = match c.kind {
                    ColumnKind::Text => "TEXT",
                    ColumnKind::Integer => "INTEGER",
                };
                format!("\"{}\" {kind} NOT NULL", c.name)
            })
            .collect::<Vec<_>>()
            .join(",\n    ");

        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{name}\" (\n    seq INTEGER PRIMARY KEY,\n    {columns}\n);\n",
            name = self.name
        );
        for (i, index) in R::INDEXES.iter().enumerate() {
            ddl.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS \"{name}_idx_{i}\" ON \"{name}\" ({});\n",
                quoted(index),
                name = self.name
            ));
        }
        if !R::UNIQUE_KEY.is_empty() {
            ddl.push_str(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS \"{name}_unique\" ON \"{name}\" ({});\n",
                quoted(R::UNIQUE_KEY),
                name = self.name
            ));
        }

        self.conn()?.execute_batch(&ddl)?;
        Ok(())
    }

    fn decode(&self, fields: Vec<Field>) -> Result<R> {
        R::from_fields(fields).map_err(|reason| Error::InvalidRecord {
            table: self.name.clone(),
            reason,
        })
    }
}

fn read_record_fields<R: Record>(
    row: &rusqlite::Row<'_>,
    offset: usize,
) -> rusqlite::Result<Vec<Field>> {
    R::COLUMNS
        .iter()
        .enumerate()
        .map(|(i, column)| match column.kind {
            ColumnKind::Text => row.get::<_, String>(offset + i).map(Field::Text),
            ColumnKind::Integer => row.get::<_, i64>(offset + i).map(Field::Integer),
        })
        .collect()
}

impl<R: Record> SortedTable<R> for SqliteTable<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_batch(&self, rows: &[R]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        if rows.is_empty() {
            return Ok(outcome);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&self.insert_sql)?;
            for (index, row) in rows.iter().enumerate() {
                let fields = row.to_fields();
                match stmt.execute(params_from_iter(fields.iter())) {
                    Ok(_) => outcome.inserted += 1,
                    Err(rusqlite::Error::SqliteFailure(err, message))
                        if err.code == ErrorCode::ConstraintViolation =>
                    {
                        outcome.failed.push(FailedRow {
                            index,
                            reason: message.unwrap_or_else(|| err.to_string()),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tx.commit()?;

        Ok(outcome)
    }

    fn scan_sorted(
        &self,
        sort_keys: &[&str],
        page_size: usize,
        after: Option<&Cursor>,
    ) -> Result<Page<R>> {
        let positions = column_positions::<R>(&self.name, sort_keys)?;
        let mut order_columns: Vec<String> = sort_keys.iter().map(|k| format!("\"{k}\"")).collect();
        order_columns.push("seq".to_string());
        let order = order_columns.join(", ");

        let mut params: Vec<Field> = Vec::new();
        let filter = match after {
            Some(cursor) => {
                if cursor.keys.len() != sort_keys.len() {
                    return Err(Error::other(format!(
                        "Cursor for '{}' has {} key(s) but the scan sorts by {}",
                        self.name,
                        cursor.keys.len(),
                        sort_keys.len()
                    )));
                }
                params.extend(cursor.keys.iter().cloned());
                params.push(Field::Integer(cursor.seq));
                let placeholders = vec!["?"; order_columns.len()].join(", ");
                format!("WHERE ({order}) > ({placeholders})")
            }
            None => String::new(),
        };
        params.push(Field::Integer(i64::try_from(page_size).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT seq, {cols} FROM \"{name}\" {filter} ORDER BY {order} LIMIT ?",
            cols = self.select_columns,
            name = self.name
        );

        let raw: Vec<(i64, Vec<Field>)> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, read_record_fields::<R>(row, 1)?))
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let Some((last_seq, last_fields)) = raw.last() else {
            return Ok(Page::empty());
        };
        let cursor = Cursor {
            keys: positions.iter().map(|&p| last_fields[p].clone()).collect(),
            seq: *last_seq,
        };

        let rows = raw
            .into_iter()
            .map(|(_, fields)| self.decode(fields))
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            rows,
            cursor: Some(cursor),
        })
    }

    fn lookup_exact(&self, key_columns: &[&str], key_values: &[Field]) -> Result<Option<R>> {
        column_positions::<R>(&self.name, key_columns)?;
        if key_columns.len() != key_values.len() {
            return Err(Error::other(format!(
                "Lookup on '{}' has {} column(s) but {} value(s)",
                self.name,
                key_columns.len(),
                key_values.len()
            )));
        }

        let condition = key_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("\"{c}\" = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "SELECT {cols} FROM \"{name}\" WHERE {condition} ORDER BY seq LIMIT 1",
            cols = self.select_columns,
            name = self.name
        );

        let fields = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.query_row(params_from_iter(key_values.iter()), |row| {
                read_record_fields::<R>(row, 0)
            })
            .optional()?
        };

        fields.map(|f| self.decode(f)).transpose()
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", self.name),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(&format!("DELETE FROM \"{}\"", self.name), [])?;
        Ok(())
    }
}
