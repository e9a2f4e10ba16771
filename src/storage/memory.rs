//! In-memory sorted table
//!
//! Same contract as [`super::SqliteTable`]; used by tests and by the
//! `memory` workspace backend for small dry runs.

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{column_positions, BatchOutcome, Cursor, FailedRow, Field, Page, Record, SortedTable};
use crate::error::{Error, Result};

struct State<R> {
    rows: Vec<(i64, R)>,
    next_seq: i64,
    unique: HashSet<Vec<Field>>,
}

/// Mock-style table backed by a `Vec`
pub struct MemoryTable<R: Record> {
    name: String,
    unique_positions: Vec<usize>,
    state: RwLock<State<R>>,
}

impl<R: Record> MemoryTable<R> {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let unique_positions = R::UNIQUE_KEY
            .iter()
            .filter_map(|key| R::COLUMNS.iter().position(|c| c.name == *key))
            .collect();
        Self {
            name,
            unique_positions,
            state: RwLock::new(State {
                rows: Vec::new(),
                next_seq: 1,
                unique: HashSet::new(),
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State<R>>> {
        self.state
            .read()
            .map_err(|_| Error::other(format!("Memory table '{}' poisoned", self.name)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State<R>>> {
        self.state
            .write()
            .map_err(|_| Error::other(format!("Memory table '{}' poisoned", self.name)))
    }
}

fn project(fields: &[Field], positions: &[usize]) -> Vec<Field> {
    positions.iter().map(|&p| fields[p].clone()).collect()
}

impl<R: Record> SortedTable<R> for MemoryTable<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_batch(&self, rows: &[R]) -> Result<BatchOutcome> {
        let mut state = self.write()?;
        let mut outcome = BatchOutcome::default();

        for (index, row) in rows.iter().enumerate() {
            if !self.unique_positions.is_empty() {
                let key = project(&row.to_fields(), &self.unique_positions);
                if !state.unique.insert(key) {
                    outcome.failed.push(FailedRow {
                        index,
                        reason: format!(
                            "UNIQUE constraint failed: {}.{}",
                            self.name,
                            R::UNIQUE_KEY.join(", ")
                        ),
                    });
                    continue;
                }
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.rows.push((seq, row.clone()));
            outcome.inserted += 1;
        }

        Ok(outcome)
    }

    fn scan_sorted(
        &self,
        sort_keys: &[&str],
        page_size: usize,
        after: Option<&Cursor>,
    ) -> Result<Page<R>> {
        let positions = column_positions::<R>(&self.name, sort_keys)?;
        let state = self.read()?;

        let mut keyed: Vec<(Vec<Field>, i64, &R)> = state
            .rows
            .iter()
            .map(|(seq, row)| (project(&row.to_fields(), &positions), *seq, row))
            .filter(|(keys, seq, _)| {
                after.map_or(true, |cursor| cursor.cmp_position(keys, *seq).is_gt())
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        keyed.truncate(page_size);

        let cursor = keyed.last().map(|(keys, seq, _)| Cursor {
            keys: keys.clone(),
            seq: *seq,
        });
        let rows = keyed.into_iter().map(|(_, _, row)| row.clone()).collect();

        Ok(Page { rows, cursor })
    }

    fn lookup_exact(&self, key_columns: &[&str], key_values: &[Field]) -> Result<Option<R>> {
        let positions = column_positions::<R>(&self.name, key_columns)?;
        if key_columns.len() != key_values.len() {
            return Err(Error::other(format!(
                "Lookup on '{}' has {} column(s) but {} value(s)",
                self.name,
                key_columns.len(),
                key_values.len()
            )));
        }

        let state = self.read()?;
        Ok(state
            .rows
            .iter()
            .find(|(_, row)| project(&row.to_fields(), &positions) == key_values)
            .map(|(_, row)| row.clone()))
    }

    fn count(&self) -> Result<u64> {
        Ok(self.read()?.rows.len() as u64)
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.write()?;
        state.rows.clear();
        state.unique.clear();
        Ok(())
    }
}
