//! Named stage tables
//!
//! A [`Workspace`] hands out the table each pipeline stage reads or writes.
//! The SQLite backend keeps one `<name>.db` file per table under a root
//! directory; the memory backend keeps tables alive for as long as the
//! workspace (or any clone of it) exists, so two stages asking for the same
//! name see the same rows.

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{MemoryTable, Record, SortedTable, SqliteTable};
use crate::error::{Error, Result};

type SharedTables = Arc<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>>;

#[derive(Clone)]
enum Backend {
    Sqlite { root: PathBuf },
    Memory { tables: SharedTables },
}

/// Factory for per-stage tables; cheap to clone and share across tasks
#[derive(Clone)]
pub struct Workspace {
    backend: Backend,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backend {
            Backend::Sqlite { root } => f
                .debug_struct("Workspace")
                .field("backend", &"sqlite")
                .field("root", root)
                .finish(),
            Backend::Memory { .. } => f
                .debug_struct("Workspace")
                .field("backend", &"memory")
                .finish(),
        }
    }
}

impl Workspace {
    /// On-disk workspace rooted at `root` (created if missing)
    pub fn sqlite(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            backend: Backend::Sqlite { root },
        })
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory {
                tables: Arc::new(Mutex::new(HashMap::new())),
            },
        }
    }

    /// Root directory of an on-disk workspace
    pub fn root(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Sqlite { root } => Some(root),
            Backend::Memory { .. } => None,
        }
    }

    /// Open the table `name`, creating it if it does not exist
    pub fn table<R: Record>(&self, name: &str) -> Result<Arc<dyn SortedTable<R>>> {
        match &self.backend {
            Backend::Sqlite { root } => {
                let path = root.join(format!("{name}.db"));
                Ok(Arc::new(SqliteTable::<R>::open(path, name)?))
            }
            Backend::Memory { tables } => {
                let mut tables = tables
                    .lock()
                    .map_err(|_| Error::other("Workspace table map poisoned"))?;
                let entry = tables
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(MemoryTable::<R>::new(name)));
                let table: Arc<dyn SortedTable<R>> = Arc::clone(entry)
                    .downcast::<MemoryTable<R>>()
                    .map_err(|_| {
                        Error::other(format!("Table '{name}' already holds another record type"))
                    })?;
                Ok(table)
            }
        }
    }

    /// Open the table `name` and drop any rows left by a previous run
    pub fn fresh_table<R: Record>(&self, name: &str) -> Result<Arc<dyn SortedTable<R>>> {
        let table = self.table::<R>(name)?;
        table.clear()?;
        Ok(table)
    }
}
