//! Flat-file export of pair relations
//!
//! One pair per line, `fbID<TAB>wdID`, UTF-8, sorted by `(fb_id, wd_id)`.
//! Files are written to a temp path and renamed into place, so a crashed run
//! never leaves a truncated export behind.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{PageReader, SortedTable};
use crate::error::Result;
use crate::models::ScoredPair;

const EXPORT_ORDER: &[&str] = &["fb_id", "wd_id"];

/// Result of one export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: u64,
}

/// Write every pair of `table` to `path`
pub fn export_pairs<R: ScoredPair>(
    table: &dyn SortedTable<R>,
    path: &Path,
    page_size: usize,
) -> Result<ExportSummary> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tsv.tmp");
    let mut writer = BufWriter::new(File::create(&temp_path)?);
    let mut reader = PageReader::new(table, EXPORT_ORDER, page_size);
    let mut rows = 0u64;

    while let Some(page) = reader.next_page()? {
        for pair in &page {
            writeln!(writer, "{}\t{}", pair.fb_id(), pair.wd_id())?;
        }
        rows += page.len() as u64;
    }
    writer.flush()?;
    drop(writer);

    fs::rename(&temp_path, path)?;

    tracing::info!(table = table.name(), path = %path.display(), rows, "Exported pairs");
    Ok(ExportSummary {
        path: path.to_path_buf(),
        rows,
    })
}

/// Exporter bound to an output directory
#[derive(Debug, Clone)]
pub struct TsvExporter {
    output_dir: PathBuf,
    page_size: usize,
}

impl TsvExporter {
    pub fn new(output_dir: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            page_size,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Export `table` to `<output_dir>/<file_name>`
    pub fn export<R: ScoredPair>(
        &self,
        table: &dyn SortedTable<R>,
        file_name: &str,
    ) -> Result<ExportSummary> {
        export_pairs(table, &self.output_dir.join(file_name), self.page_size)
    }
}
