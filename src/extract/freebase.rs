//! Freebase RDF dump extraction
//!
//! The dump is one triple per line:
//!
//! ```text
//! <http://rdf.freebase.com/ns/m.02mjmr>\t<http://rdf.freebase.com/ns/type.object.key>\t"/wikipedia/en_title/Barack_Obama"\t.
//! ```
//!
//! Only `type.object.key` triples whose key lives in a `/wikipedia/{lang}_title/`
//! namespace are kept. Keys use Freebase's `$XXXX` escape for characters
//! outside `[A-Za-z0-9_-]`, which is undone before the URL is canonicalised.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::{source_row, ExtractStats};
use crate::error::Result;
use crate::models::SourceRow;
use crate::storage::{BatchSink, FailurePolicy, SortedTable};

/// Predicate of key triples
pub const TYPE_OBJECT_KEY: &str = "<http://rdf.freebase.com/ns/type.object.key>";

fn wikipedia_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^"/wikipedia/([^/"]+?)_title/([^"]+)"$"#).expect("Invalid regex pattern")
    })
}

/// Undo Freebase key escaping (`$` + four hex digits of a UTF-16 code unit).
/// Characters outside the BMP arrive as two escapes forming a surrogate pair.
pub fn decode_key(key: &str) -> Option<String> {
    let mut decoded = String::with_capacity(key.len());
    let mut units: Vec<u16> = Vec::new();
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        if c != '$' {
            push_units(&mut units, &mut decoded)?;
            decoded.push(c);
            continue;
        }
        let hex: String = chars.by_ref().take(4).collect();
        if hex.len() != 4 || !hex.chars().all(|h| h.is_ascii_hexdigit()) {
            return None;
        }
        units.push(u16::from_str_radix(&hex, 16).ok()?);
    }
    push_units(&mut units, &mut decoded)?;
    Some(decoded)
}

/// Decode pending escapes; `None` on a lone surrogate
fn push_units(units: &mut Vec<u16>, decoded: &mut String) -> Option<()> {
    for c in char::decode_utf16(units.drain(..)) {
        decoded.push(c.ok()?);
    }
    Some(())
}

/// How a single dump line was classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// A Wikipedia key triple
    Link(SourceRow),
    /// Any other triple
    Ignored,
    /// A Wikipedia key triple (or a line) that could not be parsed
    Malformed(String),
}

/// Streams a Freebase dump into a source table
#[derive(Debug, Clone)]
pub struct FreebaseExtractor {
    page_size: usize,
    policy: FailurePolicy,
}

impl FreebaseExtractor {
    pub fn new(page_size: usize, policy: FailurePolicy) -> Self {
        Self {
            page_size: page_size.max(1),
            policy,
        }
    }

    /// Classify one dump line
    pub fn parse_line(line: &str) -> LineOutcome {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return LineOutcome::Ignored;
        }

        let mut parts = line.split('\t');
        let (Some(subject), Some(predicate), Some(object)) = (parts.next(), parts.next(), parts.next())
        else {
            return LineOutcome::Malformed("expected at least three tab-separated fields".into());
        };

        if !predicate.eq_ignore_ascii_case(TYPE_OBJECT_KEY)
            || !object.contains("/wikipedia/")
            || !object.contains("_title/")
        {
            return LineOutcome::Ignored;
        }

        let Some(entity_id) = subject
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .filter(|s| !s.is_empty())
        else {
            return LineOutcome::Malformed(format!("subject is not an IRI: {subject}"));
        };

        let Some(caps) = wikipedia_key_re().captures(object) else {
            return LineOutcome::Malformed(format!("unexpected key literal: {object}"));
        };
        let lang = &caps[1];
        let Some(title) = decode_key(&caps[2]) else {
            return LineOutcome::Malformed(format!("bad key escape: {}", &caps[2]));
        };

        LineOutcome::Link(source_row(entity_id, lang, &title))
    }

    /// Extract the dump at `path`
    pub fn extract_file(
        &self,
        path: &Path,
        table: &dyn SortedTable<SourceRow>,
    ) -> Result<ExtractStats> {
        let file = File::open(path)?;
        tracing::info!(path = %path.display(), "Extracting Freebase dump");
        self.extract(BufReader::new(file), table)
    }

    /// Extract every Wikipedia key triple from `reader` into `table`
    pub fn extract<B: BufRead>(
        &self,
        mut reader: B,
        table: &dyn SortedTable<SourceRow>,
    ) -> Result<ExtractStats> {
        let mut sink = BatchSink::new(table, self.policy);
        let mut stats = ExtractStats::default();
        let mut batch = Vec::with_capacity(self.page_size.min(65_536));
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            stats.scanned += 1;

            let Ok(line) = std::str::from_utf8(&buf) else {
                stats.skipped += 1;
                tracing::debug!(line = stats.scanned, "Skipping non UTF-8 line");
                continue;
            };

            match Self::parse_line(line) {
                LineOutcome::Link(row) => batch.push(row),
                LineOutcome::Ignored => {}
                LineOutcome::Malformed(reason) => {
                    stats.skipped += 1;
                    tracing::debug!(line = stats.scanned, %reason, "Skipping malformed line");
                }
            }

            if batch.len() >= self.page_size {
                sink.write(&batch)?;
                batch.clear();
                tracing::debug!(scanned = stats.scanned, written = sink.written(), "Freebase batch written");
            }
        }
        sink.write(&batch)?;

        stats.extracted = sink.written();
        tracing::info!(
            scanned = stats.scanned,
            extracted = stats.extracted,
            skipped = stats.skipped,
            "Freebase extraction complete"
        );
        Ok(stats)
    }
}
