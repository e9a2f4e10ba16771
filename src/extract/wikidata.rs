//! Wikidata site-link extraction
//!
//! Wikidata stores article links in `wb_items_per_site`:
//!
//! | column          | example          |
//! |-----------------|------------------|
//! | `ips_item_id`   | `76`             |
//! | `ips_site_id`   | `enwiki`         |
//! | `ips_site_page` | `Barack Obama`   |
//!
//! Rows whose site id ends in `wiki` are Wikipedia editions; the prefix is the
//! language. Sister projects such as `enwikiquote` fall out.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use super::{source_row, ExtractStats};
use crate::error::{Error, Result};
use crate::models::SourceRow;
use crate::storage::{BatchSink, FailurePolicy, SortedTable};

/// Entity IRI prefix for Wikidata items
pub const ENTITY_PREFIX: &str = "http://www.wikidata.org/wiki/Q";

/// One row of the site-link table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLink {
    pub item_id: i64,
    pub site_id: String,
    pub site_page: String,
}

impl SiteLink {
    pub fn new(item_id: i64, site_id: impl Into<String>, site_page: impl Into<String>) -> Self {
        Self {
            item_id,
            site_id: site_id.into(),
            site_page: site_page.into(),
        }
    }

    /// Language edition of a Wikipedia site id (`enwiki` -> `en`)
    pub fn wikipedia_lang(&self) -> Option<&str> {
        self.site_id
            .strip_suffix("wiki")
            .filter(|lang| !lang.is_empty())
    }

    /// Source row for a Wikipedia link, `None` for other sites
    pub fn to_source_row(&self) -> Option<SourceRow> {
        let lang = self.wikipedia_lang()?;
        Some(source_row(
            format!("{ENTITY_PREFIX}{}", self.item_id),
            lang,
            &self.site_page,
        ))
    }
}

/// One fetched row of the site-link table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedLink {
    Link(SiteLink),
    /// A row whose site id or page title is not valid UTF-8
    Undecodable { item_id: i64, column: &'static str },
}

impl From<SiteLink> for FetchedLink {
    fn from(link: SiteLink) -> Self {
        FetchedLink::Link(link)
    }
}

/// Paged access to site links
pub trait SiteLinkSource: Send {
    /// Up to `limit` rows starting at `offset`, in a stable order
    fn fetch(&mut self, limit: usize, offset: u64) -> Result<Vec<FetchedLink>>;
}

/// Site links read from a SQLite copy of `wb_items_per_site`
///
/// Sequential fetches resume after the last rowid read; any other offset
/// falls back to an `OFFSET` scan.
pub struct SqliteSiteLinks {
    conn: Connection,
    /// Offset and rowid just past the previous page
    resume: Option<(u64, i64)>,
}

impl SqliteSiteLinks {
    /// Open the database read-only
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn, resume: None }
    }
}

/// MediaWiki declares these columns `varbinary`, so accept blobs as UTF-8.
/// `None` when the bytes are not valid UTF-8.
fn text_value(value: ValueRef<'_>, column: &str) -> rusqlite::Result<Option<String>> {
    match value {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Ok(std::str::from_utf8(bytes).ok().map(str::to_string))
        }
        other => Err(rusqlite::Error::InvalidColumnType(
            0,
            column.to_string(),
            other.data_type(),
        )),
    }
}

fn fetched_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, FetchedLink)> {
    let rowid: i64 = row.get(0)?;
    let item_id: i64 = row.get(1)?;
    let Some(site_id) = text_value(row.get_ref(2)?, "ips_site_id")? else {
        return Ok((rowid, FetchedLink::Undecodable { item_id, column: "ips_site_id" }));
    };
    let Some(site_page) = text_value(row.get_ref(3)?, "ips_site_page")? else {
        return Ok((rowid, FetchedLink::Undecodable { item_id, column: "ips_site_page" }));
    };
    Ok((rowid, SiteLink { item_id, site_id, site_page }.into()))
}

impl SiteLinkSource for SqliteSiteLinks {
    fn fetch(&mut self, limit: usize, offset: u64) -> Result<Vec<FetchedLink>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<(i64, FetchedLink)> = match self.resume {
            Some((next, last_rowid)) if next == offset => {
                let mut stmt = self.conn.prepare_cached(
                    "SELECT rowid, ips_item_id, ips_site_id, ips_site_page
                     FROM wb_items_per_site
                     WHERE rowid > ?1
                     ORDER BY rowid
                     LIMIT ?2",
                )?;
                let page = stmt
                    .query_map([last_rowid, limit], fetched_link)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                page
            }
            _ => {
                let skip = i64::try_from(offset)
                    .map_err(|_| Error::other(format!("Site-link offset {offset} out of range")))?;
                let mut stmt = self.conn.prepare_cached(
                    "SELECT rowid, ips_item_id, ips_site_id, ips_site_page
                     FROM wb_items_per_site
                     ORDER BY rowid
                     LIMIT ?1 OFFSET ?2",
                )?;
                let page = stmt
                    .query_map([limit, skip], fetched_link)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                page
            }
        };

        if let Some((last_rowid, _)) = rows.last() {
            self.resume = Some((offset + rows.len() as u64, *last_rowid));
        }
        Ok(rows.into_iter().map(|(_, link)| link).collect())
    }
}

/// Pages through a [`SiteLinkSource`] into a source table
#[derive(Debug, Clone)]
pub struct WikidataExtractor {
    page_size: usize,
    policy: FailurePolicy,
}

impl WikidataExtractor {
    pub fn new(page_size: usize, policy: FailurePolicy) -> Self {
        Self {
            page_size: page_size.max(1),
            policy,
        }
    }

    pub fn extract(
        &self,
        source: &mut dyn SiteLinkSource,
        table: &dyn SortedTable<SourceRow>,
    ) -> Result<ExtractStats> {
        let mut sink = BatchSink::new(table, self.policy);
        let mut stats = ExtractStats::default();
        let mut offset = 0u64;

        loop {
            let links = source.fetch(self.page_size, offset)?;
            if links.is_empty() {
                break;
            }
            offset += links.len() as u64;
            stats.scanned += links.len() as u64;

            let mut rows = Vec::with_capacity(links.len());
            for link in &links {
                match link {
                    FetchedLink::Link(link) => rows.extend(link.to_source_row()),
                    FetchedLink::Undecodable { item_id, column } => {
                        stats.skipped += 1;
                        tracing::debug!(item_id, column, "Skipping non UTF-8 site link");
                    }
                }
            }
            sink.write(&rows)?;
            tracing::debug!(offset, written = sink.written(), "Wikidata batch written");

            if links.len() < self.page_size {
                break;
            }
        }

        stats.extracted = sink.written();
        tracing::info!(
            scanned = stats.scanned,
            extracted = stats.extracted,
            skipped = stats.skipped,
            "Wikidata extraction complete"
        );
        Ok(stats)
    }
}
