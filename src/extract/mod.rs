//! Source extraction
//!
//! Both knowledge bases are reduced to the same row shape,
//! `(entity_id, wikipedia_url, lang, url_hash)`, one row per language
//! edition an entity links to. The Wikipedia URL is canonicalised identically
//! for both sources so that equal articles produce equal hashes.
//!
//! - [`freebase`] - line-oriented RDF triple dump
//! - [`wikidata`] - `wb_items_per_site` site-link table

pub mod freebase;
pub mod wikidata;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::SourceRow;

pub use freebase::FreebaseExtractor;
pub use wikidata::{FetchedLink, SiteLink, SiteLinkSource, SqliteSiteLinks, WikidataExtractor};

/// Canonical article URL for a language edition and a page title
///
/// Spaces become underscores, then the title is form-URL-encoded
/// (`*-._` and alphanumerics kept, everything else `%XX` of its UTF-8 bytes).
pub fn canonical_url(lang: &str, title: &str) -> String {
    let title = title.replace(' ', "_");
    let encoded: String = url::form_urlencoded::byte_serialize(title.as_bytes()).collect();
    format!("http://{lang}.wikipedia.org/wiki/{encoded}")
}

/// Join key of a canonical URL: lowercase hex SHA-256
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Build a source row for `entity_id` linking to `title` in edition `lang`
pub fn source_row(entity_id: impl Into<String>, lang: &str, title: &str) -> SourceRow {
    let url = canonical_url(lang, title);
    let hash = url_hash(&url);
    SourceRow::new(entity_id, url, lang, hash)
}

/// Counters reported by an extraction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    /// Input lines or rows read
    pub scanned: u64,
    /// Rows written to the source table
    pub extracted: u64,
    /// Input that looked relevant but could not be parsed
    pub skipped: u64,
}

impl ExtractStats {
    /// Input that was read but is not a Wikipedia link
    pub fn filtered(&self) -> u64 {
        self.scanned
            .saturating_sub(self.extracted)
            .saturating_sub(self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_url_encoding() {
        assert_eq!(
            canonical_url("en", "Barack Obama"),
            "http://en.wikipedia.org/wiki/Barack_Obama"
        );
        assert_eq!(
            canonical_url("fr", "Café (film)"),
            "http://fr.wikipedia.org/wiki/Caf%C3%A9_%28film%29"
        );
        assert_eq!(
            canonical_url("de", "A*B-C.D"),
            "http://de.wikipedia.org/wiki/A*B-C.D"
        );
    }

    #[test]
    fn test_url_hash_is_stable_hex() {
        let hash = url_hash("http://en.wikipedia.org/wiki/Berlin");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hash, url_hash("http://en.wikipedia.org/wiki/Berlin"));
        assert_ne!(hash, url_hash("http://de.wikipedia.org/wiki/Berlin"));
    }

    #[test]
    fn test_space_and_underscore_titles_share_hash() {
        let a = source_row("m.01", "en", "New York");
        let b = source_row("Q60", "en", "New_York");
        assert_eq!(a.url_hash, b.url_hash);
        assert_eq!(a.wikipedia_url, b.wikipedia_url);
    }

    #[test]
    fn test_filtered_count() {
        let stats = ExtractStats {
            scanned: 10,
            extracted: 4,
            skipped: 1,
        };
        assert_eq!(stats.filtered(), 5);
    }
}
