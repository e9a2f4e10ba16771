// Core data structures for the sameas pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::{Column, ColumnKind, Field, FieldReader, Record};

/// Knowledge base a record or an identifier comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Freebase,
    Wikidata,
}

impl Side {
    /// Column holding this side's identifier in every pair table
    pub fn id_column(&self) -> &'static str {
        match self {
            Self::Freebase => "fb_id",
            Self::Wikidata => "wd_id",
        }
    }

    /// The opposite knowledge base
    pub fn other(&self) -> Self {
        match self {
            Self::Freebase => Self::Wikidata,
            Self::Wikidata => Self::Freebase,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Freebase => "freebase",
            Self::Wikidata => "wikidata",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (entity, Wikipedia language edition) link extracted from a source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRow {
    pub entity_id: String,
    pub wikipedia_url: String,
    pub lang: String,
    /// Hash of the canonical URL; the join key
    pub url_hash: String,
}

impl SourceRow {
    pub fn new(
        entity_id: impl Into<String>,
        wikipedia_url: impl Into<String>,
        lang: impl Into<String>,
        url_hash: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            wikipedia_url: wikipedia_url.into(),
            lang: lang.into(),
            url_hash: url_hash.into(),
        }
    }
}

impl Record for SourceRow {
    const COLUMNS: &'static [Column] = &[
        Column::new("entity_id", ColumnKind::Text),
        Column::new("wikipedia_url", ColumnKind::Text),
        Column::new("lang", ColumnKind::Text),
        Column::new("url_hash", ColumnKind::Text),
    ];
    const INDEXES: &'static [&'static [&'static str]] = &[&["url_hash"], &["entity_id"]];

    fn to_fields(&self) -> Vec<Field> {
        vec![
            Field::text(&self.entity_id),
            Field::text(&self.wikipedia_url),
            Field::text(&self.lang),
            Field::text(&self.url_hash),
        ]
    }

    fn from_fields(fields: Vec<Field>) -> Result<Self, String> {
        let mut r = FieldReader::new(fields);
        Ok(Self {
            entity_id: r.text()?,
            wikipedia_url: r.text()?,
            lang: r.text()?,
            url_hash: r.text()?,
        })
    }
}

/// A Freebase row and a Wikidata row that share a URL hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawPair {
    pub fb_id: String,
    pub fb_lang: String,
    pub wd_id: String,
    pub wd_lang: String,
    pub url_hash: String,
}

impl RawPair {
    pub fn from_rows(fb: &SourceRow, wd: &SourceRow) -> Self {
        Self {
            fb_id: fb.entity_id.clone(),
            fb_lang: fb.lang.clone(),
            wd_id: wd.entity_id.clone(),
            wd_lang: wd.lang.clone(),
            url_hash: fb.url_hash.clone(),
        }
    }
}

impl Record for RawPair {
    const COLUMNS: &'static [Column] = &[
        Column::new("fb_id", ColumnKind::Text),
        Column::new("fb_lang", ColumnKind::Text),
        Column::new("wd_id", ColumnKind::Text),
        Column::new("wd_lang", ColumnKind::Text),
        Column::new("url_hash", ColumnKind::Text),
    ];
    const INDEXES: &'static [&'static [&'static str]] = &[&["fb_id", "wd_id"]];

    fn to_fields(&self) -> Vec<Field> {
        vec![
            Field::text(&self.fb_id),
            Field::text(&self.fb_lang),
            Field::text(&self.wd_id),
            Field::text(&self.wd_lang),
            Field::text(&self.url_hash),
        ]
    }

    fn from_fields(fields: Vec<Field>) -> Result<Self, String> {
        let mut r = FieldReader::new(fields);
        Ok(Self {
            fb_id: r.text()?,
            fb_lang: r.text()?,
            wd_id: r.text()?,
            wd_lang: r.text()?,
            url_hash: r.text()?,
        })
    }
}

/// Deduplicated candidate pair with the number of language editions backing it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CleansedPair {
    pub fb_id: String,
    pub wd_id: String,
    pub shared_lang_count: u32,
}

impl Record for CleansedPair {
    const COLUMNS: &'static [Column] = &[
        Column::new("fb_id", ColumnKind::Text),
        Column::new("wd_id", ColumnKind::Text),
        Column::new("shared_lang_count", ColumnKind::Integer),
    ];
    const UNIQUE_KEY: &'static [&'static str] = &["fb_id", "wd_id"];
    const INDEXES: &'static [&'static [&'static str]] = &[&["wd_id"]];

    fn to_fields(&self) -> Vec<Field> {
        vec![
            Field::text(&self.fb_id),
            Field::text(&self.wd_id),
            Field::count(self.shared_lang_count),
        ]
    }

    fn from_fields(fields: Vec<Field>) -> Result<Self, String> {
        let mut r = FieldReader::new(fields);
        Ok(Self {
            fb_id: r.text()?,
            wd_id: r.text()?,
            shared_lang_count: r.count()?,
        })
    }
}

/// Number of language editions an entity links to in its own source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityCoverage {
    pub entity_id: String,
    pub lang_count: u32,
}

impl Record for EntityCoverage {
    const COLUMNS: &'static [Column] = &[
        Column::new("entity_id", ColumnKind::Text),
        Column::new("lang_count", ColumnKind::Integer),
    ];
    const UNIQUE_KEY: &'static [&'static str] = &["entity_id"];

    fn to_fields(&self) -> Vec<Field> {
        vec![Field::text(&self.entity_id), Field::count(self.lang_count)]
    }

    fn from_fields(fields: Vec<Field>) -> Result<Self, String> {
        let mut r = FieldReader::new(fields);
        Ok(Self {
            entity_id: r.text()?,
            lang_count: r.count()?,
        })
    }
}

/// Candidate pair joined with the coverage of both entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairStat {
    pub fb_id: String,
    pub wd_id: String,
    pub shared_lang_count: u32,
    pub fb_lang_count: u32,
    pub wd_lang_count: u32,
}

impl PairStat {
    /// Share of the Freebase entity's editions that back this pair
    pub fn fb_ratio(&self) -> f64 {
        ratio(self.shared_lang_count, self.fb_lang_count)
    }

    /// Share of the Wikidata entity's editions that back this pair
    pub fn wd_ratio(&self) -> f64 {
        ratio(self.shared_lang_count, self.wd_lang_count)
    }
}

fn ratio(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(total)
    }
}

impl Record for PairStat {
    const COLUMNS: &'static [Column] = &[
        Column::new("fb_id", ColumnKind::Text),
        Column::new("wd_id", ColumnKind::Text),
        Column::new("shared_lang_count", ColumnKind::Integer),
        Column::new("fb_lang_count", ColumnKind::Integer),
        Column::new("wd_lang_count", ColumnKind::Integer),
    ];
    const UNIQUE_KEY: &'static [&'static str] = &["fb_id", "wd_id"];
    const INDEXES: &'static [&'static [&'static str]] = &[&["wd_id"]];

    fn to_fields(&self) -> Vec<Field> {
        vec![
            Field::text(&self.fb_id),
            Field::text(&self.wd_id),
            Field::count(self.shared_lang_count),
            Field::count(self.fb_lang_count),
            Field::count(self.wd_lang_count),
        ]
    }

    fn from_fields(fields: Vec<Field>) -> Result<Self, String> {
        let mut r = FieldReader::new(fields);
        Ok(Self {
            fb_id: r.text()?,
            wd_id: r.text()?,
            shared_lang_count: r.count()?,
            fb_lang_count: r.count()?,
            wd_lang_count: r.count()?,
        })
    }
}

/// Final sameAs link emitted by a matcher
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchedPair {
    pub fb_id: String,
    pub wd_id: String,
    /// Shared-language count that selected the pair
    pub confidence: u32,
}

impl MatchedPair {
    pub fn new(fb_id: impl Into<String>, wd_id: impl Into<String>, confidence: u32) -> Self {
        Self {
            fb_id: fb_id.into(),
            wd_id: wd_id.into(),
            confidence,
        }
    }
}

impl Record for MatchedPair {
    const COLUMNS: &'static [Column] = &[
        Column::new("fb_id", ColumnKind::Text),
        Column::new("wd_id", ColumnKind::Text),
        Column::new("confidence", ColumnKind::Integer),
    ];
    const UNIQUE_KEY: &'static [&'static str] = &["fb_id", "wd_id"];
    const INDEXES: &'static [&'static [&'static str]] = &[&["wd_id"]];

    fn to_fields(&self) -> Vec<Field> {
        vec![
            Field::text(&self.fb_id),
            Field::text(&self.wd_id),
            Field::count(self.confidence),
        ]
    }

    fn from_fields(fields: Vec<Field>) -> Result<Self, String> {
        let mut r = FieldReader::new(fields);
        Ok(Self {
            fb_id: r.text()?,
            wd_id: r.text()?,
            confidence: r.count()?,
        })
    }
}

/// A (fb, wd) pair record carrying a shared-language score
///
/// Matchers are written against this trait so the same pass can consume
/// either the full pair statistics or the output of a previous pass.
pub trait ScoredPair: Record {
    fn fb_id(&self) -> &str;
    fn wd_id(&self) -> &str;
    fn score(&self) -> u32;

    /// Identifier on the given side
    fn id(&self, side: Side) -> &str {
        match side {
            Side::Freebase => self.fb_id(),
            Side::Wikidata => self.wd_id(),
        }
    }

    fn to_matched(&self) -> MatchedPair {
        MatchedPair::new(self.fb_id(), self.wd_id(), self.score())
    }
}

impl ScoredPair for CleansedPair {
    fn fb_id(&self) -> &str {
        &self.fb_id
    }
    fn wd_id(&self) -> &str {
        &self.wd_id
    }
    fn score(&self) -> u32 {
        self.shared_lang_count
    }
}

impl ScoredPair for PairStat {
    fn fb_id(&self) -> &str {
        &self.fb_id
    }
    fn wd_id(&self) -> &str {
        &self.wd_id
    }
    fn score(&self) -> u32 {
        self.shared_lang_count
    }
}

impl ScoredPair for MatchedPair {
    fn fb_id(&self) -> &str {
        &self.fb_id
    }
    fn wd_id(&self) -> &str {
        &self.wd_id
    }
    fn score(&self) -> u32 {
        self.confidence
    }
}
