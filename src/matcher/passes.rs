//! Building blocks shared by the matchers
//!
//! - [`filter_pass`] keeps the pairs satisfying a predicate
//! - [`max_conf_pass`] keeps, per entity of one side, the partners with the
//!   highest shared count (ties kept)
//! - [`unique_pass`] keeps the pairs that are the only candidate of their
//!   entity on one side

use std::cmp::Ordering;

use super::MatchSettings;
use crate::error::Result;
use crate::models::{MatchedPair, ScoredPair, Side};
use crate::storage::{group_into, BatchSink, PageReader, SortedTable};

const PAIR_ORDER: &[&str] = &["fb_id", "wd_id"];

/// Copy the pairs of `input` for which `keep` holds into `output`
pub fn filter_pass<R: ScoredPair>(
    input: &dyn SortedTable<R>,
    keep: impl Fn(&R) -> bool,
    settings: &MatchSettings,
    output: &dyn SortedTable<R>,
) -> Result<u64> {
    let mut reader = PageReader::new(input, PAIR_ORDER, settings.page_size);
    let mut sink = BatchSink::new(output, settings.failure_policy);

    while let Some(page) = reader.next_page()? {
        let kept: Vec<R> = page.into_iter().filter(|p| keep(p)).collect();
        sink.write(&kept)?;
    }

    tracing::debug!(
        input = input.name(),
        output = output.name(),
        rows = sink.written(),
        "Filter pass complete"
    );
    Ok(sink.written())
}

/// The best-scoring partners of one entity's group
///
/// Runs the group as a small state machine: a higher score replaces the
/// current partners, an equal score joins them.
pub fn best_partners<R: ScoredPair>(group: &[R], out: &mut Vec<MatchedPair>) {
    let mut best_count = 0u32;
    let mut best: Vec<&R> = Vec::new();
    for pair in group {
        match pair.score().cmp(&best_count) {
            Ordering::Greater => {
                best_count = pair.score();
                best.clear();
                best.push(pair);
            }
            Ordering::Equal => best.push(pair),
            Ordering::Less => {}
        }
    }
    out.extend(best.into_iter().map(ScoredPair::to_matched));
}

/// Group `input` by `side` and keep each entity's best partners
pub fn max_conf_pass<R: ScoredPair>(
    input: &dyn SortedTable<R>,
    side: Side,
    settings: &MatchSettings,
    output: &dyn SortedTable<MatchedPair>,
) -> Result<u64> {
    let sort_keys = [side.id_column(), side.other().id_column()];
    let mut sink = BatchSink::new(output, settings.failure_policy);
    let grouped = group_into(
        input,
        &sort_keys,
        settings.page_size,
        move |p: &R| p.id(side),
        best_partners::<R>,
        &mut sink,
    )?;

    tracing::debug!(
        input = input.name(),
        output = output.name(),
        side = %side,
        groups = grouped.groups,
        rows = sink.written(),
        "Max-confidence pass complete"
    );
    Ok(sink.written())
}

/// Group `input` by `side` and keep only single-member groups
pub fn unique_pass<R: ScoredPair>(
    input: &dyn SortedTable<R>,
    side: Side,
    settings: &MatchSettings,
    output: &dyn SortedTable<MatchedPair>,
) -> Result<u64> {
    let sort_keys = [side.id_column(), side.other().id_column()];
    let mut sink = BatchSink::new(output, settings.failure_policy);
    let grouped = group_into(
        input,
        &sort_keys,
        settings.page_size,
        move |p: &R| p.id(side),
        |group: &[R], out: &mut Vec<MatchedPair>| {
            if let [only] = group {
                out.push(only.to_matched());
            }
        },
        &mut sink,
    )?;

    tracing::debug!(
        input = input.name(),
        output = output.name(),
        side = %side,
        groups = grouped.groups,
        rows = sink.written(),
        "Uniqueness pass complete"
    );
    Ok(sink.written())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::test_support::stat;
    use crate::models::PairStat;
    use crate::storage::MemoryTable;

    fn settings(page_size: usize) -> MatchSettings {
        MatchSettings {
            page_size,
            ..MatchSettings::default()
        }
    }

    fn matched(table: &MemoryTable<MatchedPair>) -> Vec<(String, String, u32)> {
        let mut rows: Vec<_> = table
            .scan_sorted(&["fb_id", "wd_id"], 1000, None)
            .unwrap()
            .rows
            .into_iter()
            .map(|p| (p.fb_id, p.wd_id, p.confidence))
            .collect();
        rows.sort();
        rows
    }

    #[test]
    fn test_best_partners_keeps_ties() {
        let group = [
            stat("F1", "W1", 1, 5, 5),
            stat("F1", "W2", 3, 5, 5),
            stat("F1", "W3", 2, 5, 5),
            stat("F1", "W4", 3, 5, 5),
        ];
        let mut out = Vec::new();
        best_partners(&group, &mut out);
        let wds: Vec<_> = out.iter().map(|p| p.wd_id.as_str()).collect();
        assert_eq!(wds, vec!["W2", "W4"]);
        assert!(out.iter().all(|p| p.confidence == 3));
    }

    #[test]
    fn test_max_conf_pass_by_wikidata() {
        let input: MemoryTable<PairStat> = MemoryTable::new("in");
        input
            .insert_batch(&[
                stat("F1", "W1", 2, 5, 5),
                stat("F2", "W1", 4, 5, 5),
                stat("F3", "W2", 1, 5, 5),
            ])
            .unwrap();
        let output: MemoryTable<MatchedPair> = MemoryTable::new("out");

        for page_size in [1, 2, 10] {
            output.clear().unwrap();
            max_conf_pass::<PairStat>(&input, Side::Wikidata, &settings(page_size), &output).unwrap();
            assert_eq!(
                matched(&output),
                vec![
                    ("F2".to_string(), "W1".to_string(), 4),
                    ("F3".to_string(), "W2".to_string(), 1)
                ]
            );
        }
    }

    #[test]
    fn test_unique_pass() {
        let input: MemoryTable<PairStat> = MemoryTable::new("in");
        input
            .insert_batch(&[
                stat("F1", "W1", 1, 1, 1),
                stat("F2", "W2", 1, 2, 1),
                stat("F2", "W3", 1, 2, 1),
                stat("F3", "W4", 2, 2, 2),
            ])
            .unwrap();
        let output: MemoryTable<MatchedPair> = MemoryTable::new("out");

        unique_pass::<PairStat>(&input, Side::Freebase, &settings(1), &output).unwrap();
        assert_eq!(
            matched(&output),
            vec![
                ("F1".to_string(), "W1".to_string(), 1),
                ("F3".to_string(), "W4".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_filter_pass() {
        let input: MemoryTable<PairStat> = MemoryTable::new("in");
        input
            .insert_batch(&[stat("F1", "W1", 1, 1, 1), stat("F2", "W2", 1, 4, 1)])
            .unwrap();
        let output: MemoryTable<PairStat> = MemoryTable::new("out");

        let kept = filter_pass::<PairStat>(
            &input,
            |p: &PairStat| p.fb_lang_count == 1,
            &settings(1),
            &output,
        )
        .unwrap();
        assert_eq!(kept, 1);
        assert_eq!(output.count().unwrap(), 1);
    }
}
