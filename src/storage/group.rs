//! Streaming group-by over a sorted scan
//!
//! Rows arrive sorted by the group column. Consecutive rows with the same key
//! form a group; when the key changes the finished group is reduced into
//! output rows. The group that is still open at the end of a page is carried
//! into the next page, and the last group is flushed when the scan ends.
//! Output is written once per input page, so memory stays bounded by the
//! page size plus one group.

use super::{column_positions, BatchSink, Field, PageReader, Record, SortedTable};
use crate::error::Result;

/// Counters for one grouped pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub rows: u64,
    pub groups: u64,
    pub pages: u64,
}

/// Group `input` by `key_of` and write whatever `reduce` emits into `sink`
///
/// `sort_keys` must start with the column `key_of` reads; further keys only
/// fix the order of rows inside a group.
pub fn group_into<R, O>(
    input: &dyn SortedTable<R>,
    sort_keys: &[&str],
    page_size: usize,
    key_of: impl Fn(&R) -> &str,
    mut reduce: impl FnMut(&[R], &mut Vec<O>),
    sink: &mut BatchSink<'_, O>,
) -> Result<GroupStats>
where
    R: Record,
    O: Record,
{
    let mut reader = PageReader::new(input, sort_keys, page_size);
    let mut stats = GroupStats::default();
    let mut group: Vec<R> = Vec::new();
    let mut pending: Vec<O> = Vec::new();

    while let Some(page) = reader.next_page()? {
        for row in page {
            stats.rows += 1;
            let key_changed = group
                .first()
                .is_some_and(|first| key_of(first) != key_of(&row));
            if key_changed {
                reduce(&group, &mut pending);
                stats.groups += 1;
                group.clear();
            }
            group.push(row);
        }

        // the open group may continue on the next page
        sink.write(&pending)?;
        pending.clear();
    }

    if !group.is_empty() {
        reduce(&group, &mut pending);
        stats.groups += 1;
        sink.write(&pending)?;
    }

    stats.pages = reader.pages_loaded();
    Ok(stats)
}

/// Number of distinct values in `column`
pub fn count_distinct<R: Record>(
    table: &dyn SortedTable<R>,
    column: &str,
    page_size: usize,
) -> Result<u64> {
    let position = column_positions::<R>(table.name(), &[column])?[0];
    let sort_keys = [column];
    let mut reader = PageReader::new(table, &sort_keys, page_size);
    let mut last: Option<Field> = None;
    let mut distinct = 0u64;

    while let Some(page) = reader.next_page()? {
        for row in page {
            let value = row.to_fields().swap_remove(position);
            if last.as_ref() != Some(&value) {
                distinct += 1;
                last = Some(value);
            }
        }
    }
    Ok(distinct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityCoverage, SourceRow};
    use crate::storage::{FailurePolicy, MemoryTable};

    fn rows(ids: &[&str]) -> Vec<SourceRow> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| SourceRow::new(*id, format!("u{i}"), format!("l{i}"), format!("h{i}")))
            .collect()
    }

    fn count_groups(input: &MemoryTable<SourceRow>, page_size: usize) -> Vec<(String, u32)> {
        let output: MemoryTable<EntityCoverage> = MemoryTable::new("out");
        let mut sink = BatchSink::<EntityCoverage>::new(&output, FailurePolicy::Abort);
        group_into::<SourceRow, EntityCoverage>(
            input,
            &["entity_id"],
            page_size,
            |r: &SourceRow| r.entity_id.as_str(),
            |group: &[SourceRow], out: &mut Vec<EntityCoverage>| {
                out.push(EntityCoverage {
                    entity_id: group[0].entity_id.clone(),
                    lang_count: group.len() as u32,
                })
            },
            &mut sink,
        )
        .unwrap();

        output
            .scan_sorted(&["entity_id"], 100, None)
            .unwrap()
            .rows
            .into_iter()
            .map(|c| (c.entity_id, c.lang_count))
            .collect()
    }

    #[test]
    fn test_group_spanning_page_boundary() {
        let input: MemoryTable<SourceRow> = MemoryTable::new("in");
        input
            .insert_batch(&rows(&["a", "b", "b", "b", "c"]))
            .unwrap();

        let expected = vec![
            ("a".to_string(), 1),
            ("b".to_string(), 3),
            ("c".to_string(), 1),
        ];
        // page size 2 splits the "b" group across two pages
        assert_eq!(count_groups(&input, 2), expected);
        assert_eq!(count_groups(&input, 4), expected);
        assert_eq!(count_groups(&input, 100), expected);
    }

    #[test]
    fn test_final_group_is_flushed() {
        let input: MemoryTable<SourceRow> = MemoryTable::new("in");
        input.insert_batch(&rows(&["z", "z"])).unwrap();
        assert_eq!(count_groups(&input, 1), vec![("z".to_string(), 2)]);
    }

    #[test]
    fn test_empty_input() {
        let input: MemoryTable<SourceRow> = MemoryTable::new("in");
        assert!(count_groups(&input, 3).is_empty());
    }

    #[test]
    fn test_count_distinct_across_pages() {
        let input: MemoryTable<SourceRow> = MemoryTable::new("in");
        input
            .insert_batch(&rows(&["b", "a", "b", "c", "a"]))
            .unwrap();
        for page_size in [1, 2, 10] {
            assert_eq!(
                count_distinct::<SourceRow>(&input, "entity_id", page_size).unwrap(),
                3
            );
        }
        assert!(count_distinct::<SourceRow>(&input, "nope", 10).is_err());
    }
}
