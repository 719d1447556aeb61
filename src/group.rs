//! Year grouping for the index page.
//!
//! Entries are bucketed by the calendar year of their date. Buckets are
//! ordered most recent first; within a bucket entries keep the order they
//! were loaded in unless an [`EntryOrder`] says otherwise.

use crate::types::{Entry, YearGroup};
use serde::Deserialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Ordering of entries inside one year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryOrder {
    /// Manifest or directory order.
    #[default]
    Source,
    NewestFirst,
    OldestFirst,
}

/// Group entries by year, newest year first.
pub fn group_by_year(entries: &[Entry], order: EntryOrder) -> Vec<YearGroup> {
    let mut by_year: BTreeMap<Reverse<i32>, Vec<Entry>> = BTreeMap::new();
    for entry in entries {
        by_year
            .entry(Reverse(entry.year()))
            .or_default()
            .push(entry.clone());
    }

    by_year
        .into_iter()
        .map(|(Reverse(year), mut entries)| {
            // Stable sorts: same-day entries keep their source order.
            match order {
                EntryOrder::Source => {}
                EntryOrder::NewestFirst => entries.sort_by_key(|e| Reverse(e.date)),
                EntryOrder::OldestFirst => entries.sort_by_key(|e| e.date),
            }
            YearGroup { year, entries }
        })
        .collect()
}
