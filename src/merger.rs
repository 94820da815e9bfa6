//! Series merging
//!
//! Unifies independently provided cumulative counters into one long-form table
//! keyed by (GroupKey, date). The join is outer: a date present in only one
//! source still yields a row. Sub-region sentinels are applied before any
//! grouping so a series is never split on a blank key.

use crate::adapters::WideTable;
use crate::types::{GroupKey, Metric, Partition, RawObservation};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Merger for wide counter tables
pub struct SeriesMerger;

impl SeriesMerger {
    /// Outer-join the source tables into a date-sorted partition per series.
    ///
    /// Recovered values missing at a (key, date) default to 0, including when
    /// no recovered table is supplied at all. Confirmed and deaths stay
    /// undefined until normalization.
    pub fn merge(
        confirmed: &WideTable,
        deaths: &WideTable,
        recovered: Option<&WideTable>,
    ) -> Partition<RawObservation> {
        let mut joined: BTreeMap<(GroupKey, NaiveDate), RawObservation> = BTreeMap::new();

        absorb(&mut joined, confirmed);
        absorb(&mut joined, deaths);
        if let Some(table) = recovered {
            absorb(&mut joined, table);
        }

        let mut partition: Partition<RawObservation> = BTreeMap::new();
        // BTreeMap iteration yields (key, date) order, so each series arrives sorted
        for ((key, _), mut observation) in joined {
            observation.recovered.get_or_insert(0.0);
            partition.entry(key).or_default().push(observation);
        }

        log::info!(
            "merged {} series ({} observations)",
            partition.len(),
            partition.values().map(Vec::len).sum::<usize>()
        );

        partition
    }
}

fn absorb(joined: &mut BTreeMap<(GroupKey, NaiveDate), RawObservation>, table: &WideTable) {
    let mut duplicates = 0usize;

    for row in &table.rows {
        let key = GroupKey::new(row.region.as_str(), row.sub_region.as_deref());

        for (date, value) in table.dates.iter().zip(&row.values) {
            let observation = joined
                .entry((key.clone(), *date))
                .or_insert_with(|| RawObservation {
                    key: key.clone(),
                    date: *date,
                    confirmed: None,
                    deaths: None,
                    recovered: None,
                    latitude: None,
                    longitude: None,
                });

            if observation.latitude.is_none() {
                observation.latitude = row.latitude;
            }
            if observation.longitude.is_none() {
                observation.longitude = row.longitude;
            }

            let slot = match table.metric {
                Metric::Confirmed => &mut observation.confirmed,
                Metric::Deaths => &mut observation.deaths,
                Metric::Recovered => &mut observation.recovered,
            };
            match (slot.is_some(), value) {
                (true, Some(_)) => duplicates += 1,
                (false, Some(v)) => *slot = Some(*v),
                _ => {}
            }
        }
    }

    if duplicates > 0 {
        log::warn!(
            "{} table repeats {} (series, date) cells; keeping the first value",
            table.metric,
            duplicates
        );
    }
}
