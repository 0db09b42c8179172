// report.rs — Funnel conversion reports.
//
// A report compares two session populations of one goal: sessions that
// reached the start step, and sessions that reached the target step. Both
// come back from the store as bucket → count maps that carry the total under
// `_filtered`; the arithmetic here turns them into ratios.
//
// Ratios are plain f64 divisions. A bucket with zero starts yields NaN or
// infinity; that is a valid report, not an error.

use std::collections::BTreeMap;
use std::ops::Index;

use ctx_store::{BucketCounts, FILTERED_COUNT_KEY};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Split value bucketing sessions by their creation date.
pub const SESSION_CREATION_DATE_SPLIT: &str = "sessionCreationDate";

/// Conversion figures for one bucket (or for the whole population).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub start_count: u64,
    pub target_count: u64,
    /// `target_count / start_count`.
    pub conversion_rate: f64,
    /// `target_count / global target_count`. Always 0 on the global stats.
    pub percentage: f64,
}

/// Per-bucket stats in the order the store ranked the start buckets.
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split(Vec<(String, Stat)>);

impl Split {
    pub fn get(&self, key: &str) -> Option<&Stat> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, stat)| stat)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, Stat)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Split {
    type Item = &'a (String, Stat);
    type IntoIter = std::slice::Iter<'a, (String, Stat)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Index<&str> for Split {
    type Output = Stat;

    /// Panics if `key` is not a bucket of the split.
    fn index(&self, key: &str) -> &Stat {
        match self.get(key) {
            Some(stat) => stat,
            None => panic!("no split bucket '{}'", key),
        }
    }
}

impl Serialize for Split {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, stat) in &self.0 {
            map.serialize_entry(key, stat)?;
        }
        map.end()
    }
}

/// A goal funnel report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalReport {
    pub global_stats: Stat,
    /// Keyed strictly by the buckets of the start population.
    pub split: Split,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    numerator as f64 / denominator as f64
}

impl GoalReport {
    /// Build a report from the start and target bucket counts.
    ///
    /// The totals are taken from `_filtered`; counts without it total their
    /// buckets. Buckets only present in `target` are ignored; buckets only
    /// present in `start` get a target count of zero. The split keeps the
    /// order of `start`.
    pub fn from_counts(mut start: BucketCounts, mut target: BucketCounts) -> Self {
        let start_total = take_total(&mut start);
        let target_total = take_total(&mut target);
        let target: BTreeMap<String, u64> = target.into_iter().collect();

        let global_stats = Stat {
            key: None,
            start_count: start_total,
            target_count: target_total,
            conversion_rate: ratio(target_total, start_total),
            percentage: 0.0,
        };

        let split = start
            .into_iter()
            .map(|(key, start_count)| {
                let target_count = target.get(&key).copied().unwrap_or(0);
                let stat = Stat {
                    key: Some(key.clone()),
                    start_count,
                    target_count,
                    conversion_rate: ratio(target_count, start_count),
                    percentage: ratio(target_count, target_total),
                };
                (key, stat)
            })
            .collect();

        Self {
            global_stats,
            split: Split(split),
        }
    }
}

fn take_total(counts: &mut BucketCounts) -> u64 {
    match counts.iter().position(|(key, _)| key == FILTERED_COUNT_KEY) {
        Some(at) => counts.remove(at).1,
        None => counts.iter().map(|(_, count)| count).sum(),
    }
}
