//! Usage history: change totals per day or per week for one item.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use stockroom_core::{ItemId, add_quantities};

use crate::audit::AuditEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsagePeriod {
    Daily,
    /// ISO weeks, bucketed by their Monday.
    Weekly,
}

/// Summed change for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePoint {
    pub bucket_start: NaiveDate,
    pub total_change: f64,
    pub entries: usize,
}

/// Group an item's audit entries into daily or weekly totals.
///
/// `month` (1-12) keeps only entries recorded in that calendar month, any
/// year. Points come back ordered by bucket start; empty buckets are omitted.
pub fn usage_series(
    entries: &[AuditEntry],
    item_id: &ItemId,
    period: UsagePeriod,
    month: Option<u32>,
) -> Vec<UsagePoint> {
    let mut buckets: BTreeMap<NaiveDate, UsagePoint> = BTreeMap::new();

    for entry in entries.iter().filter(|e| &e.item_id == item_id) {
        let day = entry.recorded_at.date_naive();
        if month.is_some_and(|m| day.month() != m) {
            continue;
        }
        let bucket_start = match period {
            UsagePeriod::Daily => day,
            UsagePeriod::Weekly => {
                day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
            }
        };
        let point = buckets.entry(bucket_start).or_insert(UsagePoint {
            bucket_start,
            total_change: 0.0,
            entries: 0,
        });
        point.total_change = add_quantities(point.total_change, entry.delta);
        point.entries += 1;
    }

    buckets.into_values().collect()
}
