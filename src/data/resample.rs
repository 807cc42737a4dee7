use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveTime, TimeDelta};

use super::model::{Column, TimeTable, Timestamp};

/// Midnight of the day `t` falls on; the default bucket origin.
pub fn day_start(t: &Timestamp) -> Timestamp {
    t.date().and_time(NaiveTime::MIN)
}

/// Label of the right-closed bucket containing `t`: the smallest
/// `origin + k * interval` (k may be negative) that is `>= t`.
pub fn bucket_label(t: &Timestamp, origin: &Timestamp, interval: u32) -> Timestamp {
    let interval = i64::from(interval.max(1));
    let offset = *t - *origin;
    let nanos = offset.subsec_nanos();
    // Normalise so the whole-second part is floored and nanos are >= 0.
    let (secs, nanos) = if nanos < 0 {
        (offset.num_seconds() - 1, nanos + 1_000_000_000)
    } else {
        (offset.num_seconds(), nanos)
    };
    let rem = secs.rem_euclid(interval);
    if rem == 0 && nanos == 0 {
        return *t;
    }
    *t - TimeDelta::nanoseconds(i64::from(nanos)) + TimeDelta::seconds(interval - rem)
}

/// Median of the present values, `None` when there are none.
pub fn median(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let mut present: Vec<f64> = values.into_iter().flatten().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 1 {
        Some(present[mid])
    } else {
        Some((present[mid - 1] + present[mid]) / 2.0)
    }
}

/// Regrid `table` onto `interval`-second buckets counted from `origin`,
/// right-closed and right-labelled, taking the per-column median of each
/// bucket.
///
/// Buckets without samples produce no row; see [`fill_grid`].
pub fn resample(table: &TimeTable, origin: &Timestamp, interval: u32) -> TimeTable {
    let mut buckets: BTreeMap<Timestamp, Vec<usize>> = BTreeMap::new();
    for (i, t) in table.index.iter().enumerate() {
        buckets
            .entry(bucket_label(t, origin, interval))
            .or_default()
            .push(i);
    }

    let index: Vec<Timestamp> = buckets.keys().copied().collect();
    let columns = table
        .columns
        .iter()
        .map(|c| {
            let values = buckets
                .values()
                .map(|rows| median(rows.iter().map(|&i| c.values[i])))
                .collect();
            Column::new(c.name.clone(), values)
        })
        .collect();
    TimeTable::new(index, columns)
}

/// Insert an all-null row for every bucket label between the first and last
/// row of a resampled table, so the index becomes a regular grid.
pub fn fill_grid(table: &TimeTable, interval: u32) -> TimeTable {
    let (Some(&first), Some(&last)) = (table.index.first(), table.index.last()) else {
        return table.clone();
    };
    let step = TimeDelta::seconds(i64::from(interval.max(1)));
    let mut labels: BTreeSet<Timestamp> = table.index.iter().copied().collect();
    let mut t = first;
    while t < last {
        labels.insert(t);
        t += step;
    }
    if labels.len() == table.len() {
        return table.clone();
    }

    let index: Vec<Timestamp> = labels.into_iter().collect();
    let positions: Vec<usize> = table
        .index
        .iter()
        .filter_map(|t| index.binary_search(t).ok())
        .collect();
    let columns = table
        .columns
        .iter()
        .map(|c| {
            let mut values = vec![None; index.len()];
            for (&pos, value) in positions.iter().zip(&c.values) {
                values[pos] = *value;
            }
            Column::new(c.name.clone(), values)
        })
        .collect();
    TimeTable::new(index, columns)
}
