use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

use super::model::{Column, TimeTable, Timestamp, Window};
use super::resample::{day_start, fill_grid, resample};
use crate::error::{HkError, Result};

/// Post-processing applied when assembling the merged table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Forward-fill null cells after merging.
    pub fill_nan: bool,
    /// Regrid onto buckets of this many seconds (median per bucket).
    pub resample_interval_secs: Option<u32>,
    /// Drop columns whose sample variance is not strictly above this.
    pub variance_threshold: Option<f64>,
}

impl ExtractOptions {
    pub fn validate(&self) -> Result<()> {
        if self.resample_interval_secs == Some(0) {
            return Err(HkError::Config("resample interval must be at least 1 second".into()));
        }
        if self.variance_threshold.is_some_and(f64::is_nan) {
            return Err(HkError::Config("variance threshold is NaN".into()));
        }
        Ok(())
    }
}

/// Outer-join per-group series on timestamp.
///
/// The index is the union of all timestamps, ascending. A column name already
/// taken by an earlier group is suffixed with `@<group>`.
pub fn outer_join(series: &BTreeMap<usize, TimeTable>) -> TimeTable {
    let index: Vec<Timestamp> = series
        .values()
        .flat_map(|t| t.index.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut taken: HashSet<String> = HashSet::new();
    let mut columns = Vec::new();
    for (group, table) in series {
        let positions: Vec<usize> = table
            .index
            .iter()
            .filter_map(|t| index.binary_search(t).ok())
            .collect();
        for column in &table.columns {
            let mut values = vec![None; index.len()];
            for (&pos, value) in positions.iter().zip(&column.values) {
                values[pos] = *value;
            }
            let name = if taken.contains(&column.name) {
                format!("{}@{group}", column.name)
            } else {
                column.name.clone()
            };
            taken.insert(name.clone());
            columns.push(Column::new(name, values));
        }
    }
    TimeTable::new(index, columns)
}

/// Carry the last present value forward; leading nulls stay null.
pub fn forward_fill(table: &TimeTable) -> TimeTable {
    let columns = table
        .columns
        .iter()
        .map(|c| {
            let mut last = None;
            let values = c
                .values
                .iter()
                .map(|v| {
                    if v.is_some() {
                        last = *v;
                    }
                    last
                })
                .collect();
            Column::new(c.name.clone(), values)
        })
        .collect();
    TimeTable::new(table.index.clone(), columns)
}

/// Rows inside the window, bounds included.
pub fn clip(table: &TimeTable, window: &Window) -> TimeTable {
    table.retain_rows(|_, t| window.contains(t))
}

/// Keep columns whose sample variance is strictly greater than `threshold`.
/// Columns with fewer than two values have no variance and are dropped.
pub fn prune_low_variance(table: &TimeTable, threshold: f64) -> TimeTable {
    let columns = table
        .columns
        .iter()
        .filter(|c| {
            let keep = c.variance().is_some_and(|v| v > threshold);
            if !keep {
                debug!("dropping low-variance column {}", c.name);
            }
            keep
        })
        .cloned()
        .collect();
    TimeTable::new(table.index.clone(), columns)
}

/// Assemble the per-group series into one table:
/// resample each group, outer-join, resample again, fill, clip, prune.
///
/// Buckets are counted from midnight of the earliest sample so every group
/// and the merged table share one grid. With `fill_nan` the resampled grid is
/// made regular before filling; without it empty buckets have no row.
pub fn merge(
    series: BTreeMap<usize, TimeTable>,
    window: &Window,
    options: &ExtractOptions,
) -> TimeTable {
    let origin = series
        .values()
        .filter_map(|t| t.index.first())
        .min()
        .map(day_start);
    let series: BTreeMap<usize, TimeTable> = match (options.resample_interval_secs, origin) {
        (Some(interval), Some(origin)) => series
            .into_iter()
            .map(|(group, table)| (group, resample(&table, &origin, interval)))
            .collect(),
        _ => series,
    };

    // BTreeSet union keeps the joined index sorted.
    let mut table = outer_join(&series);
    debug_assert!(table.is_sorted_unique());

    if let (Some(interval), Some(origin)) = (options.resample_interval_secs, origin) {
        table = resample(&table, &origin, interval);
        if options.fill_nan {
            table = fill_grid(&table, interval);
        }
    }
    if options.fill_nan {
        table = forward_fill(&table);
    }
    table = clip(&table, window);
    if let Some(threshold) = options.variance_threshold {
        table = prune_low_variance(&table, threshold);
    }
    debug!(
        "merged table: {} rows x {} columns",
        table.len(),
        table.columns.len()
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::parse_timestamp;
    use chrono::TimeDelta;

    fn ts(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    fn series(name: &str, rows: &[(&str, Option<f64>)]) -> TimeTable {
        TimeTable::from_rows(
            &[name.to_string()],
            rows.iter().map(|(t, v)| (ts(t), vec![*v])).collect(),
        )
    }

    fn window(a: &str, b: &str) -> Window {
        Window::new(ts(a), ts(b)).unwrap()
    }

    #[test]
    fn outer_join_unions_timestamps_with_nulls() {
        let a = series("A", &[("2012-01-23 00:00:01", Some(1.0)), ("2012-01-23 00:00:03", Some(3.0))]);
        let b = series("B", &[("2012-01-23 00:00:02", Some(20.0)), ("2012-01-23 00:00:03", Some(30.0))]);
        let joined = outer_join(&BTreeMap::from([(1, a), (2, b)]));
        assert_eq!(joined.len(), 3);
        assert!(joined.is_sorted_unique());
        assert_eq!(joined.column("A").unwrap().values, vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(joined.column("B").unwrap().values, vec![None, Some(20.0), Some(30.0)]);
    }

    #[test]
    fn colliding_names_are_qualified() {
        let a = series("T", &[("2012-01-23 00:00:01", Some(1.0))]);
        let b = series("T", &[("2012-01-23 00:00:01", Some(2.0))]);
        let joined = outer_join(&BTreeMap::from([(1, a), (4, b)]));
        assert_eq!(joined.column_names(), vec!["T", "T@4"]);
    }

    #[test]
    fn forward_fill_leaves_leading_nulls() {
        let t = series(
            "v",
            &[
                ("2012-01-23 00:00:01", None),
                ("2012-01-23 00:00:02", Some(2.0)),
                ("2012-01-23 00:00:03", None),
            ],
        );
        assert_eq!(forward_fill(&t).columns[0].values, vec![None, Some(2.0), Some(2.0)]);
    }

    #[test]
    fn clip_is_inclusive() {
        let t = series(
            "v",
            &[
                ("2012-01-23 01:27:50", Some(0.0)),
                ("2012-01-23 01:27:51", Some(1.0)),
                ("2012-01-24 01:27:51", Some(2.0)),
                ("2012-01-24 01:27:52", Some(3.0)),
            ],
        );
        let w = window("2012-01-23 01:27:51", "2012-01-24 01:27:51");
        let c = clip(&t, &w);
        assert_eq!(c.columns[0].values, vec![Some(1.0), Some(2.0)]);
        assert!(c.index.iter().all(|t| w.contains(t)));
    }

    #[test]
    fn constant_column_dropped_at_zero_threshold() {
        let index = vec![ts("2012-01-23 00:00:01"), ts("2012-01-23 00:00:02")];
        let t = TimeTable::new(
            index,
            vec![
                Column::new("flat", vec![Some(5.0), Some(5.0)]),
                Column::new("moving", vec![Some(1.0), Some(2.0)]),
            ],
        );
        assert_eq!(prune_low_variance(&t, 0.0).column_names(), vec!["moving"]);
        // Strictly greater: variance 0.5 does not exceed 0.5.
        assert!(prune_low_variance(&t, 0.5).columns.is_empty());
    }

    #[test]
    fn empty_input_is_empty_table() {
        let w = window("2012-01-23 00:00:00", "2012-01-24 00:00:00");
        let options = ExtractOptions {
            fill_nan: true,
            resample_interval_secs: Some(60),
            variance_threshold: Some(0.0),
        };
        let t = merge(BTreeMap::new(), &w, &options);
        assert!(t.is_empty() && t.columns.is_empty());
    }

    #[test]
    fn merge_resamples_fills_and_clips() {
        let a = series(
            "A",
            &[
                ("2012-01-23 00:00:10", Some(1.0)),
                ("2012-01-23 00:00:50", Some(3.0)),
                ("2012-01-23 00:02:30", Some(7.0)),
            ],
        );
        let b = series("B", &[("2012-01-23 00:01:30", Some(4.0))]);
        let w = window("2012-01-23 00:01:00", "2012-01-23 00:03:00");
        let options = ExtractOptions {
            fill_nan: true,
            resample_interval_secs: Some(60),
            variance_threshold: None,
        };
        let t = merge(BTreeMap::from([(1, a), (2, b)]), &w, &options);
        assert_eq!(
            t.index,
            vec![ts("2012-01-23 00:01:00"), ts("2012-01-23 00:02:00"), ts("2012-01-23 00:03:00")]
        );
        assert_eq!(t.column("A").unwrap().values, vec![Some(2.0), Some(2.0), Some(7.0)]);
        assert_eq!(t.column("B").unwrap().values, vec![None, Some(4.0), Some(4.0)]);
    }

    fn resampled(fill_nan: bool, interval: u32) -> ExtractOptions {
        ExtractOptions {
            fill_nan,
            resample_interval_secs: Some(interval),
            variance_threshold: None,
        }
    }

    #[test]
    fn fill_after_resample_gives_a_regular_grid() {
        let a = series("A", &[("2012-01-23 00:01:00", Some(1.0)), ("2012-01-23 00:05:00", Some(5.0))]);
        let w = window("2012-01-23 00:00:00", "2012-01-23 01:00:00");
        let t = merge(BTreeMap::from([(1, a)]), &w, &resampled(true, 60));
        assert_eq!(t.len(), 5);
        assert!(t.index.windows(2).all(|p| p[1] - p[0] == TimeDelta::seconds(60)));
        assert_eq!(
            t.column("A").unwrap().values,
            vec![Some(1.0), Some(1.0), Some(1.0), Some(1.0), Some(5.0)]
        );
    }

    #[test]
    fn empty_buckets_have_no_row_without_fill() {
        let a = series("A", &[("2012-01-23 00:01:00", Some(1.0)), ("2012-01-23 00:05:00", Some(5.0))]);
        let w = window("2012-01-23 00:00:00", "2012-01-23 01:00:00");
        let t = merge(BTreeMap::from([(1, a)]), &w, &resampled(false, 60));
        assert_eq!(t.index, vec![ts("2012-01-23 00:01:00"), ts("2012-01-23 00:05:00")]);
    }

    #[test]
    fn groups_share_the_day_anchored_grid() {
        // 7 does not divide a day, so epoch- and midnight-anchored grids differ.
        let a = series("A", &[("2012-01-23 00:00:05", Some(1.0))]);
        let b = series("B", &[("2012-01-23 00:00:12", Some(2.0))]);
        let w = window("2012-01-23 00:00:00", "2012-01-23 00:01:00");
        let t = merge(BTreeMap::from([(1, a), (2, b)]), &w, &resampled(false, 7));
        assert_eq!(t.index, vec![ts("2012-01-23 00:00:07"), ts("2012-01-23 00:00:14")]);
        assert_eq!(t.column("A").unwrap().values, vec![Some(1.0), None]);
        assert_eq!(t.column("B").unwrap().values, vec![None, Some(2.0)]);
    }

    #[test]
    fn options_validation() {
        let bad = ExtractOptions {
            resample_interval_secs: Some(0),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(HkError::Config(_))));
        assert!(ExtractOptions::default().validate().is_ok());
    }
}
