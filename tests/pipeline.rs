use std::collections::BTreeSet;
use std::path::Path;

use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike};
use tempfile::TempDir;

use suzaku_hk::catalog::{Catalog, CatalogEntry};
use suzaku_hk::data::extract::{DATE_FIELD, TIME_FIELD};
use suzaku_hk::data::filter::{FilterConfig, SelectionEntry};
use suzaku_hk::data::model::{parse_timestamp, Window};
use suzaku_hk::fits::{BinTable, ColumnData, FitsWriter, TableColumn};
use suzaku_hk::{CancelToken, ExtractOptions, HkError, Pipeline, PipelineConfig};

fn ts(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap()
}

fn clock_columns(times: &[NaiveDateTime]) -> Vec<TableColumn> {
    let date = times
        .iter()
        .map(|t| Some(i64::from(t.year()) * 10000 + i64::from(t.month()) * 100 + i64::from(t.day())))
        .collect();
    let clock = times
        .iter()
        .map(|t| Some(i64::from(t.hour()) * 10000 + i64::from(t.minute()) * 100 + i64::from(t.second())))
        .collect();
    vec![
        TableColumn::new(DATE_FIELD, ColumnData::Int(date)),
        TableColumn::new(TIME_FIELD, ColumnData::Int(clock)),
    ]
}

fn every(start: &str, end: &str, step: i64) -> Vec<NaiveDateTime> {
    let (mut t, end) = (ts(start), ts(end));
    let mut out = Vec::new();
    while t <= end {
        out.push(t);
        t += TimeDelta::seconds(step);
    }
    out
}

/// Two record groups: group 1 with CAL_CAL (COUNT) and TEMP_CAL (VOLT),
/// group 2 with a constant FLAG_CAL (VOLT). `offset` shifts TEMP_CAL values.
fn write_hk(path: &Path, times: &[NaiveDateTime], offset: f64) {
    let mut first = BinTable::new("HK1");
    for c in clock_columns(times) {
        first = first.column(c);
    }
    let counts = (0..times.len() as i64).map(Some).collect();
    let temps = (0..times.len()).map(|i| offset + i as f64).collect();
    first = first
        .column(TableColumn::new("CAL_CAL", ColumnData::Int(counts)).with_unit("COUNT"))
        .column(TableColumn::new("TEMP_CAL", ColumnData::Float(temps)).with_unit("VOLT"));

    let mut second = BinTable::new("HK2");
    for c in clock_columns(times) {
        second = second.column(c);
    }
    second = second.column(
        TableColumn::new("FLAG_CAL", ColumnData::Float(vec![1.0; times.len()])).with_unit("VOLT"),
    );
    FitsWriter::write(path, &[first, second]).unwrap();
}

struct Archive {
    dir: TempDir,
    catalog: Catalog,
}

/// File A covers 00:00–12:00 and file B 12:00–06:00 next day; both hold a
/// sample at 12:00:00. Samples every ten minutes.
fn archive() -> Archive {
    let dir = tempfile::tempdir().unwrap();
    write_hk(
        &dir.path().join("aeA.hk"),
        &every("2012-01-23 00:00:00", "2012-01-23 12:00:00", 600),
        0.0,
    );
    write_hk(
        &dir.path().join("aeB.hk"),
        &every("2012-01-23 12:00:00", "2012-01-24 06:00:00", 600),
        1000.0,
    );
    let catalog = Catalog::new(vec![
        CatalogEntry {
            id: "https://example.org/hk/A/".into(),
            start: ts("2012-01-23 00:00:00"),
            end: ts("2012-01-23 12:00:00"),
        },
        CatalogEntry {
            id: "https://example.org/hk/B/".into(),
            start: ts("2012-01-23 12:00:00"),
            end: ts("2012-01-24 06:00:00"),
        },
    ])
    .unwrap();
    Archive { dir, catalog }
}

fn window() -> Window {
    Window::new(ts("2012-01-23 01:27:51"), ts("2012-01-24 01:27:51")).unwrap()
}

fn pipeline(archive: &Archive, filter: FilterConfig) -> Pipeline {
    let config = PipelineConfig {
        data_dir: archive.dir.path().to_path_buf(),
        jobs: 2,
        ..Default::default()
    };
    Pipeline::new(archive.catalog.clone(), window(), filter, config)
}

fn calibration_without_counts() -> FilterConfig {
    FilterConfig {
        excluded_units: BTreeSet::from(["COUNT".to_string()]),
        calibration_only: true,
        ..Default::default()
    }
}

#[test]
fn setup_resolves_files_and_compiles_selection() {
    let archive = archive();
    let mut p = pipeline(&archive, calibration_without_counts());
    let selection = p.setup().unwrap().clone();
    assert_eq!(
        selection.entries,
        vec![
            SelectionEntry {
                group: 1,
                name: "TEMP_CAL".into(),
                unit: "VOLT".into()
            },
            SelectionEntry {
                group: 2,
                name: "FLAG_CAL".into(),
                unit: "VOLT".into()
            },
        ]
    );
    let names: Vec<_> = p
        .files()
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["aeA.hk", "aeB.hk"]);
}

#[test]
fn extract_before_setup_is_state_error() {
    let archive = archive();
    let p = pipeline(&archive, FilterConfig::default());
    assert!(matches!(
        p.extract(&ExtractOptions::default()),
        Err(HkError::State(_))
    ));
}

#[test]
fn extract_clips_and_keeps_first_duplicate() {
    let archive = archive();
    let mut p = pipeline(&archive, calibration_without_counts());
    p.setup().unwrap();
    let table = p.extract(&ExtractOptions::default()).unwrap();

    let w = window();
    assert!(table.index.iter().all(|t| w.contains(t)));
    assert!(table.is_sorted_unique());
    assert_eq!(table.index.first(), Some(&ts("2012-01-23 01:30:00")));
    assert_eq!(table.index.last(), Some(&ts("2012-01-24 01:20:00")));

    // 12:00:00 is in both files; file A (72nd sample) wins.
    let noon = table
        .index
        .iter()
        .position(|t| *t == ts("2012-01-23 12:00:00"))
        .unwrap();
    assert_eq!(table.column("TEMP_CAL").unwrap().values[noon], Some(72.0));
    assert_eq!(table.column("TEMP_CAL").unwrap().values[noon + 1], Some(1001.0));
}

#[test]
fn resample_fill_and_variance_threshold() {
    let archive = archive();
    let mut p = pipeline(&archive, calibration_without_counts());
    p.setup().unwrap();
    let table = p
        .extract(&ExtractOptions {
            fill_nan: true,
            resample_interval_secs: Some(3600),
            variance_threshold: Some(0.0),
        })
        .unwrap();

    // FLAG_CAL is constant and therefore dropped.
    assert_eq!(table.column_names(), vec!["TEMP_CAL"]);
    assert_eq!(table.index.first(), Some(&ts("2012-01-23 02:00:00")));
    assert_eq!(table.index.last(), Some(&ts("2012-01-24 01:00:00")));
    assert!(table
        .index
        .windows(2)
        .all(|w| w[1] - w[0] == TimeDelta::seconds(3600)));
    // Bucket (01:00, 02:00] holds samples 7..=12 of file A.
    assert_eq!(table.column("TEMP_CAL").unwrap().values[0], Some(9.5));
}

#[test]
fn missing_file_is_data_access_error() {
    let archive = archive();
    std::fs::remove_file(archive.dir.path().join("aeB.hk")).unwrap();
    let mut p = pipeline(&archive, FilterConfig::default());
    p.setup().unwrap();
    assert!(matches!(
        p.extract(&ExtractOptions::default()),
        Err(HkError::DataAccess { .. })
    ));
}

#[test]
fn schema_drift_is_data_access_error() {
    let archive = archive();
    let times = every("2012-01-23 12:00:00", "2012-01-24 06:00:00", 600);
    let mut table = BinTable::new("HK1");
    for c in clock_columns(&times) {
        table = table.column(c);
    }
    FitsWriter::write(&archive.dir.path().join("aeB.hk"), &[table]).unwrap();

    let mut p = pipeline(&archive, calibration_without_counts());
    p.setup().unwrap();
    assert!(matches!(
        p.extract(&ExtractOptions::default()),
        Err(HkError::DataAccess { .. })
    ));
}

#[test]
fn window_outside_catalog_is_range_error() {
    let archive = archive();
    let config = PipelineConfig {
        data_dir: archive.dir.path().to_path_buf(),
        ..Default::default()
    };
    let late = Window::new(ts("2012-01-24 05:00:00"), ts("2012-01-24 07:00:00")).unwrap();
    let mut p = Pipeline::new(archive.catalog.clone(), late, FilterConfig::default(), config);
    assert!(matches!(p.setup(), Err(HkError::Range(_))));
    assert!(p.selection().is_none());
}

#[test]
fn filters_removing_everything_yield_empty_table() {
    let archive = archive();
    let filter = FilterConfig {
        included_name_substrings: BTreeSet::from(["NOTHING".to_string()]),
        ..Default::default()
    };
    let mut p = pipeline(&archive, filter);
    assert!(p.setup().unwrap().is_empty());
    let table = p.extract(&ExtractOptions::default()).unwrap();
    assert!(table.is_empty() && table.columns.is_empty());
}

#[test]
fn cancelled_run_returns_no_table() {
    let archive = archive();
    let cancel = CancelToken::new();
    let config = PipelineConfig {
        data_dir: archive.dir.path().to_path_buf(),
        jobs: 1,
        cancel: cancel.clone(),
    };
    let mut p = Pipeline::new(archive.catalog.clone(), window(), FilterConfig::default(), config);
    p.setup().unwrap();
    cancel.cancel();
    assert!(matches!(
        p.extract(&ExtractOptions::default()),
        Err(HkError::Cancelled)
    ));
}
