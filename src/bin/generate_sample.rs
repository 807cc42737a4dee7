use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike};

use suzaku_hk::data::extract::{DATE_FIELD, TIME_FIELD};
use suzaku_hk::data::model::parse_timestamp;
use suzaku_hk::fits::header::CardValue;
use suzaku_hk::fits::{BinTable, ColumnData, FitsWriter, TableColumn};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Sample instants from `start` to `end` inclusive, every `step` seconds.
fn instants(start: NaiveDateTime, end: NaiveDateTime, step: i64) -> Vec<NaiveDateTime> {
    let mut out = Vec::new();
    let mut t = start;
    while t <= end {
        out.push(t);
        t += TimeDelta::seconds(step);
    }
    out
}

/// YYYYMMDD and HHMMSS integer columns for the given instants.
fn time_columns(times: &[NaiveDateTime]) -> [TableColumn; 2] {
    let date = times
        .iter()
        .map(|t| Some(i64::from(t.year()) * 10000 + i64::from(t.month()) * 100 + i64::from(t.day())))
        .collect();
    let clock = times
        .iter()
        .map(|t| Some(i64::from(t.hour()) * 10000 + i64::from(t.minute()) * 100 + i64::from(t.second())))
        .collect();
    [
        TableColumn::new(DATE_FIELD, ColumnData::Int(date)),
        TableColumn::new(TIME_FIELD, ColumnData::Int(clock)),
    ]
}

fn xis_table(times: &[NaiveDateTime], rng: &mut SimpleRng) -> BinTable {
    let [date, clock] = time_columns(times);
    let temp = times.iter().map(|_| rng.gauss(-90.0, 0.05)).collect();
    let hv = times
        .iter()
        .enumerate()
        .map(|(i, _)| 1500.0 + (i as f64 / 200.0).sin() * 2.0 + rng.gauss(0.0, 0.1))
        .collect();
    let counter = (0..times.len() as i64).map(|i| Some(i % 256)).collect();
    BinTable::new("HK_XIS")
        .column(date)
        .column(clock)
        .column(TableColumn::new("TEMP_CAL", ColumnData::Float(temp)).with_unit("CELSIUS"))
        .column(TableColumn::new("HV_CAL", ColumnData::Float(hv)).with_unit("VOLT"))
        .column(TableColumn::new("FRAME_COUNTER", ColumnData::Int(counter)).with_unit("COUNT"))
        .card("INSTRUME", CardValue::Str("XIS".into()))
}

fn hxd_table(times: &[NaiveDateTime], rng: &mut SimpleRng) -> BinTable {
    let [date, clock] = time_columns(times);
    let pmt = times.iter().map(|_| rng.gauss(850.0, 0.5)).collect();
    let mode = times.iter().map(|_| 3.0).collect();
    BinTable::new("HK_HXD")
        .column(date)
        .column(clock)
        .column(TableColumn::new("PMT_HV_CAL", ColumnData::Float(pmt)).with_unit("VOLT"))
        .column(TableColumn::new("MODE_CAL", ColumnData::Float(mode)).with_unit("NONE"))
        .card("INSTRUME", CardValue::Str("HXD".into()))
}

fn write_archive(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut rng = SimpleRng::new(42);

    // Consecutive files share their boundary instant.
    let coverage = [
        ("100000010", "2012-01-23 00:00:00", "2012-01-23 12:00:00"),
        ("100000020", "2012-01-23 12:00:00", "2012-01-24 06:00:00"),
    ];
    let mut catalog = String::from("observation_start_time,observation_end_time,data_access_url\n");
    for (id, start, end) in coverage {
        let start = parse_timestamp(start)?;
        let end = parse_timestamp(end)?;
        let tables = [
            xis_table(&instants(start, end, 32), &mut rng),
            hxd_table(&instants(start, end, 64), &mut rng),
        ];
        let path = dir.join(format!("ae{id}.hk"));
        FitsWriter::write(&path, &tables).with_context(|| format!("writing {}", path.display()))?;
        catalog.push_str(&format!("{start},{end},https://example.org/suzaku/{id}/\n"));
        println!("Wrote {}", path.display());
    }

    std::fs::write(dir.join("suzaku_data_list.csv"), catalog)?;
    std::fs::write(
        dir.join("filters.yaml"),
        "exclude_unit_filter: [COUNT]\ndata_name_filter: []\ncalibration_filter: true\n",
    )?;
    println!("Wrote catalog and filters to {}", dir.display());
    Ok(())
}

fn main() -> Result<()> {
    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    write_archive(&dir)
}
