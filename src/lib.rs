//! Assemble satellite housekeeping (HK) telemetry spread over many FITS files
//! into one time-indexed table.
//!
//! ```no_run
//! use std::path::Path;
//! use suzaku_hk::data::loader::{load_catalog, load_filter_config};
//! use suzaku_hk::data::model::{parse_timestamp, Window};
//! use suzaku_hk::{ExtractOptions, Pipeline, PipelineConfig};
//!
//! # fn main() -> suzaku_hk::Result<()> {
//! let catalog = load_catalog(Path::new("conf/suzaku_data_list.csv"))?;
//! let filter = load_filter_config(Path::new("conf/filters.yaml"))?;
//! let window = Window::new(
//!     parse_timestamp("2012-01-23 01:27:51")?,
//!     parse_timestamp("2012-01-24 01:27:51")?,
//! )?;
//! let config = PipelineConfig {
//!     data_dir: "/data/suzaku".into(),
//!     ..Default::default()
//! };
//! let mut pipeline = Pipeline::new(catalog, window, filter, config);
//! println!("{}", pipeline.setup()?);
//! let table = pipeline.extract(&ExtractOptions {
//!     fill_nan: true,
//!     resample_interval_secs: Some(60),
//!     variance_threshold: Some(1e-5),
//! })?;
//! # let _ = table;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod data;
pub mod error;
pub mod fits;
pub mod pipeline;

pub use data::extract::CancelToken;
pub use data::merge::ExtractOptions;
pub use error::{HkError, Result};
pub use pipeline::{Pipeline, PipelineConfig};
