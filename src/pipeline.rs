use std::path::PathBuf;

use log::info;

use crate::catalog::{url2filename, Catalog};
use crate::data::extract::{CancelToken, Extractor};
use crate::data::filter::{compile, FilterConfig, SelectionTable};
use crate::data::merge::{merge, ExtractOptions};
use crate::data::model::{TimeTable, Window};
use crate::error::{HkError, Result};
use crate::fits::{FitsReader, TableReader};

// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the `ae<id>.hk` files.
    pub data_dir: PathBuf,
    /// Concurrent file reads during extraction.
    pub jobs: usize,
    pub cancel: CancelToken,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            jobs: 4,
            cancel: CancelToken::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline – setup, then extract
// ---------------------------------------------------------------------------

/// Two-phase telemetry assembly for one observation window.
///
/// [`Pipeline::setup`] resolves the files and compiles the column selection;
/// [`Pipeline::extract`] reads and merges them. The selection can be
/// inspected between the two phases.
pub struct Pipeline {
    catalog: Catalog,
    window: Window,
    filter: FilterConfig,
    config: PipelineConfig,
    reader: Box<dyn TableReader>,

    /// Resolved files in catalog order (set by `setup`).
    files: Vec<PathBuf>,
    /// Compiled column selection (set by `setup`).
    selection: Option<SelectionTable>,
}

impl Pipeline {
    pub fn new(catalog: Catalog, window: Window, filter: FilterConfig, config: PipelineConfig) -> Self {
        Self::with_reader(catalog, window, filter, config, Box::new(FitsReader))
    }

    /// Use a different binary-table reader.
    pub fn with_reader(
        catalog: Catalog,
        window: Window,
        filter: FilterConfig,
        config: PipelineConfig,
        reader: Box<dyn TableReader>,
    ) -> Self {
        Self {
            catalog,
            window,
            filter,
            config,
            reader,
            files: Vec::new(),
            selection: None,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn selection(&self) -> Option<&SelectionTable> {
        self.selection.as_ref()
    }

    /// Resolve the files covering the window and compile the column selection
    /// from the first of them. On failure the previous state is cleared.
    pub fn setup(&mut self) -> Result<&SelectionTable> {
        self.files.clear();
        self.selection = None;

        let files: Vec<PathBuf> = self
            .catalog
            .resolve(&self.window)?
            .iter()
            .map(|e| self.config.data_dir.join(url2filename(&e.id)))
            .collect();
        let reference = files
            .first()
            .ok_or_else(|| HkError::Range(format!("no catalog entry covers {}", self.window)))?;
        let headers = self.reader.read_headers(reference)?;
        let selection = compile(&headers, &self.filter);
        info!(
            "{} files cover {}; {} columns selected from {} record groups",
            files.len(),
            self.window,
            selection.len(),
            selection.groups().len()
        );

        self.files = files;
        Ok(self.selection.insert(selection))
    }

    /// Read the selected columns from every resolved file and assemble them.
    pub fn extract(&self, options: &ExtractOptions) -> Result<TimeTable> {
        let selection = self
            .selection
            .as_ref()
            .ok_or_else(|| HkError::State("extract called before setup".into()))?;
        options.validate()?;

        let extractor = Extractor::new(self.reader.as_ref(), self.config.jobs, self.config.cancel.clone());
        let series = extractor.extract(&self.files, selection)?;
        Ok(merge(series, &self.window, options))
    }
}
