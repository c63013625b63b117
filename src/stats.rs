use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::CountryCode;
use crate::error::SorterError;
use crate::settings::OutputFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every input line was classified and every output written.
    Completed,
    /// Input stopped early or some output failed; what was written is consistent.
    Partial,
}

#[derive(Debug)]
pub struct RunReport {
    pub format: OutputFormat,
    pub output_dir: PathBuf,
    pub counts: BTreeMap<CountryCode, usize>,
    pub written: Vec<PathBuf>,
    pub group_files: BTreeMap<CountryCode, PathBuf>,
    pub failures: Vec<SorterError>,
    pub input_error: Option<SorterError>,
    pub stopped_early: bool,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        if self.failures.is_empty() && self.input_error.is_none() && !self.stopped_early {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        }
    }

    pub fn is_partial(&self) -> bool {
        self.status() == RunStatus::Partial
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn group_count(&self) -> usize {
        self.counts.len()
    }
}
