//! Settings file and the resolved run configuration.
//!
//! The settings file is optional TOML:
//!
//! ```toml
//! thread_count = 10
//! format = "csv"
//! output_dir = "output"
//! lookup_order = "tld-first"
//! ```
//!
//! `ThreadCount` is accepted as an alias for `thread_count`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Deserialize;
use tracing::{info, warn};

/// Default settings file name.
pub const DEFAULT_SETTINGS_FILE: &str = "settings.toml";

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Slots per worker in each bounded queue.
const QUEUE_SLOTS_PER_WORKER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One text file per country
    #[default]
    Files,
    /// One CSV file with a country column
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Files => f.write_str("files"),
            OutputFormat::Csv => f.write_str("csv"),
        }
    }
}

/// Which lookup is consulted first when both are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LookupOrder {
    #[default]
    TldFirst,
    GeoFirst,
}

/// Values read from the settings file; anything missing falls back.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "ThreadCount")]
    pub thread_count: Option<usize>,
    pub format: Option<OutputFormat>,
    pub output_dir: Option<PathBuf>,
    pub lookup_order: Option<LookupOrder>,
}

impl Settings {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Read the settings file, using defaults when it is absent or unusable.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!(action = "load", component = "settings", file_path = ?path, "No settings file, using defaults");
            return Settings::default();
        }

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| Settings::parse(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(settings) => {
                info!(action = "loaded", component = "settings", file_path = ?path, settings = ?settings, "Loaded settings file");
                settings
            }
            Err(e) => {
                warn!(action = "load", component = "settings", file_path = ?path, error = %e, "Ignoring unreadable settings file");
                Settings::default()
            }
        }
    }
}

/// Immutable configuration for one run, built once at startup.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub threads: usize,
    pub format: OutputFormat,
    pub output_dir: PathBuf,
    pub queue_capacity: usize,
    pub lookup_order: LookupOrder,
}

impl RunConfig {
    pub fn new(threads: usize, format: OutputFormat, output_dir: impl Into<PathBuf>) -> Self {
        let threads = threads.max(1);
        RunConfig {
            threads,
            format,
            output_dir: output_dir.into(),
            queue_capacity: threads * QUEUE_SLOTS_PER_WORKER,
            lookup_order: LookupOrder::default(),
        }
    }

    pub fn with_lookup_order(mut self, order: LookupOrder) -> Self {
        self.lookup_order = order;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Default worker count from the machine's parallelism.
pub fn default_thread_count() -> usize {
    num_cpus::get().max(1)
}
