use anyhow::Context;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::classifier::CountryLookup;
use crate::domain::CountryCode;
use crate::error::{Result, SorterError};

// Include default map at compile time
const DEFAULT_TLD_MAP_BYTES: &[u8] = include_bytes!("../default_tld.map");

/// File picked up from the working directory when no map is given.
pub const DEFAULT_TLD_MAP_FILE: &str = "Tld.map";

/// Suffix-to-country table with longest-suffix matching.
///
/// Read-only once built, so workers share it by reference without locking.
#[derive(Debug, Default, Clone)]
pub struct TldTable {
    entries: HashMap<String, CountryCode>,
}

impl TldTable {
    pub fn from_entries<I, S, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: AsRef<str>,
        C: AsRef<str>,
    {
        let mut table = TldTable::default();
        for (suffix, country) in entries {
            table.insert(suffix.as_ref(), country.as_ref());
        }
        table
    }

    /// Build a table from mapping text, skipping entries that do not parse.
    pub fn parse(content: &str, source: &str) -> Self {
        let mut table = TldTable::default();
        let mut skipped = 0usize;

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim().trim_start_matches('\u{feff}');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_entry(line) {
                Some((suffix, country)) => table.insert(suffix, country),
                None => {
                    skipped += 1;
                    warn!(action = "parse", component = "tld_map", source = source, line_number = line_num + 1, entry = line, "Skipping malformed TLD map entry");
                }
            }
        }

        info!(action = "parsed", component = "tld_map", source = source, entry_count = table.len(), skipped, "Parsed TLD map");
        table
    }

    /// Load the mapping asset.
    ///
    /// An explicit path must exist. Without one, [`DEFAULT_TLD_MAP_FILE`] in
    /// the working directory is used if present, then the built-in map.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let start_time = Instant::now();
        info!(action = "start", component = "tld_loading", "Starting TLD map loading");

        let table = if let Some(path) = path {
            info!(action = "load", component = "tld_file", file_path = ?path, "Loading TLD map from specified file");
            let content = read_asset(path)?;
            TldTable::parse(&content, &path.display().to_string())
        } else {
            let default_file = Path::new(DEFAULT_TLD_MAP_FILE);
            let from_file = if default_file.exists() {
                info!(action = "load", component = "default_tld_file", file_path = ?default_file, "Loading TLD map from default file");
                let content = read_asset(default_file)?;
                TldTable::parse(&content, DEFAULT_TLD_MAP_FILE)
            } else {
                TldTable::default()
            };

            if from_file.is_empty() {
                info!(action = "load", component = "embedded_tld_map", "Using embedded default TLD map");
                TldTable::parse(&String::from_utf8_lossy(DEFAULT_TLD_MAP_BYTES), "embedded")
            } else {
                from_file
            }
        };

        info!(
            action = "complete",
            component = "tld_loading",
            entry_count = table.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "TLD map ready"
        );
        Ok(table)
    }

    /// Country for the longest suffix of `domain` present in the table.
    pub fn lookup(&self, domain: &str) -> Option<CountryCode> {
        let mut candidate = domain.trim_start_matches('.');
        loop {
            if let Some(code) = self.entries.get(candidate) {
                return Some(code.clone());
            }
            let (_, shorter) = candidate.split_once('.')?;
            candidate = shorter;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, suffix: &str, country: &str) {
        let suffix = normalize_suffix(suffix);
        let country = country.trim();
        if suffix.is_empty() || country.is_empty() {
            return;
        }
        self.entries.insert(suffix, CountryCode::new(country));
    }
}

impl CountryLookup for TldTable {
    fn name(&self) -> &'static str {
        "tld"
    }

    fn lookup(&self, domain: &str) -> Option<CountryCode> {
        TldTable::lookup(self, domain)
    }
}

/// Split one `suffix=>country` line.
fn parse_entry(line: &str) -> Option<(&str, &str)> {
    let (suffix, country) = line.split_once("=>")?;
    let (suffix, country) = (suffix.trim(), country.trim());
    if normalize_suffix(suffix).is_empty() || country.is_empty() {
        return None;
    }
    Some((suffix, country))
}

fn normalize_suffix(suffix: &str) -> String {
    suffix.trim().trim_matches('.').to_lowercase()
}

fn read_asset(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| SorterError::asset_missing(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write the built-in map to [`DEFAULT_TLD_MAP_FILE`] for local editing.
pub fn init_default_tld_map() -> anyhow::Result<()> {
    let default_file = Path::new(DEFAULT_TLD_MAP_FILE);

    if default_file.exists() {
        anyhow::bail!(
            "{} already exists. Remove it first if you want to reinitialize.",
            DEFAULT_TLD_MAP_FILE
        );
    }

    let default_content = std::str::from_utf8(DEFAULT_TLD_MAP_BYTES)
        .context("Failed to decode embedded default TLD map")?;

    fs::write(default_file, default_content)?;
    println!("Created {} with default mappings", DEFAULT_TLD_MAP_FILE);

    Ok(())
}
