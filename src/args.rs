use clap::Parser;
use std::path::PathBuf;

use crate::settings::{OutputFormat, DEFAULT_SETTINGS_FILE};

#[derive(Parser, Debug)]
#[command(
    name = "mail-country-sorter",
    about = "Group e-mail addresses by the country of their domain",
    version,
    long_about = None
)]
pub struct Args {
    /// Input file with one e-mail address per line
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory to pick a .txt input file from
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Suffix-to-country map (defaults to Tld.map, then the built-in map)
    #[arg(short = 'm', long)]
    pub tld_map: Option<PathBuf>,

    /// Settings file
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    pub settings: PathBuf,

    /// Output directory (overrides the settings file)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of worker threads (overrides the settings file)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Output format (overrides the settings file)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Fall back to a MaxMind country database for address literals
    #[arg(long)]
    pub geoip: bool,

    /// Path to the MaxMind country database
    #[arg(long, default_value = "Country.mmdb")]
    pub mmdb: PathBuf,

    /// Consult the geo database before the TLD map
    #[arg(long)]
    pub prefer_geo: bool,

    /// Write straight into the output directory instead of a Result_<timestamp> folder
    #[arg(long)]
    pub no_timestamp: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Initialize Tld.map with the built-in mappings
    #[arg(long)]
    pub init: bool,
}
