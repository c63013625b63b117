pub mod aggregate;
pub mod args;
pub mod classifier;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod geo;
pub mod input;
pub mod settings;
pub mod sorter;
pub mod stats;
pub mod tld;
pub mod utils;

pub use args::Args;
pub use classifier::{CountryClassifier, CountryLookup};
pub use domain::{ClassifiedEmail, CountryCode};
pub use error::{SorterError, Result};
pub use geo::GeoResolver;
pub use settings::{LookupOrder, OutputFormat, RunConfig, Settings};
pub use sorter::{print_run_summary, run, run_with};
pub use stats::{RunReport, RunStatus};
pub use tld::{init_default_tld_map, TldTable};
