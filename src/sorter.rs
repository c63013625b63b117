use std::io;
use std::time::Instant;

use tracing::{info, warn};

use crate::aggregate::Aggregator;
use crate::classifier::CountryClassifier;
use crate::dispatch::{Dispatcher, StopSignal};
use crate::error::Result;
use crate::geo::GeoResolver;
use crate::settings::{OutputFormat, RunConfig};
use crate::stats::{RunReport, RunStatus};
use crate::tld::TldTable;
use crate::utils::format_number;

/// Classify `lines` with the TLD table and optional geo resolver, then
/// write the groups described by `config`.
pub fn run<I>(
    lines: I,
    tld_table: TldTable,
    geo_resolver: Option<GeoResolver>,
    config: &RunConfig,
) -> Result<RunReport>
where
    I: IntoIterator<Item = io::Result<String>>,
    I::IntoIter: Send,
{
    let classifier = CountryClassifier::from_assets(tld_table, geo_resolver, config.lookup_order);
    run_with(lines, &classifier, config, &StopSignal::new())
}

/// Same as [`run`] with a prepared classifier and an external stop signal.
pub fn run_with<I>(
    lines: I,
    classifier: &CountryClassifier,
    config: &RunConfig,
    stop: &StopSignal,
) -> Result<RunReport>
where
    I: IntoIterator<Item = io::Result<String>>,
    I::IntoIter: Send,
{
    let total_start_time = Instant::now();
    info!(action = "start", component = "sorter", threads = config.threads, format = %config.format, output_dir = ?config.output_dir, "Starting run");

    let mut aggregator = Aggregator::new(config.format);
    let summary = Dispatcher::new(config, stop).dispatch(lines, classifier, &mut aggregator)?;
    aggregator.seal();

    if summary.input_error.is_some() || summary.stopped_early {
        warn!(action = "flush", component = "sorter", classified = aggregator.total(), "Flushing partial results");
    }

    let flush = aggregator.flush(&config.output_dir);

    let report = RunReport {
        format: config.format,
        output_dir: config.output_dir.clone(),
        counts: aggregator.counts().clone(),
        written: flush.written,
        group_files: flush.group_files,
        failures: flush.failures,
        input_error: summary.input_error,
        stopped_early: summary.stopped_early,
    };

    info!(
        action = "complete",
        component = "sorter",
        total = report.total(),
        groups = report.group_count(),
        partial = report.is_partial(),
        duration_ms = total_start_time.elapsed().as_millis(),
        "Run finished"
    );
    Ok(report)
}

pub fn print_run_summary(report: &RunReport) {
    println!(
        "\nProcessed: {} e-mails into {} groups (countries)",
        format_number(report.total()),
        format_number(report.group_count())
    );
    println!("Output folder: {}", report.output_dir.display());

    if !report.written.is_empty() {
        println!("\nFiles created:");
        match report.format {
            OutputFormat::Csv => {
                for path in &report.written {
                    println!("- {}", path.display());
                }
            }
            OutputFormat::Files => {
                for (country, path) in &report.group_files {
                    let count = report.counts.get(country).copied().unwrap_or_default();
                    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
                    println!("- {} ({} e-mails)", file_name, format_number(count));
                }
            }
        }
    }

    if report.status() == RunStatus::Partial {
        println!("\nRun completed partially:");
        if let Some(e) = &report.input_error {
            println!("- {}", e);
        }
        if report.stopped_early {
            println!("- stopped before the input was exhausted");
        }
        for failure in &report.failures {
            println!("- {}", failure);
        }
    }
}
