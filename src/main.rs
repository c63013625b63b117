use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use mail_country_sorter::dispatch::StopSignal;
use mail_country_sorter::settings::{default_thread_count, DEFAULT_OUTPUT_DIR};
use mail_country_sorter::{
    init_default_tld_map, input, print_run_summary, run_with, utils, Args, CountryClassifier,
    GeoResolver, LookupOrder, RunConfig, RunStatus, Settings, TldTable,
};

fn build_config(args: &Args, settings: &Settings) -> RunConfig {
    let threads = args
        .threads
        .or(settings.thread_count.filter(|&n| n > 0))
        .unwrap_or_else(default_thread_count);
    let format = args.format.or(settings.format).unwrap_or_default();
    let base = args
        .output
        .clone()
        .or_else(|| settings.output_dir.clone())
        .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.into());
    let output_dir = if args.no_timestamp {
        base
    } else {
        utils::timestamped_output_dir(&base)
    };
    let lookup_order = if args.prefer_geo {
        LookupOrder::GeoFirst
    } else {
        settings.lookup_order.unwrap_or_default()
    };

    RunConfig::new(threads, format, output_dir).with_lookup_order(lookup_order)
}

/// Load both lookup assets; any failure here means the run never starts.
fn load_classifier(args: &Args, order: LookupOrder) -> Result<CountryClassifier> {
    let tld = TldTable::load(args.tld_map.as_deref())?;
    let geo = if args.geoip {
        Some(GeoResolver::open(&args.mmdb)?)
    } else {
        None
    };
    Ok(CountryClassifier::from_assets(tld, geo, order))
}

fn execute(args: &Args) -> Result<RunStatus> {
    let settings = Settings::load(&args.settings);
    let config = build_config(args, &settings);
    let classifier = load_classifier(args, config.lookup_order)?;

    let input_path = match &args.input {
        Some(path) => path.clone(),
        None => {
            let dir = match &args.input_dir {
                Some(dir) => dir.clone(),
                None => std::env::current_dir().context("Failed to read current directory")?,
            };
            input::choose_input(&dir)?
        }
    };
    let lines = input::open_input(&input_path)?;

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        info!(action = "signal", component = "main", "Stop requested, finishing in-flight lines");
        handler_stop.raise();
    })
    .context("Failed to set Ctrl+C handler")?;

    let report = run_with(lines, &classifier, &config, &stop)?;
    print_run_summary(&report);
    Ok(report.status())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = utils::setup_logging(args.verbose, args.log.as_deref()) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(2);
    }

    if args.init {
        return match init_default_tld_map() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    if let Err(e) = utils::validate_args(&args) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(2);
    }

    match execute(&args) {
        Ok(RunStatus::Completed) => ExitCode::SUCCESS,
        Ok(RunStatus::Partial) => ExitCode::from(1),
        Err(e) => {
            error!(action = "start", component = "main", error = %e, "Run failed to start");
            eprintln!("Error: failed to start: {:#}", e);
            ExitCode::from(2)
        }
    }
}
