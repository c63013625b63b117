//! End-to-end tests for the sorter.
//!
//! These run the whole pipeline against temporary output directories with
//! in-memory inputs and small TLD tables; no geo database is involved.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use mail_country_sorter::aggregate::CSV_FILE_NAME;
use mail_country_sorter::dispatch::StopSignal;
use mail_country_sorter::{
    run, run_with, CountryClassifier, CountryCode, LookupOrder, OutputFormat, RunConfig,
    RunStatus, SorterError, TldTable,
};
use rstest::rstest;
use tempfile::TempDir;

fn scenario_lines() -> Vec<io::Result<String>> {
    ["a@x.co.uk", "b@y.ZZ", "not-an-email"]
        .iter()
        .map(|l| Ok(l.to_string()))
        .collect()
}

fn uk_table() -> TldTable {
    TldTable::from_entries([("co.uk", "GB")])
}

fn big_input(n: usize) -> Vec<String> {
    const DOMAINS: [&str; 7] = ["a.co.uk", "b.uk", "c.de", "d.fr", "e.zz", "f.com", "g.co.jp"];
    (0..n)
        .map(|i| {
            if i % 97 == 0 {
                format!("broken-line-{i}")
            } else {
                format!("user{i}@{}", DOMAINS[i % DOMAINS.len()])
            }
        })
        .collect()
}

fn big_table() -> TldTable {
    TldTable::from_entries([("uk", "GB"), ("co.uk", "GB-CO"), ("de", "DE"), ("fr", "FR"), ("jp", "JP")])
}

/// File name -> contents for everything in `dir`.
fn read_tree(dir: &Path) -> BTreeMap<String, String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            (name, fs::read_to_string(&path).unwrap())
        })
        .collect()
}

#[test]
fn files_mode_scenario() {
    let tmp = TempDir::new().unwrap();
    let config = RunConfig::new(4, OutputFormat::Files, tmp.path());

    let report = run(scenario_lines(), uk_table(), None, &config).unwrap();

    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(
        read_tree(tmp.path()),
        BTreeMap::from([
            ("GB.txt".to_string(), "a@x.co.uk\n".to_string()),
            ("UNKNOWN.txt".to_string(), "b@y.ZZ\nnot-an-email\n".to_string()),
        ])
    );
    assert_eq!(report.counts[&CountryCode::new("GB")], 1);
    assert_eq!(report.counts[&CountryCode::unknown()], 2);
    assert_eq!(report.written.len(), 2);
}

#[test]
fn csv_mode_scenario() {
    let tmp = TempDir::new().unwrap();
    let config = RunConfig::new(4, OutputFormat::Csv, tmp.path());

    let report = run(scenario_lines(), uk_table(), None, &config).unwrap();

    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(
        fs::read_to_string(tmp.path().join(CSV_FILE_NAME)).unwrap(),
        "GB,a@x.co.uk\nUNKNOWN,b@y.ZZ\nUNKNOWN,not-an-email\n"
    );
}

#[rstest]
#[case(OutputFormat::Files, 0)]
#[case(OutputFormat::Csv, 1)]
fn empty_input_is_not_an_error(#[case] format: OutputFormat, #[case] files: usize) {
    let tmp = TempDir::new().unwrap();
    let config = RunConfig::new(2, format, tmp.path());

    let report = run(Vec::<io::Result<String>>::new(), uk_table(), None, &config).unwrap();

    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(report.total(), 0);
    assert_eq!(report.group_count(), 0);
    let tree = read_tree(tmp.path());
    assert_eq!(tree.len(), files);
    assert!(tree.values().all(String::is_empty));
}

#[test]
fn blank_lines_are_not_classified() {
    let tmp = TempDir::new().unwrap();
    let config = RunConfig::new(3, OutputFormat::Files, tmp.path());
    let lines = ["a@x.co.uk", "", "   ", "b@x.co.uk", "\t"]
        .iter()
        .map(|l| Ok(l.to_string()));

    let report = run(lines.collect::<Vec<_>>(), uk_table(), None, &config).unwrap();

    assert_eq!(report.total(), 2);
}

#[rstest]
#[case(OutputFormat::Files)]
#[case(OutputFormat::Csv)]
fn thread_count_does_not_change_output(#[case] format: OutputFormat) {
    let input = big_input(10_000);
    let single = TempDir::new().unwrap();
    let many = TempDir::new().unwrap();

    let lines = |input: &[String]| input.iter().cloned().map(Ok).collect::<Vec<io::Result<String>>>();
    let single_report = run(lines(&input), big_table(), None, &RunConfig::new(1, format, single.path())).unwrap();
    let many_report = run(
        lines(&input),
        big_table(),
        None,
        &RunConfig::new(64, format, many.path()).with_queue_capacity(8),
    )
    .unwrap();

    assert_eq!(single_report.total(), 10_000);
    assert_eq!(single_report.counts, many_report.counts);
    assert_eq!(read_tree(single.path()), read_tree(many.path()));
}

#[test]
fn groups_keep_input_order() {
    let input = big_input(5_000);
    let tmp = TempDir::new().unwrap();
    let lines: Vec<io::Result<String>> = input.iter().cloned().map(Ok).collect();

    run(lines, big_table(), None, &RunConfig::new(16, OutputFormat::Files, tmp.path())).unwrap();

    let german: Vec<&str> = input.iter().map(String::as_str).filter(|l| l.ends_with("@c.de")).collect();
    let written = fs::read_to_string(tmp.path().join("DE.txt")).unwrap();
    assert_eq!(written.lines().collect::<Vec<_>>(), german);
}

#[test]
fn repeated_runs_are_identical() {
    let input = big_input(2_000);
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    for dir in [&first, &second] {
        let lines: Vec<io::Result<String>> = input.iter().cloned().map(Ok).collect();
        run(lines, big_table(), None, &RunConfig::new(8, OutputFormat::Csv, dir.path())).unwrap();
    }

    assert_eq!(read_tree(first.path()), read_tree(second.path()));
}

#[test]
fn input_failure_flushes_partial_output() {
    let tmp = TempDir::new().unwrap();
    let config = RunConfig::new(2, OutputFormat::Files, tmp.path());
    let lines = vec![
        Ok("a@x.co.uk".to_string()),
        Ok("b@y.zz".to_string()),
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated")),
        Ok("c@x.co.uk".to_string()),
    ];

    let report = run(lines, uk_table(), None, &config).unwrap();

    assert_eq!(report.status(), RunStatus::Partial);
    assert!(matches!(report.input_error, Some(SorterError::InputSourceFailure { .. })));
    assert_eq!(fs::read_to_string(tmp.path().join("GB.txt")).unwrap(), "a@x.co.uk\n");
    assert_eq!(fs::read_to_string(tmp.path().join("UNKNOWN.txt")).unwrap(), "b@y.zz\n");
}

#[test]
fn write_failure_is_reported_with_its_target() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("UNKNOWN.txt")).unwrap();
    let config = RunConfig::new(2, OutputFormat::Files, tmp.path());

    let report = run(scenario_lines(), uk_table(), None, &config).unwrap();

    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(report.written, vec![tmp.path().join("GB.txt")]);
    match &report.failures[..] {
        [SorterError::OutputWriteFailure { target, .. }] => assert_eq!(target, "UNKNOWN"),
        other => panic!("unexpected failures: {other:?}"),
    }
}

#[test]
fn stop_mid_run_flushes_an_ordered_prefix() {
    let tmp = TempDir::new().unwrap();
    let input: Vec<String> = (0..100_000).map(|i| format!("user{i}@c.de")).collect();
    let classifier = CountryClassifier::from_assets(big_table(), None, LookupOrder::TldFirst);
    let stop = StopSignal::new();
    let raiser = stop.clone();
    let lines = input.clone().into_iter().enumerate().map(move |(i, line)| {
        if i == 5_000 {
            raiser.raise();
        }
        Ok(line)
    });

    let report = run_with(
        lines,
        &classifier,
        &RunConfig::new(8, OutputFormat::Files, tmp.path()),
        &stop,
    )
    .unwrap();

    assert_eq!(report.status(), RunStatus::Partial);
    assert!(report.stopped_early);
    assert_eq!(report.total(), 5_000);
    let written = fs::read_to_string(tmp.path().join("DE.txt")).unwrap();
    let written: Vec<&str> = written.lines().collect();
    let expected: Vec<&str> = input[..written.len()].iter().map(String::as_str).collect();
    assert_eq!(written, expected);
}

#[test]
fn countries_sharing_a_file_name_are_both_kept() {
    let tmp = TempDir::new().unwrap();
    let table = TldTable::from_entries([("ab", "A/B"), ("cd", "A_B")]);
    let lines = vec![Ok("x@h.ab".to_string()), Ok("y@h.cd".to_string())];

    let report = run(lines, table, None, &RunConfig::new(2, OutputFormat::Files, tmp.path())).unwrap();

    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(
        read_tree(tmp.path()),
        BTreeMap::from([
            ("A_B.txt".to_string(), "x@h.ab\n".to_string()),
            ("A_B_2.txt".to_string(), "y@h.cd\n".to_string()),
        ])
    );
}
