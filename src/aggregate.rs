//! Ordered accumulation of classified lines and the final write-out.
//!
//! Results arrive in worker completion order. A reorder buffer keyed by
//! sequence number releases them strictly in input order, so each country
//! group (and the CSV table) matches the input regardless of scheduling.
//! Nothing touches the disk until [`Aggregator::flush`], which leaves the
//! buffered data intact so a failed target can be retried.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use crate::dispatch::Sequenced;
use crate::domain::{ClassifiedEmail, CountryCode};
use crate::error::SorterError;
use crate::settings::OutputFormat;
use crate::utils::sanitize_file_name;

/// File name of the consolidated table in CSV mode.
pub const CSV_FILE_NAME: &str = "emails_by_country.csv";

enum Payload<'a> {
    Group(&'a [String]),
    Table(&'a [ClassifiedEmail]),
}

struct Target<'a> {
    label: String,
    country: Option<&'a CountryCode>,
    path: PathBuf,
    payload: Payload<'a>,
}

/// Outcome of one flush attempt.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub written: Vec<PathBuf>,
    /// File written for each country group (files mode only).
    pub group_files: BTreeMap<CountryCode, PathBuf>,
    pub failures: Vec<SorterError>,
}

#[derive(Debug)]
pub struct Aggregator {
    format: OutputFormat,
    next_seq: u64,
    pending: BTreeMap<u64, ClassifiedEmail>,
    groups: BTreeMap<CountryCode, Vec<String>>,
    rows: Vec<ClassifiedEmail>,
    counts: BTreeMap<CountryCode, usize>,
}

impl Aggregator {
    pub fn new(format: OutputFormat) -> Self {
        Aggregator {
            format,
            next_seq: 0,
            pending: BTreeMap::new(),
            groups: BTreeMap::new(),
            rows: Vec::new(),
            counts: BTreeMap::new(),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Take one result, releasing everything that is now contiguous.
    pub fn accept(&mut self, result: Sequenced<ClassifiedEmail>) {
        if result.seq < self.next_seq || self.pending.contains_key(&result.seq) {
            warn!(action = "accept", component = "aggregator", seq = result.seq, "Ignoring duplicate sequence number");
            return;
        }

        self.pending.insert(result.seq, result.item);
        while let Some(item) = self.pending.remove(&self.next_seq) {
            self.append(item);
            self.next_seq += 1;
        }
    }

    /// Release anything still waiting behind a gap, in sequence order.
    ///
    /// Gaps only exist when a run was cut short; the lines on either side
    /// still keep their relative order.
    pub fn seal(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        warn!(action = "seal", component = "aggregator", pending = self.pending.len(), next_seq = self.next_seq, "Releasing results behind a sequence gap");
        let pending = std::mem::take(&mut self.pending);
        for (seq, item) in pending {
            self.append(item);
            self.next_seq = seq + 1;
        }
    }

    /// Number of results released so far.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Number of results waiting for an earlier sequence number.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn counts(&self) -> &BTreeMap<CountryCode, usize> {
        &self.counts
    }

    pub fn groups(&self) -> &BTreeMap<CountryCode, Vec<String>> {
        &self.groups
    }

    pub fn rows(&self) -> &[ClassifiedEmail] {
        &self.rows
    }

    fn append(&mut self, item: ClassifiedEmail) {
        *self.counts.entry(item.country.clone()).or_insert(0) += 1;
        match self.format {
            OutputFormat::Files => self.groups.entry(item.country).or_default().push(item.email),
            OutputFormat::Csv => self.rows.push(item),
        }
    }

    /// Write everything buffered into `dir`.
    ///
    /// Each target is written to a temporary file and renamed into place,
    /// so a failing target never leaves a truncated file or affects the
    /// others.
    pub fn flush(&self, dir: &Path) -> FlushReport {
        let start_time = Instant::now();
        info!(action = "start", component = "flush", output_dir = ?dir, format = %self.format, "Writing output");

        let targets = self.targets(dir);
        let mut report = FlushReport::default();

        if let Err(e) = fs::create_dir_all(dir) {
            error!(action = "create", component = "flush", output_dir = ?dir, error = %e, "Cannot create output directory");
            for target in targets {
                report.failures.push(SorterError::OutputWriteFailure {
                    target: target.label,
                    path: target.path,
                    source: io::Error::new(e.kind(), e.to_string()),
                });
            }
            return report;
        }

        for Target {
            label: target,
            country,
            path,
            payload,
        } in targets
        {
            let written = match payload {
                Payload::Group(emails) => write_atomically(dir, &path, |w| write_group(w, emails)),
                Payload::Table(rows) => write_atomically(dir, &path, |w| write_table(w, rows)),
            };

            match written {
                Ok(()) => {
                    info!(action = "write", component = "flush", target = %target, path = ?path, "Wrote output file");
                    if let Some(country) = country {
                        report.group_files.insert(country.clone(), path.clone());
                    }
                    report.written.push(path);
                }
                Err(source) => {
                    error!(action = "write", component = "flush", target = %target, path = ?path, error = %source, "Failed to write output file");
                    report.failures.push(SorterError::OutputWriteFailure {
                        target,
                        path,
                        source,
                    });
                }
            }
        }

        info!(
            action = "complete",
            component = "flush",
            written = report.written.len(),
            failed = report.failures.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Output written"
        );
        report
    }

    fn targets(&self, dir: &Path) -> Vec<Target<'_>> {
        match self.format {
            OutputFormat::Files => {
                let names = unique_file_names(self.groups.keys());
                self.groups
                    .iter()
                    .zip(names)
                    .map(|((code, emails), name)| Target {
                        label: code.to_string(),
                        country: Some(code),
                        path: dir.join(format!("{name}.txt")),
                        payload: Payload::Group(emails),
                    })
                    .collect()
            }
            OutputFormat::Csv => vec![Target {
                label: "csv".to_string(),
                country: None,
                path: dir.join(CSV_FILE_NAME),
                payload: Payload::Table(&self.rows),
            }],
        }
    }
}

/// Sanitised file stem per country, suffixed `_2`, `_3`, ... where two
/// codes would otherwise share a name. Names are compared ignoring ASCII
/// case so the result is also unique on case-insensitive file systems.
fn unique_file_names<'a>(codes: impl Iterator<Item = &'a CountryCode>) -> Vec<String> {
    let mut taken = HashSet::new();
    codes
        .map(|code| {
            let base = sanitize_file_name(code.as_str());
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.to_ascii_lowercase()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            if name != base {
                warn!(action = "name", component = "flush", country = %code, file_stem = %name, "File name already taken, using a suffixed name");
            }
            name
        })
        .collect()
}

fn write_atomically<F>(dir: &Path, path: &Path, body: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        body(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn write_group(w: &mut dyn Write, emails: &[String]) -> io::Result<()> {
    for email in emails {
        writeln!(w, "{email}")?;
    }
    Ok(())
}

fn write_table(w: &mut dyn Write, rows: &[ClassifiedEmail]) -> io::Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(w);
    for row in rows {
        writer.write_record([row.country.as_str(), row.email.as_str()])?;
    }
    writer.flush()
}
