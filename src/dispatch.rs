//! Fan-out/fan-in pipeline.
//!
//! A reader thread tags each non-blank input line with a strictly
//! increasing sequence number and pushes it into a bounded queue. A fixed
//! pool of workers classifies lines and pushes results into a second
//! bounded queue, which the calling thread drains into the [`Aggregator`].
//! Both queues block their producers when full.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::aggregate::Aggregator;
use crate::classifier::{CountryClassifier, ResolutionCache};
use crate::domain::ClassifiedEmail;
use crate::error::{Result, SorterError};
use crate::settings::RunConfig;

/// A value tagged with its position in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequenced<T> {
    pub seq: u64,
    pub item: T,
}

impl<T> Sequenced<T> {
    pub fn new(seq: u64, item: T) -> Self {
        Sequenced { seq, item }
    }
}

/// Shared flag asking the reader to stop dispatching new lines.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        StopSignal::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened while feeding and draining the pipeline.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub dispatched: u64,
    pub delivered: u64,
    pub stopped_early: bool,
    pub input_error: Option<SorterError>,
}

#[derive(Debug, Default)]
struct FeedOutcome {
    dispatched: u64,
    stopped_early: bool,
    input_error: Option<SorterError>,
}

pub struct Dispatcher<'a> {
    workers: usize,
    queue_capacity: usize,
    stop: &'a StopSignal,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &RunConfig, stop: &'a StopSignal) -> Self {
        Dispatcher {
            workers: config.threads.max(1),
            queue_capacity: config.queue_capacity.max(1),
            stop,
        }
    }

    /// Classify every line and deliver the results to `aggregator`.
    ///
    /// Returns once every dispatched line has a result in the aggregator.
    pub fn dispatch<I>(
        &self,
        lines: I,
        classifier: &CountryClassifier,
        aggregator: &mut Aggregator,
    ) -> Result<DispatchSummary>
    where
        I: IntoIterator<Item = io::Result<String>>,
        I::IntoIter: Send,
    {
        let start_time = Instant::now();
        info!(
            action = "start",
            component = "dispatcher",
            worker_count = self.workers,
            queue_capacity = self.queue_capacity,
            "Starting classification pipeline"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("classify-worker-{i}"))
            .build()?;

        let (line_tx, line_rx) = bounded::<Sequenced<String>>(self.queue_capacity);
        let (result_tx, result_rx) = bounded::<Sequenced<ClassifiedEmail>>(self.queue_capacity);
        let lines = lines.into_iter();
        let stop = self.stop;

        let (feed, delivered) = thread::scope(|scope| {
            let reader = thread::Builder::new()
                .name("line-reader".to_string())
                .spawn_scoped(scope, move || feed_lines(lines, line_tx, stop))
                .map_err(|_| SorterError::ThreadPanicked("reader"))?;

            let delivered = pool.in_place_scope(|s| {
                for worker_id in 0..self.workers {
                    let line_rx = line_rx.clone();
                    let result_tx = result_tx.clone();
                    s.spawn(move |_| classify_lines(worker_id, line_rx, result_tx, classifier));
                }
                // Only workers hold the queue ends now, so the drain ends with them.
                drop(line_rx);
                drop(result_tx);
                drain_results(result_rx, aggregator)
            });

            let feed = reader
                .join()
                .map_err(|_| SorterError::ThreadPanicked("reader"))?;
            Ok::<_, SorterError>((feed, delivered))
        })?;

        info!(
            action = "complete",
            component = "dispatcher",
            dispatched = feed.dispatched,
            delivered,
            stopped_early = feed.stopped_early,
            duration_ms = start_time.elapsed().as_millis(),
            "Classification pipeline finished"
        );

        Ok(DispatchSummary {
            dispatched: feed.dispatched,
            delivered,
            stopped_early: feed.stopped_early,
            input_error: feed.input_error,
        })
    }
}

fn feed_lines<L>(lines: L, line_tx: Sender<Sequenced<String>>, stop: &StopSignal) -> FeedOutcome
where
    L: Iterator<Item = io::Result<String>>,
{
    let mut outcome = FeedOutcome::default();

    for (index, line) in lines.enumerate() {
        if stop.is_raised() {
            warn!(action = "stop", component = "line_reader", dispatched = outcome.dispatched, "Stop requested, no further lines dispatched");
            outcome.stopped_early = true;
            break;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(action = "read", component = "line_reader", dispatched = outcome.dispatched, error = %e, "Input source failed");
                outcome.input_error = Some(SorterError::InputSourceFailure {
                    lines_read: index as u64,
                    source: e,
                });
                break;
            }
        };

        let line = if index == 0 {
            line.trim_start_matches('\u{feff}')
        } else {
            line.as_str()
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line_tx
            .send(Sequenced::new(outcome.dispatched, line.to_string()))
            .is_err()
        {
            outcome.stopped_early = true;
            break;
        }
        outcome.dispatched += 1;
    }

    outcome
}

fn classify_lines(
    worker_id: usize,
    line_rx: Receiver<Sequenced<String>>,
    result_tx: Sender<Sequenced<ClassifiedEmail>>,
    classifier: &CountryClassifier,
) {
    let mut cache = ResolutionCache::new();
    let mut processed = 0u64;

    for Sequenced { seq, item } in line_rx.iter() {
        let classified = classifier.classify_cached(item, &mut cache);
        if result_tx.send(Sequenced::new(seq, classified)).is_err() {
            break;
        }
        processed += 1;
    }

    debug!(action = "complete", component = "worker", worker_id, processed, cache_hits = cache.hits(), "Worker finished");
}

fn drain_results(result_rx: Receiver<Sequenced<ClassifiedEmail>>, aggregator: &mut Aggregator) -> u64 {
    let mut delivered = 0u64;
    for result in result_rx.iter() {
        aggregator.accept(result);
        delivered += 1;
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{LookupOrder, OutputFormat};
    use crate::tld::TldTable;

    fn classifier() -> CountryClassifier {
        let tld = TldTable::from_entries([("co.uk", "GB"), ("de", "DE")]);
        CountryClassifier::from_assets(tld, None, LookupOrder::TldFirst)
    }

    fn config(threads: usize) -> RunConfig {
        RunConfig::new(threads, OutputFormat::Csv, "unused").with_queue_capacity(2)
    }

    fn lines(values: &[&str]) -> Vec<io::Result<String>> {
        values.iter().map(|v| Ok(v.to_string())).collect()
    }

    #[test]
    fn every_non_blank_line_is_delivered_once() {
        let input: Vec<String> = (0..500)
            .map(|i| match i % 4 {
                0 => format!("user{i}@host.co.uk"),
                1 => format!("user{i}@host.de"),
                2 => "   ".to_string(),
                _ => format!("broken-{i}"),
            })
            .collect();
        let stop = StopSignal::new();
        let mut aggregator = Aggregator::new(OutputFormat::Csv);

        let summary = Dispatcher::new(&config(8), &stop)
            .dispatch(input.into_iter().map(Ok), &classifier(), &mut aggregator)
            .unwrap();

        assert_eq!(summary.dispatched, 375);
        assert_eq!(summary.delivered, 375);
        assert!(!summary.stopped_early);
        assert!(summary.input_error.is_none());
        assert_eq!(aggregator.total(), 375);
        assert_eq!(aggregator.pending(), 0);
    }

    #[test]
    fn results_are_restored_to_input_order() {
        let input: Vec<String> = (0..2000).map(|i| format!("u{i}@h{}.de", i % 7)).collect();
        let stop = StopSignal::new();
        let mut aggregator = Aggregator::new(OutputFormat::Csv);

        Dispatcher::new(&config(16), &stop)
            .dispatch(input.clone().into_iter().map(Ok), &classifier(), &mut aggregator)
            .unwrap();

        let emails: Vec<&str> = aggregator.rows().iter().map(|r| r.email.as_str()).collect();
        assert_eq!(emails, input.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn raised_stop_dispatches_nothing_new() {
        let stop = StopSignal::new();
        stop.raise();
        let mut aggregator = Aggregator::new(OutputFormat::Files);

        let summary = Dispatcher::new(&config(2), &stop)
            .dispatch(lines(&["a@x.de", "b@y.de"]), &classifier(), &mut aggregator)
            .unwrap();

        assert!(summary.stopped_early);
        assert_eq!(summary.dispatched, 0);
        assert_eq!(aggregator.total(), 0);
    }

    #[test]
    fn input_failure_keeps_lines_read_so_far() {
        let input = vec![
            Ok("a@x.de".to_string()),
            Ok("b@x.co.uk".to_string()),
            Err(io::Error::new(io::ErrorKind::InvalidData, "disk went away")),
            Ok("never@read.de".to_string()),
        ];
        let stop = StopSignal::new();
        let mut aggregator = Aggregator::new(OutputFormat::Files);

        let summary = Dispatcher::new(&config(4), &stop)
            .dispatch(input, &classifier(), &mut aggregator)
            .unwrap();

        assert_eq!(summary.delivered, 2);
        assert!(matches!(
            summary.input_error,
            Some(SorterError::InputSourceFailure { lines_read: 2, .. })
        ));
        assert_eq!(aggregator.total(), 2);
    }

    #[test]
    fn strips_byte_order_mark_on_first_line() {
        let stop = StopSignal::new();
        let mut aggregator = Aggregator::new(OutputFormat::Csv);

        Dispatcher::new(&config(1), &stop)
            .dispatch(lines(&["\u{feff}a@x.de"]), &classifier(), &mut aggregator)
            .unwrap();

        assert_eq!(aggregator.rows()[0].email, "a@x.de");
    }
}
