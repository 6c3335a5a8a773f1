//! Batch scoring of JSON-lines records.
//!
//! Records are scored on the blocking pool with at most `workers` in flight.
//! Outcomes are written in input order as soon as the oldest one is ready,
//! so memory stays bounded by the worker count rather than the input size.

use crate::metrics::ScoringMetrics;
use crate::models::inference::InferenceService;
use crate::types::{Outcome, SurveyRecord};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Records between progress log lines
const MILESTONE: u64 = 1000;

/// Score every line of `lines` and write one outcome per parsed record to `sink`.
///
/// Blank lines are skipped. Lines that are not a JSON object are logged,
/// counted as rejected and produce no output. Returns the number of lines
/// processed.
pub async fn score_lines<I, W>(
    service: Arc<InferenceService>,
    metrics: Arc<ScoringMetrics>,
    lines: I,
    mut sink: W,
    workers: usize,
) -> Result<u64>
where
    I: IntoIterator<Item = io::Result<String>>,
    W: Write,
{
    let workers = workers.max(1);
    let mut in_flight: VecDeque<JoinHandle<Option<Outcome>>> = VecDeque::with_capacity(workers);
    let mut processed = 0u64;

    for (line_no, line) in lines.into_iter().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        if in_flight.len() >= workers {
            if let Some(oldest) = in_flight.pop_front() {
                write_outcome(&mut sink, oldest.await?)?;
            }
        }

        let service = service.clone();
        let task_metrics = metrics.clone();
        in_flight.push_back(tokio::task::spawn_blocking(move || {
            score_line(&service, &task_metrics, &line, line_no + 1)
        }));

        processed += 1;
        if processed % MILESTONE == 0 {
            let stats = metrics.get_processing_stats();
            info!(
                processed,
                throughput = format!("{:.1} rec/s", metrics.get_throughput()),
                avg_latency_us = stats.mean_us,
                "Scoring milestone"
            );
        }
    }

    while let Some(handle) = in_flight.pop_front() {
        write_outcome(&mut sink, handle.await?)?;
    }
    sink.flush().context("Failed to flush scored outcomes")?;

    Ok(processed)
}

fn score_line(
    service: &InferenceService,
    metrics: &ScoringMetrics,
    line: &str,
    line_no: usize,
) -> Option<Outcome> {
    let start_time = Instant::now();
    match serde_json::from_str::<SurveyRecord>(line) {
        Ok(record) => {
            let outcome = service.predict(&record);
            metrics.record_outcome(start_time.elapsed(), &outcome);
            Some(outcome)
        }
        Err(e) => {
            warn!(line = line_no, error = %e, "Failed to parse record");
            metrics.record_rejected();
            None
        }
    }
}

fn write_outcome<W: Write>(sink: &mut W, outcome: Option<Outcome>) -> Result<()> {
    if let Some(outcome) = outcome {
        serde_json::to_writer(&mut *sink, &outcome)?;
        sink.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceConfig;
    use crate::testing::small_bundle;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    /// Sink shared between the scorer and the test
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn lines(&self) -> usize {
            self.0.lock().unwrap().iter().filter(|&&b| b == b'\n').count()
        }

        fn outcomes(&self) -> Vec<Outcome> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn record(i: usize) -> String {
        let interfere = ["Never", "Rarely", "Sometimes", "Often"][i % 4];
        let history = if i % 3 == 0 { "Yes" } else { "No" };
        format!(
            r#"{{"Age": {}, "family_history": "{}", "work_interfere": "{}"}}"#,
            20 + i,
            history,
            interfere
        )
    }

    #[tokio::test]
    async fn test_outcomes_stream_in_input_order() {
        let service = Arc::new(
            InferenceService::new(small_bundle(), InferenceConfig::default()).unwrap(),
        );
        let metrics = Arc::new(ScoringMetrics::new());
        let sink = SharedSink::default();
        let workers = 3;

        let mut input: Vec<String> = (0..40).map(record).collect();
        input.insert(5, "not json".to_string());
        input.insert(9, "   ".to_string());

        let expected: Vec<Outcome> = input
            .iter()
            .filter_map(|line| serde_json::from_str::<SurveyRecord>(line).ok())
            .map(|r| service.predict(&r))
            .collect();

        let observed = sink.clone();
        let lines: Vec<io::Result<String>> = input.into_iter().map(Ok).collect();
        let lines = lines.into_iter().enumerate().map(move |(i, line)| {
            // At most `workers` outcomes are pending; one blank and one bad line emit nothing
            assert!(observed.lines() + workers + 2 >= i);
            line
        });

        let processed = score_lines(service, metrics.clone(), lines, sink.clone(), workers)
            .await
            .unwrap();

        assert_eq!(processed, 41);
        assert_eq!(sink.outcomes(), expected);
        assert_eq!(metrics.records_scored.load(Ordering::Relaxed), 40);
        assert_eq!(metrics.records_rejected.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_read_error_stops_scoring() {
        let service = Arc::new(
            InferenceService::new(small_bundle(), InferenceConfig::default()).unwrap(),
        );
        let lines = vec![
            Ok(record(0)),
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad utf-8")),
        ];

        let result = score_lines(
            service,
            Arc::new(ScoringMetrics::new()),
            lines,
            SharedSink::default(),
            2,
        )
        .await;
        assert!(result.is_err());
    }
}
