//! Scoring metrics and statistics tracking for batch prediction runs.

use crate::types::{Outcome, PredictedClass};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for scored records
pub struct ScoringMetrics {
    /// Total records scored
    pub records_scored: AtomicU64,
    /// Records that could not be parsed
    pub records_rejected: AtomicU64,
    /// Outcomes by predicted class
    by_class: RwLock<BTreeMap<String, u64>>,
    /// Outcomes by confidence bucket
    by_confidence: RwLock<BTreeMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// P(Yes) distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self {
            records_scored: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            by_class: RwLock::new(BTreeMap::new()),
            by_confidence: RwLock::new(BTreeMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a scored outcome
    pub fn record_outcome(&self, processing_time: Duration, outcome: &Outcome) {
        self.records_scored.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = ((outcome.probability.yes * 10.0) as usize).min(9);
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }

        if let Ok(mut by_class) = self.by_class.write() {
            *by_class.entry(class_label(outcome.predicted_class)).or_insert(0) += 1;
        }
        if let Ok(mut by_confidence) = self.by_confidence.write() {
            *by_confidence
                .entry(format!("{:?}", outcome.confidence))
                .or_insert(0) += 1;
        }
    }

    /// Record an input line that could not be scored
    pub fn record_rejected(&self) {
        self.records_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = self
            .processing_times
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.5),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Records per second since creation
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        *self
            .probability_buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_by_class(&self) -> BTreeMap<String, u64> {
        self.by_class
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_by_confidence(&self) -> BTreeMap<String, u64> {
        self.by_confidence
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let scored = self.records_scored.load(Ordering::Relaxed);
        let rejected = self.records_rejected.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let by_class = self.get_by_class();
        let by_confidence = self.get_by_confidence();
        let distribution = self.get_probability_distribution();

        let pct = |count: u64, total: u64| {
            if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            }
        };

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            TREATMENT PREDICTOR - SCORING SUMMARY             ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Records Scored: {:>8}  │  Throughput: {:>8.1} rec/s        ║",
            scored, throughput
        );
        info!("║ Records Rejected: {:>6}                                      ║", rejected);
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Predicted Class:                                             ║");
        for (class, count) in &by_class {
            info!("║   {:10}: {:>6} ({:>5.1}%)", class, count, pct(*count, scored));
        }
        info!("║ Confidence:                                                  ║");
        for (level, count) in &by_confidence {
            info!("║   {:10}: {:>6} ({:>5.1}%)", level, count, pct(*count, scored));
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ P(Yes) Distribution:                                         ║");
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let share = pct(count, total);
            let bar: String = "█".repeat(((share / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                share,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn class_label(class: PredictedClass) -> String {
    match class {
        PredictedClass::Yes => "Yes".to_string(),
        PredictedClass::No => "No".to_string(),
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints periodic summaries while a long batch is running
pub struct MetricsReporter {
    metrics: std::sync::Arc<ScoringMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<ScoringMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::outcome::ConfidenceThresholds;

    fn outcome(p_yes: f64) -> Outcome {
        Outcome::new(p_yes, &ConfidenceThresholds::default(), Vec::new(), "test".to_string())
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = ScoringMetrics::new();

        metrics.record_outcome(Duration::from_micros(100), &outcome(0.9));
        metrics.record_outcome(Duration::from_micros(200), &outcome(0.2));
        metrics.record_outcome(Duration::from_micros(300), &outcome(1.0));
        metrics.record_rejected();

        assert_eq!(metrics.records_scored.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.records_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_by_class().get("Yes"), Some(&2));
        assert_eq!(metrics.get_by_confidence().get("High"), Some(&3));

        let distribution = metrics.get_probability_distribution();
        assert_eq!(distribution[9], 2);
        assert_eq!(distribution[2], 1);
    }

    #[test]
    fn test_processing_stats() {
        let metrics = ScoringMetrics::new();
        assert_eq!(metrics.get_processing_stats().count, 0);

        for us in [100, 200, 300, 400] {
            metrics.record_outcome(Duration::from_micros(us), &outcome(0.5));
        }
        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_us, 250);
        assert_eq!(stats.p50_us, 300);
        assert_eq!(stats.max_us, 400);
    }
}
