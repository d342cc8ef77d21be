//! Latency tracking
//!
//! One HDR histogram per operation label, all behind a single mutex.
//! Samples are kept in microseconds and reported in milliseconds.

use crate::error::{CacheError, CacheResult};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

/// Significant figures kept by each histogram
const SIGNIFICANT_FIGURES: u8 = 3;

/// Per-operation latency recorder
#[derive(Default)]
pub struct LatencyTracker {
    histograms: Mutex<HashMap<String, Histogram<u64>>>,
}

/// Summary of one operation's recorded latencies, in milliseconds
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stats {
    pub operation: String,
    pub count: u64,
    pub min: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample for `operation`
    pub fn record(&self, operation: &str, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let mut histograms = self.histograms.lock();

        if !histograms.contains_key(operation) {
            match Histogram::<u64>::new(SIGNIFICANT_FIGURES) {
                Ok(histogram) => {
                    histograms.insert(operation.to_string(), histogram);
                }
                Err(e) => {
                    warn!("Failed to create latency histogram for {}: {}", operation, e);
                    return;
                }
            }
        }

        if let Some(histogram) = histograms.get_mut(operation) {
            if let Err(e) = histogram.record(micros) {
                warn!("Dropped latency sample for {}: {}", operation, e);
            }
        }
    }

    /// Time a synchronous closure and record it under `operation`
    pub fn record_fn<T>(&self, operation: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(operation, start.elapsed());
        result
    }

    /// Time a future and record it under `operation`
    pub async fn time<F: Future>(&self, operation: &str, fut: F) -> F::Output {
        let start = Instant::now();
        let result = fut.await;
        self.record(operation, start.elapsed());
        result
    }

    /// Statistics for one operation
    pub fn stats(&self, operation: &str) -> CacheResult<Stats> {
        let histograms = self.histograms.lock();
        let histogram = histograms
            .get(operation)
            .ok_or_else(|| CacheError::NoMetrics(operation.to_string()))?;
        Ok(summarize(operation, histogram))
    }

    /// Statistics for every recorded operation, sorted by label
    pub fn all_stats(&self) -> Vec<Stats> {
        let histograms = self.histograms.lock();
        let mut stats: Vec<Stats> = histograms
            .iter()
            .map(|(operation, histogram)| summarize(operation, histogram))
            .collect();
        stats.sort_by(|a, b| a.operation.cmp(&b.operation));
        stats
    }
}

fn summarize(operation: &str, histogram: &Histogram<u64>) -> Stats {
    if histogram.is_empty() {
        return Stats {
            operation: operation.to_string(),
            ..Stats::default()
        };
    }

    Stats {
        operation: operation.to_string(),
        count: histogram.len(),
        min: micros_to_ms(histogram.min()),
        p50: micros_to_ms(histogram.value_at_quantile(0.50)),
        p90: micros_to_ms(histogram.value_at_quantile(0.90)),
        p95: micros_to_ms(histogram.value_at_quantile(0.95)),
        p99: micros_to_ms(histogram.value_at_quantile(0.99)),
        max: micros_to_ms(histogram.max()),
    }
}

fn micros_to_ms(micros: u64) -> f64 {
    micros as f64 / 1000.0
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "  {}: no data", self.operation);
        }
        write!(
            f,
            "  {} (n={}): min={:.2}ms p50={:.2}ms p90={:.2}ms p95={:.2}ms p99={:.2}ms max={:.2}ms",
            self.operation, self.count, self.min, self.p50, self.p90, self.p95, self.p99, self.max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn quantiles_over_known_samples() {
        let tracker = LatencyTracker::new();
        let operations = ["get_overall", "put_overall", "get_remote", "put_remote"];

        for op in operations {
            for sample in [1, 5, 10, 50, 100] {
                tracker.record(op, ms(sample));
            }
        }

        for op in operations {
            let stats = tracker.stats(op).unwrap();
            assert_eq!(stats.count, 5);
            assert!((0.9..=1.1).contains(&stats.min), "min was {}", stats.min);
            assert!((99.0..=101.0).contains(&stats.max), "max was {}", stats.max);
            assert!((5.0..=15.0).contains(&stats.p50), "p50 was {}", stats.p50);
            assert!((40.0..=110.0).contains(&stats.p99), "p99 was {}", stats.p99);
        }

        assert_eq!(tracker.all_stats().len(), operations.len());
    }

    #[test]
    fn unknown_operation_is_an_error() {
        let tracker = LatencyTracker::new();
        tracker.record("known", ms(1));
        assert!(matches!(
            tracker.stats("nonexistent"),
            Err(CacheError::NoMetrics(op)) if op == "nonexistent"
        ));
    }

    #[test]
    fn all_stats_sorted_by_label() {
        let tracker = LatencyTracker::new();
        tracker.record("put_overall", ms(2));
        tracker.record("get_overall", ms(1));
        let labels: Vec<String> = tracker
            .all_stats()
            .into_iter()
            .map(|s| s.operation)
            .collect();
        assert_eq!(labels, vec!["get_overall", "put_overall"]);
    }

    #[test]
    fn record_fn_passes_result_through() {
        let tracker = LatencyTracker::new();
        let result: Result<&str, String> = tracker.record_fn("op", || {
            std::thread::sleep(ms(10));
            Ok("done")
        });
        assert_eq!(result, Ok("done"));

        let stats = tracker.stats("op").unwrap();
        assert_eq!(stats.count, 1);
        assert!(stats.min >= 9.0, "min was {}", stats.min);
    }

    #[tokio::test]
    async fn time_records_future() {
        let tracker = LatencyTracker::new();
        let result: Result<(), String> = tracker
            .time("async_op", async {
                tokio::time::sleep(ms(5)).await;
                Err("failed".to_string())
            })
            .await;
        assert_eq!(result, Err("failed".to_string()));
        assert_eq!(tracker.stats("async_op").unwrap().count, 1);
    }

    #[test]
    fn stats_display() {
        let stats = Stats {
            operation: "test_op".to_string(),
            count: 100,
            min: 1.5,
            p50: 10.2,
            p90: 50.7,
            p95: 75.3,
            p99: 99.1,
            max: 120.5,
        };
        assert_eq!(
            stats.to_string(),
            "  test_op (n=100): min=1.50ms p50=10.20ms p90=50.70ms p95=75.30ms p99=99.10ms max=120.50ms"
        );

        let empty = Stats {
            operation: "empty_op".to_string(),
            ..Stats::default()
        };
        assert_eq!(empty.to_string(), "  empty_op: no data");
    }
}
