//! Latency sample collection and the end-of-run histogram report.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hdrhistogram::Histogram;
use serde::Serialize;

/// Bucket lower bounds below one second; wider bins follow.
const FIXED_BOUNDS_MS: [u64; 9] = [0, 50, 100, 150, 200, 300, 400, 500, 1000];
const WIDE_BIN_MS: u64 = 1000;
const HISTOGRAM_MAX_MS: u64 = 3_600_000;

// =============================================================================
// Collection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencySample {
    pub label: String,
    pub duration_ms: u64,
    pub is_error: bool,
}

impl LatencySample {
    pub fn new(label: impl Into<String>, duration_ms: u64, is_error: bool) -> Self {
        Self {
            label: label.into(),
            duration_ms,
            is_error,
        }
    }
}

/// Shared by every session in a run.
#[derive(Debug, Default)]
pub struct StatsCollector {
    samples: Mutex<Vec<LatencySample>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sample: LatencySample) {
        self.samples().push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summaries per label (sorted) and for the whole run. Meant to be
    /// called once recording has finished.
    pub fn report(&self) -> Report {
        let samples = self.samples();

        let mut by_label: BTreeMap<&str, Vec<&LatencySample>> = BTreeMap::new();
        for sample in samples.iter() {
            by_label.entry(sample.label.as_str()).or_default().push(sample);
        }

        let operations = by_label
            .into_iter()
            .filter_map(|(label, group)| {
                Summary::from_samples(&group).map(|summary| OperationSummary {
                    label: label.to_string(),
                    summary,
                })
            })
            .collect();

        let all: Vec<&LatencySample> = samples.iter().collect();

        Report {
            operations,
            overall: Summary::from_samples(&all),
        }
    }

    // Poisoning is ignored: a push either completed or never started.
    fn samples(&self) -> MutexGuard<'_, Vec<LatencySample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Summaries
// =============================================================================

/// Lower bounds for a sample set whose slowest entry took `max_ms`. The
/// last bound always lies above `max_ms`, so every sample lands in some
/// `[bound, next_bound)` window.
pub fn bucket_bounds(max_ms: u64) -> Vec<u64> {
    let mut bounds = FIXED_BOUNDS_MS.to_vec();
    let mut last = FIXED_BOUNDS_MS[FIXED_BOUNDS_MS.len() - 1];
    while last <= max_ms {
        last += WIDE_BIN_MS;
        bounds.push(last);
    }
    bounds
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub lower_ms: u64,
    /// Exclusive.
    pub upper_ms: u64,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub min_ms: u64,
    pub max_ms: u64,
    pub errors: usize,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    /// Non-empty buckets only.
    pub buckets: Vec<Bucket>,
}

impl Summary {
    fn from_samples(samples: &[&LatencySample]) -> Option<Self> {
        let min_ms = samples.iter().map(|s| s.duration_ms).min()?;
        let max_ms = samples.iter().map(|s| s.duration_ms).max()?;
        let count = samples.len();

        let mut histogram = Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_MS, 3)
            .expect("static histogram bounds are valid");
        for sample in samples {
            histogram.saturating_record(sample.duration_ms);
        }

        let buckets = bucket_bounds(max_ms)
            .windows(2)
            .filter_map(|window| {
                let (lower_ms, upper_ms) = (window[0], window[1]);
                let in_bucket = samples
                    .iter()
                    .filter(|s| s.duration_ms >= lower_ms && s.duration_ms < upper_ms)
                    .count();

                (in_bucket > 0).then(|| Bucket {
                    lower_ms,
                    upper_ms,
                    count: in_bucket,
                    percent: in_bucket as f64 / count as f64 * 100.0,
                })
            })
            .collect();

        Some(Self {
            count,
            min_ms,
            max_ms,
            errors: samples.iter().filter(|s| s.is_error).count(),
            p50_ms: histogram.value_at_quantile(0.50),
            p95_ms: histogram.value_at_quantile(0.95),
            p99_ms: histogram.value_at_quantile(0.99),
            buckets,
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Request count: {}", self.count)?;
        writeln!(f, "  Best time: {}", self.min_ms)?;
        writeln!(f, "  Worst time: {}", self.max_ms)?;
        writeln!(f, "  Error count: {}", self.errors)?;
        writeln!(
            f,
            "  p50/p95/p99: {}/{}/{}",
            self.p50_ms, self.p95_ms, self.p99_ms
        )?;

        for bucket in &self.buckets {
            writeln!(
                f,
                "    {:>4}ms - {:<4}ms: {:.2}%",
                bucket.lower_ms,
                bucket.upper_ms - 1,
                bucket.percent
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSummary {
    pub label: String,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub operations: Vec<OperationSummary>,
    /// `None` when nothing was recorded.
    pub overall: Option<Summary>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(71);

        writeln!(f, "{rule}")?;
        writeln!(f, "\nStats by tool:\n")?;
        for operation in &self.operations {
            writeln!(f, "{}", operation.label)?;
            writeln!(f, "{}", "-".repeat(operation.label.chars().count()))?;
            write!(f, "{}", operation.summary)?;
            writeln!(f)?;
        }

        writeln!(f, "\nStats for entire run:\n")?;
        if let Some(overall) = &self.overall {
            write!(f, "{overall}")?;
        }

        writeln!(f)?;
        writeln!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn collector(samples: &[(&str, u64, bool)]) -> StatsCollector {
        let stats = StatsCollector::new();
        for &(label, duration_ms, is_error) in samples {
            stats.record(LatencySample::new(label, duration_ms, is_error));
        }
        stats
    }

    fn bucket_of(summary: &Summary, duration_ms: u64) -> Option<&Bucket> {
        summary
            .buckets
            .iter()
            .find(|b| duration_ms >= b.lower_ms && duration_ms < b.upper_ms)
    }

    #[test]
    fn test_bucket_bounds_extend_past_max() {
        assert_eq!(bucket_bounds(0), FIXED_BOUNDS_MS.to_vec());
        assert_eq!(bucket_bounds(999), FIXED_BOUNDS_MS.to_vec());

        let bounds = bucket_bounds(1000);
        assert_eq!(bounds.last(), Some(&2000));

        let bounds = bucket_bounds(3500);
        assert_eq!(&bounds[8..], &[1000, 2000, 3000, 4000]);
    }

    #[test]
    fn test_bucket_lower_bound_is_inclusive() {
        let stats = collector(&[("Lessons", 0, false), ("Lessons", 50, false), ("Lessons", 49, false)]);
        let report = stats.report();
        let overall = report.overall.unwrap();

        assert_eq!(overall.buckets[0].lower_ms, 0);
        assert_eq!(overall.buckets[0].count, 2);
        assert_eq!(bucket_of(&overall, 50).unwrap().lower_ms, 50);
        assert_eq!(bucket_of(&overall, 50).unwrap().count, 1);
    }

    #[test]
    fn test_uniform_spread_sums_to_one_hundred_percent() {
        let samples: Vec<(&str, u64, bool)> = (0..100).map(|i| ("Resources", i * 10, false)).collect();
        let overall = collector(&samples).report().overall.unwrap();

        let total: f64 = overall.buckets.iter().map(|b| b.percent).sum();
        assert!((total - 100.0).abs() < 0.01, "total was {total}");
        assert_eq!(overall.count, 100);
        assert_eq!(overall.min_ms, 0);
        assert_eq!(overall.max_ms, 990);
    }

    #[test]
    fn test_round_maximum_is_counted() {
        let overall = collector(&[("Syllabus", 1000, false), ("Syllabus", 10, false)])
            .report()
            .overall
            .unwrap();

        let counted: usize = overall.buckets.iter().map(|b| b.count).sum();
        assert_eq!(counted, 2);
        assert_eq!(bucket_of(&overall, 1000).unwrap().upper_ms, 2000);
    }

    #[test]
    fn test_report_groups_by_sorted_label() {
        let stats = collector(&[
            ("Resources", 120, false),
            ("Announcements", 40, true),
            ("Resources", 2400, false),
            ("Announcements", 60, false),
        ]);
        let report = stats.report();

        let labels: Vec<&str> = report.operations.iter().map(|op| op.label.as_str()).collect();
        assert_eq!(labels, ["Announcements", "Resources"]);

        let announcements = &report.operations[0].summary;
        assert_eq!(announcements.count, 2);
        assert_eq!(announcements.errors, 1);
        // Bounds come from this group's own maximum, not the run's.
        assert!(announcements.buckets.iter().all(|b| b.upper_ms <= 1000));

        let overall = report.overall.unwrap();
        assert_eq!(overall.count, 4);
        assert_eq!(overall.errors, 1);
        assert_eq!(overall.max_ms, 2400);
    }

    #[test]
    fn test_report_is_repeatable() {
        let stats = collector(&[("Lessons", 75, false), ("Forums", 410, true), ("Lessons", 1300, false)]);

        let first = stats.report().to_string();
        let second = stats.report().to_string();
        assert_eq!(first, second);
        assert!(first.contains("Stats by tool:"));
        assert!(first.contains("Lessons\n-------\n"));
        assert!(first.contains("    1000ms - 1999ms: 50.00%"));
        assert!(first.contains("      50ms - 99  ms: 50.00%"));
    }

    #[test]
    fn test_empty_report() {
        let report = StatsCollector::new().report();
        assert!(report.operations.is_empty());
        assert!(report.overall.is_none());
        assert!(report.to_string().contains("Stats for entire run:"));
    }

    #[test]
    fn test_concurrent_records_are_kept() {
        let stats = Arc::new(StatsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        stats.record(LatencySample::new(format!("tool-{worker}"), i, i % 7 == 0));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.len(), 4000);
        let report = stats.report();
        assert_eq!(report.operations.len(), 8);
        assert!(report.operations.iter().all(|op| op.summary.count == 500));
    }
}
