use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Histogram,
}

/// Point-in-time value of one metric series.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: String,
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub kind: MetricKind,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<HistogramSummary>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        labels.sort();
        Self {
            name: name.to_string(),
            labels,
        }
    }
}

/// In-memory counters and histograms, keyed by name and sorted labels.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: DashMap<MetricKey, AtomicU64>,
    histograms: DashMap<MetricKey, Mutex<Vec<f64>>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        self.counters
            .entry(MetricKey::new(name, labels))
            .or_default()
            .fetch_add(n, Ordering::Relaxed);
    }

    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .get(&MetricKey::new(name, labels))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.histograms
            .entry(MetricKey::new(name, labels))
            .or_default()
            .lock()
            .push(value);
    }

    pub fn histogram_summary(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        self.histograms
            .get(&MetricKey::new(name, labels))
            .map(|h| summarize(&h.lock()))
            .unwrap_or_default()
    }

    /// Snapshot every series, sorted by name.
    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        let timestamp = Utc::now().to_rfc3339();
        let mut out: Vec<MetricSnapshot> = self
            .counters
            .iter()
            .map(|entry| MetricSnapshot {
                timestamp: timestamp.clone(),
                name: entry.key().name.clone(),
                labels: entry.key().labels.clone(),
                kind: MetricKind::Counter,
                value: entry.value().load(Ordering::Relaxed) as f64,
                summary: None,
            })
            .collect();
        out.extend(self.histograms.iter().map(|entry| {
            let summary = summarize(&entry.value().lock());
            MetricSnapshot {
                timestamp: timestamp.clone(),
                name: entry.key().name.clone(),
                labels: entry.key().labels.clone(),
                kind: MetricKind::Histogram,
                value: summary.count as f64,
                summary: Some(summary),
            }
        }));
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        out
    }
}

fn summarize(observations: &[f64]) -> HistogramSummary {
    if observations.is_empty() {
        return HistogramSummary::default();
    }
    let mut sorted = observations.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let count = sorted.len();
    let pick = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];
    HistogramSummary {
        count: count as u64,
        sum: sorted.iter().sum(),
        p50: pick(0.5),
        p95: pick(0.95),
        p99: pick(0.99),
    }
}
