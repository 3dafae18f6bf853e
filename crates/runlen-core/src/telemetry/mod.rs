//! In-process metrics and profiling hooks.
//!
//! Metric calls compile to no-ops unless the `telemetry` feature is enabled.
//! Profiling events additionally need the `profiling` feature and are
//! emitted as `tracing` debug records, see [`profile`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod profile;
pub mod tags;
pub mod worker;

/// Histogram summary captured in telemetry snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Point-in-time copy of every recorded metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl TelemetrySnapshot {
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauges.get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(name).copied()
    }
}

/// Increments a named counter by `value`.
///
/// Labels are accepted for call-site documentation and are not stored.
#[inline]
pub fn increment_counter(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(|metrics| {
        let counter = metrics.counters.entry(name).or_insert(0);
        *counter = counter.saturating_add(value);
    });

    let _ = (name, value);
}

/// Records one histogram sample.
#[inline]
pub fn record_histogram(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(|metrics| metrics.histograms.entry(name).or_default().record(value));

    let _ = (name, value);
}

/// Sets a gauge to an absolute value.
#[inline]
pub fn set_gauge(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(|metrics| {
        metrics.gauges.insert(name, value);
    });

    let _ = (name, value);
}

/// Adds `delta` to a gauge.
#[inline]
pub fn add_gauge(name: &'static str, delta: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(|metrics| {
        let gauge = metrics.gauges.entry(name).or_insert(0);
        *gauge = gauge.saturating_add(delta);
    });

    let _ = (name, delta);
}

/// Subtracts `delta` from a gauge, stopping at zero.
#[inline]
pub fn sub_gauge_saturating(name: &'static str, delta: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::update(|metrics| {
        let gauge = metrics.gauges.entry(name).or_insert(0);
        *gauge = gauge.saturating_sub(delta);
    });

    let _ = (name, delta);
}

/// Returns a point-in-time snapshot of all collected telemetry.
pub fn snapshot() -> TelemetrySnapshot {
    #[cfg(feature = "telemetry")]
    {
        return registry::snapshot();
    }

    #[cfg(not(feature = "telemetry"))]
    {
        TelemetrySnapshot::default()
    }
}

/// Clears all recorded metrics.
pub fn reset() {
    #[cfg(feature = "telemetry")]
    registry::update(|metrics| *metrics = registry::Metrics::default());
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::collections::BTreeMap;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    use super::{HistogramSnapshot, TelemetrySnapshot};

    /// Running sample summary; `min` is unset until the first sample.
    #[derive(Debug, Clone, Copy, Default)]
    pub(super) struct Histogram {
        count: u64,
        total: u64,
        min: Option<u64>,
        max: u64,
    }

    impl Histogram {
        pub(super) fn record(&mut self, value: u64) {
            self.min = Some(self.min.map_or(value, |min| min.min(value)));
            self.max = self.max.max(value);
            self.count = self.count.saturating_add(1);
            self.total = self.total.saturating_add(value);
        }
    }

    impl From<&Histogram> for HistogramSnapshot {
        fn from(histogram: &Histogram) -> Self {
            Self {
                count: histogram.count,
                total: histogram.total,
                min: histogram.min.unwrap_or(0),
                max: histogram.max,
                mean: if histogram.count == 0 {
                    0.0
                } else {
                    histogram.total as f64 / histogram.count as f64
                },
            }
        }
    }

    #[derive(Debug, Default)]
    pub(super) struct Metrics {
        pub(super) counters: BTreeMap<&'static str, u64>,
        pub(super) gauges: BTreeMap<&'static str, u64>,
        pub(super) histograms: BTreeMap<&'static str, Histogram>,
    }

    static METRICS: OnceLock<Mutex<Metrics>> = OnceLock::new();

    fn lock() -> MutexGuard<'static, Metrics> {
        METRICS
            .get_or_init(Mutex::default)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(super) fn update(apply: impl FnOnce(&mut Metrics)) {
        apply(&mut lock());
    }

    fn owned<'a, V: 'a, T>(
        entries: impl IntoIterator<Item = (&'a &'static str, &'a V)>,
        convert: impl Fn(&'a V) -> T,
    ) -> BTreeMap<String, T> {
        entries
            .into_iter()
            .map(|(name, value)| ((*name).to_owned(), convert(value)))
            .collect()
    }

    pub(super) fn snapshot() -> TelemetrySnapshot {
        let metrics = lock();
        TelemetrySnapshot {
            counters: owned(&metrics.counters, |value| *value),
            gauges: owned(&metrics.gauges, |value| *value),
            histograms: owned(&metrics.histograms, HistogramSnapshot::from),
        }
    }
}
