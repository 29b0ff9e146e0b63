//! Per-metric handles. Cheap to clone; a handle and all of its clones share
//! one identity, one accumulator, and the client's connection. Handles are
//! safe for concurrent use from any number of callers.

use std::sync::Arc;
use std::time::Duration;

use crate::accumulator::SaturatingAccumulator;
use crate::connection::{Connection, Emission};
use crate::formatting::{
    clamp_measurement, format_value_f64, format_value_i64, nanos_to_millis, Metric, MetricType,
};

/// A counter reporting signed deltas, with a local saturating mirror used
/// by [`reset`][CounterHandle::reset].
#[derive(Clone)]
pub struct CounterHandle {
    inner: Arc<CounterInner>,
}

struct CounterInner {
    fingerprint: String,
    connection: Arc<Connection>,
    accumulator: SaturatingAccumulator,
}

impl CounterHandle {
    pub(crate) fn new(fingerprint: String, connection: Arc<Connection>) -> Self {
        CounterHandle {
            inner: Arc::new(CounterInner {
                fingerprint,
                connection,
                accumulator: SaturatingAccumulator::new(),
            }),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    /// Adds `amount` to the local mirror and emits the raw delta.
    ///
    /// The mirror saturates at `i64::MAX`; the emitted delta is always the
    /// caller's `amount`, even after saturation.
    pub fn increment(&self, amount: i64) -> Emission {
        self.inner.accumulator.add(amount);
        self.emit_delta(format_value_i64(amount))
    }

    /// Zeroes the local mirror and emits the compensating delta, returning
    /// the server-side gauge to zero.
    pub fn reset(&self) -> Emission {
        let taken = self.inner.accumulator.take();
        // i128 because -i64::MIN is not representable.
        self.emit_delta((-(taken as i128)).to_string())
    }

    /// The current value of the local mirror.
    pub fn value(&self) -> i64 {
        self.inner.accumulator.get()
    }

    fn emit_delta(&self, value: String) -> Emission {
        self.inner.connection.emit(Metric::new(
            self.inner.fingerprint.clone(),
            value,
            MetricType::Counter,
        ))
    }

    pub(crate) fn is_same(&self, other: &CounterHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A gauge or histogram, chosen at creation time by the aggregate flag.
#[derive(Clone)]
pub struct RecorderHandle {
    inner: Arc<RecorderInner>,
}

struct RecorderInner {
    fingerprint: String,
    connection: Arc<Connection>,
    kind: MetricType,
}

impl RecorderHandle {
    pub(crate) fn new(fingerprint: String, connection: Arc<Connection>, aggregate: bool) -> Self {
        let kind = if aggregate {
            MetricType::Histogram
        } else {
            MetricType::Gauge
        };
        RecorderHandle {
            inner: Arc::new(RecorderInner {
                fingerprint,
                connection,
                kind,
            }),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    /// Emits one sample. Negative values are floored at zero.
    pub fn record(&self, value: f64) -> Emission {
        let value = clamp_measurement(value);
        self.inner.connection.emit(Metric::new(
            self.inner.fingerprint.clone(),
            format_value_f64(value),
            self.inner.kind,
        ))
    }

    pub(crate) fn is_same(&self, other: &RecorderHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A timer emitting durations as (fractional) milliseconds.
#[derive(Clone)]
pub struct TimerHandle {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    fingerprint: String,
    connection: Arc<Connection>,
}

impl TimerHandle {
    pub(crate) fn new(fingerprint: String, connection: Arc<Connection>) -> Self {
        TimerHandle {
            inner: Arc::new(TimerInner {
                fingerprint,
                connection,
            }),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    /// Emits a duration given in nanoseconds, converted to milliseconds.
    pub fn record_nanoseconds(&self, nanos: u64) -> Emission {
        self.emit_millis(nanos_to_millis(nanos))
    }

    /// Emits a duration given in seconds, converted to milliseconds.
    pub fn record_seconds(&self, seconds: f64) -> Emission {
        self.emit_millis(seconds * 1000.0)
    }

    /// Emits a [`Duration`], converted to milliseconds.
    pub fn record_duration(&self, duration: Duration) -> Emission {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.record_nanoseconds(nanos)
    }

    fn emit_millis(&self, millis: f64) -> Emission {
        let millis = clamp_measurement(millis);
        self.inner.connection.emit(Metric::new(
            self.inner.fingerprint.clone(),
            format_value_f64(millis),
            MetricType::Timer,
        ))
    }

    pub(crate) fn is_same(&self, other: &TimerHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
