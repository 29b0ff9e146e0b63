//! Fingerprint computation and wire-line encoding.
//!
//! The wire format is one metric per datagram:
//!
//! ```text
//! <fingerprint>:<value>|<type>
//! ```
//!
//! with `<type>` one of `g` (gauge), `c` (counter), `ms` (timer), `h`
//! (histogram), `m` (meter).

use indexmap::IndexMap;

use crate::common::Sanitizer;

/// The statsd type tag carried after the `|` separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Gauge,
    Counter,
    Timer,
    Histogram,
    Meter,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "g",
            MetricType::Counter => "c",
            MetricType::Timer => "ms",
            MetricType::Histogram => "h",
            MetricType::Meter => "m",
        }
    }
}

/// One wire observation: a fingerprint, a pre-formatted value, and a type
/// tag. Constructed fresh per emission and not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    name: String,
    value: String,
    kind: MetricType,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: impl Into<String>, kind: MetricType) -> Self {
        Metric {
            name: name.into(),
            value: value.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the datagram payload.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.name.len() + self.value.len() + 4);
        out.push_str(&self.name);
        out.push(':');
        out.push_str(&self.value);
        out.push('|');
        out.push_str(self.kind.as_str());
        out
    }
}

/// Computes the identity of a metric from its label and caller-ordered
/// dimensions, then applies the sanitizer.
///
/// Two calls with the same label and dimensions in the same order yield the
/// same fingerprint; a different order yields a different fingerprint.
/// Global dimensions are appended after the caller's own, in insertion
/// order.
pub fn fingerprint(
    label: &str,
    dimensions: &[(&str, &str)],
    global_dimensions: &IndexMap<String, String>,
    sanitizer: &Sanitizer,
) -> String {
    let mut raw = String::with_capacity(label.len());
    raw.push_str(label);
    for (key, value) in dimensions {
        raw.push('.');
        raw.push_str(key);
        raw.push('.');
        raw.push_str(value);
    }
    for (key, value) in global_dimensions {
        raw.push('.');
        raw.push_str(key);
        raw.push('.');
        raw.push_str(value);
    }
    sanitizer(&raw)
}

/// Formats a signed integer value. Counter deltas may be negative or zero.
pub fn format_value_i64(value: i64) -> String {
    value.to_string()
}

/// Formats a double, rendering integral values without a decimal point
/// (`3.0` becomes `3`, `3.5` stays `3.5`).
pub fn format_value_f64(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < (i64::MAX as f64) {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

/// Floors a measurement at zero. Negative, NaN, and non-finite
/// gauge/histogram/timer samples are not meaningful and are clamped, not
/// rejected.
pub fn clamp_measurement(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Converts a nanosecond duration to fractional milliseconds.
pub fn nanos_to_millis(nanos: u64) -> f64 {
    nanos as f64 / 1_000_000.0
}
