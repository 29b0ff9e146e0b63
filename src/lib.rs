//! A handle-based statsd client that emits metrics over UDP.
//!
//! ## Basics
//!
//! `statsd-udp-emitter` hands applications per-metric handles (counters,
//! gauge/histogram recorders, timers) and serializes every observation into
//! the line-oriented statsd wire format, one datagram per observation.
//!
//! ## High-level features
//!
//! - lazily-established UDP channel, bound once and reused; sends issued
//!   while the bind is in flight queue behind it in arrival order
//! - deduplicated handle registry keyed by a name+dimension fingerprint
//! - lock-free saturating counter accumulation, so `reset` can emit an
//!   exact compensating delta
//! - pluggable name sanitizer and configurable global dimensions
//!
//! ## Behavior
//!
//! This client makes some explicit trade-offs to accomplish its task:
//!
//! - No aggregation, batching, or sampling: every observation is one datagram
//! - No delivery guarantee: failed sends are dropped, per UDP semantics
//! - A failed bind fails every send queued behind it; the next emission
//!   starts a fresh attempt, with no backoff
//! - Handle methods never block; they return an [`Emission`] future that
//!   callers may await or drop
//!
//! ## Usage
//!
//! ```ignore
//! let client = StatsdClient::builder()
//!     .with_endpoint("127.0.0.1:8125")?
//!     .add_global_dimension("env", "prod")
//!     .build()?;
//!
//! let requests = client.counter("requests", &[("region", "eu")]);
//! requests.increment(1);
//!
//! let latency = client.timer("latency", &[]);
//! latency.record_nanoseconds(1_234_567);
//!
//! client.shutdown()?;
//! ```

mod common;
pub use self::common::{BuildError, ConnectError, EmitError, Sanitizer, ShutdownError};

pub mod formatting;
pub use self::formatting::{Metric, MetricType};

mod accumulator;
mod connection;
pub use self::connection::Emission;

mod handles;
pub use self::handles::{CounterHandle, RecorderHandle, TimerHandle};

mod registry;

mod builder;
pub use self::builder::StatsdBuilder;

mod client;
pub use self::client::StatsdClient;
