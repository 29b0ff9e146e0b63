use std::sync::Arc;

use indexmap::IndexMap;

use crate::builder::StatsdBuilder;
use crate::common::{Sanitizer, ShutdownError};
use crate::connection::{Connection, Emission};
use crate::formatting::{fingerprint, Metric};
use crate::handles::{CounterHandle, RecorderHandle, TimerHandle};
use crate::registry::Registry;

/// The client facade: creates and destroys metric handles, and owns the
/// shared connection they emit through.
///
/// Handle creation is deduplicated per fingerprint, independently for each
/// metric kind. The client is safe to share across threads; prefer passing
/// it (or its handles) explicitly over stashing it in a global.
pub struct StatsdClient {
    connection: Arc<Connection>,
    registry: Registry,
    sanitizer: Sanitizer,
    global_dimensions: IndexMap<String, String>,
}

impl StatsdClient {
    /// Creates a [`StatsdBuilder`] for configuring a client.
    pub fn builder() -> StatsdBuilder {
        StatsdBuilder::new()
    }

    pub(crate) fn new(
        connection: Arc<Connection>,
        sanitizer: Sanitizer,
        global_dimensions: IndexMap<String, String>,
    ) -> Self {
        StatsdClient {
            connection,
            registry: Registry::new(),
            sanitizer,
            global_dimensions,
        }
    }

    /// Returns the counter for this label and dimension list, creating it
    /// on first use.
    pub fn counter(&self, label: &str, dimensions: &[(&str, &str)]) -> CounterHandle {
        let fp = self.fingerprint(label, dimensions);
        self.registry.counter(fp, &self.connection)
    }

    /// Returns the recorder for this label and dimension list, creating it
    /// on first use.
    ///
    /// `aggregate` selects the wire type: `true` emits histogram samples
    /// (`h`), `false` emits gauge values (`g`). The flag is fixed at
    /// creation; later calls reuse the live handle as-is.
    pub fn recorder(
        &self,
        label: &str,
        dimensions: &[(&str, &str)],
        aggregate: bool,
    ) -> RecorderHandle {
        let fp = self.fingerprint(label, dimensions);
        self.registry.recorder(fp, &self.connection, aggregate)
    }

    /// Returns the timer for this label and dimension list, creating it on
    /// first use.
    pub fn timer(&self, label: &str, dimensions: &[(&str, &str)]) -> TimerHandle {
        let fp = self.fingerprint(label, dimensions);
        self.registry.timer(fp, &self.connection)
    }

    /// Removes the counter from the registry; the next `counter` call for
    /// the same identity creates a fresh handle with a zeroed accumulator.
    /// Handles this registry does not own are ignored.
    pub fn destroy_counter(&self, handle: &CounterHandle) {
        self.registry.destroy_counter(handle);
    }

    pub fn destroy_recorder(&self, handle: &RecorderHandle) {
        self.registry.destroy_recorder(handle);
    }

    pub fn destroy_timer(&self, handle: &TimerHandle) {
        self.registry.destroy_timer(handle);
    }

    /// Emits a raw, caller-constructed wire unit. This bypasses the
    /// registry; the metric name is used as given.
    pub fn emit(&self, metric: Metric) -> Emission {
        self.connection.emit(metric)
    }

    /// Releases the socket and any client-owned runtime.
    ///
    /// Idempotent; the client must not be used for emission afterwards.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        self.connection.shutdown()
    }

    fn fingerprint(&self, label: &str, dimensions: &[(&str, &str)]) -> String {
        fingerprint(label, dimensions, &self.global_dimensions, &self.sanitizer)
    }
}
