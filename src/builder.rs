use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::client::StatsdClient;
use crate::common::{BuildError, Sanitizer};
use crate::connection::Connection;

/// Builder for creating a [`StatsdClient`].
pub struct StatsdBuilder {
    endpoint: Option<SocketAddr>,
    sanitizer: Option<Sanitizer>,
    global_dimensions: Option<IndexMap<String, String>>,
}

impl StatsdBuilder {
    /// Creates a new [`StatsdBuilder`].
    pub fn new() -> Self {
        Self {
            endpoint: None,
            sanitizer: None,
            global_dimensions: None,
        }
    }

    /// Sets the agent endpoint metrics are emitted to.
    ///
    /// Resolution happens eagerly, so an unresolvable host fails client
    /// construction rather than the first emission.
    ///
    /// ## Errors
    ///
    /// If the given endpoint cannot be resolved into a valid SocketAddr, an
    /// error variant will be returned describing the error.
    pub fn with_endpoint<T>(mut self, endpoint: T) -> Result<Self, BuildError>
    where
        T: ToSocketAddrs,
    {
        let endpoint = endpoint
            .to_socket_addrs()
            .map_err(|e| BuildError::InvalidEndpoint(e.to_string()))?
            .next() // just use the first address we resolve to
            .ok_or_else(|| {
                BuildError::InvalidEndpoint(
                    "to_socket_addrs returned an empty iterator".to_string(),
                )
            })?;

        self.endpoint = Some(endpoint);

        Ok(self)
    }

    /// Replaces the default sanitizer.
    ///
    /// The sanitizer is applied to every computed fingerprint before it is
    /// used as a registry key and as the wire name. The default replaces
    /// `:` with `_`.
    #[must_use]
    pub fn with_sanitizer<F>(mut self, sanitizer: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.sanitizer = Some(Arc::new(sanitizer));
        self
    }

    /// Adds a global dimension to this client.
    ///
    /// Global dimensions are appended to every fingerprint after the
    /// metric's own dimensions. If this method is called multiple times,
    /// the latest value for a given key will be used.
    #[must_use]
    pub fn add_global_dimension<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let dims = self.global_dimensions.get_or_insert_with(IndexMap::new);
        dims.insert(key.into(), value.into());
        self
    }

    /// Builds the client.
    ///
    /// When called from within a Tokio runtime, sends are spawned onto that
    /// runtime. Otherwise, a single-worker Tokio runtime is created on a
    /// background thread and owned by the client; [`StatsdClient::shutdown`]
    /// tears it down.
    ///
    /// ## Errors
    ///
    /// If no endpoint was configured, or the background runtime could not
    /// be created, an error variant will be returned describing the error.
    pub fn build(self) -> Result<StatsdClient, BuildError> {
        let endpoint = self.endpoint.ok_or(BuildError::MissingEndpoint)?;
        let connection = Arc::new(Connection::new(endpoint)?);
        let sanitizer = self
            .sanitizer
            .unwrap_or_else(|| Arc::new(crate::common::default_sanitizer));

        Ok(StatsdClient::new(
            connection,
            sanitizer,
            self.global_dimensions.unwrap_or_default(),
        ))
    }
}

impl Default for StatsdBuilder {
    fn default() -> Self {
        StatsdBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::StatsdBuilder;
    use crate::common::BuildError;

    #[test]
    fn build_without_endpoint_fails() {
        let err = StatsdBuilder::new().build().err();
        assert!(matches!(err, Some(BuildError::MissingEndpoint)));
    }

    #[test]
    fn unresolvable_host_fails_fast() {
        let err = StatsdBuilder::new()
            .with_endpoint("definitely-not-a-real-host.invalid:8125")
            .err();
        assert!(matches!(err, Some(BuildError::InvalidEndpoint(_))));
    }

    #[test]
    fn literal_endpoint_resolves() {
        let builder = StatsdBuilder::new().with_endpoint("127.0.0.1:8125").unwrap();
        assert!(builder.endpoint.is_some());
    }
}
