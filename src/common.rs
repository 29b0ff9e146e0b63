use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Pluggable function applied to every computed fingerprint before it is
/// used as a registry key and wire name.
///
/// The default sanitizer replaces `:` with `_`, since a colon would split
/// the name from the value in the wire format.
pub type Sanitizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub(crate) fn default_sanitizer(raw: &str) -> String {
    raw.replace(':', "_")
}

/// Errors that could occur while building a [`StatsdClient`][crate::StatsdClient].
#[derive(Debug, Error)]
pub enum BuildError {
    /// The endpoint could not be resolved to a socket address.
    #[error("endpoint cannot be resolved: {0}")]
    InvalidEndpoint(String),

    /// No endpoint was configured before `build` was called.
    #[error("no endpoint configured")]
    MissingEndpoint,

    /// The background runtime for socket I/O could not be created.
    #[error("failed to spawn background runtime: {0}")]
    FailedToCreateRuntime(String),
}

/// A failed bind/connect attempt.
///
/// Cloneable because a single attempt's outcome is shared by every send
/// queued behind it.
#[derive(Debug, Clone, Error)]
#[error("connect to {endpoint} failed: {source}")]
pub struct ConnectError {
    pub(crate) endpoint: std::net::SocketAddr,
    #[source]
    pub(crate) source: Arc<io::Error>,
}

impl ConnectError {
    /// The io error kind reported by the failed bind/connect.
    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

/// Errors surfaced through an [`Emission`][crate::Emission] when a metric
/// could not be handed to the transport.
///
/// Datagrams are never retried or queued for redelivery; a failed emission
/// is equivalent to UDP loss.
#[derive(Debug, Error)]
pub enum EmitError {
    /// The connect attempt this send was queued behind failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The datagram write failed and the bounded retry budget ran out.
    #[error("datagram send failed: {0}")]
    Send(#[source] Arc<io::Error>),

    /// The send task was torn down before it could complete.
    #[error("send task dropped during teardown")]
    Dropped,
}

/// Errors that could occur while tearing down a client.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The underlying transport failed to release cleanly.
    #[error("failed to release transport: {0}")]
    Transport(String),
}
