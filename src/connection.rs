//! The UDP connection state machine.
//!
//! The socket is bound lazily on the first emission and reused afterwards.
//! Only the first caller to observe `Disconnected` performs the bind; every
//! send issued while the bind is in flight chains onto the shared pending
//! future in arrival order, so a cold start never spawns more than one
//! connect attempt and never reorders a single caller's sends.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::net::UdpSocket;
use tokio::runtime::{self, Runtime};
use tokio::task::JoinHandle;
use tracing::error;

use crate::common::{BuildError, ConnectError, EmitError, ShutdownError};
use crate::formatting::Metric;

/// Re-queues after a dead channel is detected at write time. Two is enough
/// for one full disconnect/reconnect cycle.
const MAX_REQUEUES: u8 = 2;

/// Outcome shared by every send queued behind one connect attempt.
///
/// Cloneable so a single attempt can resolve for all of its waiters. Connect
/// failures fail the whole batch; a write failure is private to the send
/// that hit it.
#[derive(Debug, Clone)]
enum ChainError {
    Connect(ConnectError),
    Send(Arc<io::Error>),
}

impl From<ChainError> for EmitError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Connect(e) => EmitError::Connect(e),
            ChainError::Send(e) => EmitError::Send(e),
        }
    }
}

type ChainFuture = Shared<BoxFuture<'static, Result<(), ChainError>>>;

enum State {
    Disconnected,
    /// Holds the combined "connect, then all sends queued so far" future.
    Connecting(ChainFuture),
    Connected(Arc<UdpSocket>),
    Shutdown,
}

/// The process-wide outbound channel. One per client; the socket is owned
/// exclusively and never handed out.
pub(crate) struct Connection {
    endpoint: SocketAddr,
    state: Arc<Mutex<State>>,
    runtime: runtime::Handle,
    /// Present only when the client created its own runtime; `take`n once
    /// at shutdown.
    owned_runtime: Mutex<Option<Runtime>>,
}

impl Connection {
    /// Resolves the execution context for socket I/O: an ambient tokio
    /// runtime when one exists, otherwise a dedicated single-worker runtime
    /// on a background thread.
    pub(crate) fn new(endpoint: SocketAddr) -> Result<Self, BuildError> {
        let (handle, owned) = match runtime::Handle::try_current() {
            Ok(handle) => (handle, None),
            Err(_) => {
                let rt = runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("statsd-udp-emitter")
                    .enable_all()
                    .build()
                    .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;
                let handle = rt.handle().clone();
                (handle, Some(rt))
            }
        };

        Ok(Connection {
            endpoint,
            state: Arc::new(Mutex::new(State::Disconnected)),
            runtime: handle,
            owned_runtime: Mutex::new(owned),
        })
    }

    /// Hands a metric to the transport without blocking the caller.
    ///
    /// The state transition happens synchronously under the lock, so sends
    /// issued back-to-back by one caller during a cold start keep their
    /// issue order. The returned [`Emission`] resolves once the datagram
    /// has been written (or dropped).
    pub(crate) fn emit(self: &Arc<Self>, metric: Metric) -> Emission {
        let payload: Arc<str> = metric.encode().into();
        let fut = self.queue(payload, MAX_REQUEUES);
        Emission {
            inner: self.runtime.spawn(fut),
        }
    }

    /// One state re-evaluation. Returns the future that completes the send;
    /// `requeues_left` bounds how many times a dead channel may trigger a
    /// fresh cycle.
    fn queue(
        self: &Arc<Self>,
        payload: Arc<str>,
        requeues_left: u8,
    ) -> BoxFuture<'static, Result<(), EmitError>> {
        let mut guard = self.state.lock().unwrap();
        match &*guard {
            State::Shutdown => panic!("statsd client used after shutdown"),
            State::Connected(socket) => {
                let socket = Arc::clone(socket);
                drop(guard);
                let conn = Arc::clone(self);
                async move {
                    match socket.send(payload.as_bytes()).await {
                        Ok(_) => Ok(()),
                        Err(err) if requeues_left > 0 => {
                            error!(endpoint = %conn.endpoint, error = %err,
                                "channel inactive at send time, rebinding");
                            conn.demote(&socket);
                            conn.queue(payload, requeues_left - 1).await
                        }
                        Err(err) => Err(EmitError::Send(Arc::new(err))),
                    }
                }
                .boxed()
            }
            State::Connecting(pending) => {
                // Chain behind the outstanding connect and everything
                // already queued, preserving arrival order.
                let prior = pending.clone();
                let state = Arc::clone(&self.state);
                let line = Arc::clone(&payload);
                let combined = async move {
                    match prior.await {
                        Err(ChainError::Connect(err)) => return Err(ChainError::Connect(err)),
                        Ok(()) | Err(ChainError::Send(_)) => {}
                    }
                    write_now(state, line).await
                }
                .boxed()
                .shared();
                *guard = State::Connecting(combined.clone());
                drop(guard);
                async move { combined.await.map_err(EmitError::from) }.boxed()
            }
            State::Disconnected => {
                // This caller owns the bind attempt; its own send forms the
                // head of the queue behind it.
                let state = Arc::clone(&self.state);
                let endpoint = self.endpoint;
                let line = Arc::clone(&payload);
                let head = async move {
                    establish(Arc::clone(&state), endpoint)
                        .await
                        .map_err(ChainError::Connect)?;
                    write_now(state, line).await
                }
                .boxed()
                .shared();
                *guard = State::Connecting(head.clone());
                drop(guard);
                async move { head.await.map_err(EmitError::from) }.boxed()
            }
        }
    }

    /// Drops a channel found inactive, unless the state already moved on.
    fn demote(&self, dead: &Arc<UdpSocket>) {
        let mut guard = self.state.lock().unwrap();
        if let State::Connected(current) = &*guard {
            if Arc::ptr_eq(current, dead) {
                *guard = State::Disconnected;
            }
        }
    }

    /// Releases the channel and, when the runtime was created by this
    /// client, tears it down. Idempotent: repeat calls are a no-op success.
    pub(crate) fn shutdown(&self) -> Result<(), ShutdownError> {
        *self.state.lock().unwrap() = State::Shutdown;
        if let Some(rt) = self.owned_runtime.lock().unwrap().take() {
            rt.shutdown_background();
        }
        Ok(())
    }
}

/// Binds a local socket of the endpoint's family and connects it, then
/// publishes the outcome to the state under the lock.
///
/// The state must still be `Connecting` on success: nothing else is allowed
/// to leave that state while an attempt is in flight.
async fn establish(state: Arc<Mutex<State>>, endpoint: SocketAddr) -> Result<(), ConnectError> {
    let bind_addr: SocketAddr = match endpoint {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let bound = async {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(endpoint).await?;
        Ok::<_, io::Error>(socket)
    }
    .await;

    let mut guard = state.lock().unwrap();
    match bound {
        Ok(socket) => match &*guard {
            State::Connecting(_) => {
                *guard = State::Connected(Arc::new(socket));
                Ok(())
            }
            State::Shutdown => Err(ConnectError {
                endpoint,
                source: Arc::new(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "client shut down during connect",
                )),
            }),
            State::Disconnected | State::Connected(_) => {
                panic!("connection state mutated during an in-flight connect")
            }
        },
        Err(err) => {
            error!(%endpoint, error = %err, "bind/connect failed");
            if matches!(&*guard, State::Connecting(_)) {
                *guard = State::Disconnected;
            }
            Err(ConnectError {
                endpoint,
                source: Arc::new(err),
            })
        }
    }
}

/// A queued send running after its connect attempt resolved. Single-shot:
/// if the channel died in between, the metric is dropped like any lost
/// datagram.
async fn write_now(state: Arc<Mutex<State>>, payload: Arc<str>) -> Result<(), ChainError> {
    let socket = {
        let guard = state.lock().unwrap();
        match &*guard {
            State::Connected(socket) => Arc::clone(socket),
            _ => {
                return Err(ChainError::Send(Arc::new(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "channel not connected",
                ))))
            }
        }
    };
    match socket.send(payload.as_bytes()).await {
        Ok(_) => Ok(()),
        Err(err) => {
            let mut guard = state.lock().unwrap();
            if let State::Connected(current) = &*guard {
                if Arc::ptr_eq(current, &socket) {
                    *guard = State::Disconnected;
                }
            }
            Err(ChainError::Send(Arc::new(err)))
        }
    }
}

/// The asynchronous result of one emission.
///
/// Awaiting it reports whether the datagram was handed to the socket;
/// dropping it detaches the send, which keeps running in the background.
pub struct Emission {
    inner: JoinHandle<Result<(), EmitError>>,
}

impl Future for Emission {
    type Output = Result<(), EmitError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(EmitError::Dropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatting::MetricType;
    use std::time::Duration;

    fn listener() -> (std::net::UdpSocket, SocketAddr) {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn recv_line(socket: &std::net::UdpSocket) -> String {
        let mut buf = [0u8; 1500];
        let n = socket.recv(&mut buf).unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn cold_emit_binds_once_and_delivers() {
        let (listener, addr) = listener();
        let conn = Arc::new(Connection::new(addr).unwrap());

        let metric = Metric::new("x", "500", MetricType::Counter);
        conn.emit(metric).await.unwrap();

        assert_eq!(recv_line(&listener), "x:500|c");
    }

    #[tokio::test]
    async fn burst_during_connect_preserves_issue_order() {
        let (listener, addr) = listener();
        let conn = Arc::new(Connection::new(addr).unwrap());

        // All five observe either Disconnected or Connecting; the chain
        // must deliver them in issue order.
        let emissions: Vec<_> = (0..5)
            .map(|i| conn.emit(Metric::new("seq", i.to_string(), MetricType::Counter)))
            .collect();
        for emission in emissions {
            emission.await.unwrap();
        }

        for i in 0..5 {
            assert_eq!(recv_line(&listener), format!("seq:{}|c", i));
        }
    }

    #[tokio::test]
    async fn reuses_the_bound_channel() {
        let (listener, addr) = listener();
        let conn = Arc::new(Connection::new(addr).unwrap());

        conn.emit(Metric::new("a", "1", MetricType::Counter))
            .await
            .unwrap();
        conn.emit(Metric::new("b", "2", MetricType::Counter))
            .await
            .unwrap();

        // Both datagrams must come from the same local port.
        let mut buf = [0u8; 64];
        let (n, first_peer) = listener.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"a:1|c");
        let (n, second_peer) = listener.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"b:2|c");
        assert_eq!(first_peer, second_peer);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (_listener, addr) = listener();
        let conn = Arc::new(Connection::new(addr).unwrap());
        conn.emit(Metric::new("x", "1", MetricType::Counter))
            .await
            .unwrap();
        assert!(conn.shutdown().is_ok());
        assert!(conn.shutdown().is_ok());
    }

    #[tokio::test]
    #[should_panic(expected = "used after shutdown")]
    async fn emitting_after_shutdown_is_fatal() {
        let (_listener, addr) = listener();
        let conn = Arc::new(Connection::new(addr).unwrap());
        conn.shutdown().unwrap();
        let _ = conn.emit(Metric::new("x", "1", MetricType::Counter));
    }
}
