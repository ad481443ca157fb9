//! # Connection Lifecycle
//!
//! Shared by [`Client`](crate::Client) and [`Server`](crate::Server): owns
//! both channel sockets, the background thread, and the state machine
//!
//! ```text
//! Disconnected ──start──► Connecting ──ok──► Connected ──shutdown──► ShuttingDown ──► Disconnected
//!                              └──────err──────► Disconnected
//! ```
//!
//! `start` and `shutdown` serialize on a lifecycle lock. Shutdown closes the
//! sockets first, which unblocks the background thread's receive with
//! `TransportError::Closed`, and then joins it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use duplex_telemetry::metrics;
use duplex_transport::{Endpoint, Socket, SocketHandle, TransportError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::RetryPolicy;
use crate::{IpcError, Result};

/// Lifecycle state of a client or server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ShuttingDown => "shutting down",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Client,
    Server,
}

impl Role {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Role::Client => metrics::ROLE_CLIENT,
            Role::Server => metrics::ROLE_SERVER,
        }
    }

    fn already_running(self) -> IpcError {
        match self {
            Role::Client => IpcError::AlreadyConnected,
            Role::Server => IpcError::AlreadyStarted,
        }
    }

    fn not_running(self) -> IpcError {
        match self {
            Role::Client => IpcError::NotConnected,
            Role::Server => IpcError::NotStarted,
        }
    }
}

/// Which of the two sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    Broadcast,
    Request,
}

/// The two sockets of one instance.
#[derive(Debug, Default)]
pub(crate) struct Channels {
    pub(crate) broadcast: SocketHandle,
    pub(crate) request: SocketHandle,
}

impl Channels {
    fn get(&self, channel: Channel) -> &SocketHandle {
        match channel {
            Channel::Broadcast => &self.broadcast,
            Channel::Request => &self.request,
        }
    }

    fn close(&mut self) {
        self.broadcast.close();
        self.request.close();
    }
}

/// Flag the background loop polls between messages.
pub(crate) type RunFlag = Arc<AtomicBool>;

pub(crate) struct ConnectionManager {
    role: Role,
    state: Mutex<ConnectionState>,
    running: RunFlag,
    channels: Mutex<Channels>,
    worker: Mutex<Option<JoinHandle<()>>>,
    lifecycle: Mutex<()>,
}

impl ConnectionManager {
    pub(crate) fn new(role: Role) -> Self {
        Self {
            role,
            state: Mutex::new(ConnectionState::Disconnected),
            running: Arc::new(AtomicBool::new(false)),
            channels: Mutex::new(Channels::default()),
            worker: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        debug!(role = self.role.as_str(), from = %previous, to = %state, "State transition");
    }

    /// Establish both channels and run `work` on a dedicated thread fed by
    /// the `loop_channel` socket.
    ///
    /// On any failure the sockets opened so far are closed and the state
    /// returns to `Disconnected`.
    pub(crate) fn start<E, W>(&self, establish: E, loop_channel: Channel, work: W) -> Result<()>
    where
        E: FnOnce() -> Result<Channels>,
        W: FnOnce(Socket, RunFlag) + Send + 'static,
    {
        let _lifecycle = self.lifecycle.lock();
        if self.state() != ConnectionState::Disconnected {
            return Err(self.role.already_running());
        }
        self.set_state(ConnectionState::Connecting);

        match self.spawn_worker(establish, loop_channel, work) {
            Ok((channels, worker)) => {
                *self.channels.lock() = channels;
                *self.worker.lock() = Some(worker);
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    fn spawn_worker<E, W>(
        &self,
        establish: E,
        loop_channel: Channel,
        work: W,
    ) -> Result<(Channels, JoinHandle<()>)>
    where
        E: FnOnce() -> Result<Channels>,
        W: FnOnce(Socket, RunFlag) + Send + 'static,
    {
        let channels = establish()?;
        let socket = channels.get(loop_channel).socket()?.clone();

        self.running.store(true, Ordering::Release);
        let running = self.running.clone();
        let worker = thread::Builder::new()
            .name(format!("duplex-{}-loop", self.role.as_str()))
            .spawn(move || work(socket, running))?;

        Ok((channels, worker))
    }

    /// Stop the background thread and close both sockets. Idempotent.
    pub(crate) fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock();
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.set_state(ConnectionState::ShuttingDown);

        self.channels.lock().close();

        if let Some(worker) = self.worker.lock().take() {
            if worker.thread().id() == thread::current().id() {
                // Called from a handler on the loop thread; it exits on its own.
                debug!(role = self.role.as_str(), "Shutdown requested from background thread");
            } else if worker.join().is_err() {
                error!(role = self.role.as_str(), "Background thread panicked");
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!(role = self.role.as_str(), "Shut down");
    }

    /// Clone of the socket for `channel`, if running.
    pub(crate) fn socket(&self, channel: Channel) -> Result<Socket> {
        if !self.is_running() {
            return Err(self.role.not_running());
        }
        self.channels
            .lock()
            .get(channel)
            .socket()
            .cloned()
            .map_err(|_| self.role.not_running())
    }
}

/// Broadcast and request endpoints for a base URL and broadcast port.
pub(crate) fn endpoints(url: &str, port: u16) -> Result<(Endpoint, Endpoint)> {
    let request_port = crate::config::request_port(port)?;
    let resolve = |port| {
        Endpoint::from_base(url, port)
            .map_err(|e| IpcError::InvalidEndpoint(format!("{url}:{port}: {e}")))
    };
    Ok((resolve(port)?, resolve(request_port)?))
}

/// Dial both channels, retrying per `policy` until one attempt connects both.
pub(crate) fn dial_with_retry(
    channels: &Channels,
    broadcast: &Endpoint,
    request: &Endpoint,
    policy: &RetryPolicy,
) -> Result<()> {
    let broadcast_socket = channels.broadcast.socket()?;
    let request_socket = channels.request.socket()?;
    let broadcast_url = broadcast.to_string();
    let request_url = request.to_string();

    let mut broadcast_error: Option<TransportError> = None;
    let mut request_error: Option<TransportError> = None;

    for attempt in 1..=policy.max_retries {
        debug!(attempt, max = policy.max_retries, endpoint = %broadcast_url, "Connection attempt");

        let broadcast_result = broadcast_socket.dial(&broadcast_url);
        let request_result = request_socket.dial(&request_url);

        match (broadcast_result, request_result) {
            (Ok(()), Ok(())) => {
                metrics::record_connect_attempt(true);
                info!(attempt, broadcast = %broadcast_url, request = %request_url, "Connected");
                return Ok(());
            }
            (b, r) => {
                metrics::record_connect_attempt(false);
                if let Err(e) = b {
                    warn!(attempt, endpoint = %broadcast_url, error = %e, "Broadcast dial failed");
                    broadcast_error = Some(e);
                }
                if let Err(e) = r {
                    warn!(attempt, endpoint = %request_url, error = %e, "Request dial failed");
                    request_error = Some(e);
                }
            }
        }

        if attempt < policy.max_retries {
            thread::sleep(policy.retry_delay);
        }
    }

    let describe = |error: Option<TransportError>| {
        error.map_or_else(|| "none".to_string(), |e| e.to_string())
    };
    Err(IpcError::ConnectFailed {
        attempts: policy.max_retries,
        broadcast_endpoint: broadcast_url,
        broadcast_error: describe(broadcast_error),
        request_endpoint: request_url,
        request_error: describe(request_error),
    })
}
