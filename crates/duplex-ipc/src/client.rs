//! # Client
//!
//! Subscribes to a server's broadcast channel and sends synchronous
//! requests on its request channel.
//!
//! ```rust,ignore
//! let client = Client::new();
//! client.on("tick", |data| println!("tick {data}"));
//! client.connect("tcp://127.0.0.1", 5555, 5, 1000)?;
//!
//! let reply = client.emit("greet", json!({"name": "ada"}))?;
//! ```
//!
//! Broadcast handlers run on the client's receive thread, one at a time in
//! publication order. `emit` blocks the calling thread; concurrent callers
//! queue on the request lock so only one request is ever in flight.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use duplex_crypto::{CompromiseHandler, EncryptionStrategy};
use duplex_telemetry::metrics::{self, CHANNEL_BROADCAST, CHANNEL_REQUEST, ROLE_CLIENT};
use duplex_transport::{Socket, SocketHandle, SocketKind, TransportError};
use duplex_types::envelope::decode_reply;
use duplex_types::Envelope;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::codec::Codec;
use crate::config::{IpcConfig, RetryPolicy};
use crate::connection::{
    dial_with_retry, endpoints, Channel, Channels, ConnectionManager, ConnectionState, Role,
    RunFlag,
};
use crate::router::{EventHandler, EventRouter};
use crate::{IpcError, Result};

/// Broadcast subscriber plus request sender.
pub struct Client {
    connection: ConnectionManager,
    handlers: Arc<EventRouter<EventHandler>>,
    codec: Codec,
    request_lock: Mutex<()>,
}

impl Client {
    /// A disconnected client with no handlers and no encryption.
    pub fn new() -> Self {
        Self {
            connection: ConnectionManager::new(Role::Client),
            handlers: Arc::new(EventRouter::new()),
            codec: Codec::new(ROLE_CLIENT),
            request_lock: Mutex::new(()),
        }
    }

    /// Connect to a server broadcasting on `port` and replying on `port + 1`.
    ///
    /// Makes up to `max_retries` attempts, sleeping `retry_delay_ms` between
    /// them. Each attempt dials both channels.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` if called while connected
    /// - `InvalidEndpoint` for an unusable url or port
    /// - `ConnectFailed` once every attempt has failed
    pub fn connect(&self, url: &str, port: u16, max_retries: u32, retry_delay_ms: u64) -> Result<()> {
        self.connect_with_policy(url, port, &RetryPolicy::new(max_retries, retry_delay_ms))
    }

    /// Connect using `config`, installing its encryption key if one is set.
    /// The new strategy replaces any earlier one along with its compromise
    /// callback; register the callback afterwards.
    ///
    /// # Errors
    ///
    /// As [`connect`](Self::connect), plus `Config` for an invalid key.
    pub fn connect_with(&self, config: &IpcConfig) -> Result<()> {
        if let Some(strategy) = config.encryption()? {
            self.set_encryption_strategy(strategy);
        }
        self.connect_with_policy(&config.url, config.port, &config.retry)
    }

    fn connect_with_policy(&self, url: &str, port: u16, policy: &RetryPolicy) -> Result<()> {
        if self.is_connected() {
            return Err(IpcError::AlreadyConnected);
        }
        let (broadcast, request) = endpoints(url, port)?;

        let handlers = self.handlers.clone();
        let codec = self.codec.clone();
        let policy = *policy;

        self.connection.start(
            move || {
                let channels = Channels {
                    broadcast: SocketHandle::open(SocketKind::Sub)?,
                    request: SocketHandle::open(SocketKind::Req)?,
                };
                // Everything, from the first frame on.
                channels.broadcast.socket()?.subscribe(b"")?;
                dial_with_retry(&channels, &broadcast, &request, &policy)?;
                Ok(channels)
            },
            Channel::Broadcast,
            move |socket, running| receive_loop(&socket, &running, &handlers, &codec),
        )?;

        info!(url, port, handlers = self.handlers.len(), "Client connected");
        Ok(())
    }

    /// Bind `handler` to broadcast `event`, replacing any earlier handler.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.handlers.insert(event, Arc::new(handler));
    }

    /// Send a request and block for the server's reply.
    ///
    /// The reply is returned as parsed JSON: whatever the server's handler
    /// returned, or a `__response__` / `__error__` object.
    ///
    /// # Errors
    ///
    /// `NotConnected` without doing any I/O when not connected; otherwise
    /// the transport, protocol or security failure of the exchange.
    pub fn emit(&self, event: &str, data: Value) -> Result<Value> {
        if !self.is_connected() {
            return Err(IpcError::NotConnected);
        }

        let _in_flight = self.request_lock.lock();
        let socket = self.connection.socket(Channel::Request)?;

        let payload = self.codec.seal(&Envelope::new(event, data))?;
        socket.send(&payload)?;
        metrics::record_sent(ROLE_CLIENT, CHANNEL_REQUEST);
        debug!(event, bytes = payload.len(), "Request sent");

        let reply = socket.recv()?;
        metrics::record_received(ROLE_CLIENT, CHANNEL_REQUEST);

        let plaintext = self.codec.open(reply)?;
        Ok(decode_reply(&plaintext)?)
    }

    /// Stop the receive thread and close both sockets. Safe to call in any
    /// state, any number of times.
    pub fn shutdown(&self) {
        self.connection.shutdown();
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_running()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Encrypt outgoing and decrypt incoming payloads with `strategy`.
    ///
    /// Takes effect for the next message on either channel.
    pub fn set_encryption_strategy(&self, strategy: Arc<dyn EncryptionStrategy>) {
        info!(strategy = strategy.name(), "Client encryption strategy set");
        self.codec.set_strategy(strategy);
    }

    /// Forward `callback` to the current encryption strategy. Does nothing
    /// if no strategy is set yet.
    pub fn set_on_compromised_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handler: CompromiseHandler = Arc::new(callback);
        if !self.codec.set_on_compromised(handler) {
            warn!("No encryption strategy set; compromise callback ignored");
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive_loop(
    socket: &Socket,
    running: &RunFlag,
    handlers: &EventRouter<EventHandler>,
    codec: &Codec,
) {
    debug!("Client receive loop started");

    while running.load(std::sync::atomic::Ordering::Acquire) {
        let message = match socket.recv() {
            Ok(message) => message,
            Err(TransportError::Closed) => break,
            Err(e) => {
                warn!(error = %e, "Broadcast receive failed");
                continue;
            }
        };
        metrics::record_received(ROLE_CLIENT, CHANNEL_BROADCAST);

        if let Err(e) = dispatch(handlers, codec, message) {
            warn!(error = %e, "Dropping broadcast message");
        }
    }

    debug!("Client receive loop stopped");
}

fn dispatch(handlers: &EventRouter<EventHandler>, codec: &Codec, message: Vec<u8>) -> Result<()> {
    let envelope = Envelope::decode(&codec.open(message)?)?;

    let Some(handler) = handlers.get(&envelope.event) else {
        warn!(event = %envelope.event, "Unknown event");
        return Ok(());
    };

    if panic::catch_unwind(AssertUnwindSafe(|| handler(&envelope.data))).is_err() {
        metrics::HANDLER_ERRORS.inc();
        error!(event = %envelope.event, "Event handler panicked");
    }
    Ok(())
}
