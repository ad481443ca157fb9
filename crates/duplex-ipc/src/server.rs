//! # Server
//!
//! Publishes events on the broadcast channel and answers requests on the
//! request channel.
//!
//! Every request gets exactly one reply:
//!
//! | Outcome | Reply |
//! |---------|-------|
//! | Handler returned `Ok(Some(v))` | `v`, verbatim |
//! | Handler returned `Ok(None)` | `{"event":"__response__","data":{"status":"success"}}` |
//! | Handler returned `Err` or panicked | `{"event":"__response__","data":{"status":"error","message":...}}` |
//! | Undecryptable or malformed request | same as a failed handler |
//! | No handler bound | `{"event":"__error__","data":{"message":"Server has no handler bound for event: ..."}}` |

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use duplex_crypto::{CompromiseHandler, EncryptionStrategy};
use duplex_telemetry::metrics::{self, CHANNEL_BROADCAST, CHANNEL_REQUEST, ROLE_SERVER};
use duplex_transport::{Socket, SocketHandle, SocketKind, TransportError};
use duplex_types::envelope::encode_reply;
use duplex_types::{response, Envelope};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::codec::Codec;
use crate::config::IpcConfig;
use crate::connection::{
    endpoints, Channel, Channels, ConnectionManager, ConnectionState, Role, RunFlag,
};
use crate::router::{EventRouter, HandlerResult, RequestHandler};
use crate::{IpcError, Result};

/// Broadcast publisher plus request replier.
pub struct Server {
    connection: ConnectionManager,
    handlers: Arc<EventRouter<RequestHandler>>,
    codec: Codec,
}

impl Server {
    pub fn new() -> Self {
        Self {
            connection: ConnectionManager::new(Role::Server),
            handlers: Arc::new(EventRouter::new()),
            codec: Codec::new(ROLE_SERVER),
        }
    }

    /// Listen for subscribers on `port` and for requests on `port + 1`.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted`, `InvalidEndpoint`, or the transport's listen failure
    /// (for example `AddressInUse`).
    pub fn serve(&self, url: &str, port: u16) -> Result<()> {
        if self.is_started() {
            return Err(IpcError::AlreadyStarted);
        }
        let (broadcast, request) = endpoints(url, port)?;

        let handlers = self.handlers.clone();
        let codec = self.codec.clone();

        self.connection.start(
            move || {
                let channels = Channels {
                    broadcast: SocketHandle::open(SocketKind::Pub)?,
                    request: SocketHandle::open(SocketKind::Rep)?,
                };
                channels.broadcast.socket()?.listen(&broadcast.to_string())?;
                channels.request.socket()?.listen(&request.to_string())?;
                Ok(channels)
            },
            Channel::Request,
            move |socket, running| request_loop(&socket, &running, &handlers, &codec),
        )?;

        info!(url, port, handlers = self.handlers.len(), "Server started");
        if self.handlers.is_empty() {
            debug!("Server started with no request handlers bound yet");
        }
        Ok(())
    }

    /// Serve using `config`, installing its encryption key if one is set.
    /// The new strategy replaces any earlier one along with its compromise
    /// callback; register the callback afterwards.
    ///
    /// # Errors
    ///
    /// As [`serve`](Self::serve), plus `Config` for an invalid key.
    pub fn serve_with(&self, config: &IpcConfig) -> Result<()> {
        if let Some(strategy) = config.encryption()? {
            self.set_encryption_strategy(strategy);
        }
        self.serve(&config.url, config.port)
    }

    /// Bind `handler` to request `event`, replacing any earlier handler.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.insert(event, Arc::new(handler));
    }

    /// Publish an event to every connected subscriber. Subscribers that
    /// connect later do not see it.
    ///
    /// # Errors
    ///
    /// `NotStarted`, or an encoding, encryption or transport failure.
    pub fn emit(&self, event: &str, data: Value) -> Result<()> {
        if !self.is_started() {
            return Err(IpcError::NotStarted);
        }
        let socket = self.connection.socket(Channel::Broadcast)?;

        let payload = self.codec.seal(&Envelope::new(event, data))?;
        socket.send(&payload)?;
        metrics::record_sent(ROLE_SERVER, CHANNEL_BROADCAST);
        debug!(event, subscribers = socket.peer_count(), "Event published");
        Ok(())
    }

    /// Subscribers currently connected to the broadcast channel.
    pub fn subscriber_count(&self) -> usize {
        self.connection
            .socket(Channel::Broadcast)
            .map(|socket| socket.peer_count())
            .unwrap_or(0)
    }

    /// Turn one raw request into the raw reply to send back.
    ///
    /// Never fails: every problem becomes an error reply.
    pub fn handle_request(&self, request: Vec<u8>) -> Vec<u8> {
        respond(&self.handlers, &self.codec, request)
    }

    /// Stop the request thread and close both sockets. Safe to call in any
    /// state, any number of times.
    pub fn shutdown(&self) {
        self.connection.shutdown();
    }

    pub fn is_started(&self) -> bool {
        self.connection.is_running()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Encrypt outgoing and decrypt incoming payloads with `strategy`.
    pub fn set_encryption_strategy(&self, strategy: Arc<dyn EncryptionStrategy>) {
        info!(strategy = strategy.name(), "Server encryption strategy set");
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

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn request_loop(
    socket: &Socket,
    running: &RunFlag,
    handlers: &EventRouter<RequestHandler>,
    codec: &Codec,
) {
    debug!("Server request loop started");

    while running.load(Ordering::Acquire) {
        let request = match socket.recv() {
            Ok(request) => request,
            Err(TransportError::Closed) => break,
            Err(e) => {
                warn!(error = %e, "Request receive failed");
                continue;
            }
        };
        metrics::record_received(ROLE_SERVER, CHANNEL_REQUEST);

        let reply = respond(handlers, codec, request);
        match socket.send(&reply) {
            Ok(()) => metrics::record_sent(ROLE_SERVER, CHANNEL_REQUEST),
            Err(TransportError::Closed) => break,
            Err(e) => error!(error = %e, "Failed to send reply"),
        }
    }

    debug!("Server request loop stopped");
}

fn respond(handlers: &EventRouter<RequestHandler>, codec: &Codec, request: Vec<u8>) -> Vec<u8> {
    let reply = route(handlers, codec, request).unwrap_or_else(|e| {
        warn!(error = %e, "Request failed");
        response::failure(&e.reply_message())
    });

    let body = encode_reply(&reply).unwrap_or_else(|e| {
        error!(error = %e, "Failed to encode reply");
        response::failure(&e.to_string()).to_string().into_bytes()
    });

    match codec.seal_bytes(body.clone()) {
        Ok(sealed) => sealed,
        Err(e) => {
            error!(error = %e, "Failed to encrypt reply; sending it unencrypted");
            body
        }
    }
}

fn route(handlers: &EventRouter<RequestHandler>, codec: &Codec, request: Vec<u8>) -> Result<Value> {
    let envelope = Envelope::decode(&codec.open(request)?)?;

    let Some(handler) = handlers.get(&envelope.event) else {
        warn!(event = %envelope.event, "No handler bound for request");
        return Ok(response::unbound_event(&envelope.event));
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&envelope.data)))
        .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload.as_ref()))));

    match outcome {
        Ok(Some(reply)) => Ok(reply),
        Ok(None) => Ok(response::success()),
        Err(e) => {
            metrics::HANDLER_ERRORS.inc();
            Err(IpcError::Application(e.to_string()))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
