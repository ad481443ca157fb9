//! # Sockets
//!
//! A [`Socket`] is a cheap, cloneable reference to one transport endpoint.
//! Clones share state: closing any clone closes the socket for all of them,
//! which is how a blocked `recv` on one thread is cancelled from another.

use std::fmt;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::protocol::{spawn_named, Pipe, Protocol, Publisher, Replier, Requester, Subscriber};
use crate::{Endpoint, TransportError, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_RECV_BUFFER};

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(1);

/// Socket protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    /// Broadcast sender; listens.
    Pub,
    /// Broadcast receiver; dials.
    Sub,
    /// Request sender; dials.
    Req,
    /// Request receiver; listens.
    Rep,
}

impl SocketKind {
    fn can_dial(self) -> bool {
        matches!(self, SocketKind::Sub | SocketKind::Req)
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketKind::Pub => write!(f, "PUB"),
            SocketKind::Sub => write!(f, "SUB"),
            SocketKind::Req => write!(f, "REQ"),
            SocketKind::Rep => write!(f, "REP"),
        }
    }
}

/// Socket tuning.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Largest message accepted on send or receive.
    pub max_message_size: usize,
    /// Messages queued on a receiving socket before new ones are dropped.
    pub recv_buffer: usize,
    /// How often a listening socket checks for new connections and for close.
    pub accept_poll_interval: Duration,
    /// Give up on a dial after this long.
    pub dial_timeout: Duration,
    /// Write timeout per connection; a peer that stalls longer is dropped.
    pub send_timeout: Option<Duration>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            recv_buffer: DEFAULT_RECV_BUFFER,
            accept_poll_interval: Duration::from_millis(10),
            dial_timeout: Duration::from_secs(5),
            send_timeout: Some(Duration::from_secs(5)),
        }
    }
}

struct Shared {
    id: u64,
    kind: SocketKind,
    options: SocketOptions,
    closed: AtomicBool,
    protocol: Protocol,
    acceptors: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Acceptors first, so no peer is attached after the protocol closes.
        self.join_acceptors();
        self.protocol.close();
        true
    }

    /// Wait for every accept thread to exit, which drops its listener and
    /// frees the port. An acceptor closing its own socket is not waited on.
    fn join_acceptors(&self) {
        let current = thread::current().id();
        for acceptor in self.acceptors.lock().drain(..) {
            if acceptor.thread().id() == current {
                continue;
            }
            if acceptor.join().is_err() {
                warn!(socket = self.id, "Accept thread panicked");
            }
        }
    }

    fn attach(&self, stream: TcpStream) -> Result<(), TransportError> {
        let pipe = Pipe::new(NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed), stream, &self.options)?;
        match &self.protocol {
            Protocol::Pub(p) => {
                p.attach(pipe);
                Ok(())
            }
            Protocol::Sub(s) => s.attach(self.id, pipe, &self.options),
            Protocol::Req(r) => r.attach(pipe),
            Protocol::Rep(r) => r.attach(self.id, pipe, &self.options),
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.close();
    }
}

/// A transport endpoint. See the [module docs](self).
#[derive(Clone)]
pub struct Socket {
    shared: Arc<Shared>,
}

impl Socket {
    /// Open a socket with default options.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible to match the transport contract.
    pub fn open(kind: SocketKind) -> Result<Self, TransportError> {
        Self::open_with(kind, SocketOptions::default())
    }

    /// Open a socket with custom options.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible to match the transport contract.
    pub fn open_with(kind: SocketKind, options: SocketOptions) -> Result<Self, TransportError> {
        let protocol = match kind {
            SocketKind::Pub => Protocol::Pub(Publisher::new()),
            SocketKind::Sub => Protocol::Sub(Subscriber::new(&options)),
            SocketKind::Req => Protocol::Req(Requester::new()),
            SocketKind::Rep => Protocol::Rep(Replier::new(&options)),
        };
        let id = NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed);
        debug!(socket = id, kind = %kind, "Socket opened");

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                kind,
                options,
                closed: AtomicBool::new(false),
                protocol,
                acceptors: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Socket protocol.
    #[must_use]
    pub fn kind(&self) -> SocketKind {
        self.shared.kind
    }

    /// Process-unique socket id, for logs.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Connect to a listening peer (SUB, REQ). A redial replaces the
    /// previous connection.
    ///
    /// # Errors
    ///
    /// `Closed`, `NotSupported`, address errors, or the connect failure.
    pub fn dial(&self, url: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        if !self.kind().can_dial() {
            return Err(self.unsupported("dial"));
        }

        let addr = Endpoint::parse(url)?.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.shared.options.dial_timeout)?;
        self.shared.attach(stream)?;

        // A close that raced the dial must not leave the new pipe running.
        if self.is_closed() {
            self.shared.protocol.close();
            return Err(TransportError::Closed);
        }

        debug!(socket = self.id(), kind = %self.kind(), url, "Dialed");
        Ok(())
    }

    /// Bind and accept connections in the background (PUB, REP).
    ///
    /// # Errors
    ///
    /// `Closed`, `NotSupported`, address errors, or the bind failure.
    pub fn listen(&self, url: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.kind().can_dial() {
            return Err(self.unsupported("listen"));
        }

        let addr = Endpoint::parse(url)?.resolve()?;
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let weak = Arc::downgrade(&self.shared);
        let poll = self.shared.options.accept_poll_interval;

        // close() sets the flag before draining, so checking under the lock
        // guarantees every pushed acceptor gets joined.
        let mut acceptors = self.shared.acceptors.lock();
        self.ensure_open()?;
        let acceptor = spawn_named(format!("duplex-accept-{}", self.id()), move || {
            accept_loop(&listener, &weak, poll);
        })?;
        acceptors.push(acceptor);
        drop(acceptors);

        info!(socket = self.id(), kind = %self.kind(), url, "Listening");
        Ok(())
    }

    /// Deliver messages starting with `prefix` (SUB). The empty prefix
    /// matches everything.
    ///
    /// # Errors
    ///
    /// `Closed` or `NotSupported`.
    pub fn subscribe(&self, prefix: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        match &self.shared.protocol {
            Protocol::Sub(s) => {
                s.subscribe(prefix);
                Ok(())
            }
            _ => Err(self.unsupported("subscribe")),
        }
    }

    /// Stop delivering messages for `prefix` (SUB).
    ///
    /// # Errors
    ///
    /// `Closed` or `NotSupported`.
    pub fn unsubscribe(&self, prefix: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        match &self.shared.protocol {
            Protocol::Sub(s) => {
                s.unsubscribe(prefix);
                Ok(())
            }
            _ => Err(self.unsupported("unsubscribe")),
        }
    }

    /// Send one message (PUB, REQ, REP).
    ///
    /// # Errors
    ///
    /// `Closed`, `NotSupported`, `MessageTooLarge`, `IncorrectState`
    /// (REP without a pending request, REQ before dialing), or a write failure.
    pub fn send(&self, body: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let max = self.shared.options.max_message_size;
        if body.len() > max {
            return Err(TransportError::MessageTooLarge {
                size: body.len(),
                max,
            });
        }

        let result = match &self.shared.protocol {
            Protocol::Pub(p) => {
                p.send(body);
                Ok(())
            }
            Protocol::Req(r) => r.send(body),
            Protocol::Rep(r) => r.send(body),
            Protocol::Sub(_) => Err(self.unsupported("send")),
        };
        self.closed_or(result)
    }

    /// Block for the next message (SUB, REQ, REP). The caller owns the buffer.
    ///
    /// # Errors
    ///
    /// `Closed` once the socket is closed (including while blocked),
    /// `NotSupported`, `IncorrectState` (REQ without a sent request), or a
    /// read failure.
    pub fn recv(&self) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        let result = match &self.shared.protocol {
            Protocol::Sub(s) => s.recv(),
            Protocol::Req(r) => r.recv(self.shared.options.max_message_size),
            Protocol::Rep(r) => r.recv(),
            Protocol::Pub(_) => Err(self.unsupported("recv")),
        };
        self.closed_or(result)
    }

    /// Close the socket. Idempotent; wakes every blocked `recv` and frees
    /// any listen address before returning.
    pub fn close(&self) {
        if self.shared.close() {
            debug!(socket = self.id(), kind = %self.kind(), "Socket closed");
        }
    }

    /// True once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Connected peers: subscribers for PUB, requesters for REP, 0 or 1 for
    /// dialing sockets.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.shared.protocol.peer_count()
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn unsupported(&self, op: &'static str) -> TransportError {
        TransportError::NotSupported {
            kind: self.kind(),
            op,
        }
    }

    /// Any failure observed after close is reported as `Closed`.
    fn closed_or<T>(&self, result: Result<T, TransportError>) -> Result<T, TransportError> {
        match result {
            Err(_) if self.is_closed() => Err(TransportError::Closed),
            other => other,
        }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn accept_loop(listener: &TcpListener, shared: &Weak<Shared>, poll: Duration) {
    loop {
        let Some(socket) = shared.upgrade() else {
            break;
        };
        if socket.is_closed() {
            break;
        }

        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = socket.attach(stream) {
                    warn!(socket = socket.id, %peer, error = %e, "Failed to attach peer");
                } else {
                    debug!(socket = socket.id, %peer, "Accepted peer");
                }
                continue;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => warn!(socket = socket.id, error = %e, "Accept failed"),
        }

        drop(socket);
        thread::sleep(poll);
    }
    debug!("Acceptor stopped");
}
