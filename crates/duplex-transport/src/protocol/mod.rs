//! Per-kind socket state.

mod pubsub;
mod reqrep;

use std::io;
use std::net::{Shutdown, TcpStream};
use std::thread::{self, JoinHandle};

use tracing::trace;

use crate::{SocketOptions, TransportError};

pub(crate) use pubsub::{Publisher, Subscriber};
pub(crate) use reqrep::{Replier, Requester};

/// One TCP connection to a peer.
pub(crate) struct Pipe {
    pub(crate) id: u64,
    pub(crate) stream: TcpStream,
}

impl Pipe {
    /// Configure a freshly connected or accepted stream.
    pub(crate) fn new(id: u64, stream: TcpStream, options: &SocketOptions) -> io::Result<Self> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(options.send_timeout)?;
        Ok(Self { id, stream })
    }

    /// Second handle on the same connection, for a reader thread.
    pub(crate) fn reader(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    /// Unblock any reader and refuse further writes.
    pub(crate) fn shutdown(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            trace!(pipe = self.id, error = %e, "Pipe already shut down");
        }
    }
}

/// Spawn a named background thread.
pub(crate) fn spawn_named<F>(name: String, f: F) -> Result<JoinHandle<()>, TransportError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name)
        .spawn(f)
        .map_err(TransportError::from)
}

/// Kind-specific state behind a [`Socket`](crate::Socket).
pub(crate) enum Protocol {
    Pub(Publisher),
    Sub(Subscriber),
    Req(Requester),
    Rep(Replier),
}

impl Protocol {
    pub(crate) fn close(&self) {
        match self {
            Protocol::Pub(p) => p.close(),
            Protocol::Sub(s) => s.close(),
            Protocol::Req(r) => r.close(),
            Protocol::Rep(r) => r.close(),
        }
    }

    pub(crate) fn peer_count(&self) -> usize {
        match self {
            Protocol::Pub(p) => p.peer_count(),
            Protocol::Sub(s) => s.peer_count(),
            Protocol::Req(r) => r.peer_count(),
            Protocol::Rep(r) => r.peer_count(),
        }
    }
}
