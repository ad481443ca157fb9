//! Broadcast: one publisher, many subscribers.
//!
//! The publisher writes each message to every connected subscriber and
//! drops subscribers whose connection fails. Subscribers filter by prefix on
//! their side; with no subscription nothing is delivered.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use super::{spawn_named, Pipe};
use crate::frame::{read_frame, write_frame};
use crate::inbox::Inbox;
use crate::{SocketOptions, TransportError};

pub(crate) struct Publisher {
    pipes: Mutex<Vec<Pipe>>,
}

impl Publisher {
    pub(crate) fn new() -> Self {
        Self {
            pipes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn attach(&self, pipe: Pipe) {
        debug!(pipe = pipe.id, "Subscriber attached");
        self.pipes.lock().push(pipe);
    }

    /// Fan out to every subscriber. Succeeds even with none connected.
    pub(crate) fn send(&self, body: &[u8]) {
        let mut pipes = self.pipes.lock();
        pipes.retain_mut(|pipe| match write_frame(&mut pipe.stream, body) {
            Ok(()) => true,
            Err(e) => {
                debug!(pipe = pipe.id, error = %e, "Dropping subscriber");
                pipe.shutdown();
                false
            }
        });
        trace!(subscribers = pipes.len(), bytes = body.len(), "Published");
    }

    pub(crate) fn close(&self) {
        for pipe in self.pipes.lock().drain(..) {
            pipe.shutdown();
        }
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.pipes.lock().len()
    }
}

pub(crate) struct Subscriber {
    inbox: Arc<Inbox<Vec<u8>>>,
    topics: Arc<RwLock<Vec<Vec<u8>>>>,
    pipe: Mutex<Option<Pipe>>,
}

impl Subscriber {
    pub(crate) fn new(options: &SocketOptions) -> Self {
        Self {
            inbox: Arc::new(Inbox::new(options.recv_buffer)),
            topics: Arc::new(RwLock::new(Vec::new())),
            pipe: Mutex::new(None),
        }
    }

    /// Start reading from `pipe`, replacing any earlier connection.
    pub(crate) fn attach(
        &self,
        socket_id: u64,
        pipe: Pipe,
        options: &SocketOptions,
    ) -> Result<(), TransportError> {
        let mut reader = pipe.reader()?;
        let inbox = self.inbox.clone();
        let topics = self.topics.clone();
        let max = options.max_message_size;
        let pipe_id = pipe.id;

        spawn_named(format!("duplex-sub-{socket_id}"), move || {
            read_loop(&mut reader, pipe_id, &inbox, &topics, max);
        })?;

        if let Some(old) = self.pipe.lock().replace(pipe) {
            old.shutdown();
        }
        Ok(())
    }

    pub(crate) fn subscribe(&self, prefix: &[u8]) {
        let mut topics = self.topics.write();
        if !topics.iter().any(|t| t == prefix) {
            topics.push(prefix.to_vec());
        }
    }

    pub(crate) fn unsubscribe(&self, prefix: &[u8]) {
        self.topics.write().retain(|t| t != prefix);
    }

    pub(crate) fn recv(&self) -> Result<Vec<u8>, TransportError> {
        self.inbox.pop().ok_or(TransportError::Closed)
    }

    pub(crate) fn close(&self) {
        self.inbox.close();
        if let Some(pipe) = self.pipe.lock().take() {
            pipe.shutdown();
        }
    }

    pub(crate) fn peer_count(&self) -> usize {
        usize::from(self.pipe.lock().is_some())
    }
}

fn read_loop(
    reader: &mut TcpStream,
    pipe_id: u64,
    inbox: &Inbox<Vec<u8>>,
    topics: &RwLock<Vec<Vec<u8>>>,
    max: usize,
) {
    loop {
        match read_frame(reader, max) {
            Ok(Some(body)) => {
                let wanted = topics.read().iter().any(|t| body.starts_with(t));
                if !wanted {
                    continue;
                }
                if inbox.push(body).is_err() && !inbox.is_closed() {
                    warn!(pipe = pipe_id, "Subscriber inbox full, message dropped");
                }
            }
            Ok(None) => {
                debug!(pipe = pipe_id, "Publisher closed the connection");
                break;
            }
            Err(e) if inbox.is_closed() || e.kind() == ErrorKind::ConnectionAborted => break,
            Err(e) => {
                warn!(pipe = pipe_id, error = %e, "Broadcast connection lost");
                break;
            }
        }
    }
}
