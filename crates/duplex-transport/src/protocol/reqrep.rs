//! Request/reply: strict send-then-receive on the requester, strict
//! receive-then-send on the replier.
//!
//! The replier serves any number of requesters. Each request remembers the
//! pipe it arrived on; the next `send` answers that pipe.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{spawn_named, Pipe};
use crate::frame::{read_frame, write_frame};
use crate::inbox::Inbox;
use crate::{SocketOptions, TransportError};

pub(crate) struct Requester {
    pipe: Mutex<Option<Pipe>>,
    reader: Mutex<Option<TcpStream>>,
    awaiting_reply: AtomicBool,
}

impl Requester {
    pub(crate) fn new() -> Self {
        Self {
            pipe: Mutex::new(None),
            reader: Mutex::new(None),
            awaiting_reply: AtomicBool::new(false),
        }
    }

    /// Use `pipe` for all further requests, replacing any earlier connection.
    pub(crate) fn attach(&self, pipe: Pipe) -> Result<(), TransportError> {
        let reader = pipe.reader()?;
        if let Some(old) = self.pipe.lock().replace(pipe) {
            old.shutdown();
        }
        *self.reader.lock() = Some(reader);
        self.awaiting_reply.store(false, Ordering::Release);
        Ok(())
    }

    pub(crate) fn send(&self, body: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.pipe.lock();
        let pipe = guard
            .as_mut()
            .ok_or(TransportError::IncorrectState("request socket is not connected"))?;
        write_frame(&mut pipe.stream, body)?;
        self.awaiting_reply.store(true, Ordering::Release);
        Ok(())
    }

    pub(crate) fn recv(&self, max: usize) -> Result<Vec<u8>, TransportError> {
        if !self.awaiting_reply.load(Ordering::Acquire) {
            return Err(TransportError::IncorrectState("no request outstanding"));
        }

        // Held across the blocking read; close() only touches `pipe`.
        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or(TransportError::Closed)?;
        let reply = match read_frame(reader, max) {
            Ok(Some(body)) => Ok(body),
            Ok(None) => Err(TransportError::Io("connection closed by peer".to_string())),
            Err(e) => Err(e.into()),
        };
        self.awaiting_reply.store(false, Ordering::Release);
        reply
    }

    pub(crate) fn close(&self) {
        if let Some(pipe) = self.pipe.lock().take() {
            pipe.shutdown();
        }
    }

    pub(crate) fn peer_count(&self) -> usize {
        usize::from(self.pipe.lock().is_some())
    }
}

struct Request {
    pipe: u64,
    body: Vec<u8>,
}

pub(crate) struct Replier {
    inbox: Arc<Inbox<Request>>,
    pipes: Arc<Mutex<HashMap<u64, Pipe>>>,
    pending: Mutex<Option<u64>>,
}

impl Replier {
    pub(crate) fn new(options: &SocketOptions) -> Self {
        Self {
            inbox: Arc::new(Inbox::new(options.recv_buffer)),
            pipes: Arc::new(Mutex::new(HashMap::new())),
            pending: Mutex::new(None),
        }
    }

    pub(crate) fn attach(
        &self,
        socket_id: u64,
        pipe: Pipe,
        options: &SocketOptions,
    ) -> Result<(), TransportError> {
        let mut reader = pipe.reader()?;
        let inbox = self.inbox.clone();
        let pipes = self.pipes.clone();
        let max = options.max_message_size;
        let pipe_id = pipe.id;

        self.pipes.lock().insert(pipe_id, pipe);
        debug!(pipe = pipe_id, "Requester attached");

        let spawned = spawn_named(format!("duplex-rep-{socket_id}-{pipe_id}"), move || {
            read_loop(&mut reader, pipe_id, &inbox, max);
            if let Some(pipe) = pipes.lock().remove(&pipe_id) {
                pipe.shutdown();
            }
        });

        if spawned.is_err() {
            if let Some(pipe) = self.pipes.lock().remove(&pipe_id) {
                pipe.shutdown();
            }
        }
        spawned.map(drop)
    }

    pub(crate) fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let request = self.inbox.pop().ok_or(TransportError::Closed)?;
        *self.pending.lock() = Some(request.pipe);
        Ok(request.body)
    }

    pub(crate) fn send(&self, body: &[u8]) -> Result<(), TransportError> {
        let pipe_id = self
            .pending
            .lock()
            .take()
            .ok_or(TransportError::IncorrectState("no request to reply to"))?;

        let mut pipes = self.pipes.lock();
        let pipe = pipes
            .get_mut(&pipe_id)
            .ok_or_else(|| TransportError::Io(format!("requester on pipe {pipe_id} is gone")))?;
        write_frame(&mut pipe.stream, body).map_err(TransportError::from)
    }

    pub(crate) fn close(&self) {
        self.inbox.close();
        for (_, pipe) in self.pipes.lock().drain() {
            pipe.shutdown();
        }
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.pipes.lock().len()
    }
}

fn read_loop(reader: &mut TcpStream, pipe_id: u64, inbox: &Inbox<Request>, max: usize) {
    loop {
        match read_frame(reader, max) {
            Ok(Some(body)) => {
                if inbox.push(Request { pipe: pipe_id, body }).is_err() {
                    if inbox.is_closed() {
                        break;
                    }
                    warn!(pipe = pipe_id, "Reply socket inbox full, request dropped");
                }
            }
            Ok(None) => {
                debug!(pipe = pipe_id, "Requester disconnected");
                break;
            }
            Err(e) => {
                if !inbox.is_closed() {
                    debug!(pipe = pipe_id, error = %e, "Request connection lost");
                }
                break;
            }
        }
    }
}
