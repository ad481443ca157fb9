//! # Duplex-IPC Test Suite
//!
//! Cross-crate flows over real loopback sockets.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── lib.rs              # Shared fixtures (ports, waiting, server/client setup)
//! └── integration/
//!     ├── pubsub.rs       # Broadcast channel
//!     ├── request_reply.rs
//!     ├── encryption.rs   # End-to-end AEAD, tampering, key mismatch
//!     └── lifecycle.rs    # Connect retries, shutdown, restart
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p duplex-tests
//! cargo test -p duplex-tests integration::encryption::
//! RUST_LOG=duplex_ipc=debug cargo test -p duplex-tests -- --nocapture
//! ```

#![allow(dead_code)]

pub mod integration;

use std::net::TcpListener;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use duplex_ipc::{Client, Server};
use tracing_subscriber::EnvFilter;

/// Loopback base URL used by every test.
pub const LOCALHOST: &str = "tcp://127.0.0.1";

/// Upper bound for anything a test waits on.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Install a test log writer once per binary. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A port `p` such that both `p` and `p + 1` were free a moment ago.
pub fn free_port_pair() -> u16 {
    for _ in 0..64 {
        let first = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = first.local_addr().expect("local addr").port();
        if port == u16::MAX {
            continue;
        }
        if TcpListener::bind(("127.0.0.1", port + 1)).is_ok() {
            return port;
        }
    }
    panic!("no free port pair found");
}

/// Poll `condition` every 5 ms until it holds or `timeout` elapses.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Serve on a fresh port pair, retrying if another test grabbed it first.
pub fn start_server(server: &Server) -> u16 {
    init_tracing();
    for _ in 0..16 {
        let port = free_port_pair();
        if server.serve(LOCALHOST, port).is_ok() {
            return port;
        }
    }
    panic!("server could not bind a port pair");
}

/// Connect `client` to `port` and wait until `server` sees it subscribed.
pub fn connect_client(client: &Client, server: &Server, port: u16) {
    let before = server.subscriber_count();
    client
        .connect(LOCALHOST, port, 3, 100)
        .expect("client connects");
    assert!(
        wait_until(WAIT_TIMEOUT, || server.subscriber_count() > before),
        "server never saw the subscriber"
    );
}
