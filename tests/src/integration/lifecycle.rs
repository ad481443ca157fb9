//! # Lifecycle Flows
//!
//! Connection retries, shutdown from every state, and restart.

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use duplex_ipc::{Client, ConnectionState, IpcError, Server, Value};
    use serde_json::json;

    use crate::{
        connect_client, free_port_pair, init_tracing, start_server, wait_until, LOCALHOST,
        WAIT_TIMEOUT,
    };

    // =============================================================================
    // CONNECT
    // =============================================================================

    #[test]
    fn test_connect_gives_up_after_max_retries() {
        init_tracing();
        let port = free_port_pair();
        let client = Client::new();

        let started = Instant::now();
        let err = client.connect(LOCALHOST, port, 2, 100).unwrap_err();

        // One sleep between two attempts, none after the last.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(1500));

        let text = err.to_string();
        match err {
            IpcError::ConnectFailed {
                attempts,
                broadcast_endpoint,
                request_endpoint,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert!(broadcast_endpoint.ends_with(&format!(":{port}")));
                assert!(request_endpoint.ends_with(&format!(":{}", port + 1)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(text.contains(&port.to_string()));
        assert!(text.contains(&(port + 1).to_string()));
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_succeeds_once_server_appears() {
        init_tracing();
        let port = free_port_pair();

        let server = Arc::new(Server::new());
        let late = server.clone();
        let starter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            late.serve(LOCALHOST, port)
        });

        let client = Client::new();
        client.connect(LOCALHOST, port, 50, 20).unwrap();
        starter.join().unwrap().unwrap();

        server.on("ping", |_: &Value| Ok(Some(json!("pong"))));
        assert_eq!(client.emit("ping", json!(null)).unwrap(), json!("pong"));
    }

    #[test]
    fn test_connect_twice_fails() {
        let server = Server::new();
        let port = start_server(&server);
        let client = Client::new();
        connect_client(&client, &server, port);

        let err = client.connect(LOCALHOST, port, 1, 0).unwrap_err();
        assert!(matches!(err, IpcError::AlreadyConnected));
        assert!(client.is_connected());
    }

    #[test]
    fn test_serve_on_taken_port_fails() {
        let first = Server::new();
        let port = start_server(&first);

        let second = Server::new();
        let err = second.serve(LOCALHOST, port).unwrap_err();
        assert!(matches!(err, IpcError::Transport(_)));
        assert!(!second.is_started());
    }

    // =============================================================================
    // SHUTDOWN
    // =============================================================================

    #[test]
    fn test_shutdown_is_idempotent_and_drop_safe() {
        let server = Server::new();
        let port = start_server(&server);
        let client = Client::new();
        connect_client(&client, &server, port);

        client.shutdown();
        client.shutdown();
        assert!(!client.is_connected());
        assert!(matches!(
            client.emit("x", json!(null)),
            Err(IpcError::NotConnected)
        ));

        server.shutdown();
        server.shutdown();
        assert!(matches!(
            server.emit("x", json!(null)),
            Err(IpcError::NotStarted)
        ));

        // Drop runs shutdown a third time.
        drop(client);
        drop(server);
    }

    #[test]
    fn test_shutdown_unblocks_pending_emit() {
        let server = Server::new();
        server.on("slow", |_: &Value| {
            thread::sleep(Duration::from_millis(500));
            Ok(None)
        });
        let port = start_server(&server);

        let client = Arc::new(Client::new());
        connect_client(&client, &server, port);

        let caller = client.clone();
        let pending = thread::spawn(move || caller.emit("slow", json!(null)));

        thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        client.shutdown();

        let result = pending.join().unwrap();
        assert!(matches!(result, Err(IpcError::Transport(_))));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_emit_after_server_shutdown_fails() {
        let server = Server::new();
        server.on("ping", |_: &Value| Ok(None));
        let port = start_server(&server);
        let client = Client::new();
        connect_client(&client, &server, port);

        assert!(client.emit("ping", json!(null)).is_ok());
        server.shutdown();

        let err = client.emit("ping", json!(null)).unwrap_err();
        assert!(matches!(err, IpcError::Transport(_)));
        // The client itself is still up until it is shut down.
        assert!(client.is_connected());
    }

    // =============================================================================
    // RESTART
    // =============================================================================

    #[test]
    fn test_client_reconnects_after_shutdown() {
        let server = Server::new();
        server.on("ping", |_: &Value| Ok(Some(json!("pong"))));
        let port = start_server(&server);

        let client = Client::new();
        connect_client(&client, &server, port);
        client.shutdown();

        // The server drops the old subscriber once its connection closes.
        assert!(wait_until(WAIT_TIMEOUT, || {
            let _ = server.emit("probe", json!(null));
            server.subscriber_count() == 0
        }));

        connect_client(&client, &server, port);
        assert_eq!(client.emit("ping", json!(null)).unwrap(), json!("pong"));
    }

    #[test]
    fn test_server_restarts_on_same_port() {
        let server = Server::new();
        let port = start_server(&server);
        let client = Client::new();
        connect_client(&client, &server, port);
        client.shutdown();
        server.shutdown();

        // Both ports are released by the time shutdown returns.
        server.serve(LOCALHOST, port).unwrap();
        assert!(server.is_started());

        connect_client(&client, &server, port);
        server.on("up", |_: &Value| Ok(Some(json!(true))));
        assert_eq!(client.emit("up", json!(null)).unwrap(), json!(true));
    }

    #[test]
    fn test_failed_serve_releases_broadcast_port() {
        init_tracing();
        let port = free_port_pair();
        let blocker = TcpListener::bind(("127.0.0.1", port + 1)).unwrap();

        let server = Server::new();
        assert!(server.serve(LOCALHOST, port).is_err());
        assert!(!server.is_started());

        drop(blocker);
        server.serve(LOCALHOST, port).unwrap();
        assert!(server.is_started());
    }
}
