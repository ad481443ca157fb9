//! # Broadcast Channel Flows
//!
//! Server `emit` → subscriber socket → client receive thread → `on` handler.
//!
//! Publishing is fire and forget: the server does not know whether a client
//! handled an event, so every test observes the client side and waits.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use duplex_ipc::{Client, Server, Value};
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::{connect_client, start_server, wait_until, WAIT_TIMEOUT};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Collects every payload delivered for `event`.
    fn record(client: &Client, event: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        client.on(event, move |data: &Value| sink.lock().push(data.clone()));
        seen
    }

    // =============================================================================
    // DELIVERY
    // =============================================================================

    #[test]
    fn test_ping_reaches_registered_handler() {
        let server = Server::new();
        let port = start_server(&server);

        let client = Client::new();
        let pings = record(&client, "ping");
        connect_client(&client, &server, port);

        server.emit("ping", json!({"n": 1})).unwrap();

        assert!(wait_until(WAIT_TIMEOUT, || !pings.lock().is_empty()));
        assert_eq!(pings.lock()[0], json!({"n": 1}));
    }

    #[test]
    fn test_unknown_event_is_dropped_and_loop_continues() {
        let server = Server::new();
        let port = start_server(&server);

        let client = Client::new();
        let pongs = record(&client, "pong");
        connect_client(&client, &server, port);

        // No handler for "ping": logged and ignored.
        server.emit("ping", json!({"n": 1})).unwrap();
        server.emit("pong", json!({"n": 2})).unwrap();

        assert!(wait_until(WAIT_TIMEOUT, || !pongs.lock().is_empty()));
        assert_eq!(*pongs.lock(), vec![json!({"n": 2})]);
        assert!(client.is_connected());
    }

    #[test]
    fn test_events_arrive_in_publication_order() {
        let server = Server::new();
        let port = start_server(&server);

        let client = Client::new();
        let ticks = record(&client, "tick");
        connect_client(&client, &server, port);

        for n in 0..100 {
            server.emit("tick", json!(n)).unwrap();
        }

        assert!(wait_until(WAIT_TIMEOUT, || ticks.lock().len() == 100));
        let expected: Vec<Value> = (0..100).map(|n| json!(n)).collect();
        assert_eq!(*ticks.lock(), expected);
    }

    #[test]
    fn test_every_subscriber_receives_each_event() {
        let server = Server::new();
        let port = start_server(&server);

        let clients: Vec<Client> = (0..3).map(|_| Client::new()).collect();
        let inboxes: Vec<_> = clients.iter().map(|c| record(c, "news")).collect();
        for client in &clients {
            connect_client(client, &server, port);
        }
        assert_eq!(server.subscriber_count(), 3);

        server.emit("news", json!("extra")).unwrap();

        for inbox in &inboxes {
            assert!(wait_until(WAIT_TIMEOUT, || inbox.lock().len() == 1));
            assert_eq!(inbox.lock()[0], json!("extra"));
        }
    }

    #[test]
    fn test_panicking_handler_does_not_stop_delivery() {
        let server = Server::new();
        let port = start_server(&server);

        let client = Client::new();
        client.on("explode", |_: &Value| panic!("handler bug"));
        let after = record(&client, "after");
        connect_client(&client, &server, port);

        server.emit("explode", json!(null)).unwrap();
        server.emit("after", json!(true)).unwrap();

        assert!(wait_until(WAIT_TIMEOUT, || after.lock().len() == 1));
        assert!(client.is_connected());
    }

    #[test]
    fn test_handler_registered_after_connect_is_used() {
        let server = Server::new();
        let port = start_server(&server);

        let client = Client::new();
        connect_client(&client, &server, port);

        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        client.on("late", move |_: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        server.emit("late", json!({})).unwrap();
        assert!(wait_until(WAIT_TIMEOUT, || count.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_emit_without_subscribers_succeeds() {
        let server = Server::new();
        start_server(&server);

        assert_eq!(server.subscriber_count(), 0);
        assert!(server.emit("nobody", json!("listening")).is_ok());
    }
}
