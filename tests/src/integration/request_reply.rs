//! # Request/Reply Flows
//!
//! Client `emit` → request socket → server handler → exactly one reply →
//! client `emit` returns it.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use duplex_ipc::{Client, HandlerResult, Server, Value};
    use duplex_types::response;
    use serde_json::json;

    use crate::{connect_client, start_server};

    fn doubling_server() -> (Server, u16) {
        let server = Server::new();
        server.on("echo", |data: &Value| {
            let x = data["x"].as_i64().unwrap_or_default();
            Ok(Some(json!({"x": x, "doubled": x * 2})))
        });
        let port = start_server(&server);
        (server, port)
    }

    // =============================================================================
    // REPLY SHAPES
    // =============================================================================

    #[test]
    fn test_handler_reply_returned_verbatim() {
        let (server, port) = doubling_server();
        let client = Client::new();
        connect_client(&client, &server, port);

        let reply = client.emit("echo", json!({"x": 5})).unwrap();
        assert_eq!(reply, json!({"x": 5, "doubled": 10}));
    }

    #[test]
    fn test_missing_handler_returns_error_payload() {
        let (server, port) = doubling_server();
        let client = Client::new();
        connect_client(&client, &server, port);

        let reply = client.emit("missing", json!({})).unwrap();
        assert_eq!(reply["event"], "__error__");
        assert_eq!(
            reply["data"]["message"],
            "Server has no handler bound for event: missing"
        );
        assert!(response::is_error(&reply));
    }

    #[test]
    fn test_handler_without_reply_returns_success_status() {
        let server = Server::new();
        server.on("store", |_: &Value| Ok(None));
        let port = start_server(&server);
        let client = Client::new();
        connect_client(&client, &server, port);

        let reply = client.emit("store", json!([1, 2, 3])).unwrap();
        assert_eq!(reply, response::success());
    }

    #[test]
    fn test_handler_error_returns_error_status() {
        let server = Server::new();
        server.on("divide", |data: &Value| -> HandlerResult {
            let divisor = data["by"].as_i64().unwrap_or_default();
            if divisor == 0 {
                anyhow::bail!("division by zero");
            }
            Ok(Some(json!(100 / divisor)))
        });
        let port = start_server(&server);
        let client = Client::new();
        connect_client(&client, &server, port);

        let reply = client.emit("divide", json!({"by": 0})).unwrap();
        assert_eq!(reply, response::failure("division by zero"));

        // The exchange after a failure is unaffected.
        let reply = client.emit("divide", json!({"by": 4})).unwrap();
        assert_eq!(reply, json!(25));
    }

    #[test]
    fn test_panicking_handler_still_gets_one_reply() {
        let server = Server::new();
        server.on("crash", |_: &Value| -> HandlerResult { panic!("oops") });
        server.on("ok", |_: &Value| Ok(Some(json!("fine"))));
        let port = start_server(&server);
        let client = Client::new();
        connect_client(&client, &server, port);

        let reply = client.emit("crash", json!(null)).unwrap();
        assert_eq!(reply["data"]["status"], "error");
        assert_eq!(reply["data"]["message"], "oops");

        assert_eq!(client.emit("ok", json!(null)).unwrap(), json!("fine"));
    }

    // =============================================================================
    // CONCURRENCY
    // =============================================================================

    #[test]
    fn test_concurrent_emits_never_overlap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let server = Server::new();
        let (current, max) = (in_flight.clone(), peak.clone());
        server.on("work", move |data: &Value| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(data.clone()))
        });
        let port = start_server(&server);

        let client = Arc::new(Client::new());
        connect_client(&client, &server, port);

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let client = client.clone();
                thread::spawn(move || {
                    for n in 0..10 {
                        let payload = json!({"worker": worker, "n": n});
                        let reply = client.emit("work", payload.clone()).unwrap();
                        // Each caller gets its own reply back.
                        assert_eq!(reply, payload);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_server_answers_several_clients() {
        let (server, port) = doubling_server();

        let clients: Vec<Client> = (0..4).map(|_| Client::new()).collect();
        for client in &clients {
            connect_client(client, &server, port);
        }

        for (i, client) in clients.iter().enumerate() {
            let x = i as i64;
            let reply = client.emit("echo", json!({"x": x})).unwrap();
            assert_eq!(reply["doubled"], x * 2);
        }
    }

    #[test]
    fn test_handler_replaced_at_runtime() {
        let server = Server::new();
        server.on("version", |_: &Value| Ok(Some(json!(1))));
        let port = start_server(&server);
        let client = Client::new();
        connect_client(&client, &server, port);

        assert_eq!(client.emit("version", json!(null)).unwrap(), json!(1));
        server.on("version", |_: &Value| Ok(Some(json!(2))));
        assert_eq!(client.emit("version", json!(null)).unwrap(), json!(2));
    }
}
