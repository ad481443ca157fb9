//! # Encrypted Flows
//!
//! Both peers share one AEAD key; every payload on both channels is sealed.
//! A peer with the wrong key sees authentication failures, which fire its
//! compromise callback.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use duplex_crypto::{AeadEncryption, KeySize, NoEncryption, SecretKey};
    use duplex_ipc::{Client, IpcConfig, IpcError, RetryPolicy, Server, Value};
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::{
        connect_client, free_port_pair, init_tracing, start_server, wait_until, WAIT_TIMEOUT,
    };

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn shared_key_pair(size: KeySize) -> (Server, Client) {
        let key = SecretKey::generate(size);
        let server = Server::new();
        server.set_encryption_strategy(Arc::new(AeadEncryption::with_key(key.clone())));
        let client = Client::new();
        client.set_encryption_strategy(Arc::new(AeadEncryption::with_key(key)));
        (server, client)
    }

    #[test]
    fn test_encrypted_request_reply_all_key_sizes() {
        for size in [KeySize::Aes128, KeySize::Aes192, KeySize::Aes256] {
            let (server, client) = shared_key_pair(size);
            server.on("secret", |data: &Value| Ok(Some(json!({"got": data}))));
            let port = start_server(&server);
            connect_client(&client, &server, port);

            let reply = client.emit("secret", json!("attack at dawn")).unwrap();
            assert_eq!(reply, json!({"got": "attack at dawn"}));
        }
    }

    #[test]
    fn test_encrypted_broadcast() {
        let (server, client) = shared_key_pair(KeySize::Aes256);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        client.on("alert", move |data: &Value| sink.lock().push(data.clone()));

        let port = start_server(&server);
        connect_client(&client, &server, port);
        server.emit("alert", json!({"level": "high"})).unwrap();

        assert!(wait_until(WAIT_TIMEOUT, || seen.lock().len() == 1));
        assert_eq!(seen.lock()[0], json!({"level": "high"}));
    }

    #[test]
    fn test_key_mismatch_fires_both_callbacks() {
        let server = Server::new();
        server.set_encryption_strategy(Arc::new(AeadEncryption::generate(KeySize::Aes256)));
        server.on("hello", |_: &Value| Ok(Some(json!("hi"))));
        let (server_alarms, on_server_alarm) = counter();
        server.set_on_compromised_callback(on_server_alarm);

        let client = Client::new();
        client.set_encryption_strategy(Arc::new(AeadEncryption::generate(KeySize::Aes256)));
        let (client_alarms, on_client_alarm) = counter();
        client.set_on_compromised_callback(on_client_alarm);

        let port = start_server(&server);
        connect_client(&client, &server, port);

        // The server cannot open the request and answers with an error reply
        // sealed under its own key, which the client cannot open either.
        let err = client.emit("hello", json!(null)).unwrap_err();
        assert!(matches!(err, IpcError::Security(_)));
        assert_eq!(server_alarms.load(Ordering::SeqCst), 1);
        assert_eq!(client_alarms.load(Ordering::SeqCst), 1);

        // Broadcasts are dropped on the client and also raise the alarm.
        server.emit("hello", json!(null)).unwrap();
        assert!(wait_until(WAIT_TIMEOUT, || client_alarms.load(Ordering::SeqCst) == 2));
        assert!(client.is_connected());
    }

    #[test]
    fn test_plaintext_client_against_encrypted_server() {
        let server = Server::new();
        server.set_encryption_strategy(Arc::new(AeadEncryption::generate(KeySize::Aes128)));
        let (alarms, on_alarm) = counter();
        server.set_on_compromised_callback(on_alarm);
        server.on("hello", |_: &Value| Ok(Some(json!("hi"))));
        let port = start_server(&server);

        let client = Client::new();
        client.set_encryption_strategy(Arc::new(NoEncryption::new()));
        connect_client(&client, &server, port);

        // The reply is ciphertext, not JSON.
        let err = client.emit("hello", json!(null)).unwrap_err();
        assert!(matches!(err, IpcError::Protocol(_)));
        assert_eq!(alarms.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_replaced_keeps_only_latest() {
        let server = Server::new();
        server.set_encryption_strategy(Arc::new(AeadEncryption::generate(KeySize::Aes256)));
        server.on("x", |_: &Value| Ok(None));
        let (first, on_first) = counter();
        let (second, on_second) = counter();
        server.set_on_compromised_callback(on_first);
        server.set_on_compromised_callback(on_second);

        let bogus = vec![0u8; 48];
        let _ = server.handle_request(bogus);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_config_with_shared_hex_key() {
        init_tracing();
        let key = SecretKey::generate(KeySize::Aes256).to_hex();
        let config = IpcConfig {
            port: free_port_pair(),
            retry: RetryPolicy::new(3, 50),
            encryption_key: Some(key),
            ..IpcConfig::default()
        };

        let server = Server::new();
        server.on("sum", |data: &Value| {
            let total: i64 = data
                .as_array()
                .map(|items| items.iter().filter_map(Value::as_i64).sum())
                .unwrap_or_default();
            Ok(Some(json!(total)))
        });
        server.serve_with(&config).unwrap();

        let client = Client::new();
        client.connect_with(&config).unwrap();

        assert_eq!(client.emit("sum", json!([1, 2, 3, 4])).unwrap(), json!(10));
    }
}
