//! # duplex-echo
//!
//! Minimal server and client for trying a deployment by hand.
//!
//! ```bash
//! # Terminal 1: serve `echo` and `metrics`, broadcast a heartbeat every second
//! DUPLEX_URL=tcp://* duplex-echo serve
//!
//! # Terminal 2: one request, reply printed as JSON
//! duplex-echo ping '{"hello": "world"}'
//! ```
//!
//! Both sides read `IpcConfig::from_env` and `TelemetryConfig::from_env`;
//! set `DUPLEX_ENCRYPTION_KEY` to the same hex key on both to encrypt.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use duplex_ipc::{Client, IpcConfig, Server, Value};
use duplex_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use serde_json::json;
use tracing::{info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mode = args.next().unwrap_or_default();

    let _telemetry = init_telemetry(&TelemetryConfig::for_service(&mode))
        .context("initializing telemetry")?;
    let config = IpcConfig::from_env().context("loading configuration")?;

    match mode.as_str() {
        "serve" => serve(&config),
        "ping" => ping(&config, args.next()),
        other => bail!("unknown mode `{other}`; expected `serve` or `ping`"),
    }
}

fn report_compromise() {
    warn!("Received a message that failed authentication");
}

/// A server with the handlers bound and, when `config` has a key, the
/// strategy installed with `on_compromised` attached. Not yet serving.
fn server_for<F>(config: &IpcConfig, on_compromised: F) -> Result<Server>
where
    F: Fn() + Send + Sync + 'static,
{
    let server = Server::new();
    // The callback attaches to the strategy, so the strategy goes first.
    if let Some(strategy) = config.encryption()? {
        server.set_encryption_strategy(strategy);
        server.set_on_compromised_callback(on_compromised);
    }

    server.on("echo", |data: &Value| Ok(Some(data.clone())));
    server.on("metrics", |_: &Value| {
        let text = encode_metrics()?;
        Ok(Some(json!({ "metrics": text })))
    });
    Ok(server)
}

/// A client set up like [`server_for`], not yet connected.
fn client_for<F>(config: &IpcConfig, on_compromised: F) -> Result<Client>
where
    F: Fn() + Send + Sync + 'static,
{
    let client = Client::new();
    if let Some(strategy) = config.encryption()? {
        client.set_encryption_strategy(strategy);
        client.set_on_compromised_callback(on_compromised);
    }

    client.on("heartbeat", |data: &Value| info!(%data, "Heartbeat"));
    Ok(client)
}

fn retry_delay_ms(config: &IpcConfig) -> u64 {
    u64::try_from(config.retry.retry_delay.as_millis()).unwrap_or(u64::MAX)
}

fn serve(config: &IpcConfig) -> Result<()> {
    let server = Arc::new(server_for(config, report_compromise)?);
    server
        .serve(&config.url, config.port)
        .context("starting server")?;

    let stop = Arc::new(AtomicBool::new(false));
    let heartbeat = {
        let server = server.clone();
        let stop = stop.clone();
        thread::Builder::new()
            .name("duplex-heartbeat".into())
            .spawn(move || {
                let mut beat: u64 = 0;
                while !stop.load(Ordering::Acquire) {
                    if let Err(e) = server.emit("heartbeat", json!({ "beat": beat })) {
                        warn!(error = %e, "Heartbeat not published");
                    }
                    beat += 1;
                    thread::sleep(HEARTBEAT_INTERVAL);
                }
            })?
    };

    info!(url = %config.url, port = config.port, "Serving; press Enter to stop");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;

    stop.store(true, Ordering::Release);
    if heartbeat.join().is_err() {
        warn!("Heartbeat thread panicked");
    }
    server.shutdown();
    Ok(())
}

fn ping(config: &IpcConfig, payload: Option<String>) -> Result<()> {
    let data: Value = match payload {
        Some(raw) => serde_json::from_str(&raw).context("payload is not JSON")?,
        None => json!({ "ping": true }),
    };

    let client = client_for(config, report_compromise)?;
    client
        .connect(
            &config.url,
            config.port,
            config.retry.max_retries,
            retry_delay_ms(config),
        )
        .context("connecting to server")?;

    let reply = client.emit("echo", data)?;
    println!("{}", serde_json::to_string_pretty(&reply)?);

    client.shutdown();
    Ok(())
}
