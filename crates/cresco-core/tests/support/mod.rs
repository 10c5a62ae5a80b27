//! In-process websocket responder standing in for a Cresco agent.
//!
//! The stub runs on its own thread and runtime. It accepts the three endpoint
//! paths, stamps identity headers on the handshake, and:
//!
//! - `/api/apisocket`: records every frame and answers RPC envelopes
//!   according to [`Mode`]
//! - `/api/dataplane`: records the first frame as the subscription, then
//!   echoes every frame back
//! - `/api/logstreamer`: records each config frame and answers with a log line

#![allow(dead_code)]

use cresco_core::{ClientConfig, TlsMode};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Message;

pub const SERVICE_KEY: &str = "test-service-key";
pub const REGION: &str = "stub-region";
pub const AGENT: &str = "stub-agent";
pub const PLUGIN: &str = "plugin/0";
pub const GLOBAL_REGION: &str = "global-region";
pub const GLOBAL_AGENT: &str = "global-controller";

/// How the RPC endpoint answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Reply with the request payload unchanged (`globalinfo` gets a real answer).
    Echo,
    /// Never reply.
    Silent,
    /// Reply with text that is not JSON.
    Garbage,
}

#[derive(Default)]
struct State {
    mode: Mutex<Option<Mode>>,
    rpc_frames: AtomicUsize,
    received: Mutex<Vec<Value>>,
    subscriptions: Mutex<Vec<String>>,
    stream_frames: Mutex<Vec<String>>,
    log_configs: Mutex<Vec<String>>,
}

impl State {
    fn mode(&self) -> Mode {
        self.mode.lock().unwrap().unwrap_or(Mode::Echo)
    }
}

pub struct StubServer {
    pub port: u16,
    state: Arc<State>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StubServer {
    pub fn start() -> Self {
        Self::start_with(Mode::Echo)
    }

    pub fn start_with(mode: Mode) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind stub listener");
        listener.set_nonblocking(true).unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(State::default());
        *state.mode.lock().unwrap() = Some(mode);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread_state = state.clone();
        let thread = std::thread::Builder::new()
            .name("stub-server".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                runtime.block_on(async move {
                    let listener = TcpListener::from_std(listener).unwrap();
                    tokio::select! {
                        _ = shutdown_rx => {}
                        _ = accept_loop(listener, thread_state) => {}
                    }
                });
                // Dropping the runtime closes every open connection
            })
            .unwrap();

        Self {
            port,
            state,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    /// Client settings pointing at this stub over plain `ws://`.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.port, SERVICE_KEY)
            .with_tls(TlsMode::Plain)
            .with_connect_timeout(Duration::from_secs(5))
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.state.mode.lock().unwrap() = Some(mode);
    }

    /// Frames received on the RPC endpoint.
    pub fn rpc_frames(&self) -> usize {
        self.state.rpc_frames.load(Ordering::SeqCst)
    }

    /// Envelopes received on the RPC endpoint, in order.
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.subscriptions.lock().unwrap().clone()
    }

    /// Data-plane frames after the subscription.
    pub fn stream_frames(&self) -> Vec<String> {
        self.state.stream_frames.lock().unwrap().clone()
    }

    pub fn log_configs(&self) -> Vec<String> {
        self.state.log_configs.lock().unwrap().clone()
    }

    /// Stop the stub and drop every connection.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

async fn accept_loop(listener: TcpListener, state: Arc<State>) {
    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(handle_connection(stream, state.clone()));
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<State>) {
    let mut path = String::new();
    let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        path = request.uri().path().to_string();

        let key = request
            .headers()
            .get("cresco_service_key")
            .and_then(|value| value.to_str().ok());
        if key != Some(SERVICE_KEY) {
            let mut reject = ErrorResponse::new(Some("invalid service key".to_string()));
            *reject.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(reject);
        }

        let headers = response.headers_mut();
        headers.insert("cresco_region", HeaderValue::from_static(REGION));
        headers.insert("cresco_agent", HeaderValue::from_static(AGENT));
        headers.insert("cresco_plugin", HeaderValue::from_static(PLUGIN));
        Ok(response)
    };

    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();

    match path.as_str() {
        "/api/apisocket" => {
            while let Some(Ok(message)) = source.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                state.rpc_frames.fetch_add(1, Ordering::SeqCst);

                let Ok(envelope) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                state.received.lock().unwrap().push(envelope.clone());

                if !envelope["message_info"]["is_rpc"].as_bool().unwrap_or(false) {
                    continue;
                }

                let reply = match state.mode() {
                    Mode::Silent => continue,
                    Mode::Garbage => "<html>this is not json".to_string(),
                    Mode::Echo => reply_for(&envelope).to_string(),
                };

                if let Some(delay) = envelope["message_payload"]["delay_ms"].as_u64() {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                if sink.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
        }
        "/api/dataplane" => {
            let mut subscribed = false;
            while let Some(Ok(message)) = source.next().await {
                match message {
                    Message::Text(text) if !subscribed => {
                        subscribed = true;
                        state.subscriptions.lock().unwrap().push(text.as_str().to_string());
                    }
                    Message::Text(text) => {
                        state.stream_frames.lock().unwrap().push(text.as_str().to_string());
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Message::Binary(data) => {
                        if sink.send(Message::Binary(data)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
        "/api/logstreamer" => {
            while let Some(Ok(message)) = source.next().await {
                match message {
                    Message::Text(text) => {
                        let config = text.as_str().to_string();
                        state.log_configs.lock().unwrap().push(config.clone());
                        let line = format!("INFO log stream configured: {}", config);
                        if sink.send(Message::Text(line.into())).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn reply_for(envelope: &Value) -> Value {
    let payload = &envelope["message_payload"];
    match payload["action"].as_str() {
        Some("globalinfo") => json!({
            "status_code": "10",
            "global_region": GLOBAL_REGION,
            "global_agent": GLOBAL_AGENT,
        }),
        _ => payload.clone(),
    }
}
