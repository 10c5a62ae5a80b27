//! Transport handle for the control-plane RPC socket.
//!
//! The live websocket is owned by a task on the [`EventLoop`]; the handle only
//! holds a command channel into that task. Every operation is scheduled onto
//! the loop and waited on with a timeout, so the socket is never touched from
//! a foreground thread.
//!
//! # Correlation
//!
//! The socket task processes one command at a time. A request writes its frame
//! and then consumes the next text frame as its reply, so at most one
//! correlated exchange is in flight per connection. Frames arriving while no
//! request is waiting are discarded. A request that times out closes the
//! socket, so its late reply cannot reach the next request; callers must
//! reconnect.

use super::identity::ConnectionIdentity;
use super::socket::{self, WsStream};
use crate::config::{ConnectionConfig, TlsMode};
use crate::error::{CrescoError, Result};
use crate::event_loop::EventLoop;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

/// Work handed to the socket task.
enum Command {
    /// Write a frame and wait for the correlated reply.
    Request {
        payload: String,
        timeout: Duration,
        reply: oneshot::Sender<Result<String>>,
    },
    /// Write a frame without waiting for any reply.
    Send {
        payload: String,
        ack: oneshot::Sender<Result<()>>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

/// State of one successful connect.
struct Session {
    commands: mpsc::UnboundedSender<Command>,
    alive: Arc<AtomicBool>,
    identity: ConnectionIdentity,
}

struct Inner {
    event_loop: Arc<EventLoop>,
    session: Mutex<Option<Session>>,
    frames_sent: Arc<AtomicU64>,
}

/// Handle to the single full-duplex control-plane connection.
///
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct TransportHandle {
    inner: Arc<Inner>,
}

impl TransportHandle {
    /// Create a disconnected handle bound to `event_loop`.
    pub fn new(event_loop: Arc<EventLoop>) -> Self {
        Self {
            inner: Arc::new(Inner {
                event_loop,
                session: Mutex::new(None),
                frames_sent: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// Open the connection and resolve the endpoint identity.
    ///
    /// Any previous connection is closed first.
    pub fn connect(
        &self,
        url: &Url,
        service_key: &str,
        tls: TlsMode,
        timeout: Duration,
    ) -> Result<ConnectionIdentity> {
        self.close();

        info!("Connecting to {}", url);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(false));

        let task_alive = alive.clone();
        let frames_sent = self.inner.frames_sent.clone();
        let url = url.clone();
        let service_key = service_key.to_string();

        let identity = self
            .inner
            .event_loop
            .run(
                async move {
                    let (stream, identity) =
                        tokio::time::timeout(timeout, socket::open(&url, &service_key, tls))
                            .await
                            .map_err(|_| CrescoError::Timeout(timeout))??;
                    task_alive.store(true, Ordering::SeqCst);
                    tokio::spawn(drive(stream, commands_rx, task_alive, frames_sent));
                    Ok::<_, CrescoError>(identity)
                },
                timeout,
            )
            .and_then(|result| result)?;

        info!("Connected as {}", identity);

        *self.inner.session.lock() = Some(Session {
            commands: commands_tx,
            alive,
            identity: identity.clone(),
        });

        Ok(identity)
    }

    /// Cheap liveness check; never blocks on the loop.
    pub fn connected(&self) -> bool {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|session| session.alive.load(Ordering::SeqCst) && !session.commands.is_closed())
            .unwrap_or(false)
    }

    /// Identity resolved by the last successful connect.
    pub fn identity(&self) -> Option<ConnectionIdentity> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|session| session.identity.clone())
    }

    /// Total frames written on any connection made through this handle.
    pub fn frames_sent(&self) -> u64 {
        self.inner.frames_sent.load(Ordering::SeqCst)
    }

    /// Blocking round trip: write `payload` and return the raw reply frame.
    pub fn send(&self, payload: String, timeout: Duration) -> Result<String> {
        let commands = self.commands()?;
        let (reply_tx, reply_rx) = oneshot::channel();

        self.inner
            .event_loop
            .run(
                async move {
                    commands
                        .send(Command::Request {
                            payload,
                            timeout,
                            reply: reply_tx,
                        })
                        .map_err(|_| task_stopped())?;
                    match reply_rx.await {
                        Ok(result) => result,
                        Err(_) => Err(task_stopped()),
                    }
                },
                timeout,
            )
            .and_then(|result| result)
    }

    /// Write `payload` and return once the transport accepted it.
    pub fn send_async(&self, payload: String, timeout: Duration) -> Result<()> {
        let commands = self.commands()?;
        let (ack_tx, ack_rx) = oneshot::channel();

        self.inner
            .event_loop
            .run(
                async move {
                    commands
                        .send(Command::Send {
                            payload,
                            ack: ack_tx,
                        })
                        .map_err(|_| task_stopped())?;
                    match ack_rx.await {
                        Ok(result) => result,
                        Err(_) => Err(task_stopped()),
                    }
                },
                timeout,
            )
            .and_then(|result| result)
    }

    /// Release the connection. Idempotent.
    pub fn close(&self) {
        let Some(session) = self.inner.session.lock().take() else {
            return;
        };

        if self.inner.event_loop.is_running() && !session.commands.is_closed() {
            let (ack_tx, ack_rx) = oneshot::channel();
            let commands = session.commands.clone();
            let result = self.inner.event_loop.run(
                async move {
                    if commands.send(Command::Close { ack: ack_tx }).is_ok() {
                        let _ = ack_rx.await;
                    }
                },
                ConnectionConfig::CLOSE_TIMEOUT,
            );
            if let Err(e) = result {
                debug!("Close handshake did not complete: {}", e);
            }
        }

        session.alive.store(false, Ordering::SeqCst);
        info!("Connection to {} closed", session.identity);
    }

    fn commands(&self) -> Result<mpsc::UnboundedSender<Command>> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|session| session.commands.clone())
            .ok_or(CrescoError::NotConnected)
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("event_loop", &self.inner.event_loop.name())
            .field("identity", &self.identity())
            .field("connected", &self.connected())
            .finish()
    }
}

fn task_stopped() -> CrescoError {
    CrescoError::connection("Transport task has stopped")
}

type Sink = SplitSink<WsStream, Message>;
type Inbound = SplitStream<WsStream>;

/// Socket task: sole owner of the websocket for one connection.
async fn drive(
    stream: WsStream,
    mut commands: mpsc::UnboundedReceiver<Command>,
    alive: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
) {
    let (mut sink, mut inbound) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("Transport handle released, closing socket");
                    let _ = sink.close().await;
                    break;
                };
                match command {
                    Command::Request { payload, timeout, reply } => {
                        let result = exchange(&mut sink, &mut inbound, payload, timeout, &frames_sent).await;
                        // Any failed exchange ends the session; a late reply must not reach the next request
                        let timed_out = matches!(result, Err(CrescoError::Timeout(_)));
                        let broken = result.is_err();
                        let _ = reply.send(result);
                        if timed_out {
                            warn!("Request timed out, closing socket");
                            let _ = tokio::time::timeout(ConnectionConfig::CLOSE_TIMEOUT, sink.close()).await;
                        }
                        if broken {
                            break;
                        }
                    }
                    Command::Send { payload, ack } => {
                        let result = write_text(&mut sink, payload, &frames_sent).await;
                        let broken = result.is_err();
                        let _ = ack.send(result);
                        if broken {
                            break;
                        }
                    }
                    Command::Close { ack } => {
                        let _ = sink.close().await;
                        let _ = ack.send(());
                        break;
                    }
                }
            }
            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    debug!("Discarding uncorrelated frame ({} bytes)", text.len());
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("Discarding uncorrelated binary frame ({} bytes)", data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Server closed the connection: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Transport read failed: {}", e);
                    break;
                }
                None => {
                    info!("Connection ended by peer");
                    break;
                }
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
}

async fn write_text(sink: &mut Sink, payload: String, frames_sent: &AtomicU64) -> Result<()> {
    frames_sent.fetch_add(1, Ordering::SeqCst);
    sink.send(Message::Text(payload.into())).await?;
    Ok(())
}

async fn exchange(
    sink: &mut Sink,
    inbound: &mut Inbound,
    payload: String,
    timeout: Duration,
    frames_sent: &AtomicU64,
) -> Result<String> {
    write_text(sink, payload, frames_sent).await?;

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let frame = tokio::time::timeout_at(deadline, inbound.next())
            .await
            .map_err(|_| CrescoError::Timeout(timeout))?;
        match frame {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Binary(data))) => {
                return Ok(String::from_utf8_lossy(&data).into_owned());
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(CrescoError::connection(
                    "Connection closed while awaiting reply",
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> TransportHandle {
        TransportHandle::new(Arc::new(EventLoop::start("transport-test").unwrap()))
    }

    #[test]
    fn test_new_handle_is_disconnected() {
        let transport = handle();
        assert!(!transport.connected());
        assert!(transport.identity().is_none());
        assert_eq!(transport.frames_sent(), 0);
    }

    #[test]
    fn test_send_without_connection_fails_fast() {
        let transport = handle();
        let result = transport.send("{}".to_string(), Duration::from_secs(5));
        assert!(matches!(result, Err(CrescoError::NotConnected)));
        assert_eq!(transport.frames_sent(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let transport = handle();
        transport.close();
        transport.close();
        assert!(!transport.connected());
    }

    #[test]
    fn test_connect_refused_reports_transport_failure() {
        let transport = handle();
        let url = Url::parse("ws://127.0.0.1:1/api/apisocket").unwrap();
        let err = transport
            .connect(&url, "1234", TlsMode::Plain, Duration::from_secs(2))
            .unwrap_err();
        assert!(err.is_transport_failure());
        assert!(!transport.connected());
    }
}
