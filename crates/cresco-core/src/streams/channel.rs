//! Callback-driven websocket channel with its own event loop.

use super::callbacks::StreamCallbacks;
use crate::config::{ConnectionConfig, TlsMode};
use crate::error::{CrescoError, Result};
use crate::event_loop::EventLoop;
use crate::transport::socket::{self, WsStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

enum Outbound {
    Frame {
        message: Message,
        ack: oneshot::Sender<Result<()>>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

/// Settings for a [`StreamChannel`].
#[derive(Debug, Clone)]
pub(crate) struct ChannelSettings {
    pub name: &'static str,
    pub url: Url,
    pub service_key: String,
    pub tls: TlsMode,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
}

struct Live {
    event_loop: Arc<EventLoop>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// One side-channel connection.
///
/// Inbound frames are pushed to the callbacks from the channel's loop thread.
pub(crate) struct StreamChannel {
    settings: ChannelSettings,
    callbacks: StreamCallbacks,
    live: Mutex<Option<Live>>,
    open: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl StreamChannel {
    pub fn new(settings: ChannelSettings, callbacks: StreamCallbacks) -> Self {
        Self {
            settings,
            callbacks,
            live: Mutex::new(None),
            open: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.settings.name
    }

    pub fn url(&self) -> &Url {
        &self.settings.url
    }

    /// Open the channel, optionally sending `first_frame` right after the handshake.
    pub fn connect(&self, first_frame: Option<String>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.channel_closed());
        }

        let mut live = self.live.lock();
        if live.is_some() && self.open.load(Ordering::SeqCst) {
            debug!("{} already connected", self.settings.name);
            return Ok(());
        }
        if let Some(stale) = live.take() {
            stale.event_loop.shutdown();
        }

        let event_loop = Arc::new(EventLoop::start(format!("cresco-{}", self.settings.name))?);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let url = self.settings.url.clone();
        let service_key = self.settings.service_key.clone();
        let tls = self.settings.tls;
        let timeout = self.settings.connect_timeout;
        let callbacks = self.callbacks.clone();
        let open = self.open.clone();
        let name = self.settings.name;

        info!("Opening {} at {}", name, url);

        let result = event_loop
            .run(
                async move {
                    let (mut stream, _identity) =
                        tokio::time::timeout(timeout, socket::open(&url, &service_key, tls))
                            .await
                            .map_err(|_| CrescoError::Timeout(timeout))??;
                    if let Some(frame) = first_frame {
                        stream.send(Message::Text(frame.into())).await?;
                    }
                    open.store(true, Ordering::SeqCst);
                    tokio::spawn(pump(name, stream, outbound_rx, callbacks, open));
                    Ok::<_, CrescoError>(())
                },
                timeout,
            )
            .and_then(|result| result);

        if let Err(e) = result {
            event_loop.shutdown();
            return Err(e);
        }

        *live = Some(Live {
            event_loop,
            outbound: outbound_tx,
        });
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.open.load(Ordering::SeqCst)
    }

    /// True once `close` ran; the channel can never be used again.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn send_text(&self, text: String) -> Result<()> {
        self.send_message(Message::Text(text.into()))
    }

    pub fn send_binary(&self, data: Vec<u8>) -> Result<()> {
        self.send_message(Message::Binary(data.into()))
    }

    fn send_message(&self, message: Message) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.channel_closed());
        }

        let (event_loop, outbound) = {
            let live = self.live.lock();
            let live = live.as_ref().ok_or(CrescoError::NotConnected)?;
            (live.event_loop.clone(), live.outbound.clone())
        };

        let closed = self.channel_closed();
        let (ack_tx, ack_rx) = oneshot::channel();
        event_loop
            .run(
                async move {
                    if outbound
                        .send(Outbound::Frame {
                            message,
                            ack: ack_tx,
                        })
                        .is_err()
                    {
                        return Err(closed);
                    }
                    match ack_rx.await {
                        Ok(result) => result,
                        Err(_) => Err(closed),
                    }
                },
                self.settings.send_timeout,
            )
            .and_then(|result| result)
    }

    /// Tear the channel down. Idempotent; a closed channel cannot be reopened.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let Some(live) = self.live.lock().take() else {
            return;
        };

        // From a callback we are on the loop thread and cannot wait for the ack
        if live.event_loop.is_loop_thread() {
            let (ack_tx, _ack_rx) = oneshot::channel();
            let _ = live.outbound.send(Outbound::Close { ack: ack_tx });
        } else if live.event_loop.is_running() {
            let (ack_tx, ack_rx) = oneshot::channel();
            let outbound = live.outbound.clone();
            let result = live.event_loop.run(
                async move {
                    if outbound.send(Outbound::Close { ack: ack_tx }).is_ok() {
                        let _ = ack_rx.await;
                    }
                },
                ConnectionConfig::CLOSE_TIMEOUT,
            );
            if let Err(e) = result {
                debug!("{} close did not complete: {}", self.settings.name, e);
            }
        }

        live.event_loop.shutdown();
        self.open.store(false, Ordering::SeqCst);
        info!("{} closed", self.settings.name);
    }

    fn channel_closed(&self) -> CrescoError {
        CrescoError::ChannelClosed {
            channel: self.settings.name.to_string(),
        }
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn pump(
    name: &'static str,
    stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    callbacks: StreamCallbacks,
    open: Arc<AtomicBool>,
) {
    let (mut sink, mut inbound) = stream.split();

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Frame { message, ack }) => {
                    let result = sink.send(message).await.map_err(CrescoError::from);
                    let broken = result.is_err();
                    let _ = ack.send(result);
                    if broken {
                        break;
                    }
                }
                Some(Outbound::Close { ack }) => {
                    let _ = sink.close().await;
                    let _ = ack.send(());
                    break;
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(text))) => callbacks.deliver_text(name, text.as_str()),
                Some(Ok(Message::Binary(data))) => callbacks.deliver_binary(name, &data),
                Some(Ok(Message::Close(frame))) => {
                    info!("{} closed by server: {:?}", name, frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("{} read failed: {}", name, e);
                    break;
                }
                None => break,
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    debug!("{} pump stopped", name);
}
