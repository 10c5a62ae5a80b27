//! Background event loop that owns live connections.
//!
//! An [`EventLoop`] is a single named thread driving a current-thread tokio
//! runtime. Foreground threads never touch a socket directly: they schedule a
//! future onto the loop and block on the result with a mandatory timeout.
//!
//! # Failure semantics
//!
//! Scheduling onto a loop that was never started or has been shut down fails
//! immediately with [`CrescoError::LoopUnavailable`]. A task dropped by a
//! shutdown in progress surfaces the same error to its waiter rather than
//! leaving it blocked until the timeout.

use crate::error::{CrescoError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A single background thread running a cooperative scheduling loop.
#[derive(Debug)]
pub struct EventLoop {
    name: String,
    handle: Handle,
    thread_id: ThreadId,
    running: Arc<AtomicBool>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EventLoop {
    /// Spawn the loop thread and wait until its runtime is ready.
    pub fn start(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<std::io::Result<Handle>>(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let running = Arc::new(AtomicBool::new(false));

        let thread_running = running.clone();
        let thread_name = name.clone();
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                thread_running.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(runtime.handle().clone()));

                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });

                // Refuse new work before the runtime drops its remaining tasks
                thread_running.store(false, Ordering::SeqCst);
                debug!("Event loop {} stopped", thread_name);
            })?;

        let handle = ready_rx
            .recv()
            .map_err(|_| CrescoError::LoopUnavailable { name: name.clone() })??;
        let thread_id = thread.thread().id();

        debug!("Event loop {} started", name);

        Ok(Self {
            name,
            handle,
            thread_id,
            running,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Name of the loop thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether the loop accepts new work.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Check whether the calling thread is the loop thread.
    pub fn is_loop_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Schedule a future onto the loop without waiting for it.
    ///
    /// The returned [`Scheduled`] can be waited on with a timeout. Dropping it
    /// does not cancel the task; its result is discarded.
    pub fn schedule<F>(&self, future: F) -> Result<Scheduled<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.is_running() {
            return Err(CrescoError::LoopUnavailable {
                name: self.name.clone(),
            });
        }

        let (result_tx, result_rx) = mpsc::sync_channel(1);
        self.handle.spawn(async move {
            let _ = result_tx.send(future.await);
        });

        Ok(Scheduled {
            loop_name: self.name.clone(),
            result_rx,
        })
    }

    /// Schedule a future and block the calling thread until it completes.
    pub fn run<F>(&self, future: F, timeout: Duration) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_loop_thread() {
            return Err(CrescoError::Reentrant {
                name: self.name.clone(),
            });
        }
        self.schedule(future)?.wait(timeout)
    }

    /// Stop the loop and join its thread. Idempotent.
    ///
    /// Tasks still pending on the loop are dropped; their waiters observe
    /// [`CrescoError::LoopUnavailable`].
    pub fn shutdown(&self) {
        let shutdown_tx = self.shutdown_tx.lock().take();
        let Some(shutdown_tx) = shutdown_tx else {
            return;
        };
        let _ = shutdown_tx.send(());

        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if self.is_loop_thread() {
                // Joining ourselves would deadlock; the thread exits on return
                return;
            }
            if thread.join().is_err() {
                warn!("Event loop {} panicked during shutdown", self.name);
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Pending result of a future scheduled onto an [`EventLoop`].
#[derive(Debug)]
pub struct Scheduled<T> {
    loop_name: String,
    result_rx: mpsc::Receiver<T>,
}

impl<T> Scheduled<T> {
    /// Block until the task completes or `timeout` elapses.
    pub fn wait(self, timeout: Duration) -> Result<T> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(CrescoError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(CrescoError::LoopUnavailable {
                name: self.loop_name,
            }),
        }
    }
}
