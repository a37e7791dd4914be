//! Interruptible waits. SIGINT/SIGTERM are watched on a helper thread and
//! forwarded over a channel so every wait in the daemon ends as soon as a
//! signal arrives.

use std::cell::Cell;
use std::io;
use std::thread;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Interrupted,
}

pub trait Sleeper {
    /// Blocks for `duration` unless shutdown is requested first.
    fn sleep(&self, duration: Duration) -> Wake;
}

pub struct ShutdownSignal {
    receiver: Receiver<()>,
    triggered: Cell<bool>,
}

impl ShutdownSignal {
    pub fn new(receiver: Receiver<()>) -> Self {
        Self {
            receiver,
            triggered: Cell::new(false),
        }
    }

    /// Spawns the signal watcher thread.
    pub fn install() -> io::Result<Self> {
        let (sender, receiver) = flume::bounded(1);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        thread::Builder::new()
            .name("signal-watcher".to_string())
            .spawn(move || watch(runtime, sender))?;
        Ok(Self::new(receiver))
    }
}

fn watch(runtime: tokio::runtime::Runtime, sender: Sender<()>) {
    runtime.block_on(async {
        match wait_for_signal().await {
            Ok(()) => {
                debug!("shutdown signal received");
                sender.try_send(()).ok();
            }
            Err(err) => warn!(error = %err, "unable to listen for shutdown signals"),
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}

impl Sleeper for ShutdownSignal {
    fn sleep(&self, duration: Duration) -> Wake {
        if self.triggered.get() {
            return Wake::Interrupted;
        }
        match self.receiver.recv_timeout(duration) {
            Ok(()) => {
                self.triggered.set(true);
                Wake::Interrupted
            }
            Err(RecvTimeoutError::Timeout) => Wake::Elapsed,
            // Watcher is gone; keep the cadence without interruption.
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(duration);
                Wake::Elapsed
            }
        }
    }
}
