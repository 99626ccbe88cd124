//! Process lifecycle - the HTTP listener and the signal watcher run side by
//! side; whichever stops first takes the other one down with it.

use std::future::Future;
use std::io;
use std::sync::OnceLock;

use actix_web::dev::Server;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    #[error("listener failed: {0}")]
    Listener(#[source] io::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
}

/// Supervises the two long-running tasks of the gateway.
pub struct Coordinator {
    token: CancellationToken,
    phase: watch::Sender<Phase>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            token: CancellationToken::new(),
            phase,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Follow phase changes.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Cancelling this token starts a shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run `listener` and `watcher` until both have exited.
    ///
    /// The first task to finish cancels the shared token. The first error
    /// either task reported is returned once both are done.
    pub async fn run<L, LF, W, WF>(&self, listener: L, watcher: W) -> Result<(), LifecycleError>
    where
        L: FnOnce(CancellationToken) -> LF,
        LF: Future<Output = Result<(), LifecycleError>>,
        W: FnOnce(CancellationToken) -> WF,
        WF: Future<Output = Result<(), LifecycleError>>,
    {
        self.phase.send_replace(Phase::Running);
        tracing::info!("Gateway running");

        let first_error = OnceLock::new();
        tokio::join!(
            self.supervise("listener", listener(self.token.clone()), &first_error),
            self.supervise("signal watcher", watcher(self.token.clone()), &first_error),
        );

        self.phase.send_replace(Phase::Stopped);

        match first_error.into_inner() {
            Some(e) => Err(e),
            None => {
                tracing::info!("Gateway stopped");
                Ok(())
            }
        }
    }

    async fn supervise<F>(&self, task: &'static str, fut: F, first_error: &OnceLock<LifecycleError>)
    where
        F: Future<Output = Result<(), LifecycleError>>,
    {
        match fut.await {
            Ok(()) => tracing::info!(task, "Task exited"),
            Err(e) => {
                tracing::error!(task, error = %e, "Task failed");
                let _ = first_error.set(e);
            }
        }

        self.phase.send_if_modified(|phase| {
            if *phase == Phase::Running {
                *phase = Phase::ShuttingDown;
                true
            } else {
                false
            }
        });
        self.token.cancel();
    }
}

/// Serve until the server stops on its own or `token` is cancelled.
///
/// On cancellation the server stops accepting connections and in-flight
/// requests get the server's shutdown timeout to finish.
pub async fn serve(server: Server, token: CancellationToken) -> Result<(), LifecycleError> {
    let handle = server.handle();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result.map_err(LifecycleError::Listener),
        _ = token.cancelled() => {
            tracing::info!("Stopping listener, draining in-flight requests");
            // The stop is acknowledged from inside the server future, so both
            // have to be polled together.
            let (_, result) = tokio::join!(handle.stop(true), &mut server);
            result.map_err(LifecycleError::Listener)
        }
    }
}

/// Wait for Ctrl-C / SIGTERM, or for `token` to be cancelled.
pub async fn watch_signals(token: CancellationToken) -> Result<(), LifecycleError> {
    tokio::select! {
        result = shutdown_signal() => {
            result.map_err(LifecycleError::Signal)?;
            tracing::info!("Shutdown signal received");
            Ok(())
        }
        _ = token.cancelled() => Ok(()),
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
