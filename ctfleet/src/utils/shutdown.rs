//! Process stop handling shared by both roles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Why the process is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Terminate,
    Interrupt,
    /// The role's own task returned, e.g. a worker that failed to start.
    RoleFinished,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Terminate => write!(f, "SIGTERM"),
            StopReason::Interrupt => write!(f, "SIGINT"),
            StopReason::RoleFinished => write!(f, "role finished"),
        }
    }
}

/// Waits for a stop request, then gives the role a bounded time to drain.
pub struct ShutdownListener {
    role_finished: Arc<Notify>,
    reason: Option<StopReason>,
}

impl ShutdownListener {
    pub fn new() -> Self {
        Self { role_finished: Arc::new(Notify::new()), reason: None }
    }

    /// Notified by the role task when it returns without being asked to.
    pub fn role_finished_handle(&self) -> Arc<Notify> {
        self.role_finished.clone()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason
    }

    pub async fn wait(&mut self) -> StopReason {
        let reason = tokio::select! {
            _ = terminated() => StopReason::Terminate,
            _ = tokio::signal::ctrl_c() => StopReason::Interrupt,
            _ = self.role_finished.notified() => StopReason::RoleFinished,
        };
        self.reason = Some(reason);
        info!(reason = %reason, "Stopping");
        reason
    }

    /// Runs `drain` and gives up after `timeout`.
    pub async fn drain<Fut>(&self, drain: Fut, timeout: Duration) -> Result<()>
    where
        Fut: Future<Output = Result<()>>,
    {
        info!(timeout_secs = timeout.as_secs(), "Draining");
        match tokio::time::timeout(timeout, drain).await {
            Ok(Ok(())) => {
                info!("Drained");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Drain failed");
                Err(e)
            }
            Err(_) => {
                error!(timeout_secs = timeout.as_secs(), "Drain timed out");
                Err(anyhow!("shutdown did not finish within {}s", timeout.as_secs()))
            }
        }
    }
}

impl Default for ShutdownListener {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn terminated() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminated() {
    std::future::pending::<()>().await;
}
