//! Orderly shutdown: flush, refund, redirect, stop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broadcast::{Broadcast, Envelope, Outbound};
use crate::session::{AbortReason, RefundReport};

use super::{LOG_TARGET, SessionHandle};

/// Something that holds player value and must release it before exit.
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> String;

    /// Aborts running rounds and returns every stake.
    async fn refund_all(&self, reason: AbortReason) -> RefundReport;

    /// Pushes credits still owed from earlier rounds into the ledger.
    async fn collect_transient_progress(&self) -> RefundReport;
}

#[async_trait]
impl ShutdownHook for SessionHandle {
    fn name(&self) -> String {
        self.kind().to_string()
    }

    async fn refund_all(&self, reason: AbortReason) -> RefundReport {
        match SessionHandle::refund_all(self, reason).await {
            Ok(report) => report,
            Err(err) => {
                warn!(target: LOG_TARGET, game = %self.kind(), %err, "refund skipped");
                RefundReport::default()
            }
        }
    }

    async fn collect_transient_progress(&self) -> RefundReport {
        self.retry_pending().await.unwrap_or_else(|err| {
            warn!(target: LOG_TARGET, game = %self.kind(), %err, "credit retry skipped");
            RefundReport::default()
        })
    }
}

/// What a shutdown released, per hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Hook name and what it credited or left owing.
    pub hooks: Vec<(String, RefundReport)>,
}

impl ShutdownReport {
    /// Everything credited or owed, across hooks.
    #[must_use]
    pub fn total(&self) -> RefundReport {
        let mut total = RefundReport::default();
        for (_, report) in &self.hooks {
            total.merge(report.clone());
        }
        total
    }
}

/// Runs the shutdown sequence exactly once.
///
/// 1. Tell every client to flush unsent progress, then wait `grace`.
/// 2. Refund every running round and retry credits still owed.
/// 3. Tell every client to reconnect elsewhere.
/// 4. Cancel `token`, which stops the transport and the session actors.
///
/// Concurrent and repeated calls wait for the same run and get the same
/// report.
pub struct ShutdownCoordinator {
    hooks: Vec<Arc<dyn ShutdownHook>>,
    broadcast: Arc<dyn Broadcast>,
    grace: Duration,
    token: CancellationToken,
    report: OnceCell<ShutdownReport>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator with no hooks.
    #[must_use]
    pub fn new(broadcast: Arc<dyn Broadcast>, grace: Duration, token: CancellationToken) -> Self {
        Self {
            hooks: Vec::new(),
            broadcast,
            grace,
            token,
            report: OnceCell::new(),
        }
    }

    /// Adds a hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn ShutdownHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Adds a hook per session handle.
    #[must_use]
    pub fn with_sessions<'a>(mut self, sessions: impl IntoIterator<Item = &'a SessionHandle>) -> Self {
        for session in sessions {
            self.hooks.push(Arc::new(session.clone()));
        }
        self
    }

    /// Token cancelled once shutdown completes.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns whether shutdown has completed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.report.initialized()
    }

    /// Shuts down, or waits for the shutdown already under way.
    pub async fn shutdown(&self) -> &ShutdownReport {
        self.report.get_or_init(|| self.run()).await
    }

    async fn run(&self) -> ShutdownReport {
        info!(target: LOG_TARGET, hooks = self.hooks.len(), grace_ms = self.grace.as_millis() as u64, "shutdown started");
        self.broadcast
            .to_all(&Envelope::server(Outbound::FlushProgress));
        tokio::time::sleep(self.grace).await;

        let mut report = ShutdownReport::default();
        for hook in &self.hooks {
            let refunded = hook.refund_all(AbortReason::Shutdown).await;
            // Failed refunds are queued and retried here, so only the retry
            // knows what is still owed.
            let retried = hook.collect_transient_progress().await;
            let mut released = RefundReport {
                credited: refunded.credited,
                pending: Vec::new(),
            };
            released.merge(retried);
            if !released.pending.is_empty() {
                warn!(
                    target: LOG_TARGET,
                    hook = %hook.name(),
                    pending = released.total_pending(),
                    "credits still owed at shutdown"
                );
            }
            report.hooks.push((hook.name(), released));
        }

        self.broadcast.to_all(&Envelope::server(Outbound::Redirect {
            reason: "server shutting down".to_owned(),
        }));
        self.token.cancel();

        let total = report.total();
        info!(
            target: LOG_TARGET,
            refunded = total.total_credited(),
            pending = total.total_pending(),
            "shutdown complete"
        );
        report
    }
}
