// Caller-imposed bounds on a workflow run.
//
// The engine itself never gives up on a node that is still making progress.
// A deadline and a cancellation token are both checked only at poll
// boundaries, never while a request to Ironic is in flight.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::workflow::WorkflowError;

#[derive(Debug, Clone, Default)]
pub struct RunLimits {
    deadline: Option<(Instant, Duration)>,
    cancel: Option<CancellationToken>,
}

/// What the run was waiting on when it paused; used for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PauseContext<'a> {
    pub node: &'a str,
    pub target: &'a str,
    pub state: &'a str,
}

impl RunLimits {
    /// No deadline, no cancellation.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Give up once `budget` has elapsed, measured from now.
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.deadline = Some((Instant::now() + budget, budget));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn budget(&self) -> Option<Duration> {
        self.deadline.map(|(_, budget)| budget)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn check(&self, ctx: PauseContext<'_>) -> Result<(), WorkflowError> {
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled {
                node: ctx.node.to_string(),
                target: ctx.target.to_string(),
                state: ctx.state.to_string(),
            });
        }
        if let Some((deadline, budget)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(WorkflowError::Timeout {
                    node: ctx.node.to_string(),
                    target: ctx.target.to_string(),
                    state: ctx.state.to_string(),
                    budget,
                });
            }
        }
        Ok(())
    }

    /// Sleep `interval` between polls. Fails without sleeping if the run has
    /// been cancelled or its deadline has passed; a cancellation that arrives
    /// mid-sleep ends the sleep early.
    pub(crate) async fn pause(&self, interval: Duration, ctx: PauseContext<'_>) -> Result<(), WorkflowError> {
        self.check(ctx)?;
        debug!(node = %ctx.node, state = %ctx.state, "Waiting {:?} before next poll", interval);

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            None => tokio::time::sleep(interval).await,
        }
        self.check(ctx)
    }
}
