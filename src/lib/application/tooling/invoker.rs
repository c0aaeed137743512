use super::error::{FailureClass, InvokeError};
use super::registry::SessionSlot;
use super::rpc::ToolCallOutcome;
use crate::config::ToolingConfig;
use serde_json::{Map as JsonMap, Value};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub attempts: u32,
    pub delay: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ToolingConfig::default())
    }
}

impl From<&ToolingConfig> for RetryPolicy {
    fn from(tooling: &ToolingConfig) -> Self {
        Self {
            attempts: tooling.attempts.max(1),
            delay: tooling.delay,
            call_timeout: tooling.call_timeout,
        }
    }
}

/// Runs one tool call against a session with bounded retry.
///
/// A tool-reported error is retried as is. A closed connection tears the
/// session down and, when another attempt follows, starts it again. Any other
/// failure is retried and, once the budget is spent, returned to the caller.
/// When every attempt ends in a tool-reported error the last such outcome is
/// returned so its text can reach the conversation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolInvoker {
    policy: RetryPolicy,
}

impl ToolInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn invoke(
        &self,
        slot: &SessionSlot,
        tool: &str,
        arguments: JsonMap<String, Value>,
    ) -> Result<ToolCallOutcome, InvokeError> {
        let _flight = slot.lock_flight().await;
        let session = slot.session();
        let server = session.name();
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 0u32;

        loop {
            let result = session
                .invoke(tool, arguments.clone(), self.policy.call_timeout)
                .await;
            attempt += 1;
            let exhausted = attempt >= attempts;

            match result {
                Ok(outcome) if !outcome.is_error => return Ok(outcome),
                Ok(outcome) => {
                    warn!(server, tool, attempt, attempts, "tool reported an error");
                    if exhausted {
                        error!(server, tool, attempts, "tool kept reporting errors");
                        return Ok(outcome);
                    }
                }
                Err(err) => match err.failure_class() {
                    FailureClass::Connection => {
                        session.stop().await;
                        if exhausted {
                            error!(server, tool, attempts, %err, "session stayed unreachable");
                            return Err(InvokeError::Disconnected {
                                server: server.to_string(),
                                tool: tool.to_string(),
                                attempts,
                                source: err,
                            });
                        }
                        warn!(server, tool, %err, "session closed, restarting it");
                        match session.start().await {
                            Ok(()) => info!(server, "session restarted"),
                            Err(start_err) => {
                                error!(server, err = %start_err, "failed to restart session")
                            }
                        }
                    }
                    FailureClass::Protocol => {
                        warn!(server, tool, attempt, attempts, %err, "tool call failed");
                        if exhausted {
                            error!(server, tool, attempts, "max retries reached");
                            return Err(InvokeError::Failed {
                                server: server.to_string(),
                                tool: tool.to_string(),
                                attempts,
                                source: err,
                            });
                        }
                    }
                },
            }

            tokio::time::sleep(self.policy.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::tooling::error::ToolInvokeError;
    use crate::application::tooling::session::{SessionState, ToolSession};
    use crate::application::tooling::testing::ScriptedSession;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_secs(1),
            call_timeout: Duration::from_secs(6),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tool_errors_use_exactly_the_attempt_budget() {
        let session = Arc::new(
            ScriptedSession::new("cost")
                .active()
                .otherwise(ToolCallOutcome::tool_error("division by zero")),
        );
        let slot = SessionSlot::new(session.clone());
        let started = Instant::now();

        let outcome = ToolInvoker::new(policy(3))
            .invoke(&slot, "estimate", JsonMap::new())
            .await
            .expect("tool error is reported, not raised");

        assert!(outcome.is_error);
        assert_eq!(outcome.text(), "division by zero");
        assert_eq!(session.calls().len(), 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(session.starts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_connection_rebuilds_once_before_next_attempt() {
        let session = ScriptedSession::new("cost").active();
        let closed = session.closed();
        let session = Arc::new(
            session
                .then(Err(closed))
                .then(Ok(ToolCallOutcome::success("12 500 EUR"))),
        );
        let slot = SessionSlot::new(session.clone());

        let outcome = ToolInvoker::new(policy(2))
            .invoke(&slot, "estimate", JsonMap::new())
            .await
            .expect("second attempt succeeds");

        assert_eq!(outcome.text(), "12 500 EUR");
        assert_eq!(session.starts(), 1);
        assert_eq!(session.stops(), 1);
        let calls = session.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].starts_before, 0);
        assert_eq!(calls[1].starts_before, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rebuild_still_counts_and_eventually_surfaces() {
        let session = ScriptedSession::new("cost").active().failing_start();
        let closed = session.closed();
        let session = Arc::new(session.then(Err(closed)).then(Err(ToolInvokeError::NotStarted {
            server: "cost".into(),
        })));
        let slot = SessionSlot::new(session.clone());

        let err = ToolInvoker::new(policy(2))
            .invoke(&slot, "estimate", JsonMap::new())
            .await
            .expect_err("never reconnects");

        assert!(matches!(err, InvokeError::Disconnected { attempts: 2, .. }));
        assert_eq!(session.starts(), 1);
        assert_eq!(session.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_connection_on_last_attempt_is_not_rebuilt() {
        let session = ScriptedSession::new("cost").active();
        let closed = session.closed();
        let session = Arc::new(session.then(Err(closed)));
        let slot = SessionSlot::new(session.clone());

        let err = ToolInvoker::new(policy(1))
            .invoke(&slot, "estimate", JsonMap::new())
            .await
            .expect_err("single attempt spent");

        assert!(matches!(err, InvokeError::Disconnected { attempts: 1, .. }));
        assert_eq!(session.stops(), 1);
        assert_eq!(session.starts(), 0);
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_errors_propagate_after_budget() {
        let session = Arc::new(
            ScriptedSession::new("cost")
                .active()
                .then(Err(ToolInvokeError::Timeout {
                    server: "cost".into(),
                    timeout: Duration::from_secs(6),
                }))
                .then(Err(ToolInvokeError::Rpc {
                    server: "cost".into(),
                    code: -32602,
                    message: "invalid params".into(),
                })),
        );
        let slot = SessionSlot::new(session.clone());
        let started = Instant::now();

        let err = ToolInvoker::new(policy(2))
            .invoke(&slot, "estimate", JsonMap::new())
            .await
            .expect_err("budget spent");

        match err {
            InvokeError::Failed {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 2);
                assert!(matches!(source, ToolInvokeError::Rpc { code: -32602, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.starts(), 0);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_a_transient_tool_error() {
        let session = Arc::new(
            ScriptedSession::new("cost")
                .active()
                .then(Ok(ToolCallOutcome::tool_error("busy")))
                .then(Ok(ToolCallOutcome::success("done"))),
        );
        let slot = SessionSlot::new(session.clone());

        let outcome = ToolInvoker::default()
            .invoke(&slot, "estimate", JsonMap::new())
            .await
            .expect("second attempt succeeds");
        assert!(!outcome.is_error);
        assert_eq!(outcome.text(), "done");
    }
}
