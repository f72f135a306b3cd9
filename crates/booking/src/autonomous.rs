//! Autonomous continuation: the driven loop that takes over after a
//! handover signal and negotiates to completion without supervision.
//!
//! The loop reuses the same transport and classifier as the orchestrator
//! but with the lenient classification pass (error wins ties — an
//! unsupervised loop must bail out on clear rejection rather than retry).
//! The whole continuation runs under its own deadline enforced through a
//! cancellation token, with a monitor task as a safety net against missed
//! cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use ca_calendar::BookingPreferences;
use ca_peer::PeerTransport;

use crate::agent::{AgentUtterance, LocalAgent};
use crate::classify::{classify, ClassifyPass, Disposition};
use crate::deadline::with_deadline;
use crate::intent::MeetingIntent;
use crate::turn::{ConversationState, TurnMetadata};

/// Per-turn ceiling used to size the overall autonomous budget.
const AUTONOMOUS_SECS_PER_TURN: u64 = 45;

/// Hard cap on the whole autonomous continuation.
const AUTONOMOUS_MAX_SECS: u64 = 20;

/// Extra slack the timeout monitor waits before reporting drift.
const MONITOR_SLACK: Duration = Duration::from_millis(500);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct AutonomousResult {
    pub success: bool,
    pub message: String,
    pub booking_details: Option<Value>,
}

impl AutonomousResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            booking_details: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AutonomousContinuation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the driven loop needs, handed over by the orchestrator.
pub struct AutonomousContinuation {
    pub endpoint: String,
    pub target_agent_id: String,
    pub intent: MeetingIntent,
    pub prefs: BookingPreferences,
    pub agent: Arc<dyn LocalAgent>,
    pub transport: Arc<dyn PeerTransport>,
    /// Deadline for each agent call and each send inside the loop.
    pub step_timeout: Duration,
}

impl AutonomousContinuation {
    /// Overall budget: `min(45s × remaining, 20s)`.
    fn overall_deadline(remaining: u32) -> Duration {
        Duration::from_secs((AUTONOMOUS_SECS_PER_TURN * u64::from(remaining)).min(AUTONOMOUS_MAX_SECS))
    }

    /// Drive the conversation for up to `remaining` turns, recording into
    /// the shared negotiation state.
    pub async fn run(&self, state: &mut ConversationState, remaining: u32) -> AutonomousResult {
        if remaining == 0 {
            return AutonomousResult::failure("booking incomplete after 0 autonomous turns");
        }

        let deadline = Self::overall_deadline(remaining);
        tracing::info!(
            target = %self.target_agent_id,
            remaining,
            deadline_secs = deadline.as_secs(),
            "autonomous mode starting"
        );

        // The cancel token expires the loop; the monitor task is the
        // safety net that reports if cancellation failed to land.
        let cancel = CancellationToken::new();
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let monitor = tokio::spawn(timeout_monitor(
            cancel.clone(),
            finished.clone(),
            deadline + MONITOR_SLACK,
        ));

        let expiry = cancel.clone();
        let expiry_task = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            expiry.cancel();
        });

        let result = tokio::select! {
            result = self.run_loop(state, remaining) => result,
            _ = cancel.cancelled() => {
                tracing::error!(
                    deadline_secs = deadline.as_secs(),
                    "autonomous mode deadline expired, cancelling in-flight work"
                );
                AutonomousResult::failure(format!(
                    "autonomous mode timed out after {}s",
                    deadline.as_secs()
                ))
            }
        };

        finished.store(true, std::sync::atomic::Ordering::SeqCst);
        expiry_task.abort();
        monitor.abort();
        result
    }

    async fn run_loop(&self, state: &mut ConversationState, remaining: u32) -> AutonomousResult {
        for turn in 1..=remaining {
            tracing::info!(turn, remaining, "autonomous turn");

            // 1. Ask the agent for its next message, given the full history.
            let prompt = crate::prompts::autonomous_prompt(
                &self.target_agent_id,
                &self.endpoint,
                &self.intent,
                &self.prefs,
                &state.history,
                turn,
                remaining,
            );
            let raw = match with_deadline(
                self.step_timeout,
                "autonomous agent call",
                self.agent.utterance(&prompt),
            )
            .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::error!(turn, error = %e, "agent failed in autonomous mode");
                    return AutonomousResult::failure(format!(
                        "agent timed out on autonomous turn {turn}: {e}"
                    ));
                }
            };

            // Handover signals are meaningless here — control is already ours.
            let message = AgentUtterance::parse(&raw).message;

            // 2. Send, threading the continuity id.
            let reply = match self
                .transport
                .send(
                    &self.endpoint,
                    &message,
                    state.target_context_id.as_deref(),
                    self.step_timeout,
                )
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(turn, error = %e, "send failed in autonomous mode");
                    return AutonomousResult::failure(format!(
                        "communication error on autonomous turn {turn}: {e}"
                    ));
                }
            };

            if let Some(ctx) = &reply.context_id {
                state.target_context_id = Some(ctx.clone());
            }

            // 3. Record, flagged autonomous.
            state.record(
                message,
                reply.text.clone(),
                TurnMetadata {
                    autonomous: true,
                    ..Default::default()
                },
            );

            // 4. Classify with the lenient pass.
            let analysis = classify(&reply.text, ClassifyPass::Lenient);
            match analysis.disposition {
                Disposition::Complete => {
                    state.booking_complete = true;
                    tracing::info!(turn, "autonomous booking complete");
                    return AutonomousResult {
                        success: true,
                        message: "booking confirmed".into(),
                        booking_details: analysis.booking_details,
                    };
                }
                Disposition::Failed => {
                    tracing::warn!(turn, message = %analysis.message, "autonomous booking failed");
                    return AutonomousResult::failure(analysis.message);
                }
                Disposition::NeedsInfo | Disposition::Processing => {
                    tracing::debug!(turn, "continuing autonomous conversation");
                }
            }
        }

        AutonomousResult::failure(format!(
            "booking incomplete after {remaining} autonomous turns"
        ))
    }
}

/// Safety-net monitor: wakes slightly after the deadline and reports if
/// the continuation is still running — cancellation of blocked I/O is
/// best-effort, and a missed one must at least be visible in the logs.
async fn timeout_monitor(
    cancel: CancellationToken,
    finished: Arc<std::sync::atomic::AtomicBool>,
    wake_after: Duration,
) {
    tokio::time::sleep(wake_after).await;
    if !finished.load(std::sync::atomic::Ordering::SeqCst) {
        tracing::error!(
            cancelled = cancel.is_cancelled(),
            waited_secs = wake_after.as_secs_f64(),
            "timeout monitor: autonomous continuation still running past its deadline"
        );
    }
}
