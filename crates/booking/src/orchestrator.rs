//! The negotiation orchestrator: the supervised turn loop that drives an
//! outbound booking.
//!
//! Each turn asks the local booking agent for an utterance, watches for a
//! handover request, sends the message to the peer, and classifies the
//! response.  Every suspension point carries its own deadline underneath
//! the overall budget, and every failure path returns a structured
//! outcome carrying the partial conversation history.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use ca_calendar::BookingPreferences;
use ca_domain::config::BookingConfig;
use ca_peer::PeerTransport;

use crate::agent::{AgentUtterance, LocalAgent};
use crate::autonomous::AutonomousContinuation;
use crate::classify::{classify, ClassifyPass, Disposition};
use crate::deadline::with_deadline;
use crate::intent::MeetingIntent;
use crate::progress::{emit, ProgressCallback, ProgressStatus};
use crate::turn::{preview, ConversationState, TurnMetadata};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BookingOutcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a negotiation produced.  Either a single confirmed booking or a
/// failure; no partial success.
#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub success: bool,
    /// One-line human-readable result.
    pub message: String,
    pub conversation_history: Vec<crate::turn::ConversationTurn>,
    /// Confirmation payload, present on success.
    pub booking_details: Option<Value>,
    pub handover_occurred: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Negotiation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One outbound negotiation.  Owns its conversation state; nothing is
/// shared across negotiations.
pub struct Negotiation {
    endpoint: String,
    target_agent_id: String,
    intent: MeetingIntent,
    prefs: BookingPreferences,
    agent: Arc<dyn LocalAgent>,
    transport: Arc<dyn PeerTransport>,
    progress: Option<ProgressCallback>,
    config: BookingConfig,
    state: ConversationState,
}

impl Negotiation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endpoint: impl Into<String>,
        target_agent_id: impl Into<String>,
        intent: MeetingIntent,
        prefs: BookingPreferences,
        agent: Arc<dyn LocalAgent>,
        transport: Arc<dyn PeerTransport>,
        config: BookingConfig,
    ) -> Self {
        let state = ConversationState::new(config.max_turns);
        Self {
            endpoint: endpoint.into(),
            target_agent_id: target_agent_id.into(),
            intent,
            prefs,
            agent,
            transport,
            progress: None,
            config,
            state,
        }
    }

    /// Attach an advisory progress callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Run the negotiation to completion under the overall deadline.
    pub async fn run(mut self) -> BookingOutcome {
        let overall = Duration::from_secs(self.config.overall_timeout_secs);
        tracing::info!(
            endpoint = %self.endpoint,
            target = %self.target_agent_id,
            max_turns = self.config.max_turns,
            overall_secs = overall.as_secs(),
            "starting booking negotiation"
        );

        match tokio::time::timeout(overall, self.run_inner()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let turn = self.state.current_turn.max(1);
                emit(
                    &self.progress,
                    turn,
                    ProgressStatus::Timeout,
                    format!("overall deadline ({}s) exceeded", overall.as_secs()),
                )
                .await;
                self.failure(format!(
                    "booking negotiation timed out after {} seconds",
                    overall.as_secs()
                ))
            }
        }
    }

    async fn run_inner(&mut self) -> BookingOutcome {
        emit(
            &self.progress,
            0,
            ProgressStatus::Starting,
            "initiating booking negotiation",
        )
        .await;

        // One-time agent initialization, bounded on its own.
        emit(
            &self.progress,
            0,
            ProgressStatus::Initializing,
            "initializing booking agent",
        )
        .await;
        let init_deadline = Duration::from_secs(self.config.agent_init_timeout_secs);
        if let Err(e) = with_deadline(init_deadline, "booking agent initialization", self.agent.init()).await
        {
            tracing::error!(error = %e, "agent initialization failed");
            return self.failure(e.to_string());
        }

        let booking_context =
            crate::prompts::booking_context(&self.intent, &self.prefs, &self.target_agent_id);
        let mut conversation_context = format!(
            "{booking_context}\n\nTarget agent endpoint: {}\nTarget agent id: {}",
            self.endpoint, self.target_agent_id
        );

        let agent_deadline = Duration::from_secs(self.config.agent_timeout_secs);
        let send_deadline = Duration::from_secs(self.config.send_timeout_secs);

        for turn in 1..=self.config.max_turns {
            self.state.current_turn = turn;
            tracing::info!(turn, max_turns = self.config.max_turns, "starting turn");

            emit(
                &self.progress,
                turn,
                ProgressStatus::Thinking,
                format!("turn {turn}/{}: booking agent is analyzing", self.config.max_turns),
            )
            .await;

            // 1. Ask the agent for its next utterance.
            let prompt = crate::prompts::turn_prompt(turn, &conversation_context);
            let raw = match with_deadline(
                agent_deadline,
                "booking agent",
                self.agent.utterance(&prompt),
            )
            .await
            {
                Ok(raw) => raw,
                Err(e) if e.is_timeout() => {
                    emit(&self.progress, turn, ProgressStatus::Timeout, e.to_string()).await;
                    return self.failure(format!(
                        "booking agent timed out on turn {turn}: could not formulate a message \
                         within {}s",
                        agent_deadline.as_secs()
                    ));
                }
                Err(e) => {
                    emit(&self.progress, turn, ProgressStatus::Error, e.to_string()).await;
                    return self.failure(format!("booking agent failed on turn {turn}: {e}"));
                }
            };

            let utterance = AgentUtterance::parse(&raw);

            // 2. Handover? Record the pending message and yield control.
            if let Some(handover) = &utterance.handover {
                tracing::info!(turn, reason = %handover.reason, "agent requested handover");
                // Skipped inside `emit` for the handover tag; kept for the log line.
                emit(
                    &self.progress,
                    turn,
                    ProgressStatus::Handover,
                    "agent taking over, continuing autonomously",
                )
                .await;

                self.state.handover_occurred = true;
                self.state.record(
                    utterance.message.clone(),
                    String::new(),
                    TurnMetadata {
                        handover_request: true,
                        agent_analysis: Some(preview(&raw, 500)),
                        ..Default::default()
                    },
                );

                let remaining = self.config.max_turns - turn;
                let continuation = AutonomousContinuation {
                    endpoint: self.endpoint.clone(),
                    target_agent_id: self.target_agent_id.clone(),
                    intent: self.intent.clone(),
                    prefs: self.prefs.clone(),
                    agent: self.agent.clone(),
                    transport: self.transport.clone(),
                    step_timeout: Duration::from_secs(self.config.autonomous_step_timeout_secs),
                };
                let result = continuation.run(&mut self.state, remaining).await;

                return BookingOutcome {
                    success: result.success,
                    message: result.message,
                    conversation_history: self.state.history.clone(),
                    booking_details: result.booking_details,
                    handover_occurred: true,
                };
            }

            // 3. Send to the peer, threading the continuity id.
            emit(
                &self.progress,
                turn,
                ProgressStatus::Sending,
                format!("turn {turn}/{}: sending to target agent", self.config.max_turns),
            )
            .await;

            let reply = match self
                .transport
                .send(
                    &self.endpoint,
                    &utterance.message,
                    self.state.target_context_id.as_deref(),
                    send_deadline,
                )
                .await
            {
                Ok(reply) => reply,
                Err(e) if e.is_timeout() => {
                    // The attempted turn is still part of the record.
                    self.state.record(
                        utterance.message,
                        String::new(),
                        TurnMetadata::default(),
                    );
                    emit(&self.progress, turn, ProgressStatus::Timeout, e.to_string()).await;
                    return self.failure(format!(
                        "target agent timed out on turn {turn}: no response within {}s",
                        send_deadline.as_secs()
                    ));
                }
                Err(e) => {
                    emit(&self.progress, turn, ProgressStatus::Error, e.to_string()).await;
                    return self.failure(format!("communication error on turn {turn}: {e}"));
                }
            };

            if let Some(ctx) = &reply.context_id {
                tracing::debug!(turn, context_id = %ctx, "stored continuity id");
                self.state.target_context_id = Some(ctx.clone());
            }

            // 4. Record the exchange.
            self.state.record(
                utterance.message.clone(),
                reply.text.clone(),
                TurnMetadata {
                    agent_analysis: Some(preview(&raw, 500)),
                    ..Default::default()
                },
            );
            conversation_context.push_str(&format!(
                "\n\nTurn {turn}:\nYou sent: {}\nTarget agent responded: {}",
                utterance.message, reply.text
            ));

            emit(
                &self.progress,
                turn,
                ProgressStatus::Received,
                format!("turn {turn}/{}: response received", self.config.max_turns),
            )
            .await;

            // 5. Classify and act.
            let analysis = classify(&reply.text, ClassifyPass::Strict);
            match analysis.disposition {
                Disposition::Complete => {
                    self.state.booking_complete = true;
                    emit(
                        &self.progress,
                        turn,
                        ProgressStatus::Complete,
                        analysis.message.clone(),
                    )
                    .await;
                    return BookingOutcome {
                        success: true,
                        message: analysis.message,
                        conversation_history: self.state.history.clone(),
                        booking_details: analysis.booking_details,
                        handover_occurred: false,
                    };
                }
                Disposition::Failed => {
                    emit(&self.progress, turn, ProgressStatus::Error, analysis.message.clone())
                        .await;
                    return self.failure(analysis.message);
                }
                Disposition::NeedsInfo => {
                    emit(
                        &self.progress,
                        turn,
                        ProgressStatus::InfoNeeded,
                        analysis.message.clone(),
                    )
                    .await;
                }
                Disposition::Processing => {
                    emit(
                        &self.progress,
                        turn,
                        ProgressStatus::Processing,
                        analysis.message.clone(),
                    )
                    .await;
                }
            }
        }

        emit(
            &self.progress,
            self.config.max_turns,
            ProgressStatus::Timeout,
            format!(
                "maximum turns ({}) reached without completing booking",
                self.config.max_turns
            ),
        )
        .await;
        self.failure(format!(
            "booking incomplete after {} turns",
            self.config.max_turns
        ))
    }

    fn failure(&self, message: String) -> BookingOutcome {
        BookingOutcome {
            success: false,
            message,
            conversation_history: self.state.history.clone(),
            booking_details: None,
            handover_occurred: self.state.handover_occurred,
        }
    }
}
