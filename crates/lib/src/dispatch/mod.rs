//! Conversation-update dispatch: classify the event, record lifecycle changes, welcome members.
//!
//! `Dispatcher::handle_conversation_update` is the single entry point the gateway calls once
//! per inbound event. It never fails: recorder, enumeration and per-recipient delivery failures
//! are logged and reported in the returned `DispatchReport`.

mod classify;
mod delivery;
mod welcome;

pub use classify::{classify, ClassificationOutcome, TEAM_RENAMED_EVENT_TYPE};
pub use delivery::{
    DeliveryFailure, DeliveryLog, DeliveryResult, DeliveryStage, Protocol,
};
pub use welcome::WelcomeOrchestrator;

use crate::activity::ConversationEvent;
use crate::card::ArtifactSource;
use crate::config::DeliveryConfig;
use crate::connector::{Connector, ConnectorError};
use crate::recorder::{MembershipRecorder, RecorderError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("opening channel to {member_id} failed: {reason}")]
    ChannelOpen { member_id: String, reason: String },
    #[error("delivering to {member_id} failed: {reason}")]
    Delivery { member_id: String, reason: String },
    #[error("listing members of {scope_id} failed: {source}")]
    Enumeration {
        scope_id: String,
        #[source]
        source: ConnectorError,
    },
    #[error("recording {operation} failed: {source}")]
    Recorder {
        operation: RecorderOperation,
        #[source]
        source: RecorderError,
    },
}

/// Recorder call made for one classification fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecorderOperation {
    TeamInfoUpdated,
    BotAdded,
    BotRemoved,
}

impl fmt::Display for RecorderOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderOperation::TeamInfoUpdated => f.write_str("team info update"),
            RecorderOperation::BotAdded => f.write_str("bot added"),
            RecorderOperation::BotRemoved => f.write_str("bot removed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderCall {
    pub operation: RecorderOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What one `handle_conversation_update` call did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// Activity id, or a generated id when the event carried none.
    pub event_id: String,
    pub outcome: ClassificationOutcome,
    pub recorded: Vec<RecorderCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enumeration_error: Option<String>,
    pub deliveries: Vec<DeliveryResult>,
}

impl DispatchReport {
    pub fn delivered_to(&self) -> Vec<&str> {
        self.deliveries
            .iter()
            .filter(|d| d.succeeded)
            .map(|d| d.member.id.as_str())
            .collect()
    }
}

/// Tuning for delivery fan-out.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub max_concurrency: usize,
    /// Budget for all network calls made for one event.
    pub event_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for DispatchOptions {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            event_timeout: Duration::from_secs(config.event_timeout_secs),
        }
    }
}

pub struct Dispatcher {
    recorder: Arc<dyn MembershipRecorder>,
    orchestrator: WelcomeOrchestrator,
    event_timeout: Duration,
}

impl Dispatcher {
    /// The welcome artifact is built once here and shared by every delivery.
    pub fn new(
        connector: Arc<dyn Connector>,
        recorder: Arc<dyn MembershipRecorder>,
        artifacts: &dyn ArtifactSource,
        options: DispatchOptions,
    ) -> Self {
        let artifact = Arc::new(artifacts.build_welcome_artifact());
        Self {
            recorder,
            orchestrator: WelcomeOrchestrator::new(connector, artifact, options.max_concurrency),
            event_timeout: options.event_timeout,
        }
    }

    /// Deadline for an event received at `received`.
    pub fn deadline_for(&self, received: Instant) -> Instant {
        received + self.event_timeout
    }

    /// Handle one conversation-update event with a deadline starting now.
    pub async fn handle_conversation_update(&self, event: &ConversationEvent) -> DispatchReport {
        self.handle_conversation_update_until(event, self.deadline_for(Instant::now()))
            .await
    }

    /// Handle one conversation-update event: all applicable facts fire, each isolated from
    /// the others' failures. Connector calls still pending at `deadline` fail as timed out.
    pub async fn handle_conversation_update_until(
        &self,
        event: &ConversationEvent,
        deadline: Instant,
    ) -> DispatchReport {
        let outcome = classify(event);
        let mut report = DispatchReport {
            event_id: event
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("evt-{}", uuid::Uuid::new_v4())),
            outcome: outcome.clone(),
            ..Default::default()
        };
        if outcome.is_empty() {
            log::debug!("dispatch: nothing to do for event {}", report.event_id);
            return report;
        }

        if outcome.is_team_renamed {
            report
                .recorded
                .push(self.record(RecorderOperation::TeamInfoUpdated, event).await);
        }
        if outcome.is_bot_added {
            report
                .recorded
                .push(self.record(RecorderOperation::BotAdded, event).await);
        }
        if outcome.is_bot_removed {
            report
                .recorded
                .push(self.record(RecorderOperation::BotRemoved, event).await);
        }

        let deliveries = DeliveryLog::new();
        self.orchestrator
            .welcome_members(event, &outcome.added_non_bot_members, deadline, &deliveries)
            .await;
        if outcome.is_bot_added {
            if let Err(e) = self
                .orchestrator
                .reintroduce_to_scope(event, deadline, &deliveries)
                .await
            {
                log::warn!("dispatch: bulk welcome skipped: {}", e);
                report.enumeration_error = Some(e.to_string());
            }
        }

        report.deliveries = deliveries.summary();
        if !report.deliveries.is_empty() {
            log::info!(
                "dispatch: event {}: {} welcome(s) delivered, {} failed",
                report.event_id,
                deliveries.succeeded(),
                deliveries.failed()
            );
        }
        report
    }

    async fn record(&self, operation: RecorderOperation, event: &ConversationEvent) -> RecorderCall {
        let result = match operation {
            RecorderOperation::TeamInfoUpdated => self.recorder.on_team_info_updated(event).await,
            RecorderOperation::BotAdded => self.recorder.on_bot_added(event).await,
            RecorderOperation::BotRemoved => self.recorder.on_bot_removed(event).await,
        };
        match result {
            Ok(()) => {
                log::info!(
                    "dispatch: recorded {} for {}",
                    operation,
                    event.team_or_conversation_id()
                );
                RecorderCall {
                    operation,
                    error: None,
                }
            }
            Err(source) => {
                let e = DispatchError::Recorder { operation, source };
                log::error!("dispatch: {}", e);
                RecorderCall {
                    operation,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
