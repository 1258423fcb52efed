//! Event classification: derive independent facts from one conversation-update event.

use crate::activity::{ConversationEvent, MemberRef};
use serde::Serialize;

/// Channel-data event type marking a team rename. Compared case-insensitively.
pub const TEAM_RENAMED_EVENT_TYPE: &str = "teamRenamed";

/// Facts derived from one event. Not mutually exclusive: several may hold at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationOutcome {
    pub is_team_renamed: bool,
    pub is_bot_added: bool,
    pub is_bot_removed: bool,
    /// Added members other than the bot, in event order.
    pub added_non_bot_members: Vec<MemberRef>,
}

impl ClassificationOutcome {
    /// True when no fact applies and there is nothing to dispatch.
    pub fn is_empty(&self) -> bool {
        !self.is_team_renamed
            && !self.is_bot_added
            && !self.is_bot_removed
            && self.added_non_bot_members.is_empty()
    }
}

/// Classify an event. Pure; missing fields yield false/empty rather than errors.
pub fn classify(event: &ConversationEvent) -> ClassificationOutcome {
    let bot_id = event.recipient.id.as_str();
    let is_team_renamed = event
        .channel_data
        .as_ref()
        .and_then(|d| d.event_type.as_deref())
        .map(|t| t.eq_ignore_ascii_case(TEAM_RENAMED_EVENT_TYPE))
        .unwrap_or(false);
    let is_bot_added = event.members_added.iter().any(|m| m.id == bot_id);
    let is_bot_removed = event.members_removed.iter().any(|m| m.id == bot_id);

    let scope = event.scope();
    let tenant_id = event.tenant_id();
    let added_non_bot_members = event
        .members_added
        .iter()
        .filter(|m| m.id != bot_id)
        .map(|m| MemberRef::from_account(m, scope, tenant_id))
        .collect();

    ClassificationOutcome {
        is_team_renamed,
        is_bot_added,
        is_bot_removed,
        added_non_bot_members,
    }
}
