//! Inbound activity payloads: conversation-update events as posted by the messaging platform.
//!
//! Only the fields the dispatcher reads are modelled. Everything except `type` defaults when
//! absent so a sparse event still parses and classifies.

use serde::{Deserialize, Deserializer, Serialize};

/// Activity type tag for membership and team-metadata changes.
pub const CONVERSATION_UPDATE: &str = "conversationUpdate";

/// A participant (user or bot) as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Conversation the event was raised in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// "personal", "groupChat" or "channel".
    #[serde(default)]
    pub conversation_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantInfo {
    pub id: String,
}

/// Platform-specific metadata attached to the event (team, tenant, event subtype).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelData {
    /// Event subtype, e.g. "teamRenamed".
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub team: Option<TeamInfo>,
    #[serde(default)]
    pub tenant: Option<TenantInfo>,
}

/// Whether a conversation is a 1:1 chat with the bot or a team/group context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Personal,
    Team,
}

/// A delivery target: participant identity plus the scope and tenant it was seen in.
/// Equality and hashing use the identity id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub scope: Scope,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl MemberRef {
    pub fn new(id: impl Into<String>, scope: Scope, tenant_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            scope,
            tenant_id,
        }
    }

    pub fn from_account(account: &ChannelAccount, scope: Scope, tenant_id: Option<&str>) -> Self {
        Self {
            id: account.id.clone(),
            name: account.name.clone(),
            scope,
            tenant_id: tenant_id.map(str::to_string),
        }
    }
}

impl PartialEq for MemberRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MemberRef {}

impl std::hash::Hash for MemberRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One inbound conversation-update event. Read-only once parsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEvent {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Base URL of the platform connector that serves this tenant.
    #[serde(default)]
    pub service_url: Option<String>,
    /// The bot's own identity.
    #[serde(default)]
    pub recipient: ChannelAccount,
    #[serde(default)]
    pub conversation: ConversationAccount,
    #[serde(default, deserialize_with = "null_as_default")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub members_removed: Vec<ChannelAccount>,
    #[serde(default)]
    pub channel_data: Option<ChannelData>,
}

/// Treat an explicit `null` the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ConversationEvent {
    pub fn is_conversation_update(&self) -> bool {
        self.typ.eq_ignore_ascii_case(CONVERSATION_UPDATE)
    }

    /// Team scope when channel data names a team, personal otherwise.
    pub fn scope(&self) -> Scope {
        match self.channel_data.as_ref().and_then(|d| d.team.as_ref()) {
            Some(_) => Scope::Team,
            None => Scope::Personal,
        }
    }

    /// Tenant id from channel data, falling back to the conversation's tenant.
    pub fn tenant_id(&self) -> Option<&str> {
        self.channel_data
            .as_ref()
            .and_then(|d| d.tenant.as_ref())
            .map(|t| t.id.as_str())
            .or(self.conversation.tenant_id.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Team id when present, else the conversation id.
    pub fn team_or_conversation_id(&self) -> &str {
        self.channel_data
            .as_ref()
            .and_then(|d| d.team.as_ref())
            .map(|t| t.id.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.conversation.id)
    }

    pub fn team_name(&self) -> Option<&str> {
        self.channel_data
            .as_ref()
            .and_then(|d| d.team.as_ref())
            .and_then(|t| t.name.as_deref())
    }
}
