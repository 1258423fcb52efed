//! In-memory connector and recorder used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use herald_core::activity::{ChannelAccount, ChannelData, ConversationEvent, TeamInfo, TenantInfo};
use herald_core::card::{ArtifactSource, WelcomeArtifact};
use herald_core::connector::{ChannelHandle, Connector, ConnectorError, OpenChannelRequest};
use herald_core::recorder::{MembershipRecorder, RecorderError};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const SERVICE_URL: &str = "https://smba.example.net/emea/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open { member: String, tenant: Option<String> },
    Send { conversation: String, member: String, notify: bool },
    List { scope: String },
}

#[derive(Default)]
pub struct FakeConnector {
    pub scope_members: HashMap<String, Vec<String>>,
    pub fail_open: HashSet<String>,
    pub fail_send: HashSet<String>,
    pub fail_list: bool,
    pub panic_open: HashSet<String>,
    pub call_delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
    next_conversation: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: &str, members: &[&str]) -> Self {
        self.scope_members
            .insert(scope.to_string(), members.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn failing_open(mut self, member: &str) -> Self {
        self.fail_open.insert(member.to_string());
        self
    }

    pub fn failing_send(mut self, member: &str) -> Self {
        self.fail_send.insert(member.to_string());
        self
    }

    pub fn panicking_open(mut self, member: &str) -> Self {
        self.panic_open.insert(member.to_string());
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Open { member, .. } => Some(member),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<(String, String, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send {
                    conversation,
                    member,
                    notify,
                } => Some((conversation, member, notify)),
                _ => None,
            })
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(d) = self.call_delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open_channel(
        &self,
        request: &OpenChannelRequest,
    ) -> Result<ChannelHandle, ConnectorError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call::Open {
            member: request.participant.id.clone(),
            tenant: request.tenant_id.clone(),
        });
        self.pause().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.panic_open.contains(&request.participant.id) {
            panic!("connector bug for {}", request.participant.id);
        }
        if self.fail_open.contains(&request.participant.id) {
            return Err(ConnectorError::Api("createConversation failed: 403 Forbidden".to_string()));
        }
        let n = self.next_conversation.fetch_add(1, Ordering::SeqCst);
        Ok(ChannelHandle::new(
            format!("a:conv-{}", n),
            request.service_url.clone(),
            request.participant.id.clone(),
        ))
    }

    async fn send_message(
        &self,
        channel: ChannelHandle,
        _artifact: &WelcomeArtifact,
        notify: bool,
    ) -> Result<(), ConnectorError> {
        self.calls.lock().unwrap().push(Call::Send {
            conversation: channel.conversation_id().to_string(),
            member: channel.member_id().to_string(),
            notify,
        });
        if self.fail_send.contains(channel.member_id()) {
            return Err(ConnectorError::Api("sendToConversation failed: 429 Too Many Requests".to_string()));
        }
        Ok(())
    }

    async fn list_scope_members(
        &self,
        _service_url: &str,
        scope_id: &str,
    ) -> Result<Vec<ChannelAccount>, ConnectorError> {
        self.calls.lock().unwrap().push(Call::List {
            scope: scope_id.to_string(),
        });
        if self.fail_list {
            return Err(ConnectorError::Api("getConversationMembers failed: 404 Not Found".to_string()));
        }
        Ok(self
            .scope_members
            .get(scope_id)
            .map(|ids| ids.iter().map(ChannelAccount::new).collect())
            .unwrap_or_default())
    }
}

/// Connector whose `open_channel` panics before returning a future, so the panic escapes
/// the per-call guard and takes down the delivery task itself. Other members are delivered.
pub struct AbortingConnector {
    pub inner: FakeConnector,
    pub abort_for: String,
}

#[async_trait]
impl Connector for AbortingConnector {
    fn open_channel<'life0, 'life1, 'async_trait>(
        &'life0 self,
        request: &'life1 OpenChannelRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChannelHandle, ConnectorError>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        if request.participant.id == self.abort_for {
            panic!("open_channel aborted for {}", request.participant.id);
        }
        self.inner.open_channel(request)
    }

    async fn send_message(
        &self,
        channel: ChannelHandle,
        artifact: &WelcomeArtifact,
        notify: bool,
    ) -> Result<(), ConnectorError> {
        self.inner.send_message(channel, artifact, notify).await
    }

    async fn list_scope_members(
        &self,
        service_url: &str,
        scope_id: &str,
    ) -> Result<Vec<ChannelAccount>, ConnectorError> {
        self.inner.list_scope_members(service_url, scope_id).await
    }
}

#[derive(Default)]
pub struct FakeRecorder {
    pub fail: bool,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeRecorder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, name: &'static str) -> Result<(), RecorderError> {
        self.calls.lock().unwrap().push(name);
        if self.fail {
            return Err(RecorderError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "store is read-only",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MembershipRecorder for FakeRecorder {
    async fn on_team_info_updated(&self, _event: &ConversationEvent) -> Result<(), RecorderError> {
        self.push("team_info_updated")
    }

    async fn on_bot_added(&self, _event: &ConversationEvent) -> Result<(), RecorderError> {
        self.push("bot_added")
    }

    async fn on_bot_removed(&self, _event: &ConversationEvent) -> Result<(), RecorderError> {
        self.push("bot_removed")
    }
}

pub struct StaticCard;

impl ArtifactSource for StaticCard {
    fn build_welcome_artifact(&self) -> WelcomeArtifact {
        WelcomeArtifact {
            content_type: "application/vnd.microsoft.card.adaptive".to_string(),
            content: serde_json::json!({ "type": "AdaptiveCard", "version": "1.0", "body": [] }),
        }
    }
}

/// Conversation update addressed to `bot`, with optional team and tenant channel data.
pub fn event(bot: &str, added: &[&str], removed: &[&str]) -> ConversationEvent {
    ConversationEvent {
        typ: "conversationUpdate".to_string(),
        service_url: Some(SERVICE_URL.to_string()),
        recipient: ChannelAccount::new(bot),
        members_added: added.iter().map(|id| ChannelAccount::new(*id)).collect(),
        members_removed: removed.iter().map(|id| ChannelAccount::new(*id)).collect(),
        ..Default::default()
    }
}

pub fn in_team(mut event: ConversationEvent, team_id: &str, tenant_id: &str) -> ConversationEvent {
    let data = event.channel_data.get_or_insert_with(ChannelData::default);
    data.team = Some(TeamInfo {
        id: team_id.to_string(),
        name: None,
    });
    data.tenant = Some(TenantInfo {
        id: tenant_id.to_string(),
    });
    event
}
