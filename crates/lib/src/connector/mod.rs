//! Connector: the narrow capability the dispatcher uses to reach the messaging platform.
//!
//! Opening a proactive 1:1 channel and sending on it are separate calls so an open failure
//! can be told apart from a send failure. The default implementation talks to the platform's
//! REST connector with reqwest; tests substitute in-memory fakes.

mod client;

pub use client::BotConnectorClient;

use crate::activity::{ChannelAccount, MemberRef};
use crate::card::WelcomeArtifact;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("connector request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("connector api error: {0}")]
    Api(String),
    #[error("connector response invalid: {0}")]
    Decode(String),
    #[error("connector call timed out")]
    Timeout,
    #[error("connector call panicked")]
    Panicked,
}

/// Parameters for opening a personal (1:1) channel to one participant.
#[derive(Debug, Clone)]
pub struct OpenChannelRequest {
    pub service_url: String,
    pub participant: MemberRef,
    pub bot: ChannelAccount,
    pub tenant_id: Option<String>,
}

/// An open proactive channel to one recipient. Not `Clone`: a handle belongs to the attempt
/// that opened it and is consumed by the send.
#[derive(Debug)]
pub struct ChannelHandle {
    conversation_id: String,
    service_url: String,
    member_id: String,
}

impl ChannelHandle {
    pub fn new(
        conversation_id: impl Into<String>,
        service_url: impl Into<String>,
        member_id: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            service_url: service_url.into(),
            member_id: member_id.into(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Create a new 1:1 conversation with the participant.
    async fn open_channel(&self, request: &OpenChannelRequest)
        -> Result<ChannelHandle, ConnectorError>;

    /// Post the artifact to an opened channel. `notify` asks the platform to raise an alert.
    async fn send_message(
        &self,
        channel: ChannelHandle,
        artifact: &WelcomeArtifact,
        notify: bool,
    ) -> Result<(), ConnectorError>;

    /// List current members of a team or conversation.
    async fn list_scope_members(
        &self,
        service_url: &str,
        scope_id: &str,
    ) -> Result<Vec<ChannelAccount>, ConnectorError>;
}
