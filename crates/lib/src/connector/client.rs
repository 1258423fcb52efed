//! REST connector client: create conversation, post activity, list members.

use crate::activity::ChannelAccount;
use crate::card::WelcomeArtifact;
use crate::connector::{ChannelHandle, Connector, ConnectorError, OpenChannelRequest};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct ConversationResource {
    id: String,
}

/// Connector client for the platform's `/v3/conversations` API, rooted at each event's
/// service URL. Sends an optional bearer token; obtaining one is the caller's concern.
#[derive(Clone)]
pub struct BotConnectorClient {
    token: Option<String>,
    client: reqwest::Client,
}

impl BotConnectorClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            client: reqwest::Client::new(),
        }
    }

    /// `{service_url}/v3/conversations/{segments...}` with each segment percent-encoded.
    fn conversations_url(service_url: &str, segments: &[&str]) -> Result<Url, ConnectorError> {
        let mut url = Url::parse(service_url)
            .map_err(|e| ConnectorError::Api(format!("invalid service url {}: {}", service_url, e)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ConnectorError::Api(format!("service url cannot be a base: {}", service_url)))?;
            path.pop_if_empty().push("v3").push("conversations");
            for s in segments {
                path.push(s);
            }
        }
        Ok(url)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn check(res: reqwest::Response, what: &str) -> Result<reqwest::Response, ConnectorError> {
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ConnectorError::Api(format!("{} failed: {} {}", what, status, body)));
        }
        Ok(res)
    }
}

#[async_trait]
impl Connector for BotConnectorClient {
    async fn open_channel(
        &self,
        request: &OpenChannelRequest,
    ) -> Result<ChannelHandle, ConnectorError> {
        let url = Self::conversations_url(&request.service_url, &[])?;
        let mut body = json!({
            "isGroup": false,
            "bot": request.bot,
            "members": [{ "id": request.participant.id }],
        });
        if let Some(ref tenant) = request.tenant_id {
            body["tenantId"] = json!(tenant);
            body["channelData"] = json!({ "tenant": { "id": tenant } });
        }
        let res = self.authorized(self.client.post(url).json(&body)).send().await?;
        let res = Self::check(res, "createConversation").await?;
        let resource: ConversationResource = res
            .json()
            .await
            .map_err(|e| ConnectorError::Decode(e.to_string()))?;
        if resource.id.trim().is_empty() {
            return Err(ConnectorError::Decode("createConversation returned an empty id".to_string()));
        }
        Ok(ChannelHandle::new(
            resource.id,
            request.service_url.clone(),
            request.participant.id.clone(),
        ))
    }

    async fn send_message(
        &self,
        channel: ChannelHandle,
        artifact: &WelcomeArtifact,
        notify: bool,
    ) -> Result<(), ConnectorError> {
        let url = Self::conversations_url(
            channel.service_url(),
            &[channel.conversation_id(), "activities"],
        )?;
        let body = json!({
            "type": "message",
            "textFormat": "xml",
            "conversation": { "id": channel.conversation_id() },
            "attachments": [artifact],
            "channelData": { "notification": { "alert": notify } },
        });
        let res = self.authorized(self.client.post(url).json(&body)).send().await?;
        Self::check(res, "sendToConversation").await?;
        Ok(())
    }

    async fn list_scope_members(
        &self,
        service_url: &str,
        scope_id: &str,
    ) -> Result<Vec<ChannelAccount>, ConnectorError> {
        let url = Self::conversations_url(service_url, &[scope_id, "members"])?;
        let res = self.authorized(self.client.get(url)).send().await?;
        let res = Self::check(res, "getConversationMembers").await?;
        res.json()
            .await
            .map_err(|e| ConnectorError::Decode(e.to_string()))
    }
}
