//! Membership state recorder: bookkeeping for bot installs, removals, and team renames.
//!
//! The dispatcher only sees the `MembershipRecorder` trait. `JsonFileRecorder` keeps one
//! record per installation (team or conversation) and persists the list as JSON.

use crate::activity::{ConversationEvent, Scope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("recorder io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("recorder serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait MembershipRecorder: Send + Sync {
    async fn on_team_info_updated(&self, event: &ConversationEvent) -> Result<(), RecorderError>;
    async fn on_bot_added(&self, event: &ConversationEvent) -> Result<(), RecorderError>;
    async fn on_bot_removed(&self, event: &ConversationEvent) -> Result<(), RecorderError>;
}

/// One installation of the bot: a team, or a personal/group conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub service_url: Option<String>,
    pub scope: Scope,
    /// RFC 3339 timestamp of the latest bot-added event.
    pub installed_at: String,
}

/// Installation records held in memory and written to a JSON file after each change.
pub struct JsonFileRecorder {
    path: PathBuf,
    records: RwLock<Vec<InstallationRecord>>,
}

impl JsonFileRecorder {
    /// Load records from path; a missing or unreadable file starts empty.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                log::warn!("recorder: ignoring invalid {}: {}", path.display(), e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn records(&self) -> Vec<InstallationRecord> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<InstallationRecord> {
        let records = self.records.read().await;
        records.iter().find(|r| r.id == id).cloned()
    }

    async fn save(&self, records: &[InstallationRecord]) -> Result<(), RecorderError> {
        let json = serde_json::to_string_pretty(records)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write beside the target, then rename over it.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipRecorder for JsonFileRecorder {
    async fn on_team_info_updated(&self, event: &ConversationEvent) -> Result<(), RecorderError> {
        let id = event.team_or_conversation_id();
        let mut records = self.records.write().await;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            log::debug!("recorder: team info update for unknown installation {}", id);
            return Ok(());
        };
        let Some(name) = event.team_name().map(str::trim).filter(|n| !n.is_empty()) else {
            log::debug!("recorder: team info update for {} carries no name", id);
            return Ok(());
        };
        record.name = Some(name.to_string());
        self.save(&records).await
    }

    async fn on_bot_added(&self, event: &ConversationEvent) -> Result<(), RecorderError> {
        let record = InstallationRecord {
            id: event.team_or_conversation_id().to_string(),
            name: event.team_name().map(str::to_string),
            tenant_id: event.tenant_id().map(str::to_string),
            service_url: event.service_url.clone(),
            scope: event.scope(),
            installed_at: chrono::Utc::now().to_rfc3339(),
        };
        let mut records = self.records.write().await;
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
        } else {
            records.push(record);
        }
        self.save(&records).await
    }

    async fn on_bot_removed(&self, event: &ConversationEvent) -> Result<(), RecorderError> {
        let id = event.team_or_conversation_id();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            log::debug!("recorder: bot removed from unknown installation {}", id);
            return Ok(());
        }
        self.save(&records).await
    }
}
