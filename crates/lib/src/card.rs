//! Welcome artifact: the attachment sent to each newly reached member.
//!
//! The dispatcher treats the artifact as an opaque immutable value. `WelcomeCard` builds the
//! default adaptive-card payload from the configured base URI.

use serde::{Deserialize, Serialize};
use serde_json::json;

pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";

const DEFAULT_WELCOME_TEXT: &str = "Herald is your official team notifications assistant!";
const EMAIL_NOTIFICATIONS_TITLE: &str = "Email Notifications";

/// Message attachment: `{ "contentType", "content" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeArtifact {
    pub content_type: String,
    pub content: serde_json::Value,
}

/// Supplies the welcome artifact.
pub trait ArtifactSource: Send + Sync {
    fn build_welcome_artifact(&self) -> WelcomeArtifact;
}

/// Default welcome card: hero image, welcome text, and an optional email-notifications link.
#[derive(Debug, Clone)]
pub struct WelcomeCard {
    base_uri: String,
    welcome_text: String,
    email_notifications_url: Option<String>,
}

impl WelcomeCard {
    pub fn new(
        base_uri: impl Into<String>,
        welcome_text: Option<String>,
        email_notifications_url: Option<String>,
    ) -> Self {
        let base_uri: String = base_uri.into();
        Self {
            base_uri: base_uri.trim_end_matches('/').to_string(),
            welcome_text: welcome_text
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_WELCOME_TEXT.to_string()),
            email_notifications_url: email_notifications_url
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }

    fn image_url(&self, name: &str) -> String {
        format!("{}/Images/{}", self.base_uri, name)
    }

    fn email_columns(&self, url: &str) -> serde_json::Value {
        let open_url = json!({
            "type": "Action.OpenUrl",
            "url": url,
            "title": EMAIL_NOTIFICATIONS_TITLE,
        });
        json!({
            "type": "ColumnSet",
            "columns": [
                {
                    "type": "Column",
                    "width": "auto",
                    "items": [{
                        "type": "Image",
                        "url": self.image_url("EmailNotifications.png"),
                        "size": "Small",
                        "horizontalAlignment": "Center",
                        "spacing": "None",
                        "selectAction": open_url,
                    }],
                },
                {
                    "type": "Column",
                    "width": "auto",
                    "items": [{
                        "type": "TextBlock",
                        "text": EMAIL_NOTIFICATIONS_TITLE,
                        "color": "Accent",
                        "size": "Medium",
                        "horizontalAlignment": "Center",
                        "spacing": "None",
                    }],
                    "selectAction": open_url,
                },
            ],
        })
    }
}

impl ArtifactSource for WelcomeCard {
    fn build_welcome_artifact(&self) -> WelcomeArtifact {
        let mut items = vec![
            json!({ "type": "Image", "url": self.image_url("WelcomeCard.png") }),
            json!({
                "type": "RichTextBlock",
                "inlines": [
                    { "type": "TextRun", "text": self.welcome_text, "weight": "Bolder", "size": "Small" },
                    { "type": "TextRun", "text": " Use it to:", "size": "Small" },
                ],
            }),
        ];
        if let Some(ref url) = self.email_notifications_url {
            items.push(self.email_columns(url));
        }
        WelcomeArtifact {
            content_type: ADAPTIVE_CARD_CONTENT_TYPE.to_string(),
            content: json!({
                "type": "AdaptiveCard",
                "version": "1.0",
                "body": [{ "type": "Container", "items": items }],
            }),
        }
    }
}
