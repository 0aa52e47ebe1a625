use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Known notification categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ChatMessage,
    MatchFound,
    LikeReceived,
    System,
}

/// Delivery priority
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A stored notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Time-ordered unique id (UUID v7)
    pub id: String,
    pub owner_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Opaque structured payload
    #[serde(default)]
    pub data: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Caller-supplied fields for a new notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub owner_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Materialize a new notification with a service-assigned id and timestamp
    pub fn new(input: NewNotification) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            owner_id: input.owner_id,
            kind: input.kind,
            title: input.title,
            body: input.body,
            data: input.data,
            read: false,
            created_at: Utc::now(),
            priority: input.priority,
            channels: input.channels,
            expires_at: input.expires_at,
        }
    }

    /// Check if the notification has passed its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

/// Resolved user identity, cached by the read path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserIdentity {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
}
