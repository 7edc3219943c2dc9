pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChatTarget;
use crate::error::Result;

pub use client::{GatewayClient, GatewayConnector};

/// Name of the implicit folder holding channels that belong to no custom folder
pub const MAIN_FOLDER: &str = "Main";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
    pub folder: String,
    pub is_private: bool,
    pub access_secret: Option<String>,
}

impl Channel {
    pub fn public(id: i64, title: impl Into<String>, username: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            username: Some(username.into()),
            folder: folder.into(),
            is_private: false,
            access_secret: None,
        }
    }

    pub fn private(id: i64, title: impl Into<String>, folder: impl Into<String>, access_secret: Option<String>) -> Self {
        Self {
            id,
            title: title.into(),
            username: None,
            folder: folder.into(),
            is_private: true,
            access_secret,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// `None` for the implicit "Main" folder
    pub id: Option<i64>,
    pub name: String,
    pub channel_count: usize,
}

/// A dialog as reported by the gateway. Only `Channel` is syncable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Resource {
    Channel(DialogInfo),
    Supergroup(DialogInfo),
    Group(DialogInfo),
    Bot(DialogInfo),
    User(DialogInfo),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DialogInfo {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl Resource {
    pub fn as_channel(&self) -> Option<&DialogInfo> {
        match self {
            Resource::Channel(info) => Some(info),
            _ => None,
        }
    }
}

/// Channels of the requested folders plus whether folder enumeration worked
#[derive(Debug, Clone, Default)]
pub struct SourceSnapshot {
    pub channels: Vec<Channel>,
    /// Folder enumeration was unavailable and every channel was reported as "Main"
    pub degraded: bool,
}

/// An open session against the chat-folder source
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// All folders with channel counts, plus the implicit "Main" folder
    async fn list_folders(&self) -> Result<Vec<Folder>>;

    /// Channels of the named folders, one entry per (channel, folder) membership
    async fn channels_in_folders(&self, folders: &[String]) -> Result<SourceSnapshot>;

    /// Channels that belong to no custom folder
    async fn unfoldered_channels(&self) -> Result<Vec<Channel>>;

    /// End the session
    async fn close(&self) -> Result<()>;
}

/// Opens source sessions
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ChannelSource>>;
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_message(&self, chat: &ChatTarget, text: &str) -> Result<()>;
}

/// Strip the `-100` channel prefix and the sign from a peer id
pub fn normalize_peer_id(id: i64) -> i64 {
    let text = id.to_string();
    match text.strip_prefix("-100") {
        Some(rest) if !rest.is_empty() => rest.parse().unwrap_or_else(|_| saturating_abs(id)),
        _ => saturating_abs(id),
    }
}

fn saturating_abs(id: i64) -> i64 {
    id.checked_abs().unwrap_or(i64::MAX)
}

/// Deterministic access secret for a private channel
pub fn channel_secret(channel_id: i64, api_hash: &str) -> String {
    let digest = blake3::hash(format!("{}_{}", channel_id, api_hash).as_bytes());
    digest.to_hex()[..16].to_string()
}
