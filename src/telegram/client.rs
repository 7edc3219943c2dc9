use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{ChatTarget, TelegramConfig};
use crate::error::{Error, Result};
use crate::telegram::{
    channel_secret, normalize_peer_id, Channel, ChannelSource, DialogInfo, Folder, NotificationSender,
    Resource, SourceConnector, SourceSnapshot, MAIN_FOLDER,
};

pub const MAX_FLOOD_RETRIES: u32 = 3;

/// Run a gateway call, sleeping through flood waits up to `max_retries` attempts
pub async fn with_flood_retry<T, F, Fut>(method: &str, max_retries: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 0..max_retries {
        match op().await {
            Err(Error::FloodWait { seconds, .. }) => {
                if attempt + 1 < max_retries {
                    warn!(
                        "FloodWait in {}: {}s. Waiting as required by Telegram... (attempt {}/{})",
                        method,
                        seconds,
                        attempt + 1,
                        max_retries
                    );
                    tokio::time::sleep(Duration::from_secs(seconds)).await;
                } else {
                    let message = format!("FloodWait on final attempt in {}: {}s. Giving up.", method, seconds);
                    error!("{}", message);
                    return Err(Error::Telegram {
                        method: method.to_string(),
                        message,
                    });
                }
            }
            other => return other,
        }
    }

    Err(Error::Telegram {
        method: method.to_string(),
        message: format!("Max retries ({}) reached in {}", max_retries, method),
    })
}

#[derive(Debug, Clone, Deserialize)]
struct DialogFilter {
    id: i64,
    title: String,
    #[serde(default)]
    include_peers: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct FloodBody {
    retry_after: Option<u64>,
}

#[derive(Debug, Clone)]
struct GatewaySettings {
    base_url: String,
    api_id: i64,
    api_hash: String,
    session: String,
}

/// Opens sessions against the Telegram HTTP gateway
#[derive(Debug, Clone)]
pub struct GatewayConnector {
    client: Client,
    settings: GatewaySettings,
}

impl GatewayConnector {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent("Teleflux")
            .build()
            .map_err(|e| Error::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        let session = config
            .session_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| config.session_file.to_string_lossy().into_owned());

        Ok(Self {
            client,
            settings: GatewaySettings {
                base_url: config.gateway_url.trim_end_matches('/').to_string(),
                api_id: config.api_id,
                api_hash: config.api_hash.clone(),
                session,
            },
        })
    }

    /// Check authorization and return a live session
    pub async fn open(&self) -> Result<GatewayClient> {
        let client = GatewayClient {
            client: self.client.clone(),
            settings: self.settings.clone(),
            closed: AtomicBool::new(false),
        };

        let me: serde_json::Value = client.call("connect", Method::GET, "/v1/me", None).await?;
        info!(
            "Connected to Telegram as {}",
            me.get("username")
                .and_then(|u| u.as_str())
                .or_else(|| me.get("first_name").and_then(|n| n.as_str()))
                .unwrap_or("unknown user")
        );

        Ok(client)
    }
}

#[async_trait]
impl SourceConnector for GatewayConnector {
    async fn connect(&self) -> Result<Box<dyn ChannelSource>> {
        Ok(Box::new(self.open().await?))
    }
}

/// A connected gateway session
#[derive(Debug)]
pub struct GatewayClient {
    client: Client,
    settings: GatewaySettings,
    closed: AtomicBool,
}

impl GatewayClient {
    async fn request_once(
        &self,
        method_name: &str,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Telegram {
                method: method_name.to_string(),
                message: "Session is closed".to_string(),
            });
        }

        let url = format!("{}{}", self.settings.base_url, path);
        let mut builder = self
            .client
            .request(method, &url)
            .header("X-Session", &self.settings.session)
            .header("X-Api-Id", self.settings.api_id.to_string());
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| Error::Telegram {
            method: method_name.to_string(),
            message: format!("Gateway request failed: {}", e),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status.as_u16() == 420 || status == StatusCode::TOO_MANY_REQUESTS {
            let header_wait = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body_wait = response
                .json::<FloodBody>()
                .await
                .ok()
                .and_then(|b| b.retry_after);
            return Err(Error::FloodWait {
                method: method_name.to_string(),
                seconds: body_wait.or(header_wait).unwrap_or(1),
            });
        }

        if status == StatusCode::NOT_FOUND || status == StatusCode::NOT_IMPLEMENTED {
            return Err(Error::NotFound(format!("{} ({})", path, status.as_u16())));
        }

        let text = response.text().await.unwrap_or_default();
        Err(Error::Telegram {
            method: method_name.to_string(),
            message: format!("HTTP {}: {}", status.as_u16(), text.chars().take(500).collect::<String>()),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method_name: &str,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let response = with_flood_retry(method_name, MAX_FLOOD_RETRIES, || {
            self.request_once(method_name, method.clone(), path, body.as_ref())
        })
        .await?;

        response.json::<T>().await.map_err(|e| Error::Telegram {
            method: method_name.to_string(),
            message: format!("Invalid gateway response: {}", e),
        })
    }

    /// Custom folders, or `None` when the gateway cannot enumerate them
    async fn dialog_filters(&self) -> Result<Option<Vec<DialogFilter>>> {
        match self.call("dialog_filters", Method::GET, "/v1/dialog_filters", None).await {
            Ok(filters) => Ok(Some(filters)),
            Err(Error::NotFound(_)) => {
                warn!("Folder enumeration unavailable; only the '{}' folder can be synchronized", MAIN_FOLDER);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Broadcast channels from the dialog list, in gateway order
    async fn channel_dialogs(&self) -> Result<Vec<DialogInfo>> {
        let resources: Vec<Resource> = self.call("dialogs", Method::GET, "/v1/dialogs", None).await?;
        let total = resources.len();
        let channels: Vec<DialogInfo> = resources.iter().filter_map(Resource::as_channel).cloned().collect();
        debug!("Analyzed {} dialogs, found {} channels", total, channels.len());
        Ok(channels)
    }

    fn to_channel(&self, info: &DialogInfo, folder: &str) -> Channel {
        let username = info.username.clone().filter(|u| !u.is_empty());
        let is_private = username.is_none();
        Channel {
            id: info.id,
            title: info.title.clone(),
            username,
            folder: folder.to_string(),
            is_private,
            access_secret: is_private.then(|| channel_secret(info.id, &self.settings.api_hash)),
        }
    }

    fn foldered_ids(filters: &[DialogFilter]) -> HashSet<i64> {
        filters
            .iter()
            .flat_map(|f| f.include_peers.iter().map(|p| normalize_peer_id(*p)))
            .collect()
    }
}

#[async_trait]
impl ChannelSource for GatewayClient {
    async fn list_folders(&self) -> Result<Vec<Folder>> {
        let dialogs = self.channel_dialogs().await?;
        let channel_ids: HashSet<i64> = dialogs.iter().map(|d| normalize_peer_id(d.id)).collect();

        let Some(filters) = self.dialog_filters().await? else {
            return Ok(vec![Folder {
                id: None,
                name: MAIN_FOLDER.to_string(),
                channel_count: dialogs.len(),
            }]);
        };

        let foldered = Self::foldered_ids(&filters);
        let mut folders: Vec<Folder> = filters
            .iter()
            .map(|f| Folder {
                id: Some(f.id),
                name: f.title.clone(),
                channel_count: f
                    .include_peers
                    .iter()
                    .filter(|p| channel_ids.contains(&normalize_peer_id(**p)))
                    .count(),
            })
            .collect();

        folders.push(Folder {
            id: None,
            name: MAIN_FOLDER.to_string(),
            channel_count: channel_ids.iter().filter(|id| !foldered.contains(id)).count(),
        });

        folders.sort_by(|a, b| (a.name != MAIN_FOLDER, &a.name).cmp(&(b.name != MAIN_FOLDER, &b.name)));
        Ok(folders)
    }

    async fn channels_in_folders(&self, folders: &[String]) -> Result<SourceSnapshot> {
        info!("Getting channels from folders: {:?}", folders);

        let dialogs = self.channel_dialogs().await?;

        let Some(filters) = self.dialog_filters().await? else {
            warn!("Folder-specific filtering unavailable - all channels assigned to '{}'", MAIN_FOLDER);
            let channels = dialogs.iter().map(|d| self.to_channel(d, MAIN_FOLDER)).collect();
            return Ok(SourceSnapshot {
                channels,
                degraded: true,
            });
        };

        let foldered = Self::foldered_ids(&filters);
        let mut channels = Vec::new();

        for folder in folders {
            let before = channels.len();

            if let Some(filter) = filters.iter().find(|f| &f.title == folder) {
                let peers: HashSet<i64> = filter.include_peers.iter().map(|p| normalize_peer_id(*p)).collect();
                channels.extend(
                    dialogs
                        .iter()
                        .filter(|d| peers.contains(&normalize_peer_id(d.id)))
                        .map(|d| self.to_channel(d, folder)),
                );
            } else if folder == MAIN_FOLDER {
                channels.extend(
                    dialogs
                        .iter()
                        .filter(|d| !foldered.contains(&normalize_peer_id(d.id)))
                        .map(|d| self.to_channel(d, folder)),
                );
            } else {
                warn!("Folder '{}' not found", folder);
                continue;
            }

            info!("Found {} channels in folder '{}'", channels.len() - before, folder);
        }

        info!("Found {} total channels across all specified folders", channels.len());
        Ok(SourceSnapshot {
            channels,
            degraded: false,
        })
    }

    async fn unfoldered_channels(&self) -> Result<Vec<Channel>> {
        let dialogs = self.channel_dialogs().await?;
        let foldered = match self.dialog_filters().await? {
            Some(filters) => Self::foldered_ids(&filters),
            None => HashSet::new(),
        };

        Ok(dialogs
            .iter()
            .filter(|d| !foldered.contains(&normalize_peer_id(d.id)))
            .map(|d| self.to_channel(d, MAIN_FOLDER))
            .collect())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Disconnected from Telegram gateway");
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for GatewayClient {
    async fn send_message(&self, chat: &ChatTarget, text: &str) -> Result<()> {
        let chat_id = match chat {
            ChatTarget::Id(id) => json!(id),
            other => json!(other.to_string()),
        };

        let _: serde_json::Value = self
            .call(
                "send_message",
                Method::POST,
                "/v1/messages",
                Some(json!({ "chat_id": chat_id, "text": text })),
            )
            .await?;

        debug!("Message sent to {}", chat);
        Ok(())
    }
}
