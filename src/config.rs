use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub miniflux: MinifluxConfig,
    pub rsshub: RssHubConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub api_id: i64,

    /// May be left out when `TELEFLUX_API_HASH` supplies it
    #[serde(default)]
    pub api_hash: String,

    /// Base URL of the HTTP gateway that holds the Telegram session
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    pub notify_chat_id: ChatTarget,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinifluxConfig {
    pub url: String,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RssHubConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub folders: FolderMapping,

    pub remove_absent_feeds: bool,

    pub private_feed_mode: PrivateFeedMode,

    #[serde(default = "default_true")]
    pub validate_feeds: bool,

    #[serde(default)]
    pub notify_no_changes: bool,

    #[serde(default)]
    pub keep_emojis_in_titles: bool,

    #[serde(default)]
    pub disable_title_updates: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Overrides `telegram.notify_chat_id` when set
    #[serde(default)]
    pub chat_id: Option<ChatTarget>,
}

/// How channels without a public username are turned into feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivateFeedMode {
    Secret,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Notification recipient: `me`, `@username` or a numeric chat id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_yaml::Value", into = "String")]
pub enum ChatTarget {
    Me,
    Username(String),
    Id(i64),
}

impl TryFrom<serde_yaml::Value> for ChatTarget {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> std::result::Result<Self, Self::Error> {
        const MESSAGE: &str = "telegram.notify_chat_id must be 'me', '@username', or a number";
        match value {
            serde_yaml::Value::Number(n) => n.as_i64().map(ChatTarget::Id).ok_or_else(|| MESSAGE.to_string()),
            serde_yaml::Value::String(s) if s == "me" => Ok(ChatTarget::Me),
            serde_yaml::Value::String(s) if s.starts_with('@') && s.len() > 1 => Ok(ChatTarget::Username(s)),
            serde_yaml::Value::String(s) => s.trim().parse().map(ChatTarget::Id).map_err(|_| MESSAGE.to_string()),
            _ => Err(MESSAGE.to_string()),
        }
    }
}

impl From<ChatTarget> for String {
    fn from(target: ChatTarget) -> Self {
        target.to_string()
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatTarget::Me => write!(f, "me"),
            ChatTarget::Username(name) => write!(f, "{}", name),
            ChatTarget::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Ordered `folder -> category` pairs. Order is the conflict priority.
///
/// Accepts either a list (folder name doubles as category name) or a map.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "serde_yaml::Value")]
pub struct FolderMapping(Vec<(String, String)>);

impl FolderMapping {
    pub fn new<I, F, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, C)>,
        F: Into<String>,
        C: Into<String>,
    {
        Self(pairs.into_iter().map(|(f, c)| (f.into(), c.into())).collect())
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            names
                .into_iter()
                .map(|n| {
                    let n = n.into();
                    (n.clone(), n)
                })
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(f, c)| (f.as_str(), c.as_str()))
    }

    pub fn folder_names(&self) -> Vec<String> {
        self.0.iter().map(|(f, _)| f.clone()).collect()
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.0.iter().map(|(_, c)| c.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<serde_yaml::Value> for FolderMapping {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> std::result::Result<Self, Self::Error> {
        let scalar = |v: &serde_yaml::Value| -> Option<String> {
            match v {
                serde_yaml::Value::String(s) => Some(s.clone()),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };

        match value {
            serde_yaml::Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    scalar(item)
                        .map(|name| (name.clone(), name))
                        .ok_or_else(|| "sync.folders list entries must be folder names".to_string())
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(FolderMapping),
            serde_yaml::Value::Mapping(map) => map
                .iter()
                .map(|(k, v)| match (scalar(k), scalar(v)) {
                    (Some(folder), Some(category)) => Ok((folder, category)),
                    _ => Err("sync.folders entries must map a folder name to a category name".to_string()),
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(FolderMapping),
            _ => Err("sync.folders must be a dictionary or a list".to_string()),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    /// Load a file, let environment variables fill or replace values, then validate
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let mut config = Self::parse(&std::fs::read_to_string(path)?)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Deserialize and normalize without validating
    fn parse(content: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(content).map_err(|e| {
            let message = e.to_string();
            if message.contains("could not find expected ':'") && content.contains("folders:") {
                Error::Config(format!(
                    "YAML parsing error: it looks like you might be mixing dictionary and list formats in the 'folders' section.\n\
                     Please use either:\n  Dictionary format: folders: {{\"AI\": \"AI\", \"Tech\": \"Technology\"}}\n  \
                     List format: folders: [\"AI\", \"Tech\"]\nOriginal error: {}",
                    message
                ))
            } else {
                Error::Config(message)
            }
        })?;

        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        self.miniflux.url = self.miniflux.url.trim_end_matches('/').to_string();
        self.rsshub.base_url = self.rsshub.base_url.trim_end_matches('/').to_string();
        self.telegram.gateway_url = self.telegram.gateway_url.trim_end_matches('/').to_string();
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("miniflux.url", &self.miniflux.url),
            ("rsshub.base_url", &self.rsshub.base_url),
            ("telegram.gateway_url", &self.telegram.gateway_url),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|e| Error::Config(format!("{} is not a valid URL ({}): {}", field, e, value)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Config(format!("{} must use http or https: {}", field, value)));
            }
        }

        if self.sync.folders.is_empty() {
            return Err(Error::Config("sync.folders must contain at least one folder".to_string()));
        }

        for (folder, category) in self.sync.folders.iter() {
            if folder.trim().is_empty() || category.trim().is_empty() {
                return Err(Error::Config("sync.folders cannot contain empty names".to_string()));
            }
        }

        let has_token = self.miniflux.token.as_deref().map_or(false, |t| !t.is_empty());
        let has_basic = self.miniflux.username.is_some() && self.miniflux.password.is_some();
        if !has_token && !has_basic {
            return Err(Error::Config(
                "miniflux.token (or miniflux.username and miniflux.password) is required".to_string(),
            ));
        }

        if self.telegram.api_hash.is_empty() {
            return Err(Error::Config("telegram.api_hash cannot be empty".to_string()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TELEFLUX_MINIFLUX_TOKEN") {
            self.miniflux.token = Some(token);
        }

        if let Ok(hash) = std::env::var("TELEFLUX_API_HASH") {
            self.telegram.api_hash = hash;
        }

        if let Ok(level) = std::env::var("TELEFLUX_LOG_LEVEL") {
            match serde_yaml::from_str::<LogLevel>(&level.to_uppercase()) {
                Ok(parsed) => self.logging.level = parsed,
                Err(_) => tracing::warn!("Ignoring invalid TELEFLUX_LOG_LEVEL: {}", level),
            }
        }
    }

    /// Title updates are on unless explicitly disabled
    pub fn title_updates_enabled(&self) -> bool {
        !self.sync.disable_title_updates
    }

    pub fn notification_target(&self) -> &ChatTarget {
        self.notifications.chat_id.as_ref().unwrap_or(&self.telegram.notify_chat_id)
    }

    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("teleflux"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            file: None,
            quiet: false,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chat_id: None,
        }
    }
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_session_file() -> PathBuf {
    PathBuf::from("data/teleflux.session")
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
telegram:
  api_id: 12345
  api_hash: "abcdef"
  notify_chat_id: "me"
miniflux:
  url: "https://miniflux.example.com/"
  token: "secret-token"
rsshub:
  base_url: "https://rsshub.example.com/"
logging:
  level: INFO
"#;

    fn with_sync(sync: &str) -> String {
        format!("{}{}", BASE, sync)
    }

    #[test]
    fn test_load_dict_folders_keeps_order() {
        let config = Config::from_yaml_str(&with_sync(
            "sync:\n  folders:\n    Tech: Technology\n    AI: AI\n    News: Daily\n  remove_absent_feeds: true\n  private_feed_mode: skip\n",
        ))
        .unwrap();

        let pairs: Vec<_> = config.sync.folders.iter().collect();
        assert_eq!(pairs, vec![("Tech", "Technology"), ("AI", "AI"), ("News", "Daily")]);
        assert_eq!(config.miniflux.url, "https://miniflux.example.com");
        assert_eq!(config.rsshub.base_url, "https://rsshub.example.com");
        assert!(config.sync.validate_feeds);
        assert!(!config.sync.keep_emojis_in_titles);
        assert!(config.title_updates_enabled());
        assert!(config.notifications.enabled);
        assert_eq!(config.telegram.session_file, PathBuf::from("data/teleflux.session"));
    }

    #[test]
    fn test_load_list_folders() {
        let config = Config::from_yaml_str(&with_sync(
            "sync:\n  folders: [\"AI\", \"Tech\"]\n  remove_absent_feeds: false\n  private_feed_mode: secret\n",
        ))
        .unwrap();

        assert_eq!(config.sync.folders, FolderMapping::from_names(["AI", "Tech"]));
        assert_eq!(config.sync.private_feed_mode, PrivateFeedMode::Secret);
    }

    #[test]
    fn test_invalid_folders_shape() {
        let err = Config::from_yaml_str(&with_sync(
            "sync:\n  folders: \"AI\"\n  remove_absent_feeds: true\n  private_feed_mode: skip\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("sync.folders must be a dictionary or a list"));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_invalid_private_feed_mode() {
        let err = Config::from_yaml_str(&with_sync(
            "sync:\n  folders: [\"AI\"]\n  remove_absent_feeds: true\n  private_feed_mode: public\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("private_feed_mode"));
    }

    #[test]
    fn test_missing_required_field() {
        let err = Config::from_yaml_str(&with_sync("sync:\n  folders: [\"AI\"]\n  private_feed_mode: skip\n"))
            .unwrap_err();
        assert!(err.to_string().contains("remove_absent_feeds"));
    }

    #[test]
    fn test_invalid_log_level() {
        let yaml = with_sync("sync:\n  folders: [\"AI\"]\n  remove_absent_feeds: true\n  private_feed_mode: skip\n")
            .replace("level: INFO", "level: VERBOSE");
        assert!(Config::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_numeric_and_username_chat_targets() {
        let sync = "sync:\n  folders: [\"AI\"]\n  remove_absent_feeds: true\n  private_feed_mode: skip\n";
        let numeric = with_sync(sync).replace("notify_chat_id: \"me\"", "notify_chat_id: 123456789");
        assert_eq!(Config::from_yaml_str(&numeric).unwrap().telegram.notify_chat_id, ChatTarget::Id(123456789));

        let named = with_sync(sync).replace("notify_chat_id: \"me\"", "notify_chat_id: \"@teleflux_bot\"");
        assert_eq!(
            Config::from_yaml_str(&named).unwrap().telegram.notify_chat_id,
            ChatTarget::Username("@teleflux_bot".to_string())
        );

        let invalid = with_sync(sync).replace("notify_chat_id: \"me\"", "notify_chat_id: \"somebody\"");
        assert!(Config::from_yaml_str(&invalid).is_err());
    }

    #[test]
    fn test_requires_miniflux_credentials() {
        let yaml = with_sync("sync:\n  folders: [\"AI\"]\n  remove_absent_feeds: true\n  private_feed_mode: skip\n")
            .replace("  token: \"secret-token\"\n", "");
        let err = Config::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("miniflux.token"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/definitely/not/here/config.yml").unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(
            &path,
            with_sync("sync:\n  folders: [\"AI\"]\n  remove_absent_feeds: true\n  private_feed_mode: skip\n  keep_emojis_in_titles: true\n  disable_title_updates: true\n"),
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.sync.keep_emojis_in_titles);
        assert!(!config.title_updates_enabled());
    }

    #[test]
    fn test_env_supplies_missing_credentials() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        let yaml = with_sync("sync:\n  folders: [\"AI\"]\n  remove_absent_feeds: true\n  private_feed_mode: skip\n")
            .replace("  token: \"secret-token\"\n", "")
            .replace("  api_hash: \"abcdef\"\n", "");
        std::fs::write(&path, yaml).unwrap();

        assert!(Config::load(&path).is_err());

        std::env::set_var("TELEFLUX_MINIFLUX_TOKEN", "from-env");
        std::env::set_var("TELEFLUX_API_HASH", "hash-from-env");
        let loaded = Config::load_with_env(&path);
        std::env::remove_var("TELEFLUX_MINIFLUX_TOKEN");
        std::env::remove_var("TELEFLUX_API_HASH");

        let config = loaded.unwrap();
        assert_eq!(config.miniflux.token.as_deref(), Some("from-env"));
        assert_eq!(config.telegram.api_hash, "hash-from-env");
    }
}
