use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::cli::Cli;
use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use crate::feed::MinifluxClient;
use crate::report::{self, Notifier};
use crate::sync::{SyncResult, Syncer};
use crate::telegram::{Channel, ChannelSource, Folder, GatewayClient, GatewayConnector, MAIN_FOLDER};

const EXIT_SERVICE_ERROR: i32 = 5;

/// Run one synchronization and send the notification. Returns the exit code.
///
/// An interrupted run returns `Error::Interrupted` and sends no notification.
pub async fn run_sync(config: &Config, dry_run: bool, quiet: bool) -> Result<i32> {
    if dry_run {
        info!("Starting teleflux in DRY RUN mode");
        info!("No actual changes will be made");
    } else {
        info!("Starting teleflux");
    }

    let connector = GatewayConnector::new(&config.telegram)?;
    let miniflux = MinifluxClient::new(&config.miniflux)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let watcher = {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current operation");
                cancel.store(true, Ordering::SeqCst);
            }
        })
    };

    let result = Syncer::new(config, &connector, &miniflux)
        .with_cancellation(Arc::clone(&cancel))
        .quiet(quiet)
        .sync_folders(dry_run)
        .await;

    watcher.abort();

    if result.interrupted || cancel.load(Ordering::SeqCst) {
        return Err(Error::Interrupted);
    }

    notify(config, &connector, &result).await;

    if result.has_errors() {
        warn!("Synchronization completed with errors: {}", result.errors.len());
    } else {
        info!("Synchronization completed successfully");
    }

    Ok(0)
}

async fn notify(config: &Config, connector: &GatewayConnector, result: &SyncResult) {
    if !config.notifications.enabled {
        info!("Notifications are disabled in configuration");
        return;
    }
    if result.dry_run {
        info!("Skipping notification in dry run mode");
        return;
    }
    if !report::should_notify(result, config.sync.notify_no_changes) {
        info!("Skipping notification: no changes and notify_no_changes is disabled");
        return;
    }

    let client = match connector.open().await {
        Ok(client) => client,
        Err(e) => {
            error!("Error sending notification: {}", e);
            return;
        }
    };

    Notifier::new(&client, config.notification_target().clone(), config.sync.notify_no_changes)
        .send_sync_notification(result)
        .await;

    if let Err(e) = client.close().await {
        debug!("Error closing Telegram session: {}", e);
    }
}

/// Print every folder with its channel count, then check the configured mapping
pub async fn list_folders(config: &Config, quiet: bool) -> Result<i32> {
    let client = match open_session(config, quiet).await {
        Some(client) => client,
        None => return Ok(EXIT_SERVICE_ERROR),
    };

    let folders = client.list_folders().await;
    close_session(&client).await;

    let folders = match folders {
        Ok(folders) => folders,
        Err(e) => return Ok(service_error(&e, quiet)),
    };

    println!("{}", render_folder_list(&folders, config));
    Ok(0)
}

/// Print channels outside every custom folder
pub async fn list_unfoldered_channels(config: &Config, quiet: bool) -> Result<i32> {
    let client = match open_session(config, quiet).await {
        Some(client) => client,
        None => return Ok(EXIT_SERVICE_ERROR),
    };

    let channels = client.unfoldered_channels().await;
    close_session(&client).await;

    let channels = match channels {
        Ok(channels) => channels,
        Err(e) => return Ok(service_error(&e, quiet)),
    };

    println!("{}", render_unfoldered(&channels));
    Ok(0)
}

async fn open_session(config: &Config, quiet: bool) -> Option<GatewayClient> {
    let opened = match GatewayConnector::new(&config.telegram) {
        Ok(connector) => connector.open().await,
        Err(e) => Err(e),
    };

    match opened {
        Ok(client) => Some(client),
        Err(e) => {
            service_error(&e, quiet);
            None
        }
    }
}

async fn close_session(client: &GatewayClient) {
    if let Err(e) = client.close().await {
        debug!("Error closing Telegram session: {}", e);
    }
}

fn service_error(err: &Error, quiet: bool) -> i32 {
    error!("External service error: {}", err);
    if !quiet {
        eprintln!("External service error: {}", err);
    }
    EXIT_SERVICE_ERROR
}

pub fn render_folder_list(folders: &[Folder], config: &Config) -> String {
    let mut lines = vec![String::new(), "Available Telegram folders:".to_string(), "=".repeat(40)];

    for folder in folders {
        let marker = if folder.name == MAIN_FOLDER { "*" } else { " " };
        lines.push(format!("{} {:<20} {:>3} channels", marker, folder.name, folder.channel_count));
    }

    let total: usize = folders.iter().map(|f| f.channel_count).sum();
    lines.push(String::new());
    lines.push(format!("Total: {} folders, {} channels", folders.len(), total));

    if !config.sync.folders.is_empty() {
        lines.push(String::new());
        lines.push("Current configuration mapping:".to_string());

        let mut missing = false;
        for (folder, category) in config.sync.folders.iter() {
            if folders.iter().any(|f| f.name == folder) {
                lines.push(format!("  [OK] {} -> {}", folder, category));
            } else {
                missing = true;
                lines.push(format!("  [NOT FOUND] {} -> {}", folder, category));
            }
        }

        if missing {
            lines.push(String::new());
            lines.push("Warning: Some configured folders don't exist in your Telegram account!".to_string());
        }
    }

    lines.join("\n")
}

pub fn render_unfoldered(channels: &[Channel]) -> String {
    let mut lines = vec![
        String::new(),
        "Telegram channels not in any folder:".to_string(),
        "=".repeat(60),
    ];

    if channels.is_empty() {
        lines.push("No channels found outside of folders.".to_string());
        lines.push("All your channels are organized in folders!".to_string());
        return lines.join("\n");
    }

    for (i, channel) in channels.iter().enumerate() {
        lines.push(format!("{:3}. {}", i + 1, channel.title));
        match &channel.username {
            Some(username) if !channel.is_private => {
                lines.push(format!("     @{} (ID: {})", username, channel.id));
            }
            _ => {
                lines.push(format!("     Private channel (ID: {})", channel.id));
                if let Some(secret) = &channel.access_secret {
                    lines.push(format!("     Hash: {}", secret));
                }
            }
        }
    }

    lines.push(String::new());
    lines.push(format!("Total: {} channels not in any folder", channels.len()));
    lines.push(String::new());
    lines.push(format!("These channels are currently in the '{}' folder.", MAIN_FOLDER));

    lines.join("\n")
}

/// Create the directory that holds the session file
pub fn ensure_session_dir(session_file: &Path) -> Result<()> {
    match session_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
            fs::create_dir_all(dir)?;
            debug!("Created session directory: {}", dir.display());
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Generate shell completions
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let cmd_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, cmd_name, &mut std::io::stdout());
}

/// Initialize tracing to stderr and, when configured, to a log file.
///
/// Quiet mode only lets errors through. HTTP client internals are capped at `warn`.
pub fn init_logging(logging: &LoggingConfig, quiet: bool) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if quiet { "error" } else { logging.level.as_filter() };
    let filter = EnvFilter::try_new(format!("{},hyper=warn,reqwest=warn,h2=warn", level))
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))?;

    let debug = level == "debug";

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            fs::create_dir_all(dir)?;
            let file_name = path
                .file_name()
                .ok_or_else(|| Error::Config(format!("Invalid log file path: {}", path.display())))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_file(debug)
                .with_line_number(debug)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    debug!("Logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_yaml_str(
            r#"
telegram:
  api_id: 12345
  api_hash: "abcdef"
  notify_chat_id: "me"
miniflux:
  url: "http://localhost:8080"
  token: "t"
rsshub:
  base_url: "http://localhost:1200"
sync:
  folders:
    Tech: Technology
    Ghost: Nowhere
  remove_absent_feeds: false
  private_feed_mode: skip
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_render_folder_list() {
        let folders = vec![
            Folder { id: None, name: "Main".into(), channel_count: 4 },
            Folder { id: Some(2), name: "Tech".into(), channel_count: 12 },
        ];
        let output = render_folder_list(&folders, &config());

        assert!(output.contains("* Main                   4 channels"));
        assert!(output.contains("  Tech                  12 channels"));
        assert!(output.contains("Total: 2 folders, 16 channels"));
        assert!(output.contains("  [OK] Tech -> Technology"));
        assert!(output.contains("  [NOT FOUND] Ghost -> Nowhere"));
        assert!(output.ends_with("Warning: Some configured folders don't exist in your Telegram account!"));
    }

    #[test]
    fn test_render_unfoldered() {
        let channels = vec![
            Channel::public(10, "Public One", "pubone", MAIN_FOLDER),
            Channel::private(20, "Secret", MAIN_FOLDER, Some("0123456789abcdef".into())),
        ];
        let output = render_unfoldered(&channels);

        assert!(output.contains("  1. Public One\n     @pubone (ID: 10)"));
        assert!(output.contains("  2. Secret\n     Private channel (ID: 20)\n     Hash: 0123456789abcdef"));
        assert!(output.contains("Total: 2 channels not in any folder"));

        let empty = render_unfoldered(&[]);
        assert!(empty.ends_with("All your channels are organized in folders!"));
    }

    #[test]
    fn test_ensure_session_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let session = dir.path().join("nested/deeper/teleflux.session");
        ensure_session_dir(&session).unwrap();
        assert!(session.parent().unwrap().is_dir());

        ensure_session_dir(Path::new("bare.session")).unwrap();
    }
}
