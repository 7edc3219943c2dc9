use std::time::Duration;
use tracing::{error, info};

use crate::config::ChatTarget;
use crate::error::Result;
use crate::sync::{SyncAction, SyncResult};
use crate::telegram::NotificationSender;

/// Telegram's message length limit, in characters
pub const MAX_MESSAGE_LENGTH: usize = 4096;
const MAX_ITEMS_TO_SHOW: usize = 20;
const MAX_ERROR_LENGTH: usize = 200;
const PART_DELAY: Duration = Duration::from_millis(100);

fn push_section<F>(lines: &mut Vec<String>, heading: &str, actions: &[SyncAction], mut item: F)
where
    F: FnMut(&SyncAction, &mut Vec<String>),
{
    if actions.is_empty() {
        return;
    }

    lines.push(format!("**{}** ({}):", heading, actions.len()));
    for action in actions.iter().take(MAX_ITEMS_TO_SHOW) {
        item(action, lines);
    }
    if actions.len() > MAX_ITEMS_TO_SHOW {
        lines.push(format!("  • ... and {} more", actions.len() - MAX_ITEMS_TO_SHOW));
    }
    lines.push(String::new());
}

fn with_category(title: &str, arrow: &str, category: &str) -> String {
    if category.is_empty() {
        format!("  • {}", title)
    } else {
        format!("  • {} {} {}", title, arrow, category)
    }
}

/// Human-readable summary of a run for the notification chat
pub fn format_sync_message(result: &SyncResult) -> String {
    let mut lines = Vec::new();
    let dry = result.dry_run;

    let status = match (result.has_actions(), result.has_errors(), dry) {
        (false, false, true) => "No changes would be made",
        (false, false, false) => "No changes required",
        (_, false, true) => "Dry run completed successfully",
        (_, false, false) => "Synchronization completed successfully",
        (_, true, true) => "⚠️ Dry run completed with errors",
        (_, true, false) => "⚠️ Synchronization completed with errors",
    };
    lines.push(format!("Sync Status: {}", status));

    if !result.has_actions() && !result.has_errors() {
        return lines.join("\n");
    }
    lines.push(String::new());

    push_section(
        &mut lines,
        if dry { "Would add feeds" } else { "Added feeds" },
        &result.added,
        |a, lines| lines.push(with_category(&a.channel_title, "→", &a.category_name)),
    );

    push_section(
        &mut lines,
        if dry { "Would remove feeds" } else { "Removed feeds" },
        &result.removed,
        |a, lines| lines.push(with_category(&a.channel_title, "←", &a.category_name)),
    );

    push_section(
        &mut lines,
        if dry { "Would update titles" } else { "Updated titles" },
        &result.updated_titles,
        |a, lines| {
            lines.push(format!(
                "  • {} → {}",
                a.old_title.as_deref().unwrap_or("Unknown"),
                a.channel_title
            ))
        },
    );

    push_section(
        &mut lines,
        if dry { "Would move feeds" } else { "Moved feeds" },
        &result.moved,
        |a, lines| {
            lines.push(format!("  • {}", a.channel_title));
            lines.push(format!(
                "    {} → {}",
                a.old_category.as_deref().unwrap_or("Unknown"),
                a.category_name
            ));
        },
    );

    if result.has_errors() {
        lines.push(format!("**Errors** ({}):", result.errors.len()));
        for err in result.errors.iter().take(MAX_ITEMS_TO_SHOW) {
            lines.push(format!("  • {}", truncate_error(err)));
        }
        if result.errors.len() > MAX_ITEMS_TO_SHOW {
            lines.push(format!("  • ... and {} more", result.errors.len() - MAX_ITEMS_TO_SHOW));
        }
        lines.push(String::new());
    }

    let parts: Vec<String> = [
        ("Added", result.added.len()),
        ("Removed", result.removed.len()),
        ("Updated", result.updated_titles.len()),
        ("Moved", result.moved.len()),
        ("Errors", result.errors.len()),
    ]
    .iter()
    .filter(|(_, n)| *n > 0)
    .map(|(label, n)| format!("{}: {}", label, n))
    .collect();

    lines.push(format!(
        "**Summary**: {}{}",
        parts.join(" | "),
        if dry { " (DRY RUN)" } else { "" }
    ));

    lines.join("\n")
}

fn truncate_error(err: &str) -> String {
    if err.chars().count() <= MAX_ERROR_LENGTH {
        err.to_string()
    } else {
        format!("{}...", err.chars().take(MAX_ERROR_LENGTH - 3).collect::<String>())
    }
}

/// Split a message into parts of at most `max_length` characters.
///
/// Prefers the last newline, then the last space, when it falls in the second
/// half of the window. The separator it splits on is dropped.
pub fn split_message(message: &str, max_length: usize) -> Vec<String> {
    let chars: Vec<char> = message.chars().collect();
    if chars.len() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut rest = &chars[..];

    while !rest.is_empty() {
        if rest.len() <= max_length {
            parts.push(rest.iter().collect());
            break;
        }

        let window = &rest[..max_length];
        let split_at = |sep: char| window.iter().rposition(|c| *c == sep).filter(|&i| i > max_length / 2);

        match split_at('\n').or_else(|| split_at(' ')) {
            Some(i) => {
                parts.push(rest[..i].iter().collect());
                rest = &rest[i + 1..];
            }
            None => {
                parts.push(window.iter().collect());
                rest = &rest[max_length..];
            }
        }
    }

    parts
}

/// A run with no actions and no errors is only reported when asked for
pub fn should_notify(result: &SyncResult, notify_no_changes: bool) -> bool {
    result.has_actions() || result.has_errors() || notify_no_changes
}

/// Sends run summaries to the configured chat
pub struct Notifier<'a> {
    sender: &'a dyn NotificationSender,
    target: ChatTarget,
    notify_no_changes: bool,
}

impl<'a> Notifier<'a> {
    pub fn new(sender: &'a dyn NotificationSender, target: ChatTarget, notify_no_changes: bool) -> Self {
        Self {
            sender,
            target,
            notify_no_changes,
        }
    }

    pub fn should_notify(&self, result: &SyncResult) -> bool {
        should_notify(result, self.notify_no_changes)
    }

    /// Format and send a run summary. Failures are logged, never returned.
    pub async fn send_sync_notification(&self, result: &SyncResult) {
        if !self.should_notify(result) {
            info!("Skipping notification: no changes and notify_no_changes is disabled");
            return;
        }

        match self.send(&format_sync_message(result)).await {
            Ok(()) if result.dry_run => info!("Dry run notification sent"),
            Ok(()) => info!("Synchronization notification sent"),
            Err(e) => error!("Error sending notification: {}", e),
        }
    }

    /// Send a message, splitting it when it exceeds the length limit
    pub async fn send(&self, message: &str) -> Result<()> {
        if message.chars().count() <= MAX_MESSAGE_LENGTH {
            self.sender.send_message(&self.target, message).await?;
            info!("Notification sent successfully");
            return Ok(());
        }

        let parts = split_message(message, MAX_MESSAGE_LENGTH);
        info!(
            "Message is {} characters, splitting into {} messages",
            message.chars().count(),
            parts.len()
        );

        let total = parts.len();
        for (i, part) in parts.iter().enumerate() {
            let text = if i == 0 {
                part.clone()
            } else {
                tokio::time::sleep(PART_DELAY).await;
                format!("(continued {}/{})\n\n{}", i + 1, total, part)
            };

            if let Err(e) = self.sender.send_message(&self.target, &text).await {
                error!("Failed to send notification part {}/{}: {}", i + 1, total, e);
            }
        }

        info!("Notification sent in {} parts", total);
        Ok(())
    }
}
