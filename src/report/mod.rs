pub mod notify;

use std::collections::{BTreeSet, HashMap};

use crate::config::{Config, PrivateFeedMode};
use crate::feed::Feed;
use crate::sync::diff::category_label;
use crate::sync::identity::{build_feed_url, channel_link, is_managed_feed, normalize_for_comparison};
use crate::sync::planner::Plan;
use crate::sync::title::{effective_title, sanitize_title};
use crate::sync::SyncResult;
use crate::telegram::Channel;

pub use notify::{format_sync_message, should_notify, split_message, Notifier};

const COMPARISON_HEADERS: [&str; 5] = ["Action", "Channel Name", "Channel URL", "Feed Name", "Feed URL"];
const MAX_OTHER_FEEDS: usize = 5;
const MAX_SUMMARY_MOVES: usize = 10;
const MAX_SUMMARY_ERRORS: usize = 5;
const SUMMARY_ERROR_WIDTH: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    InSync,
    MovedIn(String),
    MovedOut(String),
    ToAdd,
    ToRemove,
    Conflict(String),
    Skipped,
    Error,
}

impl RowStatus {
    fn priority(&self) -> u8 {
        match self {
            RowStatus::InSync => 1,
            RowStatus::MovedIn(_) => 2,
            RowStatus::MovedOut(_) => 3,
            RowStatus::ToAdd => 4,
            RowStatus::ToRemove => 5,
            RowStatus::Conflict(_) => 6,
            RowStatus::Skipped => 7,
            RowStatus::Error => 8,
        }
    }

    pub fn label(&self) -> String {
        match self {
            RowStatus::InSync => "[IN SYNC]".to_string(),
            RowStatus::MovedIn(from) => format!("[MOVED IN ← {}]", from),
            RowStatus::MovedOut(to) => format!("[MOVED OUT → {}]", to),
            RowStatus::ToAdd => "[TO ADD]".to_string(),
            RowStatus::ToRemove => "[TO REMOVE]".to_string(),
            RowStatus::Conflict(to) => format!("[CONFLICT → {}]", to),
            RowStatus::Skipped => "[SKIPPED]".to_string(),
            RowStatus::Error => "[ERROR]".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRow {
    pub status: RowStatus,
    pub channel_name: String,
    pub channel_url: String,
    pub feed_name: String,
    pub feed_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonCounts {
    pub in_sync: usize,
    pub to_add: usize,
    pub to_remove: usize,
    pub moving_out: usize,
    pub moving_in: usize,
    pub to_update_titles: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Side-by-side view of one folder and its target category
#[derive(Debug, Clone)]
pub struct FolderComparison {
    pub folder: String,
    pub category: String,
    pub rows: Vec<ComparisonRow>,
    pub counts: ComparisonCounts,
    pub other_feeds: Vec<String>,
    pub dry_run: bool,
}

impl FolderComparison {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        folder: &str,
        category: &str,
        channels: &[Channel],
        all_feeds: &[Feed],
        category_names: &HashMap<i64, String>,
        plan: &Plan,
        config: &Config,
        dry_run: bool,
    ) -> Self {
        let base_url = &config.rsshub.base_url;
        let mode = config.sync.private_feed_mode;

        let managed_anywhere: HashMap<String, &Feed> = all_feeds
            .iter()
            .filter(|f| is_managed_feed(&f.feed_url, base_url))
            .map(|f| (normalize_for_comparison(&f.feed_url), f))
            .collect();

        let mut category_feeds = Vec::new();
        let mut other_feeds = Vec::new();
        for feed in all_feeds {
            if category_names.get(&feed.category_id).map(String::as_str) != Some(category) {
                continue;
            }
            if is_managed_feed(&feed.feed_url, base_url) {
                category_feeds.push(feed);
            } else {
                other_feeds.push(feed.title.clone());
            }
        }

        let category_by_url: HashMap<String, &Feed> = category_feeds
            .iter()
            .map(|f| (normalize_for_comparison(&f.feed_url), *f))
            .collect();

        let mut rows = Vec::new();
        let mut counts = ComparisonCounts::default();
        let mut matched = Vec::new();

        for channel in channels {
            let Some(rss_url) = build_feed_url(channel, base_url, mode) else {
                let skipped = channel.is_private && mode == PrivateFeedMode::Skip;
                if skipped {
                    counts.skipped += 1;
                } else {
                    counts.errors += 1;
                }
                rows.push(ComparisonRow {
                    status: if skipped { RowStatus::Skipped } else { RowStatus::Error },
                    channel_name: sanitize_title(&channel.title),
                    channel_url: if skipped { "Private channel".to_string() } else { "Unknown".to_string() },
                    feed_name: String::new(),
                    feed_url: String::new(),
                });
                continue;
            };

            let key = normalize_for_comparison(&rss_url);
            let planned = plan.get(&rss_url).map(|a| a.category_name.clone());

            if let Some(feed) = category_by_url.get(&key) {
                matched.push(key);
                let status = match planned {
                    Some(target) if target != category => {
                        counts.moving_out += 1;
                        RowStatus::MovedOut(target)
                    }
                    _ => {
                        counts.in_sync += 1;
                        RowStatus::InSync
                    }
                };

                if config.title_updates_enabled()
                    && effective_title(&channel.title, config.sync.keep_emojis_in_titles) != feed.title
                {
                    counts.to_update_titles += 1;
                }

                rows.push(ComparisonRow {
                    status,
                    channel_name: sanitize_title(&channel.title),
                    channel_url: channel_link(channel),
                    feed_name: sanitize_title(&feed.title),
                    feed_url: feed.feed_url.clone(),
                });
                continue;
            }

            let mut row = ComparisonRow {
                status: RowStatus::ToAdd,
                channel_name: sanitize_title(&channel.title),
                channel_url: channel_link(channel),
                feed_name: String::new(),
                feed_url: String::new(),
            };

            match planned {
                Some(target) if target != category => row.status = RowStatus::Conflict(target),
                _ => match managed_anywhere.get(&key) {
                    Some(existing) => {
                        counts.moving_in += 1;
                        row.status = RowStatus::MovedIn(category_label(category_names, existing.category_id));
                        row.feed_name = sanitize_title(&existing.title);
                        row.feed_url = existing.feed_url.clone();
                    }
                    None => counts.to_add += 1,
                },
            }

            rows.push(row);
        }

        for feed in &category_feeds {
            let key = normalize_for_comparison(&feed.feed_url);
            if matched.contains(&key) {
                continue;
            }

            let status = match plan.get(&feed.feed_url) {
                Some(assignment) => RowStatus::MovedOut(assignment.category_name.clone()),
                None => {
                    counts.to_remove += 1;
                    RowStatus::ToRemove
                }
            };

            rows.push(ComparisonRow {
                status,
                channel_name: String::new(),
                channel_url: String::new(),
                feed_name: sanitize_title(&feed.title),
                feed_url: feed.feed_url.clone(),
            });
        }

        rows.sort_by(|a, b| {
            a.status
                .priority()
                .cmp(&b.status.priority())
                .then_with(|| a.channel_name.trim().to_lowercase().cmp(&b.channel_name.trim().to_lowercase()))
        });

        Self {
            folder: folder.to_string(),
            category: category.to_string(),
            rows,
            counts,
            other_feeds,
            dry_run,
        }
    }

    pub fn summary_line(&self) -> String {
        let c = &self.counts;
        let parts: Vec<String> = [
            ("In sync", c.in_sync),
            ("To add", c.to_add),
            ("To remove", c.to_remove),
            ("Moving out", c.moving_out),
            ("Moving in", c.moving_in),
            ("To update titles", c.to_update_titles),
            ("Skipped", c.skipped),
            ("Errors", c.errors),
        ]
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(label, n)| format!("{}: {}", label, n))
        .collect();

        format!("Summary: {}", parts.join(" | "))
    }

    pub fn render(&self) -> String {
        let mode = if self.dry_run { "[DRY RUN] " } else { "" };
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| {
                vec![
                    r.status.label(),
                    r.channel_name.clone(),
                    r.channel_url.clone(),
                    r.feed_name.clone(),
                    r.feed_url.clone(),
                ]
            })
            .collect();

        let mut out = format!("\n{}Folder Comparison: {} -> {}\n", mode, self.folder, self.category);
        out.push_str(&render_table(&COMPARISON_HEADERS, &rows));
        out.push_str(&format!("\n\n{}\n", self.summary_line()));

        if !self.other_feeds.is_empty() {
            out.push_str(&format!("\nOther feeds in category: {}\n", self.other_feeds.len()));
            for title in self.other_feeds.iter().take(MAX_OTHER_FEEDS) {
                out.push_str(&format!("   - {}\n", title));
            }
            if self.other_feeds.len() > MAX_OTHER_FEEDS {
                out.push_str(&format!("   - ... and {} more\n", self.other_feeds.len() - MAX_OTHER_FEEDS));
            }
        }

        out
    }
}

/// Boxed grid table sized by character count
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let border = |left: &str, mid: &str, right: &str| -> String {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{}{}{}", left, segments.join(mid), right)
    };

    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let cell = cells.get(i).copied().unwrap_or("");
                format!(" {}{} ", cell, " ".repeat(w - cell.chars().count()))
            })
            .collect();
        format!("│{}│", padded.join("│"))
    };

    let mut lines = vec![border("┌", "┬", "┐"), line(headers.to_vec())];
    for row in rows {
        lines.push(border("├", "┼", "┤"));
        lines.push(line(row.iter().map(String::as_str).collect()));
    }
    lines.push(border("└", "┴", "┘"));
    lines.join("\n")
}

fn count_or_dash(n: usize) -> String {
    if n > 0 {
        n.to_string()
    } else {
        "-".to_string()
    }
}

/// Per-category totals, moved feeds and errors for a finished run
pub fn render_overall_summary(result: &SyncResult) -> String {
    let mode = if result.dry_run { "[DRY RUN] " } else { "" };
    let rule = "=".repeat(80);
    let mut out = format!("\n{}\n{}OVERALL SUMMARY\n{}\n", rule, mode, rule);

    if !result.has_actions() {
        out.push_str("✅ No actions performed - all folders are in sync\n");
    } else {
        let mut categories = BTreeSet::new();
        for action in result
            .added
            .iter()
            .chain(&result.removed)
            .chain(&result.updated_titles)
            .chain(&result.moved)
        {
            categories.insert(action.category_name.clone());
            if let Some(old) = &action.old_category {
                categories.insert(old.clone());
            }
        }

        let mut rows = Vec::new();
        for category in &categories {
            let added = result.added.iter().filter(|a| &a.category_name == category).count();
            let removed = result.removed.iter().filter(|a| &a.category_name == category).count();
            let updated = result.updated_titles.iter().filter(|a| &a.category_name == category).count();
            let moved_to = result.moved.iter().filter(|a| &a.category_name == category).count() as i64;
            let moved_from = result
                .moved
                .iter()
                .filter(|a| a.old_category.as_ref() == Some(category))
                .count() as i64;
            let net = moved_to - moved_from;

            if added == 0 && removed == 0 && updated == 0 && net == 0 {
                continue;
            }

            let moved = match net {
                n if n > 0 => format!("+{}", n),
                0 => "-".to_string(),
                n => n.to_string(),
            };
            rows.push(vec![
                category.clone(),
                count_or_dash(added),
                count_or_dash(removed),
                moved,
                count_or_dash(updated),
            ]);
        }

        if !rows.is_empty() {
            rows.push(vec![
                "TOTAL".to_string(),
                count_or_dash(result.added.len()),
                count_or_dash(result.removed.len()),
                count_or_dash(result.moved.len()),
                count_or_dash(result.updated_titles.len()),
            ]);
            out.push_str(&render_table(&["Category", "Added", "Removed", "Moved", "Updated"], &rows));
            out.push('\n');
        }
    }

    if !result.moved.is_empty() {
        out.push_str(&format!("\n📁 Moved feeds ({}):\n", result.moved.len()));
        for action in result.moved.iter().take(MAX_SUMMARY_MOVES) {
            out.push_str(&format!(
                "   • {}: {} → {}\n",
                action.channel_title,
                action.old_category.as_deref().unwrap_or("?"),
                action.category_name
            ));
        }
        if result.moved.len() > MAX_SUMMARY_MOVES {
            out.push_str(&format!("   ... and {} more\n", result.moved.len() - MAX_SUMMARY_MOVES));
        }
    }

    if result.has_errors() {
        out.push_str(&format!("\n⚠️  Errors encountered: {}\n", result.errors.len()));
        let rows: Vec<Vec<String>> = result
            .errors
            .iter()
            .take(MAX_SUMMARY_ERRORS)
            .enumerate()
            .map(|(i, e)| vec![format!("{}.", i + 1), truncate(e, SUMMARY_ERROR_WIDTH)])
            .collect();
        out.push_str(&render_table(&["#", "Error Description"], &rows));
        out.push('\n');
        if result.errors.len() > MAX_SUMMARY_ERRORS {
            out.push_str(&format!(
                "\n... and {} more errors (check logs for details)\n",
                result.errors.len() - MAX_SUMMARY_ERRORS
            ));
        }
    }

    if result.interrupted {
        out.push_str("\n⏹️  Interrupted before all changes were applied\n");
    }

    out.push_str(&format!("Finished at {}\n", result.started_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&rule);
    out
}

/// Cut to `max` characters, marking the cut with "..."
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}
