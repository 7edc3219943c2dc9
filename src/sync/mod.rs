pub mod diff;
pub mod executor;
pub mod identity;
pub mod planner;
pub mod title;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use diff::{DiffOptions, SyncDiff};
pub use executor::Syncer;
pub use planner::{Assignment, Conflict, Plan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Add,
    Remove,
    UpdateTitle,
    MoveCategory,
}

/// One applied (or, in a dry run, planned) change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncAction {
    pub kind: ActionKind,
    pub channel_title: String,
    pub feed_url: String,
    pub category_name: String,
    pub old_title: Option<String>,
    pub old_category: Option<String>,
}

impl SyncAction {
    fn new(kind: ActionKind, channel_title: &str, feed_url: &str, category_name: &str) -> Self {
        Self {
            kind,
            channel_title: channel_title.to_string(),
            feed_url: feed_url.to_string(),
            category_name: category_name.to_string(),
            old_title: None,
            old_category: None,
        }
    }

    pub fn add(channel_title: &str, feed_url: &str, category_name: &str) -> Self {
        Self::new(ActionKind::Add, channel_title, feed_url, category_name)
    }

    pub fn remove(feed_title: &str, feed_url: &str, category_name: &str) -> Self {
        Self::new(ActionKind::Remove, feed_title, feed_url, category_name)
    }

    pub fn update_title(channel_title: &str, feed_url: &str, category_name: &str, old_title: &str) -> Self {
        Self {
            old_title: Some(old_title.to_string()),
            ..Self::new(ActionKind::UpdateTitle, channel_title, feed_url, category_name)
        }
    }

    pub fn move_category(channel_title: &str, feed_url: &str, category_name: &str, old_category: &str) -> Self {
        Self {
            old_category: Some(old_category.to_string()),
            ..Self::new(ActionKind::MoveCategory, channel_title, feed_url, category_name)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub added: Vec<SyncAction>,
    pub removed: Vec<SyncAction>,
    pub updated_titles: Vec<SyncAction>,
    pub moved: Vec<SyncAction>,
    pub errors: Vec<String>,
    pub dry_run: bool,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn new(dry_run: bool) -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            updated_titles: Vec::new(),
            moved: Vec::new(),
            errors: Vec::new(),
            dry_run,
            interrupted: false,
            started_at: Utc::now(),
        }
    }

    pub fn total_actions(&self) -> usize {
        self.added.len() + self.removed.len() + self.updated_titles.len() + self.moved.len()
    }

    pub fn has_actions(&self) -> bool {
        self.total_actions() > 0
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
