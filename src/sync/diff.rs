use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::feed::{Category, Feed};
use crate::sync::identity::{is_managed_feed, normalize_for_comparison};
use crate::sync::planner::{Assignment, Plan};
use crate::sync::title::effective_title;

#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub rsshub_base_url: String,
    pub configured_categories: Vec<String>,
    pub update_titles: bool,
    pub keep_emojis: bool,
    /// Remove absent managed feeds. Off when removal is disabled or the source is degraded.
    pub remove_absent: bool,
}

impl DiffOptions {
    pub fn from_config(config: &Config, degraded: bool) -> Self {
        Self {
            rsshub_base_url: config.rsshub.base_url.clone(),
            configured_categories: config
                .sync
                .folders
                .category_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            update_titles: config.title_updates_enabled(),
            keep_emojis: config.sync.keep_emojis_in_titles,
            remove_absent: config.sync.remove_absent_feeds && !degraded,
        }
    }
}

/// Work needed for one assignment
#[derive(Debug, Clone)]
pub struct FeedChange {
    pub assignment: Assignment,
    /// `None` when the category does not exist yet
    pub target_category: Option<i64>,
    pub existing: Option<Feed>,
    pub needs_move: bool,
    /// Set when the existing feed must be renamed
    pub new_title: Option<String>,
    pub effective_title: String,
}

impl FeedChange {
    pub fn is_add(&self) -> bool {
        self.existing.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Removal {
    pub feed: Feed,
    pub category_name: String,
}

/// Planned assignments compared against one destination snapshot
#[derive(Debug, Clone, Default)]
pub struct SyncDiff {
    pub changes: Vec<FeedChange>,
    pub removals: Vec<Removal>,
    pub missing_categories: Vec<String>,
    pub in_sync: usize,
}

impl SyncDiff {
    pub fn compute(
        plan: &Plan,
        categories: &[Category],
        feeds: &[Feed],
        options: &DiffOptions,
    ) -> Self {
        let category_ids: HashMap<&str, i64> = categories
            .iter()
            .map(|c| (c.title.as_str(), c.id))
            .collect();
        let category_names = category_names(categories);

        let mut managed: HashMap<String, &Feed> = HashMap::new();
        let managed_feeds = feeds
            .iter()
            .filter(|f| is_managed_feed(&f.feed_url, &options.rsshub_base_url));
        for feed in managed_feeds {
            managed.entry(normalize_for_comparison(&feed.feed_url)).or_insert(feed);
        }

        let mut diff = SyncDiff::default();

        for assignment in plan.assignments() {
            let target_category = category_ids.get(assignment.category_name.as_str()).copied();
            if target_category.is_none()
                && !diff.missing_categories.contains(&assignment.category_name)
            {
                diff.missing_categories.push(assignment.category_name.clone());
            }

            let title = effective_title(&assignment.channel.title, options.keep_emojis);
            let existing = managed.get(&normalize_for_comparison(&assignment.feed_url)).copied();

            let (needs_move, new_title) = match existing {
                Some(feed) => (
                    target_category != Some(feed.category_id),
                    (options.update_titles && title != feed.title).then(|| title.clone()),
                ),
                None => (false, None),
            };

            if existing.is_some() && !needs_move && new_title.is_none() {
                diff.in_sync += 1;
                continue;
            }

            diff.changes.push(FeedChange {
                assignment: assignment.clone(),
                target_category,
                existing: existing.cloned(),
                needs_move,
                new_title,
                effective_title: title,
            });
        }

        if options.remove_absent {
            let configured: HashSet<i64> = categories
                .iter()
                .filter(|c| options.configured_categories.contains(&c.title))
                .map(|c| c.id)
                .collect();

            diff.removals = feeds
                .iter()
                .filter(|f| is_managed_feed(&f.feed_url, &options.rsshub_base_url))
                .filter(|f| configured.contains(&f.category_id))
                .filter(|f| !plan.contains(&f.feed_url))
                .map(|f| Removal {
                    feed: f.clone(),
                    category_name: category_label(&category_names, f.category_id),
                })
                .collect();
        }

        diff
    }

    /// True when the destination already matches the plan
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.removals.is_empty()
    }

    pub fn additions(&self) -> usize {
        self.changes.iter().filter(|c| c.is_add()).count()
    }

    pub fn moves(&self) -> usize {
        self.changes.iter().filter(|c| c.needs_move).count()
    }

    pub fn title_updates(&self) -> usize {
        self.changes.iter().filter(|c| c.new_title.is_some()).count()
    }
}

pub fn category_names(categories: &[Category]) -> HashMap<i64, String> {
    categories.iter().map(|c| (c.id, c.title.clone())).collect()
}

/// Category title for an id, or a placeholder when it is unknown
pub fn category_label(names: &HashMap<i64, String>, id: i64) -> String {
    names.get(&id).cloned().unwrap_or_else(|| format!("Category {}", id))
}
