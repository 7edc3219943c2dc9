//! Conflict-resolving assignment of channels to categories.
//!
//! Folders are visited in configuration order and the first folder that
//! claims a feed URL keeps it. Every later claim becomes a [`Conflict`].

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::{FolderMapping, PrivateFeedMode};
use crate::sync::identity::{build_feed_url, normalize_for_comparison};
use crate::telegram::Channel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub feed_url: String,
    pub category_name: String,
    pub folder_name: String,
    pub channel: Channel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub channel: Channel,
    pub existing_folder: String,
    pub existing_category: String,
    pub new_folder: String,
    pub new_category: String,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    assignments: Vec<Assignment>,
    index: HashMap<String, usize>,
    conflicts: Vec<Conflict>,
    skipped_private: usize,
    malformed: usize,
}

impl Plan {
    pub fn build(channels: &[Channel], folders: &FolderMapping, base_url: &str, mode: PrivateFeedMode) -> Self {
        let mut plan = Plan::default();

        for (folder_name, category_name) in folders.iter() {
            for channel in channels.iter().filter(|c| c.folder == folder_name) {
                let Some(feed_url) = build_feed_url(channel, base_url, mode) else {
                    if channel.is_private && mode == PrivateFeedMode::Skip {
                        debug!(
                            "Skipping private channel: '{}' from folder '{}' - private channels are not synchronized",
                            channel.title, folder_name
                        );
                        plan.skipped_private += 1;
                    } else {
                        warn!("Failed to build RSS URL for channel: {}", channel.title);
                        plan.malformed += 1;
                    }
                    continue;
                };

                let key = normalize_for_comparison(&feed_url);
                if let Some(&existing) = plan.index.get(&key) {
                    let winner = &plan.assignments[existing];
                    plan.conflicts.push(Conflict {
                        channel: channel.clone(),
                        existing_folder: winner.folder_name.clone(),
                        existing_category: winner.category_name.clone(),
                        new_folder: folder_name.to_string(),
                        new_category: category_name.to_string(),
                    });
                    continue;
                }

                plan.index.insert(key, plan.assignments.len());
                plan.assignments.push(Assignment {
                    feed_url,
                    category_name: category_name.to_string(),
                    folder_name: folder_name.to_string(),
                    channel: channel.clone(),
                });
            }
        }

        if plan.skipped_private > 0 {
            info!("Filtered out {} private channels", plan.skipped_private);
        }

        if !plan.conflicts.is_empty() {
            info!("Found {} channels in multiple folders:", plan.conflicts.len());
            for conflict in &plan.conflicts {
                info!(
                    "  '{}' in folders: '{}' and '{}' -> assigned to '{}' (higher priority)",
                    conflict.channel.title, conflict.existing_folder, conflict.new_folder, conflict.existing_category
                );
            }
        }

        plan
    }

    /// Assignments in the order they were made
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Assignment for a feed URL, compared case-insensitively
    pub fn get(&self, feed_url: &str) -> Option<&Assignment> {
        self.index
            .get(&normalize_for_comparison(feed_url))
            .map(|&i| &self.assignments[i])
    }

    pub fn contains(&self, feed_url: &str) -> bool {
        self.index.contains_key(&normalize_for_comparison(feed_url))
    }

    pub fn skipped_private(&self) -> usize {
        self.skipped_private
    }

    pub fn malformed(&self) -> usize {
        self.malformed
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://rsshub.example.com";

    fn folders() -> FolderMapping {
        FolderMapping::new([("Alpha", "A"), ("Beta", "B")])
    }

    #[test]
    fn test_first_folder_wins() {
        let channels = vec![
            Channel::public(1, "Shared", "shared", "Beta"),
            Channel::public(1, "Shared", "shared", "Alpha"),
            Channel::public(2, "Only Beta", "onlybeta", "Beta"),
        ];

        let plan = Plan::build(&channels, &folders(), BASE, PrivateFeedMode::Secret);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.assignments()[0].folder_name, "Alpha");
        assert_eq!(plan.assignments()[0].category_name, "A");
        assert_eq!(plan.assignments()[1].channel.title, "Only Beta");

        assert_eq!(plan.conflicts().len(), 1);
        let conflict = &plan.conflicts()[0];
        assert_eq!(conflict.existing_folder, "Alpha");
        assert_eq!(conflict.existing_category, "A");
        assert_eq!(conflict.new_folder, "Beta");
        assert_eq!(conflict.new_category, "B");
    }

    #[test]
    fn test_duplicate_within_folder_is_conflict() {
        let channels = vec![
            Channel::public(1, "Tech", "tech", "Alpha"),
            Channel::public(1, "Tech again", "Tech", "Alpha"),
        ];

        let plan = Plan::build(&channels, &folders(), BASE, PrivateFeedMode::Secret);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.assignments()[0].channel.title, "Tech");
        assert_eq!(plan.conflicts().len(), 1);
        assert_eq!(plan.conflicts()[0].new_folder, "Alpha");
    }

    #[test]
    fn test_skips_private_and_malformed() {
        let mut malformed = Channel::public(3, "No name", "x", "Alpha");
        malformed.username = None;

        let channels = vec![
            Channel::private(-1001, "Club", "Alpha", Some("s".to_string())),
            malformed,
            Channel::public(4, "Elsewhere", "elsewhere", "Unconfigured"),
        ];

        let plan = Plan::build(&channels, &folders(), BASE, PrivateFeedMode::Skip);
        assert!(plan.is_empty());
        assert!(plan.conflicts().is_empty());
        assert_eq!(plan.skipped_private(), 1);
        assert_eq!(plan.malformed(), 1);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let channels = vec![Channel::public(1, "Tech", "TechNews", "Alpha")];
        let plan = Plan::build(&channels, &folders(), BASE, PrivateFeedMode::Secret);

        assert!(plan.contains("https://RSSHUB.example.com/telegram/channel/TECHNEWS"));
        assert_eq!(
            plan.get("https://rsshub.example.com/telegram/channel/technews").map(|a| a.category_name.as_str()),
            Some("A")
        );
    }
}
