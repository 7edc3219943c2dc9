use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::feed::{Category, CreateOutcome, Feed, FeedDestination};
use crate::report::{self, FolderComparison};
use crate::sync::diff::{category_label, category_names, DiffOptions, FeedChange, Removal, SyncDiff};
use crate::sync::identity::normalize_for_comparison;
use crate::sync::planner::Plan;
use crate::sync::{SyncAction, SyncResult};
use crate::telegram::{SourceConnector, SourceSnapshot};

/// Category id used for categories that a dry run would create
const DRY_RUN_CATEGORY_ID: i64 = -1;

/// Two-stage synchronization of configured folders into feed reader categories
pub struct Syncer<'a> {
    config: &'a Config,
    source: &'a dyn SourceConnector,
    destination: &'a dyn FeedDestination,
    cancel: Arc<AtomicBool>,
    quiet: bool,
}

/// Destination state read once before any write
struct DestinationSnapshot {
    feeds: Vec<Feed>,
    categories: Vec<Category>,
}

impl<'a> Syncer<'a> {
    pub fn new(
        config: &'a Config,
        source: &'a dyn SourceConnector,
        destination: &'a dyn FeedDestination,
    ) -> Self {
        Self {
            config,
            source,
            destination,
            cancel: Arc::new(AtomicBool::new(false)),
            quiet: config.logging.quiet,
        }
    }

    /// Share a flag that stops the run between stages and between feeds
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub async fn sync_folders(&self, dry_run: bool) -> SyncResult {
        if dry_run {
            info!("Starting two-stage synchronization in DRY RUN mode");
        } else {
            info!("Starting two-stage synchronization");
        }

        if self.config.title_updates_enabled() {
            info!("Title updates are enabled");
        } else {
            info!("Title updates are disabled");
        }

        let mut result = SyncResult::new(dry_run);

        let outcome = AssertUnwindSafe(self.run(dry_run, &mut result)).catch_unwind().await;
        if let Err(panic) = outcome {
            let message = format!(
                "Critical synchronization error: {}",
                panic_message(panic.as_ref())
            );
            error!("{}", message);
            result.errors.push(message);
        }

        if dry_run {
            info!(
                "Dry run completed. Would add: {}, would move: {}, would remove: {}, would update titles: {}, errors: {}",
                result.added.len(),
                result.moved.len(),
                result.removed.len(),
                result.updated_titles.len(),
                result.errors.len()
            );
        } else {
            info!(
                "Synchronization completed. Added: {}, moved: {}, removed: {}, updated titles: {}, errors: {}",
                result.added.len(),
                result.moved.len(),
                result.removed.len(),
                result.updated_titles.len(),
                result.errors.len()
            );
        }

        if !self.quiet {
            println!("{}", report::render_overall_summary(&result));
        }

        result
    }

    async fn run(&self, dry_run: bool, result: &mut SyncResult) {
        let snapshot = match self.fetch_channels().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let message = format!("Failed to get channels from Telegram: {}", e);
                error!("{}", message);
                result.errors.push(message);
                return;
            }
        };

        if self.interrupted(result) {
            return;
        }

        info!("Stage 1: Planning synchronization and resolving conflicts...");
        let plan = Plan::build(
            &snapshot.channels,
            &self.config.sync.folders,
            &self.config.rsshub.base_url,
            self.config.sync.private_feed_mode,
        );

        let destination = match self.fetch_destination().await {
            Ok(destination) => destination,
            Err(e) => {
                let message = format!("Failed to get initial data from Miniflux: {}", e);
                error!("{}", message);
                result.errors.push(message);
                return;
            }
        };

        if snapshot.degraded && self.config.sync.remove_absent_feeds {
            warn!("Folder enumeration is unavailable; feed removal is disabled for this run");
        }

        let options = DiffOptions::from_config(self.config, snapshot.degraded);
        let diff = SyncDiff::compute(&plan, &destination.categories, &destination.feeds, &options);

        if !self.quiet {
            self.print_comparisons(&snapshot, &plan, &destination, dry_run);
        }

        if diff.is_empty() {
            info!("Stage 2: No changes needed - skipping synchronization changes");
            return;
        }

        if self.interrupted(result) {
            return;
        }

        info!("Stage 2: Applying synchronization changes...");
        self.apply(&diff, &destination, dry_run, result).await;
    }

    async fn fetch_channels(&self) -> Result<SourceSnapshot> {
        let session = self.source.connect().await?;
        let folders = self.config.sync.folders.folder_names();
        let snapshot = session.channels_in_folders(&folders).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close Telegram session: {}", e);
        }

        snapshot
    }

    async fn fetch_destination(&self) -> Result<DestinationSnapshot> {
        let (feeds, categories) = futures::try_join!(
            self.destination.list_feeds(),
            self.destination.list_categories()
        )?;
        debug!("Destination has {} feeds in {} categories", feeds.len(), categories.len());
        Ok(DestinationSnapshot { feeds, categories })
    }

    fn print_comparisons(
        &self,
        snapshot: &SourceSnapshot,
        plan: &Plan,
        destination: &DestinationSnapshot,
        dry_run: bool,
    ) {
        let names = category_names(&destination.categories);
        for (folder, category) in self.config.sync.folders.iter() {
            let channels: Vec<_> = snapshot
                .channels
                .iter()
                .filter(|c| c.folder == folder)
                .cloned()
                .collect();
            let comparison = FolderComparison::build(
                folder,
                category,
                &channels,
                &destination.feeds,
                &names,
                plan,
                self.config,
                dry_run,
            );
            println!("{}", comparison.render());
        }
    }

    fn interrupted(&self, result: &mut SyncResult) -> bool {
        if self.cancel.load(Ordering::SeqCst) {
            if !result.interrupted {
                warn!("Synchronization interrupted; reporting partial results");
            }
            result.interrupted = true;
        }
        result.interrupted
    }

    async fn apply(
        &self,
        diff: &SyncDiff,
        destination: &DestinationSnapshot,
        dry_run: bool,
        result: &mut SyncResult,
    ) {
        let names = category_names(&destination.categories);
        let mut category_ids: HashMap<String, i64> = destination
            .categories
            .iter()
            .map(|c| (c.title.clone(), c.id))
            .collect();

        for change in &diff.changes {
            if self.interrupted(result) {
                return;
            }

            let applied = self
                .apply_change(change, &names, &mut category_ids, dry_run, result)
                .await;
            if let Err(e) = applied {
                let message = describe_change_error(change, &e);
                error!(code = e.error_code(), temporary = e.is_temporary(), "{}", message);
                result.errors.push(message);
            }
        }

        for removal in &diff.removals {
            if self.interrupted(result) {
                return;
            }

            match self.apply_removal(removal, dry_run).await {
                Ok(()) => result.removed.push(SyncAction::remove(
                    &removal.feed.title,
                    &removal.feed.feed_url,
                    &removal.category_name,
                )),
                Err(e) => {
                    let message = format!("Error removing feed {}: {}", removal.feed.feed_url, e);
                    error!(code = e.error_code(), temporary = e.is_temporary(), "{}", message);
                    result.errors.push(message);
                }
            }
        }
    }

    async fn resolve_category(
        &self,
        name: &str,
        cache: &mut HashMap<String, i64>,
        dry_run: bool,
    ) -> Result<i64> {
        if let Some(id) = cache.get(name) {
            return Ok(*id);
        }

        if dry_run {
            info!("[DRY RUN] Would create category: {}", name);
            return Ok(DRY_RUN_CATEGORY_ID);
        }

        let id = match self.destination.create_category(name).await {
            Ok(category) => category.id,
            Err(Error::Api { status: 400 | 409, .. }) => {
                debug!("Category '{}' appeared since planning, looking it up", name);
                self.destination
                    .list_categories()
                    .await?
                    .into_iter()
                    .find(|c| c.title == name)
                    .map(|c| c.id)
                    .ok_or_else(|| Error::NotFound(format!("category '{}'", name)))?
            }
            Err(e) => return Err(e),
        };
        cache.insert(name.to_string(), id);
        Ok(id)
    }

    async fn apply_change(
        &self,
        change: &FeedChange,
        names: &HashMap<i64, String>,
        category_ids: &mut HashMap<String, i64>,
        dry_run: bool,
        result: &mut SyncResult,
    ) -> Result<()> {
        let assignment = &change.assignment;
        let category_id = self
            .resolve_category(&assignment.category_name, category_ids, dry_run)
            .await?;

        let Some(existing) = &change.existing else {
            if dry_run {
                info!(
                    "[DRY RUN] Would add feed: {} -> {}",
                    assignment.channel.title, assignment.feed_url
                );
            } else {
                self.create_feed(change, category_id).await?;
            }
            result.added.push(SyncAction::add(
                &assignment.channel.title,
                &assignment.feed_url,
                &assignment.category_name,
            ));
            return Ok(());
        };

        if change.needs_move {
            if dry_run {
                info!(
                    "[DRY RUN] Would move feed '{}' from category {} to '{}'",
                    existing.title, existing.category_id, assignment.category_name
                );
            } else {
                self.destination.move_feed_category(existing.id, category_id).await?;
            }
            result.moved.push(SyncAction::move_category(
                &assignment.channel.title,
                &assignment.feed_url,
                &assignment.category_name,
                &category_label(names, existing.category_id),
            ));
        }

        if let Some(new_title) = &change.new_title {
            if dry_run {
                info!("[DRY RUN] Would update feed title: '{}' -> '{}'", existing.title, new_title);
            } else {
                self.destination.update_feed_title(existing.id, new_title).await?;
            }
            result.updated_titles.push(SyncAction::update_title(
                &assignment.channel.title,
                &assignment.feed_url,
                &assignment.category_name,
                &existing.title,
            ));
        }

        Ok(())
    }

    async fn create_feed(&self, change: &FeedChange, category_id: i64) -> Result<()> {
        let feed_url = &change.assignment.feed_url;
        let title = &change.effective_title;

        if self.config.sync.validate_feeds && !self.destination.validate_feed_url(feed_url).await {
            return Err(Error::FeedNotAccessible(feed_url.clone()));
        }

        match self.destination.create_feed(feed_url, category_id).await? {
            CreateOutcome::Created(feed) => {
                if !title.is_empty() && &feed.title != title {
                    debug!("Updating new feed title to: '{}'", title);
                    self.destination.update_feed_title(feed.id, title).await?;
                }
                info!("Feed created: {}", title);
            }
            CreateOutcome::AlreadyExists => {
                info!("Feed already exists, checking category: {}", feed_url);
                let key = normalize_for_comparison(feed_url);
                let feeds = self.destination.list_feeds().await?;
                let feed = feeds
                    .into_iter()
                    .find(|f| normalize_for_comparison(&f.feed_url) == key)
                    .ok_or_else(|| Error::FeedNotLocated(feed_url.clone()))?;

                if feed.category_id != category_id {
                    debug!("Moving existing feed '{}' to category {}", feed.title, category_id);
                    self.destination.move_feed_category(feed.id, category_id).await?;
                }

                if !title.is_empty() && &feed.title != title {
                    debug!("Updating existing feed title to: '{}'", title);
                    self.destination.update_feed_title(feed.id, title).await?;
                }
            }
        }

        Ok(())
    }

    async fn apply_removal(&self, removal: &Removal, dry_run: bool) -> Result<()> {
        if dry_run {
            info!(
                "[DRY RUN] Would remove feed: {} -> {}",
                removal.feed.title, removal.feed.feed_url
            );
            return Ok(());
        }
        self.destination.delete_feed(removal.feed.id).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unexpected failure")
}

/// Readable message for a failed assignment, naming the channel
fn describe_change_error(change: &FeedChange, err: &Error) -> String {
    let title = &change.assignment.channel.title;
    let url = &change.assignment.feed_url;

    match err {
        Error::FeedNotAccessible(_) => format!("Feed URL validation failed for {}: {}", title, err),
        Error::FeedNotLocated(_) => {
            format!("Feed exists but could not be located for {}: {}", title, err)
        }
        Error::BadRequest(_) => format!("Miniflux rejected feed for {}: {}", title, err),
        Error::Api { status: 503, .. } => format!(
            "RSS service unavailable for {} ({}): The RSS feed service is currently down",
            title, url
        ),
        Error::Api { status, .. } if *status >= 500 => {
            format!("Miniflux server error for {} ({}): {}", title, url, err)
        }
        _ => format!("Error processing feed {} ({}): {}", title, url, err),
    }
}
