use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use teleflux::config::PrivateFeedMode;
use teleflux::sync::{Plan, SyncResult, Syncer};
use teleflux::telegram::Channel;
use teleflux::Config;

use test_data::*;

/// Sync scenarios against in-memory source and destination fakes

async fn run(config: &Config, source: &FakeSource, destination: &FakeDestination, dry_run: bool) -> SyncResult {
    Syncer::new(config, source, destination)
        .quiet(true)
        .sync_folders(dry_run)
        .await
}

/// Every reported action as a sortable `(kind, feed_url, category)` tuple
fn action_keys(result: &SyncResult) -> Vec<(String, String, String)> {
    let mut keys: Vec<_> = result
        .added
        .iter()
        .chain(&result.moved)
        .chain(&result.removed)
        .chain(&result.updated_titles)
        .map(|a| (format!("{:?}", a.kind), a.feed_url.clone(), a.category_name.clone()))
        .collect();
    keys.sort();
    keys
}

fn news_config(remove_absent: bool) -> Config {
    config_with_sync(&format!(
        "sync:\n  folders:\n    News: News\n  remove_absent_feeds: {}\n  private_feed_mode: skip\n",
        remove_absent
    ))
}

#[tokio::test]
async fn test_new_channel_creates_category_and_feed() {
    let config = news_config(false);
    let source = FakeSource::with_channels(vec![Channel::public(1, "📰 Tech", "tech1", "News")]);
    let destination = FakeDestination::default();

    let result = run(&config, &source, &destination, false).await;

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.added.len(), 1);
    assert_eq!(result.added[0].category_name, "News");
    assert_eq!(result.added[0].feed_url, feed_url("tech1"));

    let category_id = destination.category_id("News").expect("category created");
    let feed = destination.feed_by_url(&feed_url("tech1")).expect("feed created");
    assert_eq!(feed.title, "Tech");
    assert_eq!(feed.category_id, category_id);
    assert_eq!(source.close_count(), 1);
}

#[tokio::test]
async fn test_channel_in_two_folders_goes_to_first() {
    let config = config_with_sync(
        "sync:\n  folders:\n    A: Alpha\n    B: Beta\n  remove_absent_feeds: false\n  private_feed_mode: skip\n",
    );
    let channels = vec![
        Channel::public(7, "Shared", "shared", "A"),
        Channel::public(7, "Shared", "shared", "B"),
    ];

    let plan = Plan::build(&channels, &config.sync.folders, RSSHUB, PrivateFeedMode::Skip);
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.assignments()[0].category_name, "Alpha");
    assert_eq!(plan.conflicts().len(), 1);
    assert_eq!(plan.conflicts()[0].existing_folder, "A");
    assert_eq!(plan.conflicts()[0].new_folder, "B");

    let source = FakeSource::with_channels(channels);
    let destination = FakeDestination::default();
    let result = run(&config, &source, &destination, false).await;

    assert_eq!(result.added.len(), 1);
    assert_eq!(result.added[0].category_name, "Alpha");
    assert!(destination.category_id("Beta").is_none());
    assert_eq!(destination.feeds().len(), 1);
}

#[tokio::test]
async fn test_mixed_case_url_is_in_sync() {
    let config = config_with_sync(
        "sync:\n  folders:\n    Tech: Tech\n  remove_absent_feeds: true\n  private_feed_mode: skip\n",
    );
    let source = FakeSource::with_channels(vec![Channel::public(5, "Test Channel", "Test_Channel", "Tech")]);
    let destination = FakeDestination::new(
        vec![category(1, "Tech")],
        vec![feed(10, "Test Channel", &feed_url("Test_Channel"), 1)],
    );

    let result = run(&config, &source, &destination, false).await;

    assert!(!result.has_actions());
    assert!(result.errors.is_empty());
    assert!(destination.writes().is_empty());
}

#[tokio::test]
async fn test_absent_feed_removed_only_from_configured_categories() {
    let config = news_config(true);
    let source = FakeSource::with_channels(vec![]);
    let destination = FakeDestination::new(
        vec![category(1, "News"), category(2, "Other")],
        vec![
            feed(10, "Gone", &feed_url("gone"), 1),
            feed(11, "Elsewhere", &feed_url("elsewhere"), 2),
            feed(12, "Blog", "https://blog.example.com/rss", 1),
        ],
    );

    let result = run(&config, &source, &destination, false).await;

    assert_eq!(result.removed.len(), 1);
    assert_eq!(result.removed[0].feed_url, feed_url("gone"));
    assert_eq!(result.removed[0].category_name, "News");

    let remaining: Vec<i64> = destination.feeds().iter().map(|f| f.id).collect();
    assert_eq!(remaining, vec![11, 12]);
}

#[tokio::test]
async fn test_private_channel_skipped_without_error() {
    let config = news_config(false);
    let channels = vec![Channel::private(-1001234567, "Secret", "News", None)];

    let plan = Plan::build(&channels, &config.sync.folders, RSSHUB, PrivateFeedMode::Skip);
    assert!(plan.is_empty());
    assert_eq!(plan.skipped_private(), 1);

    let source = FakeSource::with_channels(channels);
    let destination = FakeDestination::default();
    let result = run(&config, &source, &destination, false).await;

    assert!(!result.has_actions());
    assert!(!result.has_errors());
    assert!(destination.writes().is_empty());
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let config = news_config(true);
    let source = FakeSource::with_channels(vec![
        Channel::public(1, "📰 Tech", "tech1", "News"),
        Channel::public(2, "World", "world", "News"),
    ]);
    let destination = FakeDestination::default();

    let first = run(&config, &source, &destination, false).await;
    assert_eq!(first.added.len(), 2);
    let writes_after_first = destination.writes().len();

    let second = run(&config, &source, &destination, false).await;
    assert!(!second.has_actions(), "second run: {:?}", second);
    assert_eq!(destination.writes().len(), writes_after_first);
}

#[tokio::test]
async fn test_dry_run_reports_same_actions_without_writes() {
    let config = config_with_sync(
        "sync:\n  folders:\n    News: News\n    Tech: Tech\n  remove_absent_feeds: true\n  private_feed_mode: secret\n",
    );
    let channels = vec![
        Channel::public(1, "Fresh", "fresh", "News"),
        Channel::public(2, "Mover", "mover", "Tech"),
        Channel::public(3, "New Name", "renamed", "News"),
        Channel::private(-1009999, "Hidden", "Tech", Some("abcd".into())),
    ];
    let categories = || vec![category(1, "News")];
    let feeds = || {
        vec![
            feed(10, "Mover", &feed_url("mover"), 1),
            feed(11, "Old Name", &feed_url("renamed"), 1),
            feed(12, "Stale", &feed_url("stale"), 1),
        ]
    };

    let source = FakeSource::with_channels(channels);
    let dry_destination = FakeDestination::new(categories(), feeds());
    let live_destination = FakeDestination::new(categories(), feeds());

    let dry = run(&config, &source, &dry_destination, true).await;
    let live = run(&config, &source, &live_destination, false).await;

    assert!(dry.dry_run);
    assert!(dry_destination.writes().is_empty());
    assert!(live.errors.is_empty(), "errors: {:?}", live.errors);

    assert_eq!(action_keys(&dry), action_keys(&live));

    assert_eq!(live.added.len(), 2);
    assert_eq!(live.moved.len(), 1);
    assert_eq!(live.moved[0].old_category.as_deref(), Some("News"));
    assert_eq!(live.updated_titles.len(), 1);
    assert_eq!(live.updated_titles[0].old_title.as_deref(), Some("Old Name"));
    assert_eq!(live.removed.len(), 1);

    let tech = live_destination.category_id("Tech").expect("Tech created once");
    assert_eq!(live_destination.feed_by_url(&feed_url("mover")).map(|f| f.category_id), Some(tech));
    assert_eq!(
        live_destination.writes().iter().filter(|w| w.starts_with("create_category")).count(),
        1
    );
}

#[tokio::test]
async fn test_existing_feed_is_reconciled() {
    let config = news_config(false);
    let url = feed_url("known");
    let source = FakeSource::with_channels(vec![Channel::public(1, "Known", "known", "News")]);
    let destination = FakeDestination::new(vec![category(1, "News"), category(2, "Other")], vec![]);
    destination
        .hidden
        .lock()
        .unwrap()
        .insert(url.clone(), feed(50, "Untitled", &url, 2));

    let result = run(&config, &source, &destination, false).await;

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.added.len(), 1);
    let reconciled = destination.feed_by_url(&url).unwrap();
    assert_eq!(reconciled.category_id, 1);
    assert_eq!(reconciled.title, "Known");
}

#[tokio::test]
async fn test_failed_validation_does_not_stop_run() {
    let config = news_config(false);
    let source = FakeSource::with_channels(vec![
        Channel::public(1, "Broken", "broken", "News"),
        Channel::public(2, "Working", "working", "News"),
    ]);
    let mut destination = FakeDestination::default();
    destination.unreachable.insert(feed_url("broken"));

    let result = run(&config, &source, &destination, false).await;

    assert_eq!(result.added.len(), 1);
    assert_eq!(result.added[0].channel_title, "Working");
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Feed URL validation failed for Broken"));
}

#[tokio::test]
async fn test_degraded_source_never_removes() {
    let config = news_config(true);
    let mut source = FakeSource::with_channels(vec![]);
    source.degraded = true;
    let destination = FakeDestination::new(vec![category(1, "News")], vec![feed(10, "Gone", &feed_url("gone"), 1)]);

    let result = run(&config, &source, &destination, false).await;

    assert!(result.removed.is_empty());
    assert_eq!(destination.feeds().len(), 1);
}

#[tokio::test]
async fn test_source_failure_is_recorded() {
    let config = news_config(true);
    let mut source = FakeSource::with_channels(vec![Channel::public(1, "Tech", "tech", "News")]);
    source.fail_listing = true;
    let destination = FakeDestination::new(vec![category(1, "News")], vec![feed(10, "Gone", &feed_url("gone"), 1)]);

    let result = run(&config, &source, &destination, false).await;

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Failed to get channels from Telegram"));
    assert!(destination.writes().is_empty());
    assert_eq!(source.close_count(), 1);

    source.fail_listing = false;
    source.fail_connect = true;
    let result = run(&config, &source, &destination, false).await;
    assert_eq!(result.errors.len(), 1);
    assert!(destination.writes().is_empty());
}

#[tokio::test]
async fn test_interrupted_run_makes_no_writes() {
    let config = news_config(true);
    let source = FakeSource::with_channels(vec![Channel::public(1, "Tech", "tech", "News")]);
    let destination = FakeDestination::default();

    let result = Syncer::new(&config, &source, &destination)
        .with_cancellation(Arc::new(AtomicBool::new(true)))
        .quiet(true)
        .sync_folders(false)
        .await;

    assert!(result.interrupted);
    assert!(!result.has_actions());
    assert!(destination.writes().is_empty());
}

#[tokio::test]
async fn test_destination_read_failure_stops_before_writes() {
    let config = news_config(true);
    let source = FakeSource::with_channels(vec![Channel::public(1, "Tech", "tech", "News")]);
    let mut destination =
        FakeDestination::new(vec![category(1, "News")], vec![feed(10, "Gone", &feed_url("gone"), 1)]);
    destination.fail_reads = true;

    let result = run(&config, &source, &destination, false).await;

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Failed to get initial data from Miniflux"));
    assert!(!result.has_actions());
    assert!(destination.writes().is_empty());
    assert_eq!(source.close_count(), 1);
}

#[tokio::test]
async fn test_unexpected_failure_still_returns_result() {
    let config = news_config(false);
    let source = FakeSource::with_channels(vec![Channel::public(1, "Tech", "tech", "News")]);
    let mut destination = FakeDestination::new(vec![category(1, "News")], vec![]);
    destination.panic_on_create = true;

    let result = run(&config, &source, &destination, false).await;

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Critical synchronization error"));
    assert!(result.errors[0].contains("feed store corrupted"));
    assert!(result.added.is_empty());
    assert!(destination.writes().is_empty());
}

#[tokio::test]
async fn test_category_created_elsewhere_is_reused() {
    let config = news_config(false);
    let source = FakeSource::with_channels(vec![
        Channel::public(1, "Tech", "tech", "News"),
        Channel::public(2, "World", "world", "News"),
    ]);
    let destination = FakeDestination::default();
    destination.late_categories.lock().unwrap().push(category(7, "News"));

    let result = run(&config, &source, &destination, false).await;

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(result.added.len(), 2);
    assert_eq!(destination.categories(), vec![category(7, "News")]);
    assert_eq!(destination.feed_by_url(&feed_url("tech")).map(|f| f.category_id), Some(7));
    assert_eq!(destination.feed_by_url(&feed_url("world")).map(|f| f.category_id), Some(7));
    assert!(!destination.writes().iter().any(|w| w.starts_with("create_category")));
}
