pub mod miniflux;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use miniflux::MinifluxClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub title: String,
    pub feed_url: String,
    pub category_id: i64,
}

/// Result of asking the reader to subscribe to a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Feed),
    /// The reader already has a subscription for this URL
    AlreadyExists,
}

/// Feed reader that receives the synchronized categories and feeds
#[async_trait]
pub trait FeedDestination: Send + Sync {
    /// List all categories
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Create a category with the given title
    async fn create_category(&self, title: &str) -> Result<Category>;

    /// List all feeds across categories
    async fn list_feeds(&self) -> Result<Vec<Feed>>;

    /// Subscribe to a feed URL in a category
    async fn create_feed(&self, feed_url: &str, category_id: i64) -> Result<CreateOutcome>;

    /// Rename a feed
    async fn update_feed_title(&self, feed_id: i64, title: &str) -> Result<()>;

    /// Move a feed to another category
    async fn move_feed_category(&self, feed_id: i64, category_id: i64) -> Result<()>;

    /// Unsubscribe from a feed
    async fn delete_feed(&self, feed_id: i64) -> Result<()>;

    /// Check that a feed URL answers before subscribing to it
    async fn validate_feed_url(&self, feed_url: &str) -> bool;
}
