use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::MinifluxConfig;
use crate::error::{Error, Result};
use crate::feed::{Category, CreateOutcome, Feed, FeedDestination};

const USER_AGENT: &str = "Teleflux";
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone)]
enum Auth {
    Token(String),
    Basic { username: String, password: String },
}

/// HTTP client for the Miniflux v1 API
#[derive(Debug, Clone)]
pub struct MinifluxClient {
    client: Client,
    base_url: String,
    auth: Auth,
}

#[derive(Debug, Deserialize)]
struct ApiFeed {
    id: i64,
    title: String,
    feed_url: String,
    category: ApiCategory,
}

#[derive(Debug, Deserialize)]
struct ApiCategory {
    id: i64,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct CreatedFeed {
    feed_id: i64,
}

impl From<ApiFeed> for Feed {
    fn from(feed: ApiFeed) -> Self {
        Feed {
            id: feed.id,
            title: feed.title,
            feed_url: feed.feed_url,
            category_id: feed.category.id,
        }
    }
}

impl From<ApiCategory> for Category {
    fn from(category: ApiCategory) -> Self {
        Category {
            id: category.id,
            title: category.title,
        }
    }
}

impl MinifluxClient {
    pub fn new(config: &MinifluxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        let auth = match (&config.token, &config.username, &config.password) {
            (Some(token), _, _) if !token.is_empty() => Auth::Token(token.clone()),
            (_, Some(username), Some(password)) => Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => return Err(Error::Config("Miniflux credentials are missing".to_string())),
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}/v1{}", self.base_url, endpoint);
        let builder = self.client.request(method, url);
        match &self.auth {
            Auth::Token(token) => builder.header("X-Auth-Token", token),
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
        }
    }

    async fn send(&self, method: Method, endpoint: &str, body: Option<serde_json::Value>) -> Result<Response> {
        let mut builder = self.request(method.clone(), endpoint);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| {
            error!("Miniflux API request error {} {}: {}", method, endpoint, e);
            Error::from(e)
        })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = format!(
            "{} {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error"),
            extract_error_details(&body)
        );
        error!("Miniflux API request error {} {}: {}", method, endpoint, message);

        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch_feed(&self, feed_id: i64) -> Result<Feed> {
        let response = self.send(Method::GET, &format!("/feeds/{}", feed_id), None).await?;
        let feed: ApiFeed = response.json().await?;
        Ok(feed.into())
    }
}

#[async_trait]
impl FeedDestination for MinifluxClient {
    async fn list_categories(&self) -> Result<Vec<Category>> {
        let response = self.send(Method::GET, "/categories", None).await?;
        let categories: Vec<ApiCategory> = response.json().await?;
        debug!("Got {} categories", categories.len());
        Ok(categories.into_iter().map(Category::from).collect())
    }

    async fn create_category(&self, title: &str) -> Result<Category> {
        let response = self
            .send(Method::POST, "/categories", Some(json!({ "title": title })))
            .await?;
        let category: ApiCategory = response.json().await?;
        info!("Category created: {}", title);
        Ok(category.into())
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let response = self.send(Method::GET, "/feeds", None).await?;
        let feeds: Vec<ApiFeed> = response.json().await?;
        debug!("Got {} feeds", feeds.len());
        Ok(feeds.into_iter().map(Feed::from).collect())
    }

    async fn create_feed(&self, feed_url: &str, category_id: i64) -> Result<CreateOutcome> {
        debug!("Creating feed: {}", feed_url);

        let result = self
            .send(
                Method::POST,
                "/feeds",
                Some(json!({ "feed_url": feed_url, "category_id": category_id })),
            )
            .await;

        match result {
            Ok(response) => {
                let created: CreatedFeed = response.json().await?;
                let feed = self.fetch_feed(created.feed_id).await?;
                info!("Feed created: {}", feed.title);
                Ok(CreateOutcome::Created(feed))
            }
            Err(Error::Api { status: 400, message }) => {
                if message.to_lowercase().contains("already exists") {
                    info!("Feed already exists: {}", feed_url);
                    Ok(CreateOutcome::AlreadyExists)
                } else {
                    Err(Error::BadRequest(message))
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn update_feed_title(&self, feed_id: i64, title: &str) -> Result<()> {
        self.send(Method::PUT, &format!("/feeds/{}", feed_id), Some(json!({ "title": title })))
            .await?;
        debug!("Feed {} renamed to '{}'", feed_id, title);
        Ok(())
    }

    async fn move_feed_category(&self, feed_id: i64, category_id: i64) -> Result<()> {
        self.send(
            Method::PUT,
            &format!("/feeds/{}", feed_id),
            Some(json!({ "category_id": category_id })),
        )
        .await?;
        debug!("Feed {} moved to category {}", feed_id, category_id);
        Ok(())
    }

    async fn delete_feed(&self, feed_id: i64) -> Result<()> {
        self.send(Method::DELETE, &format!("/feeds/{}", feed_id), None).await?;
        info!("Feed deleted: {}", feed_id);
        Ok(())
    }

    async fn validate_feed_url(&self, feed_url: &str) -> bool {
        debug!("Validating feed URL: {}", feed_url);

        let response = self
            .client
            .head(feed_url)
            .timeout(VALIDATION_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(response) if response.status().as_u16() == 200 => {
                debug!("Feed URL validation successful: {}", feed_url);
                true
            }
            Ok(response) => {
                warn!("Feed URL returned status {}: {}", response.status().as_u16(), feed_url);
                false
            }
            Err(e) => {
                warn!("Feed URL validation failed for {}: {}", feed_url, e);
                false
            }
        }
    }
}

/// Pull the most useful part out of an error response body
fn extract_error_details(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => {
            if let Some(message) = value.get("error_message").and_then(|m| m.as_str()) {
                message.to_string()
            } else if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
                message.to_string()
            } else {
                format!("Response: {}", value)
            }
        }
        Err(_) => {
            let text: String = body.chars().take(MAX_ERROR_BODY).collect();
            format!("Response: {}", text)
        }
    }
}
