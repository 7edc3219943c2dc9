//! Channel identity and feed URL handling.
//!
//! Feed URLs are the reconciliation identity between the chat source and the
//! feed reader. Comparison is case-insensitive; the reader's casing wins when
//! both sides know a URL.

use tracing::warn;

use crate::config::PrivateFeedMode;
use crate::telegram::Channel;

const TELEGRAM_CHANNEL_PATH: &str = "/telegram/channel/";

/// Build the RSSHub feed URL for a channel.
///
/// Returns `None` when the channel must not be synced: a private channel in
/// `skip` mode, or a public channel without a username.
pub fn build_feed_url(channel: &Channel, base_url: &str, mode: PrivateFeedMode) -> Option<String> {
    let base_url = base_url.trim_end_matches('/');

    if channel.is_private {
        if mode == PrivateFeedMode::Skip {
            return None;
        }

        let mut url = format!("{}{}{}", base_url, TELEGRAM_CHANNEL_PATH, channel.id.unsigned_abs());
        if let Some(secret) = channel.access_secret.as_deref().filter(|s| !s.is_empty()) {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("secret", secret)
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        return Some(url);
    }

    match channel.username.as_deref().filter(|u| !u.is_empty()) {
        Some(username) => Some(format!(
            "{}{}{}",
            base_url,
            TELEGRAM_CHANNEL_PATH,
            username.to_lowercase()
        )),
        None => {
            warn!("Public channel {} has no username", channel.title);
            None
        }
    }
}

/// Comparison key for a feed URL
pub fn normalize_for_comparison(url: &str) -> String {
    url.to_lowercase()
}

/// Whether a feed URL was generated by our RSSHub instance for a Telegram channel
pub fn is_managed_feed(url: &str, base_url: &str) -> bool {
    url.starts_with(base_url.trim_end_matches('/')) && url.contains(TELEGRAM_CHANNEL_PATH)
}

/// Human-facing link to a channel
pub fn channel_link(channel: &Channel) -> String {
    match channel.username.as_deref() {
        Some(username) if !username.is_empty() => format!("https://t.me/{}", username),
        _ if channel.is_private => format!("https://t.me/c/{}", channel.id.unsigned_abs()),
        _ => "Private channel".to_string(),
    }
}
