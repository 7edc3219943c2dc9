use regex::Regex;
use std::sync::OnceLock;
use tracing::error;

use crate::error::{Error, Result};

const EMOJI_RANGES: &str = concat!(
    "[",
    "\u{1F600}-\u{1F64F}",
    "\u{1F300}-\u{1F5FF}",
    "\u{1F680}-\u{1F6FF}",
    "\u{1F1E0}-\u{1F1FF}",
    "\u{2702}-\u{27B0}",
    "\u{24C2}",
    "\u{1F170}-\u{1F251}",
    "\u{2B00}-\u{2BFF}",
    "\u{3297}\u{3299}",
    "\u{1F900}-\u{1F9FF}",
    "\u{1FA70}-\u{1FAFF}",
    "\u{2600}-\u{26FF}",
    "\u{2700}-\u{27BF}",
    "\u{2640}-\u{2642}",
    "\u{23CF}\u{23E9}\u{231A}\u{3030}",
    "]+"
);

// ZWJ, VS16, ZWNJ, ZWSP, word joiner, BOM, Mongolian vowel separator
const INVISIBLE_CHARS: &str = "[\u{200D}\u{FE0F}\u{200C}\u{200B}\u{2060}\u{FEFF}\u{180E}]+";

/// Compiled patterns for cleaning channel titles
#[derive(Debug, Clone)]
pub struct TitleSanitizer {
    emoji: Regex,
    invisible: Regex,
    whitespace: Regex,
}

impl TitleSanitizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            emoji: Regex::new(EMOJI_RANGES).map_err(|e| Error::Pattern(e.to_string()))?,
            invisible: Regex::new(INVISIBLE_CHARS).map_err(|e| Error::Pattern(e.to_string()))?,
            whitespace: Regex::new(r"\s+").map_err(|e| Error::Pattern(e.to_string()))?,
        })
    }

    /// Remove emoji and invisible joiners, keeping word boundaries.
    pub fn sanitize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let cleaned = self.emoji.replace_all(text, " ");
        let cleaned = self.invisible.replace_all(&cleaned, " ");
        self.whitespace.replace_all(&cleaned, " ").trim().to_string()
    }
}

fn shared_sanitizer() -> Option<&'static TitleSanitizer> {
    static SANITIZER: OnceLock<Option<TitleSanitizer>> = OnceLock::new();
    SANITIZER
        .get_or_init(|| match TitleSanitizer::new() {
            Ok(sanitizer) => Some(sanitizer),
            Err(e) => {
                error!("Title cleaning disabled: {}", e);
                None
            }
        })
        .as_ref()
}

/// Remove emoji and invisible joiners from a title, keeping word boundaries.
///
/// Without compiled patterns only whitespace is collapsed.
pub fn sanitize_title(text: &str) -> String {
    match shared_sanitizer() {
        Some(sanitizer) => sanitizer.sanitize(text),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// Title to use for a feed given the emoji setting
pub fn effective_title(title: &str, keep_emojis: bool) -> String {
    if keep_emojis {
        title.to_string()
    } else {
        sanitize_title(title)
    }
}
