//! Small text helpers shared by the stages.
//!
//! - String truncation for logging remote response bodies
//! - JSON error detection for spotting truncated model output
//! - HTML-to-text reduction for feed summaries
//! - Hashtag normalization

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

/// Anything that cannot appear in an Instagram hashtag.
static NON_HASHTAG_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\p{L}\p{N}_]").expect("hashtag character class is a valid regex")
});

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a char
/// boundary) and suffixed with the number of bytes dropped.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the model's reply is cut off (e.g. by an output token limit) the JSON
/// fails with an EOF error rather than a data error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Reduce an HTML fragment to its visible text with whitespace collapsed.
///
/// Feed descriptions frequently embed markup (`<p>`, links, images). Plain
/// text passes through unchanged apart from whitespace.
pub fn html_to_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    doc.root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a hashtag as returned by the model.
///
/// Leading `#` and any character Instagram would cut the tag at are removed,
/// so `"#Open AI"` becomes `"OpenAI"`. May return an empty string.
pub fn normalize_hashtag(tag: &str) -> String {
    let tag = tag.trim().trim_start_matches('#');
    NON_HASHTAG_CHARS.replace_all(tag, "").into_owned()
}
