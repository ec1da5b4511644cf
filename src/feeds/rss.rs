//! RSS 2.0 and Atom parsing.
//!
//! `feed-rs` detects the dialect and handles namespaced extensions such as
//! Media RSS, so `<media:title>` never shadows an item's own `<title>`.
//! Feeds routinely use HTML named entities (`&eacute;`, `&nbsp;`) that XML
//! does not define; those are rewritten to numeric references first so a
//! single stray entity cannot sink the whole document.

use crate::models::FeedItem;
use crate::utils::html_to_text;
use feed_rs::parser::{self, ParseFeedError};
use once_cell::sync::Lazy;
use quick_xml::escape::{resolve_html5_entity, resolve_xml_entity};
use regex::{Captures, Regex};
use std::borrow::Cow;
use thiserror::Error;
use tracing::debug;

static NAMED_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").expect("named entity pattern is a valid regex")
});

#[derive(Error, Debug)]
pub enum FeedParseError {
    #[error("not a readable RSS or Atom feed: {0}")]
    Parse(#[from] ParseFeedError),
}

/// Rewrite HTML named entities as numeric character references.
///
/// The five XML entities are left alone. Names HTML doesn't know either are
/// escaped so they survive as literal text.
fn normalize_entities(xml: &str) -> Cow<'_, str> {
    NAMED_ENTITY.replace_all(xml, |caps: &Captures| {
        let name = &caps[1];
        if resolve_xml_entity(name).is_some() {
            return caps[0].to_string();
        }
        match resolve_html5_entity(name) {
            Some(text) => text.chars().map(|c| format!("&#{};", u32::from(c))).collect(),
            None => format!("&amp;{name};"),
        }
    })
}

fn to_item(title: Option<String>, summary: Option<String>) -> Option<FeedItem> {
    let title = html_to_text(title.as_deref()?);
    if title.is_empty() {
        return None;
    }
    let summary = summary
        .as_deref()
        .map(html_to_text)
        .filter(|s| !s.is_empty());
    Some(FeedItem::new(title, summary))
}

/// Parse a syndication document into items, in document order.
///
/// Entries without a title are skipped. The summary is the entry's
/// `description`/`summary`, or its content when there is none, reduced to
/// plain text.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, FeedParseError> {
    let xml = normalize_entities(xml);
    let feed = parser::parse(xml.as_bytes())?;
    debug!(feed_type = ?feed.feed_type, entries = feed.entries.len(), "Parsed feed document");

    let items = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let summary = entry
                .summary
                .map(|t| t.content)
                .or_else(|| entry.content.and_then(|c| c.body));
            to_item(entry.title.map(|t| t.content), summary)
        })
        .collect();
    Ok(items)
}
