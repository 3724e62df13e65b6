//! The rendering environment the collector drives.
//!
//! A [`View`] is whatever holds the rendered timeline: a live browser tab or a
//! recorded sequence of frames. The collector only ever asks it for a
//! snapshot of the current document, tells it to scroll, and reads back how
//! tall the content has become.

mod chromium;
mod replay;

pub use chromium::{ChromiumView, ChromiumViewConfig};
pub use replay::{ReplayFrame, ReplayView};

use anyhow::Result;
use async_trait::async_trait;
use scraper::Html;
use serde_json::Value;
use url::Url;

/// Where the view currently points, as far as target resolution cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub url: Url,
    /// Current value of the page's search box, when one is rendered.
    pub search_box: Option<String>,
}

impl Location {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            search_box: None,
        }
    }

    #[must_use]
    pub fn with_search_box(mut self, value: impl Into<String>) -> Self {
        self.search_box = Some(value.into());
        self
    }
}

/// Property bags found by walking a post node's render-tree parents,
/// nearest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyChain(pub Vec<Value>);

/// How deep into a property bag we look for a post payload.
const MAX_PAYLOAD_DEPTH: usize = 6;

impl PropertyChain {
    /// Find the post-shaped payload (an object carrying a `legacy` record)
    /// for the given post id.
    ///
    /// A payload whose id matches wins. Failing that, the nearest payload
    /// that carries no id at all is used. Payloads with a different id belong
    /// to another post (a quoted one, or a node that re-rendered between
    /// reads) and are never returned.
    #[must_use]
    pub fn find_post_payload(&self, post_id: &str) -> Option<&Value> {
        let mut candidates = Vec::new();
        for bag in &self.0 {
            collect_payloads(bag, 0, &mut candidates);
        }
        candidates
            .iter()
            .copied()
            .find(|payload| payload_id(payload) == Some(post_id))
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|payload| payload_id(payload).is_none())
            })
    }
}

fn collect_payloads<'a>(value: &'a Value, depth: usize, out: &mut Vec<&'a Value>) {
    if depth > MAX_PAYLOAD_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            if map.get("legacy").is_some_and(Value::is_object) {
                out.push(value);
            }
            for child in map.values() {
                collect_payloads(child, depth + 1, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_payloads(child, depth + 1, out);
            }
        }
        _ => {}
    }
}

fn payload_id(payload: &Value) -> Option<&str> {
    payload
        .get("rest_id")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/legacy/id_str").and_then(Value::as_str))
}

/// One look at the rendered document.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub html: String,
    /// Structured records for each post node, in document order. Missing or
    /// shorter than the post list when the render tree was not reachable.
    pub records: Vec<Option<PropertyChain>>,
}

impl PageSnapshot {
    #[must_use]
    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }

    /// Structured record for the post node at `index` in document order.
    #[must_use]
    pub fn record(&self, index: usize) -> Option<&PropertyChain> {
        self.records.get(index).and_then(Option::as_ref)
    }
}

/// The rendering environment.
#[async_trait]
pub trait View: Send {
    /// Where the view currently points.
    async fn location(&mut self) -> Result<Location>;

    /// The currently rendered document.
    async fn snapshot(&mut self) -> Result<PageSnapshot>;

    /// Scroll to the bottom of the rendered content.
    async fn scroll_to_end(&mut self) -> Result<()>;

    /// Current height of the rendered content.
    async fn content_extent(&mut self) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_post_payload_prefers_matching_id() {
        let chain = PropertyChain(vec![
            json!({"quoted": {"rest_id": "1", "legacy": {"id_str": "1"}}}),
            json!({"tweet": {"rest_id": "2", "legacy": {"id_str": "2"}}}),
        ]);
        let payload = chain.find_post_payload("2").unwrap();
        assert_eq!(payload["rest_id"], "2");
    }

    #[test]
    fn test_find_post_payload_falls_back_to_unidentified() {
        let chain = PropertyChain(vec![json!({"tweet": {"legacy": {"full_text": "x"}}})]);
        assert!(chain.find_post_payload("999").is_some());
    }

    #[test]
    fn test_find_post_payload_rejects_other_post() {
        let chain = PropertyChain(vec![json!({
            "quoted": {"rest_id": "1", "legacy": {"id_str": "1"}}
        })]);
        assert!(chain.find_post_payload("2").is_none());
    }

    #[test]
    fn test_find_post_payload_skips_other_post_for_unidentified() {
        let chain = PropertyChain(vec![
            json!({"quoted": {"rest_id": "1", "legacy": {"id_str": "1"}}}),
            json!({"tweet": {"legacy": {"full_text": "mine"}}}),
        ]);
        let payload = chain.find_post_payload("2").unwrap();
        assert_eq!(payload["legacy"]["full_text"], "mine");
    }

    #[test]
    fn test_find_post_payload_none_without_legacy() {
        let chain = PropertyChain(vec![json!({"children": [1, 2, 3]})]);
        assert!(chain.find_post_payload("1").is_none());
    }

    #[test]
    fn test_snapshot_record_lookup() {
        let snapshot = PageSnapshot {
            html: String::new(),
            records: vec![None, Some(PropertyChain::default())],
        };
        assert!(snapshot.record(0).is_none());
        assert!(snapshot.record(1).is_some());
        assert!(snapshot.record(5).is_none());
    }
}
