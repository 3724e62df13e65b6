//! Turning rendered post nodes into [`Post`](crate::model::Post) records.

pub mod media;
pub mod metrics;
pub mod poll;
mod post;

use std::sync::LazyLock;

use scraper::Selector;
use thiserror::Error;

pub use media::{MediaContext, MediaResolver, MediaStrategy, StructuredMedia, VisibleMedia};
pub use metrics::{read_metric, read_metrics, MetricKind};
pub use poll::extract_poll;
pub use post::PostExtractor;

/// Every rendered post on a timeline, search page or thread.
pub static POST_NODE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"article[data-testid="tweet"]"#).unwrap());

/// Why a rendered post was not turned into a record.
///
/// These never leave the scan: the post is skipped and the loop carries on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("post has no author links")]
    NoAuthorLinks,
    #[error("post is not authored by @{target}")]
    NotOwned { target: String },
    #[error("post has no timestamp")]
    MissingTimestamp,
    #[error("timestamp is not inside a permalink")]
    MissingPermalink,
    #[error("permalink has no id segment: {0}")]
    InvalidPermalink(String),
}
