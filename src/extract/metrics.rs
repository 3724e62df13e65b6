use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use crate::dom;
use crate::model::{Metrics, UNKNOWN_COUNT};

/// Which engagement counter to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Reply,
    Repost,
    Like,
}

static REPLY: LazyLock<Vec<Selector>> =
    LazyLock::new(|| vec![Selector::parse(r#"[data-testid="reply"]"#).unwrap()]);

// The toggled roles show up once the viewing account has reposted/liked.
static REPOST: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    vec![
        Selector::parse(r#"[data-testid="retweet"]"#).unwrap(),
        Selector::parse(r#"[data-testid="unretweet"]"#).unwrap(),
    ]
});

static LIKE: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    vec![
        Selector::parse(r#"[data-testid="like"]"#).unwrap(),
        Selector::parse(r#"[data-testid="unlike"]"#).unwrap(),
    ]
});

impl MetricKind {
    fn selectors(self) -> &'static [Selector] {
        match self {
            Self::Reply => REPLY.as_slice(),
            Self::Repost => REPOST.as_slice(),
            Self::Like => LIKE.as_slice(),
        }
    }
}

/// Read one counter: the accessible label if present, else the visible text,
/// else `"0"`.
#[must_use]
pub fn read_metric(post: ElementRef<'_>, kind: MetricKind) -> String {
    let Some(region) = kind
        .selectors()
        .iter()
        .find_map(|selector| dom::first(post, selector))
    else {
        return UNKNOWN_COUNT.to_string();
    };

    if let Some(label) = dom::attr(region, "aria-label") {
        return label.to_string();
    }

    let text = dom::inner_text(region);
    if text.is_empty() {
        UNKNOWN_COUNT.to_string()
    } else {
        text
    }
}

/// Read all three counters of a post.
#[must_use]
pub fn read_metrics(post: ElementRef<'_>) -> Metrics {
    Metrics {
        reply: read_metric(post, MetricKind::Reply),
        repost: read_metric(post, MetricKind::Repost),
        like: read_metric(post, MetricKind::Like),
    }
}
