//! Media URL resolution.
//!
//! Two independent sources can tell us which media a post carries: the
//! structured record behind the rendered node (true video variants) and the
//! visible `<img>` elements (thumbnails). Strategies are tried in order and
//! the first one that produces anything wins; results are never merged.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use serde_json::Value;

use crate::dom;
use crate::view::PropertyChain;

static TWEET_PHOTO_IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[data-testid="tweetPhoto"] img"#).unwrap());

static IMAGE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|webp)$").unwrap());

const ANIMATED_THUMB_PATH: &str = "pbs.twimg.com/tweet_video_thumb";
const ANIMATED_VIDEO_PATH: &str = "video.twimg.com/tweet_video";

/// Everything a strategy may look at for one post.
#[derive(Clone, Copy)]
pub struct MediaContext<'a> {
    pub post: ElementRef<'a>,
    pub post_id: &'a str,
    pub record: Option<&'a PropertyChain>,
}

/// One way of finding a post's media.
pub trait MediaStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Media URLs in display order, or `None` when this source has nothing.
    fn resolve(&self, ctx: &MediaContext<'_>) -> Option<Vec<String>>;
}

/// Ordered list of strategies; first non-empty answer wins.
pub struct MediaResolver {
    strategies: Vec<Box<dyn MediaStrategy>>,
}

impl MediaResolver {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn MediaStrategy>>) -> Self {
        Self { strategies }
    }

    #[must_use]
    pub fn resolve(&self, ctx: &MediaContext<'_>) -> Vec<String> {
        self.strategies
            .iter()
            .find_map(|strategy| {
                strategy
                    .resolve(ctx)
                    .filter(|urls| !urls.is_empty())
                    .inspect(|urls| {
                        tracing::trace!(
                            post_id = %ctx.post_id,
                            strategy = strategy.name(),
                            count = urls.len(),
                            "Resolved media"
                        );
                    })
            })
            .unwrap_or_default()
    }
}

impl Default for MediaResolver {
    fn default() -> Self {
        Self::new(vec![Box::new(StructuredMedia), Box::new(VisibleMedia)])
    }
}

/// Media entities from the post's structured record.
pub struct StructuredMedia;

impl MediaStrategy for StructuredMedia {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn resolve(&self, ctx: &MediaContext<'_>) -> Option<Vec<String>> {
        let payload = ctx.record?.find_post_payload(ctx.post_id)?;
        let legacy = payload.get("legacy")?;
        let entries = legacy
            .pointer("/extended_entities/media")
            .or_else(|| legacy.pointer("/entities/media"))?
            .as_array()?;

        let urls: Vec<String> = entries.iter().filter_map(media_entry_url).collect();
        (!urls.is_empty()).then_some(urls)
    }
}

/// One URL per media entity: the best mp4 variant for clips, the direct
/// image URL otherwise.
fn media_entry_url(entry: &Value) -> Option<String> {
    match entry.get("type").and_then(Value::as_str) {
        Some("video" | "animated_gif") => best_video_variant(entry),
        _ => entry
            .get("media_url_https")
            .or_else(|| entry.get("media_url"))
            .and_then(Value::as_str)
            .map(ToString::to_string),
    }
}

fn best_video_variant(entry: &Value) -> Option<String> {
    entry
        .pointer("/video_info/variants")?
        .as_array()?
        .iter()
        .filter(|variant| variant.get("content_type").and_then(Value::as_str) == Some("video/mp4"))
        .filter_map(|variant| {
            let url = variant.get("url").and_then(Value::as_str)?;
            let bitrate = variant.get("bitrate").and_then(Value::as_u64).unwrap_or(0);
            Some((bitrate, url))
        })
        .max_by_key(|(bitrate, _)| *bitrate)
        .map(|(_, url)| url.to_string())
}

/// Images visible in the post's media grid.
pub struct VisibleMedia;

impl MediaStrategy for VisibleMedia {
    fn name(&self) -> &'static str {
        "visible"
    }

    fn resolve(&self, ctx: &MediaContext<'_>) -> Option<Vec<String>> {
        let urls: Vec<String> = ctx
            .post
            .select(&TWEET_PHOTO_IMG)
            .filter_map(|img| dom::attr(img, "src"))
            .map(rewrite_animated_thumbnail)
            .collect();
        (!urls.is_empty()).then_some(urls)
    }
}

/// Map an animated-image thumbnail to the clip it stands for; any other URL
/// is returned unchanged.
#[must_use]
pub fn rewrite_animated_thumbnail(src: &str) -> String {
    if !src.contains(ANIMATED_THUMB_PATH) {
        return src.to_string();
    }
    let swapped = src.replacen(ANIMATED_THUMB_PATH, ANIMATED_VIDEO_PATH, 1);
    let base = swapped.split(['?', '#']).next().unwrap_or(&swapped);
    format!("{}.mp4", IMAGE_EXTENSION.replace(base, ""))
}
