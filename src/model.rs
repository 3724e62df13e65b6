//! Records produced by a harvest run and the export document they end up in.

use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder for counts that could not be read.
pub const UNKNOWN_COUNT: &str = "0";

/// One collected post.
///
/// Posts are write-once: the collector keeps the first observation of an id
/// and never touches it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Trailing path segment of the permalink.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Machine-readable timestamp, verbatim from the page. Older documents
    /// may carry `null` here; it reads back as empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    /// Body text with inline emoji images replaced by their alt text.
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    /// Absolute permalink.
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    /// Media URLs in display order. Entries ending in `.mp4` are videos.
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
    #[serde(default)]
    pub poll: Option<Poll>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metrics: Metrics,
}

impl Post {
    /// Whether any media entry points at a playable video.
    #[must_use]
    pub fn has_video(&self) -> bool {
        self.images.iter().any(|url| is_video_url(url))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Whether a media URL refers to a video rather than a still image.
#[must_use]
pub fn is_video_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".mp4")
}

/// A poll widget as rendered under a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub total_votes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub label: String,
    pub percent: f64,
}

/// Engagement counters in the compact form the page shows them ("1.2K").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub reply: String,
    pub repost: String,
    pub like: String,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            reply: UNKNOWN_COUNT.to_string(),
            repost: UNKNOWN_COUNT.to_string(),
            like: UNKNOWN_COUNT.to_string(),
        }
    }
}

/// Profile fields of the target account, filled in as the run discovers them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub name: String,
    pub screen_name: String,
    pub avatar_url: String,
    pub following: String,
    pub followers: String,
}

impl ProfileData {
    /// Identity-derived placeholder used before anything has been found.
    #[must_use]
    pub fn placeholder(target: &str) -> Self {
        Self {
            name: target.to_string(),
            screen_name: format!("@{target}"),
            avatar_url: String::new(),
            following: UNKNOWN_COUNT.to_string(),
            followers: UNKNOWN_COUNT.to_string(),
        }
    }
}

/// The document handed to the export sink at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub meta: ExportMeta,
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMeta {
    pub target: String,
    pub exported_at: String,
    pub user_info: ProfileData,
}
