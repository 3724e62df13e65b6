//! Reading export documents back for browsing.
//!
//! Documents from several runs are merged by target account; a later load for
//! the same account replaces the earlier one. Older exports carry
//! `meta.target_user` and a newest-first `meta.profile_history` instead of
//! `meta.target` and `meta.user_info`, so both shapes are accepted. The
//! archive shape is what [`crate::archive`] writes.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{Poll, Post, ProfileData};

pub const DEFAULT_AVATAR_URL: &str =
    "https://abs.twimg.com/sticky/default_profile_images/default_profile_400x400.png";

/// Shown for follow counts a document does not carry.
pub const MISSING_COUNT: &str = "-";

const UNKNOWN_TARGET: &str = "unknown";

static COMPACT_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d,.]+[KMGT万億]?)").unwrap());

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("failed to parse export document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An export document as loosely as the browser accepts it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveDocument {
    #[serde(default)]
    pub meta: ArchiveMeta,
    #[serde(default)]
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_posts_retrieved: Option<u64>,
    #[serde(default)]
    pub profile_history: Vec<ProfileSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub name: Option<String>,
    pub screen_name: Option<String>,
    pub avatar_url: Option<String>,
    pub following: Option<String>,
    pub followers: Option<String>,
}

impl From<ProfileData> for UserInfo {
    fn from(profile: ProfileData) -> Self {
        Self {
            name: Some(profile.name),
            screen_name: Some(profile.screen_name),
            avatar_url: Some(profile.avatar_url),
            following: Some(profile.following),
            followers: Some(profile.followers),
        }
    }
}

/// One entry of a merged archive's profile history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    /// When this entry was last confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub name: Option<String>,
    pub screen_name: Option<String>,
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<String>,
}

impl ArchiveDocument {
    /// The account this document belongs to.
    #[must_use]
    pub fn target(&self) -> &str {
        [&self.meta.target, &self.meta.target_user]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .find(|t| !t.is_empty())
            .unwrap_or(UNKNOWN_TARGET)
    }
}

/// What the header shows for an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProfile {
    pub name: String,
    pub screen_name: String,
    pub avatar_url: String,
    pub following: String,
    pub followers: String,
    pub post_count: u64,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Posts,
    /// Only posts with at least one media entry.
    Media,
}

/// Loaded documents keyed by target, in first-load order.
#[derive(Debug, Default)]
pub struct Library {
    accounts: Vec<(String, ArchiveDocument)>,
}

impl Library {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parsed document. Returns the account key it was filed under.
    pub fn insert(&mut self, document: ArchiveDocument) -> String {
        let target = document.target().to_string();
        match self.accounts.iter_mut().find(|(key, _)| *key == target) {
            Some((_, existing)) => {
                debug!(account = %target, "Replacing loaded archive");
                *existing = document;
            }
            None => self.accounts.push((target.clone(), document)),
        }
        target
    }

    /// Parse and add a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not an export document; the library is
    /// left unchanged.
    pub fn load_str(&mut self, json: &str) -> Result<String, LibraryError> {
        let document: ArchiveDocument = serde_json::from_str(json)?;
        Ok(self.insert(document))
    }

    /// Read, parse and add a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load_file(&mut self, path: &Path) -> Result<String, LibraryError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LibraryError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        self.load_str(&json)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.accounts.iter().map(|(key, _)| key.as_str())
    }

    #[must_use]
    pub fn get(&self, target: &str) -> Option<&ArchiveDocument> {
        self.accounts
            .iter()
            .find(|(key, _)| key == target)
            .map(|(_, document)| document)
    }

    #[must_use]
    pub fn header(&self, target: &str) -> Option<HeaderProfile> {
        self.get(target).map(|document| header_profile(target, document))
    }

    #[must_use]
    pub fn timeline(&self, target: &str, tab: Tab) -> Vec<&Post> {
        let Some(document) = self.get(target) else {
            return Vec::new();
        };
        document
            .posts
            .iter()
            .filter(|post| tab == Tab::Posts || !post.images.is_empty())
            .collect()
    }
}

/// Resolve the header: newest history entry, else the exported profile, else
/// a placeholder built from the account key.
#[must_use]
pub fn header_profile(target: &str, document: &ArchiveDocument) -> HeaderProfile {
    let meta = &document.meta;
    let info = meta.user_info.clone().unwrap_or_default();

    let latest = meta.profile_history.first();
    let (name, screen_name, avatar) = match latest {
        Some(latest) => (latest.name.clone(), latest.screen_name.clone(), latest.avatar.clone()),
        None => (info.name.clone(), info.screen_name.clone(), info.avatar_url.clone()),
    };
    let following = non_empty(info.following).or_else(|| latest.and_then(|l| non_empty(l.following.clone())));
    let followers = non_empty(info.followers).or_else(|| latest.and_then(|l| non_empty(l.followers.clone())));

    HeaderProfile {
        name: non_empty(name).unwrap_or_else(|| target.to_string()),
        screen_name: non_empty(screen_name).unwrap_or_else(|| format!("@{target}")),
        avatar_url: avatar_url(avatar.as_deref()),
        following: following.unwrap_or_else(|| MISSING_COUNT.to_string()),
        followers: followers.unwrap_or_else(|| MISSING_COUNT.to_string()),
        post_count: meta
            .total_posts_retrieved
            .unwrap_or(document.posts.len() as u64),
        updated_at: meta.last_updated.clone().or_else(|| meta.exported_at.clone()),
    }
}

/// Normalise a stored avatar path, or fall back to the default avatar.
#[must_use]
pub fn avatar_url(avatar: Option<&str>) -> String {
    match avatar.filter(|a| !a.is_empty()) {
        Some(path) => media_path(path),
        None => DEFAULT_AVATAR_URL.to_string(),
    }
}

/// Media entries saved on Windows use backslashes.
#[must_use]
pub fn media_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Pull the compact number out of a metric label such as "1.2K Likes".
#[must_use]
pub fn compact_count(label: &str) -> String {
    COMPACT_COUNT
        .captures(label)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| "0".to_string(), |m| m.as_str().to_string())
}

/// Votes per option, reconstructed from the total and the percentages.
#[must_use]
pub fn estimated_votes(poll: &Poll) -> Vec<u64> {
    poll.options
        .iter()
        .map(|option| {
            let votes = poll.total_votes as f64 * option.percent / 100.0;
            votes.round().max(0.0) as u64
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PollOption;

    const EXPORT: &str = r#"{
        "meta": {
            "target": "someone",
            "exported_at": "2024-06-15T12:00:00.000Z",
            "user_info": {
                "name": "Some One",
                "screenName": "@someone",
                "avatarUrl": "https://pbs.twimg.com/profile_images/1/a.jpg",
                "following": "120",
                "followers": "3.4K"
            }
        },
        "posts": [
            {"id": "1", "date": "2024-06-01T00:00:00.000Z", "text": "plain",
             "url": "https://x.com/someone/status/1", "images": [], "poll": null,
             "metrics": {"reply": "0", "repost": "2", "like": "10"}},
            {"id": "2", "date": "2024-06-02T00:00:00.000Z", "text": "pic",
             "url": "https://x.com/someone/status/2",
             "images": ["https://pbs.twimg.com/media/x.jpg"]}
        ]
    }"#;

    const MERGED: &str = r#"{
        "meta": {
            "target_user": "someone",
            "last_updated": "2024-07-01T00:00:00",
            "total_posts_retrieved": 250,
            "profile_history": [
                {"name": "New Name", "screen_name": "@someone", "avatar": "media\\someone\\avatar.jpg"},
                {"name": "Old Name", "screen_name": "@someone", "avatar": ""}
            ]
        },
        "posts": []
    }"#;

    #[test]
    fn test_header_from_user_info() {
        let mut library = Library::new();
        let key = library.load_str(EXPORT).unwrap();
        assert_eq!(key, "someone");
        let header = library.header("someone").unwrap();
        assert_eq!(header.name, "Some One");
        assert_eq!(header.followers, "3.4K");
        assert_eq!(header.post_count, 2);
        assert_eq!(header.updated_at.as_deref(), Some("2024-06-15T12:00:00.000Z"));
    }

    #[test]
    fn test_header_prefers_newest_history_entry() {
        let mut library = Library::new();
        library.load_str(MERGED).unwrap();
        let header = library.header("someone").unwrap();
        assert_eq!(header.name, "New Name");
        assert_eq!(header.avatar_url, "media/someone/avatar.jpg");
        assert_eq!(header.following, MISSING_COUNT);
        assert_eq!(header.post_count, 250);
    }

    #[test]
    fn test_later_load_replaces_same_target() {
        let mut library = Library::new();
        library.load_str(EXPORT).unwrap();
        library.load_str(r#"{"meta": {"target": "other"}, "posts": []}"#).unwrap();
        library.load_str(MERGED).unwrap();
        let targets: Vec<_> = library.targets().collect();
        assert_eq!(targets, ["someone", "other"]);
        assert_eq!(library.header("someone").unwrap().name, "New Name");
    }

    #[test]
    fn test_missing_target_is_unknown() {
        let mut library = Library::new();
        assert_eq!(library.load_str(r#"{"posts": []}"#).unwrap(), "unknown");
        let header = library.header("unknown").unwrap();
        assert_eq!(header.name, "unknown");
        assert_eq!(header.screen_name, "@unknown");
        assert_eq!(header.avatar_url, DEFAULT_AVATAR_URL);
    }

    #[test]
    fn test_null_post_date_does_not_fail_load() {
        let mut library = Library::new();
        library
            .load_str(
                r#"{"meta": {"target": "someone"}, "posts": [
                    {"id": "9", "date": null, "text": "undated", "url": "https://x.com/someone/status/9"}
                ]}"#,
            )
            .unwrap();
        let posts = library.timeline("someone", Tab::Posts);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].date, "");
        assert_eq!(posts[0].text, "undated");
    }

    #[test]
    fn test_invalid_document_leaves_library_unchanged() {
        let mut library = Library::new();
        assert!(library.load_str("not json").is_err());
        assert_eq!(library.targets().count(), 0);
    }

    #[test]
    fn test_media_tab_filters() {
        let mut library = Library::new();
        library.load_str(EXPORT).unwrap();
        assert_eq!(library.timeline("someone", Tab::Posts).len(), 2);
        let media = library.timeline("someone", Tab::Media);
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].id, "2");
        assert!(library.timeline("nobody", Tab::Posts).is_empty());
    }

    #[test]
    fn test_missing_metrics_default() {
        let mut library = Library::new();
        library.load_str(EXPORT).unwrap();
        let posts = library.timeline("someone", Tab::Posts);
        assert_eq!(posts[1].metrics.like, "0");
    }

    #[test]
    fn test_compact_count() {
        assert_eq!(compact_count("1.2K Likes"), "1.2K");
        assert_eq!(compact_count("1,234 replies"), "1,234");
        assert_eq!(compact_count("3万"), "3万");
        assert_eq!(compact_count("Reply"), "0");
        assert_eq!(compact_count(""), "0");
    }

    #[test]
    fn test_estimated_votes() {
        let poll = Poll {
            options: vec![
                PollOption {
                    label: "A".to_string(),
                    percent: 42.0,
                },
                PollOption {
                    label: "B".to_string(),
                    percent: 58.0,
                },
            ],
            total_votes: 1234,
        };
        assert_eq!(estimated_votes(&poll), [518, 716]);
    }
}
