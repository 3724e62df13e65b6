//! Folding raw exports into a long-lived per-account archive.
//!
//! Each run exports only what it saw. The archive (`<target>_data.json`)
//! accumulates posts across runs keyed by id, newest first, and keeps a
//! history of the account's name and handle.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::info;

use crate::library::{ArchiveDocument, ArchiveMeta, ProfileSnapshot};
use crate::model::{ExportDocument, Post, ProfileData};

/// Suffix of an account's archive file.
pub const ARCHIVE_FILE_SUFFIX: &str = "_data.json";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid archive JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a merge changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Posts whose id was not in the archive yet.
    pub added: usize,
    /// Posts in the archive after the merge.
    pub total: usize,
    /// Whether a new profile history entry was started.
    pub profile_changed: bool,
}

#[must_use]
pub fn archive_file_name(target: &str) -> String {
    format!("{target}{ARCHIVE_FILE_SUFFIX}")
}

/// Merge posts by id. A post seen again replaces the stored one in place;
/// the result is sorted newest first, with undated posts last.
///
/// Returns the merged list and how many incoming ids were new.
#[must_use]
pub fn merge_posts(existing: Vec<Post>, incoming: Vec<Post>) -> (Vec<Post>, usize) {
    let mut merged: Vec<Post> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut added = 0;

    let existing = existing
        .into_iter()
        .filter(|post| !post.id.is_empty())
        .map(|post| (post, false));
    for (post, is_new) in existing.chain(incoming.into_iter().map(|post| (post, true))) {
        match index.get(&post.id) {
            Some(&at) => merged[at] = post,
            None => {
                index.insert(post.id.clone(), merged.len());
                merged.push(post);
                if is_new {
                    added += 1;
                }
            }
        }
    }

    // Stable, so posts with equal or missing dates keep merge order.
    merged.sort_by(|a, b| post_instant(b).cmp(&post_instant(a)));
    (merged, added)
}

fn post_instant(post: &Post) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&post.date)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Record the current profile in a newest-first history.
///
/// A new entry is started only when the name or handle differs from the
/// newest one; otherwise the newest entry is refreshed with the current
/// avatar and counts. Returns the history and whether an entry was added.
#[must_use]
pub fn update_profile_history(
    mut history: Vec<ProfileSnapshot>,
    profile: &ProfileData,
    at: &str,
) -> (Vec<ProfileSnapshot>, bool) {
    let current = ProfileSnapshot {
        date: Some(at.to_string()),
        name: Some(profile.name.clone()),
        screen_name: Some(profile.screen_name.clone()),
        avatar: Some(profile.avatar_url.clone()),
        following: Some(profile.following.clone()),
        followers: Some(profile.followers.clone()),
    };

    let Some(latest) = history.first_mut() else {
        return (vec![current], true);
    };
    let renamed = latest.name.as_deref().unwrap_or_default() != profile.name
        || latest.screen_name.as_deref().unwrap_or_default() != profile.screen_name;

    if renamed {
        history.insert(0, current);
    } else {
        *latest = current;
    }
    (history, renamed)
}

/// Fold one export into an archive, stamped with `at`.
#[must_use]
pub fn merge_export(
    existing: Option<ArchiveDocument>,
    export: ExportDocument,
    at: DateTime<Utc>,
) -> (ArchiveDocument, MergeReport) {
    let existing = existing.unwrap_or_default();
    let stamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);

    let (profile_history, profile_changed) =
        update_profile_history(existing.meta.profile_history, &export.meta.user_info, &stamp);
    let (posts, added) = merge_posts(existing.posts, export.posts);

    let report = MergeReport {
        added,
        total: posts.len(),
        profile_changed,
    };
    let document = ArchiveDocument {
        meta: ArchiveMeta {
            target: None,
            target_user: Some(export.meta.target),
            exported_at: None,
            last_updated: Some(stamp),
            total_posts_retrieved: Some(posts.len() as u64),
            profile_history,
            user_info: Some(export.meta.user_info.into()),
        },
        posts,
    };
    (document, report)
}

/// Merge an export into `<target>_data.json` under `dir`, creating it on the
/// first run. Returns the archive path and what changed.
///
/// # Errors
///
/// Returns an error if an existing archive cannot be read or parsed, or the
/// merged archive cannot be written. A missing archive is not an error.
pub async fn merge_into_dir(
    dir: &Path,
    export: ExportDocument,
) -> Result<(PathBuf, MergeReport), ArchiveError> {
    let path = dir.join(archive_file_name(&export.meta.target));

    let existing = match tokio::fs::read_to_string(&path).await {
        Ok(text) => Some(serde_json::from_str::<ArchiveDocument>(&text)?),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(source) => {
            return Err(ArchiveError::Read {
                path: path.clone(),
                source,
            })
        }
    };

    let (document, report) = merge_export(existing, export, Utc::now());
    let json = serde_json::to_string_pretty(&document)?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| ArchiveError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|source| ArchiveError::Write {
            path: path.clone(),
            source,
        })?;

    info!(
        path = %path.display(),
        added = report.added,
        total = report.total,
        profile_changed = report.profile_changed,
        "Archive updated"
    );
    Ok((path, report))
}
