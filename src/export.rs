//! Packaging a finished run into the export document and saving it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::info;

use crate::collector::HarvestOutcome;
use crate::model::{ExportDocument, ExportMeta};

/// Suffix of the suggested export file name.
pub const EXPORT_FILE_SUFFIX: &str = "_tweets_raw.json";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Suggested file name for a target's export.
#[must_use]
pub fn export_file_name(target: &str) -> String {
    format!("{target}{EXPORT_FILE_SUFFIX}")
}

/// Build the export document, stamped with the current time.
#[must_use]
pub fn assemble(outcome: HarvestOutcome) -> ExportDocument {
    assemble_at(outcome, Utc::now())
}

/// Build the export document with an explicit export time.
#[must_use]
pub fn assemble_at(outcome: HarvestOutcome, exported_at: DateTime<Utc>) -> ExportDocument {
    ExportDocument {
        meta: ExportMeta {
            target: outcome.target,
            exported_at: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            user_info: outcome.profile,
        },
        posts: outcome.posts,
    }
}

/// Where an export document ends up.
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Save the document under `file_name`. Returns where it went.
    async fn save(&self, file_name: &str, document: &ExportDocument) -> Result<PathBuf, ExportError>;
}

/// Writes pretty-printed JSON into a directory.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ExportSink for FileSink {
    async fn save(&self, file_name: &str, document: &ExportDocument) -> Result<PathBuf, ExportError> {
        let json = serde_json::to_string_pretty(document)?;
        let path = self.dir.join(file_name);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ExportError::Write {
                path: self.dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| ExportError::Write {
                path: path.clone(),
                source,
            })?;

        info!(
            path = %path.display(),
            posts = document.posts.len(),
            "Export saved"
        );
        Ok(path)
    }
}
