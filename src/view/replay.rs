//! Offline playback of previously rendered frames.
//!
//! A replay directory holds `location.txt` (page URL, optionally followed by
//! the search box value on a second line) and one `<name>.html` file per
//! frame, played back in file-name order. Each frame may have a
//! `<name>.records.json` sidecar with the structured records of its posts and
//! a `<name>.extent` file with the measured content height; without one the
//! document length stands in for the height.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::{Location, PageSnapshot, PropertyChain, View};

/// One rendered state of the page.
#[derive(Debug, Clone)]
pub struct ReplayFrame {
    pub html: String,
    pub extent: u64,
    pub records: Vec<Option<PropertyChain>>,
}

impl ReplayFrame {
    #[must_use]
    pub fn new(html: impl Into<String>, extent: u64) -> Self {
        Self {
            html: html.into(),
            extent,
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_records(mut self, records: Vec<Option<PropertyChain>>) -> Self {
        self.records = records;
        self
    }
}

/// A view that shows a fixed sequence of frames.
///
/// Every scroll moves to the next frame; past the last one the view keeps
/// showing it, which reads as a page that has stopped growing.
pub struct ReplayView {
    location: Location,
    frames: Vec<ReplayFrame>,
    current: usize,
    scrolls: usize,
}

impl ReplayView {
    #[must_use]
    pub fn new(location: Location, frames: Vec<ReplayFrame>) -> Self {
        Self {
            location,
            frames,
            current: 0,
            scrolls: 0,
        }
    }

    /// Load a replay directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `location.txt` is missing or invalid, a frame or
    /// sidecar cannot be read, or the directory holds no frames.
    pub async fn from_dir(dir: &Path) -> Result<Self> {
        let location_file = dir.join("location.txt");
        let location_text = tokio::fs::read_to_string(&location_file)
            .await
            .with_context(|| format!("Failed to read {}", location_file.display()))?;
        let location = parse_location(&location_text)
            .with_context(|| format!("Invalid location in {}", location_file.display()))?;

        let mut html_files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to list {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "html") {
                html_files.push(path);
            }
        }
        html_files.sort();

        let mut frames = Vec::with_capacity(html_files.len());
        for path in html_files {
            let html = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read frame {}", path.display()))?;

            let extent_path = path.with_extension("extent");
            let extent = match read_sidecar(&extent_path).await? {
                Some(text) => text
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid extent in {}", extent_path.display()))?,
                None => html.len() as u64,
            };

            let records_path = path.with_extension("records.json");
            let records = match read_sidecar(&records_path).await? {
                Some(text) => parse_records(&text)
                    .with_context(|| format!("Invalid records in {}", records_path.display()))?,
                None => Vec::new(),
            };

            debug!(frame = %path.display(), extent, records = records.len(), "Loaded replay frame");
            frames.push(ReplayFrame::new(html, extent).with_records(records));
        }

        if frames.is_empty() {
            bail!("No *.html frames in {}", dir.display());
        }
        info!(dir = %dir.display(), frames = frames.len(), url = %location.url, "Replay loaded");
        Ok(Self::new(location, frames))
    }

    /// How many times the view has been scrolled.
    #[must_use]
    pub fn scrolls(&self) -> usize {
        self.scrolls
    }

    fn frame(&self) -> Result<&ReplayFrame> {
        self.frames.get(self.current).context("Replay has no frames")
    }
}

#[async_trait]
impl View for ReplayView {
    async fn location(&mut self) -> Result<Location> {
        Ok(self.location.clone())
    }

    async fn snapshot(&mut self) -> Result<PageSnapshot> {
        let frame = self.frame()?;
        Ok(PageSnapshot {
            html: frame.html.clone(),
            records: frame.records.clone(),
        })
    }

    async fn scroll_to_end(&mut self) -> Result<()> {
        self.scrolls += 1;
        if self.current + 1 < self.frames.len() {
            self.current += 1;
        }
        Ok(())
    }

    async fn content_extent(&mut self) -> Result<u64> {
        Ok(self.frame()?.extent)
    }
}

/// Contents of an optional sidecar file; `None` only when it does not exist.
async fn read_sidecar(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn parse_location(text: &str) -> Result<Location> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let url = lines.next().context("Empty location file")?;
    let location = Location::new(Url::parse(url)?);
    Ok(match lines.next() {
        Some(search_box) => location.with_search_box(search_box),
        None => location,
    })
}

/// Records sidecars hold one entry per post node: `null` or an array of
/// property bags.
pub(crate) fn parse_records(text: &str) -> Result<Vec<Option<PropertyChain>>> {
    let raw: Vec<Option<Vec<Value>>> = serde_json::from_str(text)?;
    Ok(raw.into_iter().map(|chain| chain.map(PropertyChain)).collect())
}
