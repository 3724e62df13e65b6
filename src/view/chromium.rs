//! A live browser tab driven over the DevTools protocol.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::replay::parse_records;
use super::{Location, PageSnapshot, View};

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 800;
pub const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SETTLE_MS: u64 = 2000;

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";

const EXTENT_SCRIPT: &str = "document.body.scrollHeight";

const SEARCH_BOX_SCRIPT: &str = r#"(() => {
  const input = document.querySelector('input[data-testid="SearchBox_Search_Input"]');
  return input ? input.value : null;
})()"#;

/// Walks each post node's render-tree parents and copies out their props,
/// minus functions, DOM nodes and cycles. One entry per post node in document
/// order: `null` when the node has no render-tree handle.
const RECORDS_SCRIPT: &str = r#"(() => {
  const copy = (value, depth, seen) => {
    if (value === null || typeof value !== 'object') {
      return typeof value === 'function' ? undefined : value;
    }
    if (depth <= 0 || seen.has(value) || value instanceof Node) return undefined;
    seen.add(value);
    if (Array.isArray(value)) {
      return value.slice(0, 64).map((v) => copy(v, depth - 1, seen) ?? null);
    }
    const out = {};
    for (const key of Object.keys(value)) {
      if (key.startsWith('_') || key === 'children') continue;
      const v = copy(value[key], depth - 1, seen);
      if (v !== undefined) out[key] = v;
    }
    return out;
  };
  const nodes = document.querySelectorAll('article[data-testid="tweet"]');
  return JSON.stringify(Array.from(nodes, (node) => {
    const key = Object.keys(node).find((k) => k.startsWith('__reactFiber$'));
    if (!key) return null;
    const chain = [];
    for (let fiber = node[key], i = 0; fiber && i < 25; fiber = fiber.return, i++) {
      const props = fiber.memoizedProps;
      if (props && typeof props === 'object') {
        const bag = copy(props, 12, new WeakSet());
        if (bag && Object.keys(bag).length > 0) chain.push(bag);
      }
    }
    return chain;
  }));
})()"#;

#[derive(Debug, Clone)]
pub struct ChromiumViewConfig {
    /// Page opened at launch.
    pub start_url: Url,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub page_timeout: Duration,
    /// Wait after navigation before the first snapshot.
    pub settle: Duration,
    /// Path to Chrome/Chromium executable (None for auto-detection).
    pub chrome_path: Option<String>,
    /// Existing user data directory, for a logged-in session.
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    /// Where to save every snapshot as a replayable frame.
    pub dump_dir: Option<PathBuf>,
}

impl ChromiumViewConfig {
    #[must_use]
    pub fn new(start_url: Url) -> Self {
        Self {
            start_url,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            page_timeout: Duration::from_secs(DEFAULT_PAGE_TIMEOUT_SECS),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            chrome_path: None,
            user_data_dir: None,
            headless: true,
            dump_dir: None,
        }
    }
}

/// One browser, one tab.
pub struct ChromiumView {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    dump_dir: Option<PathBuf>,
    frames_dumped: usize,
}

impl ChromiumView {
    /// Launch the browser and open the start page.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser cannot be launched or the start page
    /// does not load.
    pub async fn launch(config: ChromiumViewConfig) -> Result<Self> {
        info!(url = %config.start_url, headless = config.headless, "Launching browser");

        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.page_timeout)
            .no_sandbox()
            .disable_default_args()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--mute-audio");

        builder = if config.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        if let Some(ref chrome_path) = config.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }
        if let Some(ref dir) = config.user_data_dir {
            builder = builder.user_data_dir(dir);
        }

        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        let page = browser
            .new_page(config.start_url.as_str())
            .await
            .context("Failed to open start page")?;
        page.wait_for_navigation()
            .await
            .context("Navigation timeout")?;
        tokio::time::sleep(config.settle).await;

        if let Some(ref dir) = config.dump_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create dump directory {}", dir.display()))?;
        }

        Ok(Self {
            browser,
            page,
            handler,
            dump_dir: config.dump_dir,
            frames_dumped: 0,
        })
    }

    /// Close the browser.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {e}");
        } else {
            info!("Browser shutdown complete");
        }
        self.handler.abort();
    }
}

async fn read_records(page: &Page) -> Result<String> {
    let raw: String = page
        .evaluate(RECORDS_SCRIPT)
        .await
        .context("Render tree walk failed")?
        .into_value()
        .context("Render tree walk returned no JSON")?;
    Ok(raw)
}

async fn dump(dir: Option<&Path>, name: &str, contents: &str) {
    let Some(dir) = dir else {
        return;
    };
    let path = dir.join(name);
    if let Err(e) = tokio::fs::write(&path, contents).await {
        warn!(path = %path.display(), "Failed to dump frame: {e}");
    }
}

fn frame_name(index: usize, extension: &str) -> String {
    format!("{index:04}.{extension}")
}

#[async_trait]
impl View for ChromiumView {
    async fn location(&mut self) -> Result<Location> {
        let url = self
            .page
            .url()
            .await
            .context("Failed to read page URL")?
            .context("Page has no URL")?;
        let url = Url::parse(&url).with_context(|| format!("Invalid page URL {url}"))?;

        let search_box: Option<String> = self
            .page
            .evaluate(SEARCH_BOX_SCRIPT)
            .await
            .context("Failed to read search box")?
            .into_value()
            .unwrap_or_default();

        let mut location = Location::new(url);
        location.search_box = search_box.filter(|v| !v.trim().is_empty());

        if self.frames_dumped == 0 {
            let mut text = location.url.to_string();
            if let Some(ref value) = location.search_box {
                text.push('\n');
                text.push_str(value);
            }
            dump(self.dump_dir.as_deref(), "location.txt", &text).await;
        }
        Ok(location)
    }

    async fn snapshot(&mut self) -> Result<PageSnapshot> {
        let html = self
            .page
            .content()
            .await
            .context("Failed to read page content")?;

        // Structured records are an optional layer; extraction falls back to
        // the markup without them.
        let (raw_records, records) = match read_records(&self.page).await {
            Ok(raw) => match parse_records(&raw) {
                Ok(records) => (Some(raw), records),
                Err(e) => {
                    warn!("Unreadable render tree records: {e:#}");
                    (None, Vec::new())
                }
            },
            Err(e) => {
                debug!("No render tree records: {e:#}");
                (None, Vec::new())
            }
        };

        if self.dump_dir.is_some() {
            let index = self.frames_dumped + 1;
            dump(self.dump_dir.as_deref(), &frame_name(index, "html"), &html).await;
            if let Some(ref raw) = raw_records {
                dump(self.dump_dir.as_deref(), &frame_name(index, "records.json"), raw).await;
            }
            self.frames_dumped = index;
        }

        Ok(PageSnapshot { html, records })
    }

    async fn scroll_to_end(&mut self) -> Result<()> {
        self.page
            .evaluate(SCROLL_SCRIPT)
            .await
            .context("Failed to scroll")?;
        Ok(())
    }

    async fn content_extent(&mut self) -> Result<u64> {
        let extent: u64 = self
            .page
            .evaluate(EXTENT_SCRIPT)
            .await
            .context("Failed to measure page")?
            .into_value()
            .context("Page height is not a number")?;

        // The height after a scroll belongs to the frame the next snapshot
        // will show.
        if self.dump_dir.is_some() {
            let name = frame_name(self.frames_dumped + 1, "extent");
            dump(self.dump_dir.as_deref(), &name, &extent.to_string()).await;
        }
        Ok(extent)
    }
}
