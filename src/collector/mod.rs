//! The scroll-driven collection loop.
//!
//! A run owns one [`Harvest`] context: the collected posts, the profile being
//! backfilled and the cutoff state. Each cycle scans the rendered snapshot,
//! scrolls, waits, and checks whether the page is still growing.

pub mod cutoff;
pub mod extent;
pub mod pacer;

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::extract::{MediaResolver, PostExtractor, POST_NODE};
use crate::identity::{self, IdentityError};
use crate::model::{Post, ProfileData};
use crate::operator::OperatorInput;
use crate::profile::ProfileBackfill;
use crate::view::{PageSnapshot, View};

pub use cutoff::{CutoffState, CutoffVerdict};
pub use extent::ExtentTracker;
pub use pacer::{Pacer, TokioPacer};

/// Characters of post text shown in the collection log.
const PREVIEW_CHARS: usize = 15;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("view failed to {action}: {message}")]
    View {
        action: &'static str,
        message: String,
    },
}

impl HarvestError {
    fn view(action: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |e| Self::View {
            action,
            message: format!("{e:#}"),
        }
    }
}

/// Policy knobs for one run.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Origin relative permalinks are resolved against.
    pub base_url: Url,
    /// Posts strictly older than this are not collected.
    pub cutoff: Option<DateTime<Utc>>,
    /// Consecutive old posts that stop the run.
    pub stale_post_limit: u32,
    /// Identical extent readings that mean the timeline is exhausted.
    pub stable_cycles: u32,
    /// Wait after each scroll.
    pub scroll_delay: Duration,
    /// Ask the operator for follow counts the page did not show.
    pub prompt_counts: bool,
}

impl HarvestOptions {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            cutoff: None,
            stale_post_limit: 5,
            stable_cycles: 3,
            scroll_delay: Duration::from_millis(3000),
            prompt_counts: true,
        }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The page stopped growing.
    Exhausted,
    /// Enough consecutive posts fell before the cutoff.
    CutoffReached,
}

/// Posts in first-seen order, keyed by id. First write wins.
#[derive(Debug, Default)]
pub struct CollectedSet {
    posts: Vec<Post>,
    ids: HashSet<String>,
}

impl CollectedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a post unless its id is already present.
    pub fn insert(&mut self, post: Post) -> bool {
        if !self.ids.insert(post.id.clone()) {
            return false;
        }
        self.posts.push(post);
        true
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Post> {
        self.posts.iter()
    }

    #[must_use]
    pub fn into_posts(self) -> Vec<Post> {
        self.posts
    }
}

/// Counts from one pass over a snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub seen: usize,
    pub added: usize,
    pub skipped: usize,
    pub stale: usize,
}

/// Everything a finished run hands to export.
#[derive(Debug)]
pub struct HarvestOutcome {
    pub target: String,
    pub profile: ProfileData,
    pub posts: Vec<Post>,
    pub termination: Termination,
    pub cycles: u32,
}

/// State of one run.
pub struct Harvest {
    extractor: PostExtractor,
    profile: ProfileBackfill,
    collected: CollectedSet,
    cutoff: Option<CutoffState>,
    stale_seen: HashSet<String>,
    options: HarvestOptions,
    cycles: u32,
}

impl Harvest {
    #[must_use]
    pub fn new(target: &str, options: HarvestOptions) -> Self {
        let cutoff = options
            .cutoff
            .map(|at| CutoffState::new(at, options.stale_post_limit));
        Self {
            extractor: PostExtractor::new(target, options.base_url.clone()),
            profile: ProfileBackfill::new(target),
            collected: CollectedSet::new(),
            cutoff,
            stale_seen: HashSet::new(),
            options,
            cycles: 0,
        }
    }

    #[must_use]
    pub fn with_media_resolver(mut self, media: MediaResolver) -> Self {
        self.extractor = self.extractor.with_media_resolver(media);
        self
    }

    #[must_use]
    pub fn target(&self) -> &str {
        self.extractor.target()
    }

    #[must_use]
    pub fn profile(&self) -> &ProfileBackfill {
        &self.profile
    }

    #[must_use]
    pub fn collected(&self) -> &CollectedSet {
        &self.collected
    }

    #[must_use]
    pub fn cutoff(&self) -> Option<&CutoffState> {
        self.cutoff.as_ref()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cutoff.as_ref().is_some_and(CutoffState::is_stopped)
    }

    /// Look for profile fields on a page without collecting posts.
    pub fn scan_profile(&mut self, snapshot: &PageSnapshot) -> bool {
        let document = snapshot.parse();
        self.profile.scan_page(&document)
    }

    /// One extraction pass over the rendered posts, in document order.
    pub fn scan(&mut self, snapshot: &PageSnapshot) -> ScanReport {
        let mut report = ScanReport::default();
        if self.is_stopped() {
            return report;
        }

        let document = snapshot.parse();
        self.profile.scan_page(&document);

        for (index, node) in document.select(&POST_NODE).enumerate() {
            report.seen += 1;
            let post = match self.extractor.extract(node, snapshot.record(index)) {
                Ok(post) => post,
                Err(e) => {
                    debug!(index, error = %e, "Skipping post node");
                    report.skipped += 1;
                    continue;
                }
            };
            self.profile.scan_post(node);

            if self.collected.contains(&post.id) || self.stale_seen.contains(&post.id) {
                continue;
            }

            match self.cutoff.as_mut().map(|c| c.observe(&post.date)) {
                Some(CutoffVerdict::Stale) => {
                    debug!(post_id = %post.id, date = %post.date, "Post older than cutoff");
                    self.stale_seen.insert(post.id);
                    report.stale += 1;
                    continue;
                }
                Some(CutoffVerdict::Stop) => {
                    self.stale_seen.insert(post.id);
                    report.stale += 1;
                    info!(
                        limit = self.options.stale_post_limit,
                        "Cutoff reached after consecutive old posts"
                    );
                    break;
                }
                Some(CutoffVerdict::Undated) => {
                    warn!(post_id = %post.id, date = %post.date, "Unreadable post date, keeping post");
                }
                Some(CutoffVerdict::Fresh) | None => {}
            }

            info!(
                post_id = %post.id,
                total = self.collected.len() + 1,
                "Collected {}{}...",
                markers(&post),
                preview(&post.text)
            );
            self.collected.insert(post);
            report.added += 1;
        }
        report
    }

    /// Scan, scroll and wait until the page stops growing or the cutoff
    /// latches.
    ///
    /// # Errors
    ///
    /// Returns an error if the view fails; collected posts stay in `self`.
    pub async fn collect(
        &mut self,
        view: &mut dyn View,
        pacer: &dyn Pacer,
    ) -> Result<Termination, HarvestError> {
        let mut tracker = ExtentTracker::new(self.options.stable_cycles);

        loop {
            self.cycles += 1;
            let snapshot = view
                .snapshot()
                .await
                .map_err(HarvestError::view("take a snapshot"))?;
            let report = self.scan(&snapshot);
            debug!(
                cycle = self.cycles,
                seen = report.seen,
                added = report.added,
                skipped = report.skipped,
                stale = report.stale,
                total = self.collected.len(),
                "Scan complete"
            );

            if self.is_stopped() {
                return Ok(Termination::CutoffReached);
            }

            view.scroll_to_end()
                .await
                .map_err(HarvestError::view("scroll"))?;
            pacer.pause(self.options.scroll_delay).await;
            let extent = view
                .content_extent()
                .await
                .map_err(HarvestError::view("measure the page"))?;

            if tracker.observe(extent) {
                info!(extent, cycles = self.cycles, "Page stopped growing");
                return Ok(Termination::Exhausted);
            }
            debug!(extent, unchanged = tracker.unchanged_cycles(), "Waiting for more posts");
        }
    }

    #[must_use]
    pub fn finish(self, termination: Termination) -> HarvestOutcome {
        HarvestOutcome {
            target: self.extractor.target().to_string(),
            profile: self.profile.into_data(),
            posts: self.collected.into_posts(),
            termination,
            cycles: self.cycles,
        }
    }
}

/// Run a whole harvest against a view.
///
/// Resolves the target from the view's location, backfills the profile from
/// the first page, asks the operator once for missing follow counts, then
/// collects until a termination condition holds.
///
/// # Errors
///
/// Returns an error if no target can be resolved (nothing is collected) or
/// the view fails.
pub async fn harvest(
    view: &mut dyn View,
    pacer: &dyn Pacer,
    operator: &dyn OperatorInput,
    options: HarvestOptions,
) -> Result<HarvestOutcome, HarvestError> {
    let location = view
        .location()
        .await
        .map_err(HarvestError::view("read the location"))?;
    let target = identity::resolve_target(&location)?;
    info!(account = %target, url = %location.url, "Harvesting timeline");

    let prompt_counts = options.prompt_counts;
    let mut run = Harvest::new(&target, options);

    let first = view
        .snapshot()
        .await
        .map_err(HarvestError::view("take a snapshot"))?;
    run.scan_profile(&first);
    if prompt_counts {
        run.profile.request_missing_counts(operator).await;
    }

    let termination = run.collect(view, pacer).await?;
    info!(
        account = %target,
        posts = run.collected.len(),
        ?termination,
        "Harvest finished"
    );
    Ok(run.finish(termination))
}

fn markers(post: &Post) -> String {
    let mut out = String::new();
    if post.has_video() {
        out.push_str("[media] ");
    }
    if post.poll.is_some() {
        out.push_str("[poll] ");
    }
    out
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
