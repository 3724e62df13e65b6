//! Profile backfill.
//!
//! The target's display name, avatar and follow counts are not all visible
//! from any single view. The backfill keeps one [`ProfileData`] per run and
//! fills its fields in place from whichever source exposes them: the profile
//! header, a search-result user cell, or the author block of one of the
//! target's own posts.
//!
//! Two field groups converge independently: identity (`name` + `avatarUrl`,
//! with `screenName` riding along) and counts (`following` + `followers`).
//! Once both fields of a group have been written, the group accepts no more
//! writes. A written field is only replaced by a strictly more trusted source.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::dom;
use crate::model::ProfileData;
use crate::operator::OperatorInput;

static PRIMARY_COLUMN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[data-testid="primaryColumn"]"#).unwrap());

static PROFILE_USER_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[data-testid="UserName"]"#).unwrap());

static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img[src]").unwrap());

static USER_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-testid="UserCell"]"#).unwrap());

static POST_AUTHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[data-testid="User-Name"]"#).unwrap());

static POST_AVATAR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[data-testid="Tweet-User-Avatar"] img"#).unwrap());

/// Where a value came from, ordered from least to most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProfileSource {
    PostAuthor,
    SearchSnippet,
    ProfilePage,
    Operator,
}

/// Convergence of one field group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    Unfilled,
    PartiallyFilled,
    Filled,
}

impl FillState {
    fn of(a: Option<ProfileSource>, b: Option<ProfileSource>) -> Self {
        match (a.is_some(), b.is_some()) {
            (true, true) => Self::Filled,
            (false, false) => Self::Unfilled,
            _ => Self::PartiallyFilled,
        }
    }
}

/// Values one source exposed. Empty strings count as "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFinding {
    pub name: Option<String>,
    pub screen_name: Option<String>,
    pub avatar_url: Option<String>,
    pub following: Option<String>,
    pub followers: Option<String>,
}

impl ProfileFinding {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Provenance {
    name: Option<ProfileSource>,
    screen_name: Option<ProfileSource>,
    avatar_url: Option<ProfileSource>,
    following: Option<ProfileSource>,
    followers: Option<ProfileSource>,
}

/// The run's single profile record and what is known about each field.
#[derive(Debug, Clone)]
pub struct ProfileBackfill {
    target: String,
    data: ProfileData,
    provenance: Provenance,
    operator_asked: bool,
}

impl ProfileBackfill {
    /// Start from identity-derived placeholders.
    #[must_use]
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            data: ProfileData::placeholder(target),
            provenance: Provenance::default(),
            operator_asked: false,
        }
    }

    #[must_use]
    pub fn data(&self) -> &ProfileData {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> ProfileData {
        self.data
    }

    #[must_use]
    pub fn identity_state(&self) -> FillState {
        FillState::of(self.provenance.name, self.provenance.avatar_url)
    }

    #[must_use]
    pub fn counts_state(&self) -> FillState {
        FillState::of(self.provenance.following, self.provenance.followers)
    }

    /// Whether any group still accepts writes.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.identity_state() == FillState::Filled && self.counts_state() == FillState::Filled
    }

    /// Write whatever the finding adds. Returns whether anything changed.
    pub fn apply(&mut self, finding: ProfileFinding, source: ProfileSource) -> bool {
        let mut changed = false;

        if self.identity_state() != FillState::Filled {
            changed |= write_field(&mut self.data.name, &mut self.provenance.name, finding.name, source);
            changed |= write_field(
                &mut self.data.screen_name,
                &mut self.provenance.screen_name,
                finding.screen_name,
                source,
            );
            changed |= write_field(
                &mut self.data.avatar_url,
                &mut self.provenance.avatar_url,
                finding.avatar_url,
                source,
            );
            if self.identity_state() == FillState::Filled {
                info!(name = %self.data.name, avatar = %self.data.avatar_url, "Profile identity filled");
            }
        }

        if self.counts_state() != FillState::Filled {
            changed |= write_field(
                &mut self.data.following,
                &mut self.provenance.following,
                finding.following,
                source,
            );
            changed |= write_field(
                &mut self.data.followers,
                &mut self.provenance.followers,
                finding.followers,
                source,
            );
            if self.counts_state() == FillState::Filled {
                info!(
                    following = %self.data.following,
                    followers = %self.data.followers,
                    "Profile counts filled"
                );
            }
        }

        if changed {
            debug!(?source, "Profile backfilled");
        }
        changed
    }

    /// Scan a whole page for the profile header and search-result cells.
    pub fn scan_page(&mut self, document: &Html) -> bool {
        if self.is_complete() {
            return false;
        }
        let header = find_in_profile_header(document, &self.target);
        let snippet = find_in_search_results(document, &self.target);
        let changed = self.apply(header, ProfileSource::ProfilePage);
        self.apply(snippet, ProfileSource::SearchSnippet) || changed
    }

    /// Read the author block of one of the target's own posts.
    pub fn scan_post(&mut self, post: ElementRef<'_>) -> bool {
        if self.identity_state() == FillState::Filled {
            return false;
        }
        self.apply(find_in_post_author(post), ProfileSource::PostAuthor)
    }

    /// Ask the operator for follow counts the page did not show.
    ///
    /// Only the first call can prompt; later calls are no-ops.
    pub async fn request_missing_counts(&mut self, operator: &dyn OperatorInput) -> bool {
        if self.operator_asked || self.counts_state() == FillState::Filled {
            return false;
        }
        self.operator_asked = true;

        let mut finding = ProfileFinding::default();
        if self.provenance.following.is_none() {
            let prompt = format!("Following count for @{}", self.target);
            finding.following = operator.request(&prompt, &self.data.following).await;
        }
        if self.provenance.followers.is_none() {
            let prompt = format!("Follower count for @{}", self.target);
            finding.followers = operator.request(&prompt, &self.data.followers).await;
        }
        self.apply(finding, ProfileSource::Operator)
    }
}

fn write_field(
    slot: &mut String,
    provenance: &mut Option<ProfileSource>,
    value: Option<String>,
    source: ProfileSource,
) -> bool {
    let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return false;
    };
    match *provenance {
        Some(existing) if existing >= source => false,
        _ => {
            let changed = *slot != value || provenance.is_none();
            *slot = value;
            *provenance = Some(source);
            changed
        }
    }
}

/// Display name, handle, avatar and counts from a profile page header.
#[must_use]
pub fn find_in_profile_header(document: &Html, target: &str) -> ProfileFinding {
    let mut finding = ProfileFinding::default();
    let Some(column) = document.select(&PRIMARY_COLUMN).next() else {
        return finding;
    };

    if let Some(header) = dom::first(column, &PROFILE_USER_NAME) {
        let (name, screen_name) = split_name_lines(&dom::text_lines(header));
        finding.name = name;
        finding.screen_name = screen_name;
    }

    finding.avatar_url = avatar_container_selectors(target)
        .iter()
        .find_map(|selector| document.select(selector).next())
        .and_then(|img| dom::attr(img, "src"))
        .map(ToString::to_string);

    let following_suffix = format!("/{}/following", target.to_lowercase());
    let followers_suffixes = [
        format!("/{}/followers", target.to_lowercase()),
        format!("/{}/verified_followers", target.to_lowercase()),
    ];
    for link in column.select(&LINK) {
        let Some(href) = dom::attr(link, "href").map(str::to_lowercase) else {
            continue;
        };
        if finding.following.is_none() && href.ends_with(&following_suffix) {
            finding.following = count_text(link);
        } else if finding.followers.is_none()
            && followers_suffixes.iter().any(|s| href.ends_with(s.as_str()))
        {
            finding.followers = count_text(link);
        }
    }

    finding
}

/// Name, handle and avatar from a search-result user cell linking to the target.
#[must_use]
pub fn find_in_search_results(document: &Html, target: &str) -> ProfileFinding {
    let cell = document.select(&USER_CELL).find(|cell| {
        cell.select(&LINK)
            .filter_map(|a| dom::attr(a, "href"))
            .filter_map(dom::last_path_segment)
            .any(|segment| segment.eq_ignore_ascii_case(target))
    });
    let Some(cell) = cell else {
        return ProfileFinding::default();
    };

    let (name, screen_name) = split_name_lines(&dom::text_lines(cell));
    ProfileFinding {
        name,
        screen_name,
        avatar_url: cell
            .select(&IMG)
            .filter_map(|img| dom::attr(img, "src"))
            .find(|src| src.contains("profile_images"))
            .map(ToString::to_string),
        ..ProfileFinding::default()
    }
}

/// Name, handle and avatar from a post's author block.
#[must_use]
pub fn find_in_post_author(post: ElementRef<'_>) -> ProfileFinding {
    let (name, screen_name) = dom::first(post, &POST_AUTHOR)
        .map(|block| split_name_lines(&dom::text_lines(block)))
        .unwrap_or_default();
    ProfileFinding {
        name,
        screen_name,
        avatar_url: dom::first(post, &POST_AVATAR)
            .and_then(|img| dom::attr(img, "src"))
            .map(ToString::to_string),
        ..ProfileFinding::default()
    }
}

/// The first line is the display name; the first `@` line is the handle.
fn split_name_lines(lines: &[String]) -> (Option<String>, Option<String>) {
    let name = lines.first().filter(|l| !l.starts_with('@')).cloned();
    let screen_name = lines.iter().find(|l| l.starts_with('@')).cloned();
    (name, screen_name)
}

fn avatar_container_selectors(target: &str) -> Vec<Selector> {
    let mut handles = vec![target.to_string()];
    let lower = target.to_lowercase();
    if lower != target {
        handles.push(lower);
    }
    handles
        .iter()
        .filter_map(|handle| {
            Selector::parse(&format!(
                r#"div[data-testid="UserAvatar-Container-{handle}"] img"#
            ))
            .ok()
        })
        .collect()
}

/// The number part of a "1,234 Following" link.
fn count_text(link: ElementRef<'_>) -> Option<String> {
    dom::text_lines(link)
        .into_iter()
        .find(|line| line.chars().any(|c| c.is_ascii_digit()))
        .map(|line| line.split_whitespace().next().unwrap_or_default().to_string())
}
