use std::sync::LazyLock;

use scraper::{ElementRef, Selector};
use url::Url;

use super::media::{MediaContext, MediaResolver};
use super::{metrics, poll, ExtractionError};
use crate::dom;
use crate::model::Post;
use crate::view::PropertyChain;

static AUTHOR_BLOCK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[data-testid="User-Name"]"#).unwrap());

static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

static POST_TEXT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[data-testid="tweetText"]"#).unwrap());

static TIME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("time").unwrap());

/// Extracts posts authored by one target account.
pub struct PostExtractor {
    target: String,
    base_url: Url,
    media: MediaResolver,
}

impl PostExtractor {
    /// `base_url` is used to make permalinks absolute.
    #[must_use]
    pub fn new(target: impl Into<String>, base_url: Url) -> Self {
        Self {
            target: target.into(),
            base_url,
            media: MediaResolver::default(),
        }
    }

    #[must_use]
    pub fn with_media_resolver(mut self, media: MediaResolver) -> Self {
        self.media = media;
        self
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Check that at least one author link points at the target account.
    ///
    /// Only the post's own author block counts: a quoted post nested inside
    /// carries an author block of its own, which comes later in the document.
    /// Reposts and other accounts' posts in mixed views fail this check.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no author links or none of them match.
    pub fn check_ownership(&self, post: ElementRef<'_>) -> Result<(), ExtractionError> {
        let block = dom::first(post, &AUTHOR_BLOCK).ok_or(ExtractionError::NoAuthorLinks)?;
        let mut links = block
            .select(&LINK)
            .filter_map(|a| dom::attr(a, "href"))
            .peekable();

        if links.peek().is_none() {
            return Err(ExtractionError::NoAuthorLinks);
        }

        if links.any(|href| self.link_points_at_target(href)) {
            Ok(())
        } else {
            Err(ExtractionError::NotOwned {
                target: self.target.clone(),
            })
        }
    }

    fn link_points_at_target(&self, href: &str) -> bool {
        let resolved = self.base_url.join(href).ok();
        let segment = resolved
            .as_ref()
            .map_or_else(|| dom::last_path_segment(href), |url| dom::last_path_segment(url.path()));
        segment.is_some_and(|s| s.eq_ignore_ascii_case(&self.target))
    }

    /// Build a post record from a rendered post node.
    ///
    /// `record` is the node's structured record when the render tree was
    /// reachable; media falls back to the visible markup without it.
    ///
    /// # Errors
    ///
    /// Returns an error if the post belongs to another account or lacks the
    /// timestamp permalink its id is derived from.
    pub fn extract(
        &self,
        post: ElementRef<'_>,
        record: Option<&PropertyChain>,
    ) -> Result<Post, ExtractionError> {
        self.check_ownership(post)?;

        let time = dom::first(post, &TIME).ok_or(ExtractionError::MissingTimestamp)?;
        let date = dom::attr(time, "datetime").ok_or(ExtractionError::MissingTimestamp)?;
        let href = dom::closest(time, "a")
            .and_then(|a| dom::attr(a, "href"))
            .ok_or(ExtractionError::MissingPermalink)?;
        let id = dom::last_path_segment(href)
            .ok_or_else(|| ExtractionError::InvalidPermalink(href.to_string()))?;
        let url = self
            .base_url
            .join(href)
            .map_err(|_| ExtractionError::InvalidPermalink(href.to_string()))?;

        let text = dom::first(post, &POST_TEXT)
            .map(dom::text_with_alt)
            .unwrap_or_default();

        let images = self.media.resolve(&MediaContext {
            post,
            post_id: id,
            record,
        });

        Ok(Post {
            id: id.to_string(),
            date: date.to_string(),
            text,
            url: url.to_string(),
            images,
            poll: poll::extract_poll(post),
            metrics: metrics::read_metrics(post),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    const OWN_POST: &str = r#"
        <article data-testid="tweet">
          <div data-testid="User-Name">
            <a href="/TargetUser"><span>Target Person</span></a>
            <a href="/TargetUser"><span>@TargetUser</span></a>
            <a href="/TargetUser/status/1790000000000000001"><time datetime="2024-05-13T10:00:00.000Z">May 13</time></a>
          </div>
          <div data-testid="tweetText"><span>Morning </span><img alt="☕" src="https://abs-0.twimg.com/emoji/v2/svg/2615.svg"><span> time</span></div>
          <div data-testid="tweetPhoto"><img src="https://pbs.twimg.com/media/pic?format=jpg&amp;name=small"></div>
          <button data-testid="reply" aria-label="3 Replies. Reply"></button>
          <button data-testid="retweet"><span>5</span></button>
          <button data-testid="like"><span>1.2K</span></button>
        </article>"#;

    fn extractor() -> PostExtractor {
        PostExtractor::new("targetuser", Url::parse("https://x.com").unwrap())
    }

    fn with_article<F: FnOnce(ElementRef<'_>)>(html: &str, f: F) {
        let doc = Html::parse_document(html);
        let sel = Selector::parse("article").unwrap();
        f(doc.select(&sel).next().unwrap());
    }

    #[test]
    fn test_extract_full_post() {
        with_article(OWN_POST, |article| {
            let post = extractor().extract(article, None).unwrap();
            assert_eq!(post.id, "1790000000000000001");
            assert_eq!(post.date, "2024-05-13T10:00:00.000Z");
            assert_eq!(post.url, "https://x.com/TargetUser/status/1790000000000000001");
            assert_eq!(post.text, "Morning ☕ time");
            assert_eq!(post.images, vec!["https://pbs.twimg.com/media/pic?format=jpg&name=small"]);
            assert!(post.poll.is_none());
            assert_eq!(post.metrics.reply, "3 Replies. Reply");
            assert_eq!(post.metrics.repost, "5");
            assert_eq!(post.metrics.like, "1.2K");
        });
    }

    #[test]
    fn test_rejects_other_account() {
        with_article(
            r#"<article data-testid="tweet"><div data-testid="User-Name">
                <a href="/otheruser">Other</a>
                <a href="/otheruser/status/5"><time datetime="2024-01-01T00:00:00.000Z">Jan 1</time></a>
               </div></article>"#,
            |article| {
                assert_eq!(
                    extractor().extract(article, None),
                    Err(ExtractionError::NotOwned {
                        target: "targetuser".to_string()
                    })
                );
            },
        );
    }

    #[test]
    fn test_rejects_without_author_links() {
        with_article(
            r#"<article data-testid="tweet"><a href="/targetuser/status/5"><time datetime="2024-01-01T00:00:00.000Z">Jan 1</time></a></article>"#,
            |article| {
                assert_eq!(
                    extractor().extract(article, None),
                    Err(ExtractionError::NoAuthorLinks)
                );
            },
        );
    }

    #[test]
    fn test_accepts_absolute_author_link() {
        with_article(
            r#"<article data-testid="tweet"><div data-testid="User-Name">
                <a href="https://x.com/TARGETUSER">T</a></div>
                <a href="/TARGETUSER/status/77"><time datetime="2024-01-01T00:00:00.000Z">Jan 1</time></a></article>"#,
            |article| {
                let post = extractor().extract(article, None).unwrap();
                assert_eq!(post.id, "77");
            },
        );
    }

    #[test]
    fn test_rejects_other_account_quoting_target() {
        with_article(
            r#"<article data-testid="tweet">
                <div data-testid="User-Name">
                  <a href="/otheruser"><span>Other</span></a>
                  <a href="/otheruser/status/555"><time datetime="2024-01-01T00:00:00.000Z">Jan 1</time></a>
                </div>
                <div data-testid="tweetText">look at this</div>
                <div role="link">
                  <div data-testid="User-Name">
                    <a href="/targetuser"><span>Target</span></a>
                    <time datetime="2023-12-31T00:00:00.000Z">Dec 31</time>
                  </div>
                </div>
               </article>"#,
            |article| {
                assert_eq!(
                    extractor().extract(article, None),
                    Err(ExtractionError::NotOwned {
                        target: "targetuser".to_string()
                    })
                );
            },
        );
    }

    #[test]
    fn test_accepts_target_quoting_other_account() {
        with_article(
            r#"<article data-testid="tweet">
                <div data-testid="User-Name">
                  <a href="/targetuser"><span>Target</span></a>
                  <a href="/targetuser/status/556"><time datetime="2024-01-02T00:00:00.000Z">Jan 2</time></a>
                </div>
                <div role="link">
                  <div data-testid="User-Name"><a href="/otheruser"><span>Other</span></a></div>
                </div>
               </article>"#,
            |article| {
                let post = extractor().extract(article, None).unwrap();
                assert_eq!(post.id, "556");
                assert_eq!(post.url, "https://x.com/targetuser/status/556");
            },
        );
    }

    #[test]
    fn test_missing_timestamp_fails() {
        with_article(
            r#"<article data-testid="tweet"><div data-testid="User-Name"><a href="/targetuser">T</a></div>
               <div data-testid="tweetText">promoted</div></article>"#,
            |article| {
                assert_eq!(
                    extractor().extract(article, None),
                    Err(ExtractionError::MissingTimestamp)
                );
            },
        );
    }

    #[test]
    fn test_timestamp_outside_link_fails() {
        with_article(
            r#"<article data-testid="tweet"><div data-testid="User-Name"><a href="/targetuser">T</a></div>
               <time datetime="2024-01-01T00:00:00.000Z">Jan 1</time></article>"#,
            |article| {
                assert_eq!(
                    extractor().extract(article, None),
                    Err(ExtractionError::MissingPermalink)
                );
            },
        );
    }

    #[test]
    fn test_missing_text_and_metrics_default() {
        with_article(
            r#"<article data-testid="tweet"><div data-testid="User-Name"><a href="/targetuser">T</a>
               <a href="/targetuser/status/9"><time datetime="2024-01-01T00:00:00.000Z">Jan 1</time></a></div></article>"#,
            |article| {
                let post = extractor().extract(article, None).unwrap();
                assert_eq!(post.text, "");
                assert!(post.images.is_empty());
                assert_eq!(post.metrics.like, "0");
            },
        );
    }
}
