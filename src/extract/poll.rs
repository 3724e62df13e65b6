use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::debug;

use crate::dom;
use crate::model::{Poll, PollOption};

static POLL_ROOT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-testid="cardPoll"]"#).unwrap());

static POLL_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"li[role="listitem"]"#).unwrap());

/// Older layout: a generic card wrapper with one container per choice.
static CARD_WRAPPER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-testid="card.wrapper"]"#).unwrap());

static CARD_OPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-testid^="pollOption"]"#).unwrap());

static PERCENT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?%$").unwrap());

/// `1,234 votes`, `1.234 Stimmen`, `1 234 votes`, `1,234票` ...
static TOTAL_VOTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-9][0-9,.'\x{00A0}\x{202F} ]*)\s*(?:votes?|票|stimmen|votos|voti)").unwrap()
});

/// Parse the poll widget under a post, if there is one.
///
/// Returns `None` when there is no widget or when none of its options could
/// be read.
#[must_use]
pub fn extract_poll(post: ElementRef<'_>) -> Option<Poll> {
    let (root, items): (ElementRef<'_>, Vec<ElementRef<'_>>) =
        if let Some(root) = dom::first(post, &POLL_ROOT) {
            (root, root.select(&POLL_ITEM).collect())
        } else {
            let root = dom::first(post, &CARD_WRAPPER)?;
            let items: Vec<_> = root.select(&CARD_OPTION).collect();
            if items.is_empty() {
                // A card that is not a poll (link preview, media card).
                return None;
            }
            (root, items)
        };

    let options: Vec<PollOption> = items
        .into_iter()
        .filter_map(|item| parse_option(&dom::text_lines(item)))
        .collect();

    if options.is_empty() {
        debug!("Poll widget present but no options could be parsed");
        return None;
    }

    Some(Poll {
        options,
        total_votes: parse_total_votes(&dom::inner_text(root)),
    })
}

/// Split one option's lines into label and percentage.
///
/// The first bare percentage line is the value; everything before it is the
/// label. Without a percentage (poll still open, not voted) the first line is
/// the label and the percentage is zero.
fn parse_option(lines: &[String]) -> Option<PollOption> {
    let first = lines.first()?;

    let option = match lines.iter().position(|line| PERCENT_LINE.is_match(line)) {
        Some(idx) => PollOption {
            label: lines[..idx].join(" "),
            percent: lines[idx].trim_end_matches('%').parse().unwrap_or(0.0),
        },
        None => PollOption {
            label: first.clone(),
            percent: 0.0,
        },
    };
    Some(option)
}

/// Total vote count from the widget text; grouping separators are ignored.
fn parse_total_votes(text: &str) -> u64 {
    TOTAL_VOTES
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .chars()
                .filter(char::is_ascii_digit)
                .collect::<String>()
        })
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn poll_from(html: &str) -> Option<Poll> {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse("article").unwrap();
        extract_poll(doc.select(&sel).next().unwrap())
    }

    #[test]
    fn test_parse_option_with_percent() {
        let option = parse_option(&lines(&["Option A", "42%"])).unwrap();
        assert_eq!(option.label, "Option A");
        assert!((option.percent - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_option_multiline_label() {
        let option = parse_option(&lines(&["Pizza", "with pineapple", "12.5%"])).unwrap();
        assert_eq!(option.label, "Pizza with pineapple");
        assert!((option.percent - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_option_without_percent() {
        let option = parse_option(&lines(&["Open choice", "extra"])).unwrap();
        assert_eq!(option.label, "Open choice");
        assert!(option.percent.abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_option_empty() {
        assert!(parse_option(&[]).is_none());
    }

    #[test]
    fn test_parse_total_votes() {
        assert_eq!(parse_total_votes("1,234 votes"), 1234);
        assert_eq!(parse_total_votes("Final results\n1,234 votes"), 1234);
        assert_eq!(parse_total_votes("5.678 Stimmen · Endergebnis"), 5678);
        assert_eq!(parse_total_votes("12,345票・最終結果"), 12345);
        assert_eq!(parse_total_votes("1 vote"), 1);
        assert_eq!(parse_total_votes("no count here"), 0);
    }

    #[test]
    fn test_extract_poll_from_card() {
        let poll = poll_from(
            r#"<article><div data-testid="cardPoll"><ul>
                <li role="listitem"><div><span>Option A</span></div><div><span>42%</span></div></li>
                <li role="listitem"><div><span>Option B</span></div><div><span>58%</span></div></li>
            </ul><div><span>1,234 votes</span><span>Final results</span></div></div></article>"#,
        )
        .unwrap();

        assert_eq!(poll.options.len(), 2);
        assert_eq!(poll.options[0].label, "Option A");
        assert!((poll.options[1].percent - 58.0).abs() < f64::EPSILON);
        assert_eq!(poll.total_votes, 1234);
    }

    #[test]
    fn test_extract_poll_from_card_wrapper_layout() {
        let poll = poll_from(
            r#"<article><div data-testid="card.wrapper">
                <div data-testid="pollOption_0"><span>Yes</span><span>70%</span></div>
                <div data-testid="pollOption_1"><span>No</span><span>30%</span></div>
                <span>10 votes</span></div></article>"#,
        )
        .unwrap();

        assert_eq!(poll.options.len(), 2);
        assert_eq!(poll.options[0].label, "Yes");
        assert_eq!(poll.total_votes, 10);
    }

    #[test]
    fn test_no_widget() {
        assert!(poll_from("<article><p>plain post</p></article>").is_none());
    }

    #[test]
    fn test_link_card_is_not_a_poll() {
        assert!(poll_from(
            r#"<article><div data-testid="card.wrapper"><a href="https://example.com">example.com</a></div></article>"#
        )
        .is_none());
    }

    #[test]
    fn test_malformed_widget_is_none() {
        assert!(poll_from(
            r#"<article><div data-testid="cardPoll"><ul><li role="listitem"></li></ul></div></article>"#
        )
        .is_none());
    }
}
