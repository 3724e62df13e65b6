//! Lookup helpers over a rendered page snapshot.
//!
//! Every helper answers with an `Option` or an empty value instead of failing,
//! so extractors can treat a missing region as "nothing there".

use scraper::{ElementRef, Node, Selector};

/// First descendant of `root` matching `selector`.
#[must_use]
pub fn first<'a>(root: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    root.select(selector).next()
}

/// A trimmed, non-empty attribute value.
#[must_use]
pub fn attr<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Nearest ancestor element with the given tag name.
#[must_use]
pub fn closest<'a>(element: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == tag)
}

/// Visible text broken into trimmed, non-empty lines.
///
/// Each text node (and each explicit line break inside one) starts a new line,
/// which is how the page lays out poll options and author blocks.
#[must_use]
pub fn text_lines(element: ElementRef<'_>) -> Vec<String> {
    element
        .text()
        .flat_map(str::lines)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Visible text as one newline-separated string.
#[must_use]
pub fn inner_text(element: ElementRef<'_>) -> String {
    text_lines(element).join("\n")
}

/// Text of a rich-text region with inline images replaced by their alt text.
///
/// Images without alt text are dropped; `<br>` becomes a newline.
#[must_use]
pub fn text_with_alt(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "img" => {
                if let Some(alt) = el.attr("alt") {
                    out.push_str(alt);
                }
            }
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Final non-empty path segment of a link, ignoring query and fragment.
#[must_use]
pub fn last_path_segment(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.rsplit('/').find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn parse(html: &str) -> Html {
        Html::parse_fragment(html)
    }

    #[test]
    fn test_text_with_alt_replaces_images() {
        let html = parse(
            r#"<div id="t"><span>Good morning </span><img alt="☀️" src="x.svg"><span> all</span><img src="noalt.svg"></div>"#,
        );
        let sel = Selector::parse("#t").unwrap();
        let el = html.select(&sel).next().unwrap();
        assert_eq!(text_with_alt(el), "Good morning ☀️ all");
    }

    #[test]
    fn test_text_with_alt_keeps_line_breaks() {
        let html = parse(r#"<div id="t">line one<br>line two</div>"#);
        let sel = Selector::parse("#t").unwrap();
        let el = html.select(&sel).next().unwrap();
        assert_eq!(text_with_alt(el), "line one\nline two");
    }

    #[test]
    fn test_text_lines_skips_blank_nodes() {
        let html = parse(r#"<li id="o"><div><span>Option A</span></div>  <div><span>42%</span></div></li>"#);
        let sel = Selector::parse("#o").unwrap();
        let el = html.select(&sel).next().unwrap();
        assert_eq!(text_lines(el), vec!["Option A", "42%"]);
    }

    #[test]
    fn test_closest_finds_anchor() {
        let html = parse(r#"<a href="/u/status/1"><time datetime="2024-01-01T00:00:00.000Z">Jan 1</time></a>"#);
        let sel = Selector::parse("time").unwrap();
        let time = html.select(&sel).next().unwrap();
        let anchor = closest(time, "a").unwrap();
        assert_eq!(attr(anchor, "href"), Some("/u/status/1"));
    }

    #[test]
    fn test_last_path_segment() {
        assert_eq!(last_path_segment("/someone/status/123"), Some("123"));
        assert_eq!(last_path_segment("/someone/"), Some("someone"));
        assert_eq!(last_path_segment("https://x.com/someone?lang=en"), Some("someone"));
        assert_eq!(last_path_segment("/"), None);
    }
}
