//! Plain-text projection of fetched page content.

use scraper::{ElementRef, Html, Node};

/// Elements whose boundaries end a line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "hr", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td",
    "th", "table", "thead", "tbody", "section", "article", "header", "footer", "nav", "main",
    "aside", "title", "dt", "dd", "dl", "blockquote", "pre", "address", "figure", "figcaption",
];

/// Elements whose text is never page content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect_text(child_el, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Drop tags, comments and script bodies and decode entities, leaving the
/// text nodes byte for byte. Block elements become line breaks.
///
/// Used ahead of iCalendar parsing, where leading whitespace on a line is a
/// continuation marker and must survive.
pub fn remove_tags(content: &str) -> String {
    let document = Html::parse_document(content);
    let mut out = String::with_capacity(content.len());
    collect_text(document.root_element(), &mut out);
    out
}

/// Strip markup but keep line structure: block elements become line breaks,
/// each line is whitespace-collapsed and blank lines are dropped.
pub fn strip_markup(content: &str) -> String {
    remove_tags(content)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The indexable projection stored in `pages.plain_text`.
pub fn plain_text(content: &str) -> String {
    strip_markup(content)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup_keeps_lines() {
        let html = "<html><head><style>p { color: red }</style></head><body>\
                    <h1>Fun   Hike</h1><p>January 10, 2026 10:00 AM</p>\
                    <script>var x = 1;</script><p>Join us &amp; friends</p></body></html>";
        assert_eq!(
            strip_markup(html),
            "Fun Hike\nJanuary 10, 2026 10:00 AM\nJoin us & friends"
        );
    }

    #[test]
    fn test_plain_text_is_single_line() {
        assert_eq!(
            plain_text("<div>Quarterly <b>infrastructure</b>\n review</div><!-- hidden -->"),
            "Quarterly infrastructure review"
        );
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(plain_text("<p>&lt;a&gt; &#65;&#x42; &amp; more</p>"), "<a> AB & more");
    }

    #[test]
    fn test_quoted_angle_bracket_in_attribute() {
        let html = r#"<p><a href="/map" title="a > b">Riverside Park</a> cleanup</p>"#;
        assert_eq!(strip_markup(html), "Riverside Park cleanup");
    }

    #[test]
    fn test_plain_text_without_markup() {
        assert_eq!(strip_markup("Board Meeting\n  March 8, 2025"), "Board Meeting\nMarch 8, 2025");
    }

    #[test]
    fn test_remove_tags_preserves_folding() {
        let src = "<pre>DESCRIPTION:long\n  line</pre>";
        assert_eq!(remove_tags(src), "\nDESCRIPTION:long\n  line\n");
    }
}
