//! HTML processing: visible text extraction and stylesheet discovery.

use scraper::{node::Node, Html, Selector};

/// Elements whose text content is never rendered.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "template"];

/// Extracts text visible in an HTML document, in document order.
///
/// Markup, attributes, comments and contents of `<script>` / `<style>` elements are excluded.
/// Malformed markup never fails the extraction; the parser recovers what text it can.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();
    for node in document.tree.root().descendants() {
        let Node::Text(fragment) = node.value() else {
            continue;
        };
        let is_hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        if !is_hidden {
            text.push_str(fragment);
        }
    }
    text
}

/// Stylesheet referenced by an HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StylesheetSource {
    /// `<link rel="stylesheet" href="...">`; contains the `href` as written.
    Linked(String),
    /// Contents of a `<style>` element.
    Embedded(String),
}

/// Finds stylesheets linked from or embedded into an HTML document, in document order.
pub fn stylesheets(html: &str) -> Vec<StylesheetSource> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("link[href], style").expect("selector is valid");

    let mut sources = vec![];
    for element in document.select(&selector) {
        let value = element.value();
        if value.name() == "style" {
            let css: String = element.text().collect();
            if !css.trim().is_empty() {
                sources.push(StylesheetSource::Embedded(css));
            }
            continue;
        }

        let is_stylesheet = value.attr("rel").is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case("stylesheet"))
        });
        if let (true, Some(href)) = (is_stylesheet, value.attr("href")) {
            let href = href.trim();
            if !href.is_empty() {
                sources.push(StylesheetSource::Linked(href.to_owned()));
            }
        }
    }
    sources
}
