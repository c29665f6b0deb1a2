// src/scrape/html.rs
// HTML parsing, noise reduction, and Markdown conversion for the local-fetch
// scraper. Built on `scraper` (CSS selection) and `htmd` (HTML -> Markdown).

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

const NOISE_SELECTORS: &[&str] = &[
    "nav",
    "header",
    "footer",
    "aside",
    "[role=banner]",
    "[role=navigation]",
    "[role=complementary]",
    ".sidebar",
    ".menu",
    ".cookie-banner",
    ".ad",
    ".advertisement",
];

const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=main]",
    ".main-content",
    ".content",
    "#content",
    "#main",
];

pub struct ParsedPage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub visible_text: String,
}

pub struct ReducedContent {
    pub markdown: String,
    pub html: String,
    pub links: Vec<String>,
}

fn select_one<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    Selector::parse(selector)
        .ok()
        .and_then(|s| doc.select(&s).next())
}

fn attr_text(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    select_one(doc, selector)?
        .value()
        .attr(attr)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn element_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts title/description/language metadata and the visible body text
/// (script/style/noscript subtrees excluded).
pub fn parse_page(doc: &Html) -> ParsedPage {
    let title = select_one(doc, "title")
        .map(element_text)
        .filter(|s| !s.is_empty())
        .or_else(|| attr_text(doc, r#"meta[property="og:title"]"#, "content"));

    let description = attr_text(doc, r#"meta[name="description"]"#, "content")
        .or_else(|| attr_text(doc, r#"meta[property="og:description"]"#, "content"));

    let language = attr_text(doc, "html", "lang");

    let mut visible_text = String::new();
    collect_visible_text(doc.tree.root(), &mut visible_text);
    let visible_text = collapse_whitespace(&visible_text);

    ParsedPage {
        title,
        description,
        language,
        visible_text,
    }
}

fn collect_visible_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => {
            out.push_str(text);
            out.push(' ');
        }
        Node::Element(el) => {
            if matches!(el.name(), "script" | "style" | "noscript") {
                return;
            }
            for child in node.children() {
                collect_visible_text(child, out);
            }
        }
        _ => {
            for child in node.children() {
                collect_visible_text(child, out);
            }
        }
    }
}

/// Picks the target HTML per the precedence (includeTags, then
/// onlyMainContent candidates, then body, then the raw document), renders it
/// to Markdown, and extracts deduplicated absolute links.
pub fn reduce(
    doc: &Html,
    raw_html: &str,
    final_url: &str,
    only_main_content: bool,
    include_tags: &[String],
    exclude_tags: &[String],
) -> ReducedContent {
    let mut noise_selectors: Vec<Selector> = NOISE_SELECTORS
        .iter()
        .chain(exclude_tags.iter().map(String::as_str))
        .filter_map(|s| Selector::parse(s).ok())
        .collect();
    if !only_main_content {
        noise_selectors.clear();
        noise_selectors.extend(
            exclude_tags
                .iter()
                .filter_map(|s| Selector::parse(s).ok()),
        );
    }

    let target_html = if !include_tags.is_empty() {
        include_tags
            .iter()
            .filter_map(|sel| Selector::parse(sel).ok())
            .flat_map(|sel| doc.select(&sel).map(render_inner(&noise_selectors)))
            .collect::<Vec<_>>()
            .join("\n")
    } else if only_main_content {
        MAIN_CONTENT_SELECTORS
            .iter()
            .filter_map(|sel| Selector::parse(sel).ok())
            .find_map(|sel| {
                doc.select(&sel)
                    .map(render_inner(&noise_selectors))
                    .find(|html| html.len() > 100)
            })
            .unwrap_or_else(|| {
                select_one(doc, "body")
                    .map(render_inner(&noise_selectors))
                    .unwrap_or_else(|| raw_html.to_string())
            })
    } else {
        select_one(doc, "body")
            .map(render_inner(&noise_selectors))
            .unwrap_or_else(|| raw_html.to_string())
    };

    let markdown = htmd::convert(&target_html).unwrap_or_default();
    let links = extract_links(doc, final_url);

    ReducedContent {
        markdown,
        html: target_html,
        links,
    }
}

fn render_inner(noise: &[Selector]) -> impl Fn(ElementRef) -> String + '_ {
    move |el: ElementRef| {
        let mut out = String::new();
        for child in el.children() {
            render_filtered(child, noise, &mut out);
        }
        out
    }
}

fn render_filtered(node: ego_tree::NodeRef<'_, Node>, noise: &[Selector], out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(text),
        Node::Element(el) => {
            if let Some(element_ref) = ElementRef::wrap(node)
                && noise.iter().any(|s| s.matches(&element_ref))
            {
                return;
            }
            if matches!(el.name(), "script" | "style" | "noscript" | "iframe") {
                return;
            }
            let tag = el.name();
            out.push('<');
            out.push_str(tag);
            for (name, value) in el.attrs() {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&value.replace('"', "&quot;"));
                out.push('"');
            }
            out.push('>');
            for child in node.children() {
                render_filtered(child, noise, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        _ => {
            for child in node.children() {
                render_filtered(child, noise, out);
            }
        }
    }
}

fn extract_links(doc: &Html, final_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(final_url) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for el in doc.select(&selector) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let resolved = resolved.to_string();
        if seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_falls_back_to_og_title() {
        let doc = Html::parse_document(
            r#"<html><head><meta property="og:title" content="OG Title"></head><body></body></html>"#,
        );
        let page = parse_page(&doc);
        assert_eq!(page.title.as_deref(), Some("OG Title"));
    }

    #[test]
    fn visible_text_excludes_script_content() {
        let doc = Html::parse_document(
            "<html><body><p>Hello world</p><script>var hidden = 'not visible';</script></body></html>",
        );
        let page = parse_page(&doc);
        assert!(page.visible_text.contains("Hello world"));
        assert!(!page.visible_text.contains("not visible"));
    }

    #[test]
    fn extract_links_resolves_relative_and_dedupes() {
        let doc = Html::parse_document(
            r#"<html><body>
                <a href="/a">A</a>
                <a href="/a">A again</a>
                <a href="#frag">skip</a>
                <a href="javascript:void(0)">skip</a>
            </body></html>"#,
        );
        let links = extract_links(&doc, "https://example.com/page");
        assert_eq!(links, vec!["https://example.com/a".to_string()]);
    }

    #[test]
    fn reduce_picks_main_over_body() {
        let raw = r#"<html><body><nav>Menu</nav><main><p>The real content here, long enough to pass the length gate for main content selection in tests.</p></main></body></html>"#;
        let doc = Html::parse_document(raw);
        let reduced = reduce(&doc, raw, "https://example.com", true, &[], &[]);
        assert!(reduced.html.contains("real content"));
        assert!(!reduced.html.contains("Menu"));
    }
}
