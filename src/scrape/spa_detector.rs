// src/scrape/spa_detector.rs
// Decides whether fetched bytes look like an un-hydrated single-page-app
// shell that needs JavaScript the server cannot execute.

use scraper::{Html, Selector};

use super::html::collapse_whitespace;

pub const SPA_LOADING_PATTERNS: &[&str] = &[
    "loading...",
    "loading…",
    "please wait",
    "just a moment",
    "checking your browser",
    "one moment please",
    "redirecting",
    "enable javascript",
    "javascript is required",
    "javascript must be enabled",
    "this app requires javascript",
    "you need to enable javascript",
    "noscript",
];

pub const SPA_ROOT_SELECTORS: &[&str] = &[
    "#root",
    "#app",
    "#__next",
    "#__nuxt",
    "#svelte",
    "app-root",
    "#___gatsby",
    "#main-app",
];

pub const MIN_MEANINGFUL_TEXT_LENGTH: usize = 200;
pub const SCRIPT_HEAVY_RATIO: f64 = 0.65;

/// Returns a short reason the page looks like an SPA shell, or `None` if it
/// looks like real content. `doc` must already have been parsed from `raw`.
pub fn detect(raw: &str, visible_text: &str, doc: &Html) -> Option<String> {
    let lower = visible_text.to_lowercase();
    let text_len = visible_text.chars().count();

    if text_len < MIN_MEANINGFUL_TEXT_LENGTH {
        if let Some(reason) = check_root_selectors(doc) {
            return Some(reason);
        }
        if let Some(pattern) = find_pattern(&lower) {
            return Some(format!("Loading indicator detected: \"{pattern}\""));
        }
        if text_len < 50 {
            return Some(format!("Near-empty body text ({text_len} chars)"));
        }
    } else if text_len < 500 {
        if let Some(pattern) = find_pattern(&lower) {
            return Some(format!("Short page with loading indicator: \"{pattern}\""));
        }
    }

    let script_content_length = script_text_length(doc);
    let raw_len = raw.len();
    if raw_len > 1000
        && (script_content_length as f64 / raw_len as f64) > SCRIPT_HEAVY_RATIO
        && text_len < MIN_MEANINGFUL_TEXT_LENGTH
    {
        let pct = (script_content_length as f64 / raw_len as f64 * 100.0).round();
        return Some(format!(
            "Script-heavy page ({pct}% scripts, {text_len} chars text)"
        ));
    }

    None
}

fn find_pattern(lower: &str) -> Option<&'static str> {
    SPA_LOADING_PATTERNS
        .iter()
        .find(|p| lower.contains(*p))
        .copied()
}

fn check_root_selectors(doc: &Html) -> Option<String> {
    for selector in SPA_ROOT_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        for el in doc.select(&sel) {
            let text = collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "));
            let len = text.chars().count();
            if len < MIN_MEANINGFUL_TEXT_LENGTH {
                return Some(format!(
                    "SPA root container \"{selector}\" with minimal content ({len} chars)"
                ));
            }
        }
    }
    None
}

fn script_text_length(doc: &Html) -> usize {
    let Ok(sel) = Selector::parse("script") else {
        return 0;
    };
    doc.select(&sel)
        .map(|el| el.text().collect::<Vec<_>>().join("").len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::html::parse_page;

    fn check(raw: &str) -> Option<String> {
        let doc = Html::parse_document(raw);
        let page = parse_page(&doc);
        detect(raw, &page.visible_text, &doc)
    }

    #[test]
    fn scenario_5_empty_root_with_script_tag() {
        let raw = r#"<html><body><div id="root"></div><script src="/app.js"></script></body></html>"#;
        let reason = check(raw).unwrap();
        assert!(reason.contains("#root"));
    }

    #[test]
    fn scenario_6_real_article_with_loading_in_title_is_not_flagged() {
        let mut body = String::from("<html><body><h1>How Loading Times Affect User Experience</h1>");
        for i in 0..5 {
            body.push_str(&format!(
                "<p>This is paragraph number {i} with enough real prose to push the total \
                 visible text length comfortably past the minimal meaningful content threshold \
                 used by the shell detector, describing how loading times affect users.</p>"
            ));
        }
        body.push_str("</body></html>");
        assert!(check(&body).is_none());
    }

    #[test]
    fn empty_body_is_near_empty() {
        let reason = check("<html><body></body></html>").unwrap();
        assert!(reason.contains("Near-empty body"));
    }

    #[test]
    fn short_4xx_page_without_spa_indicators_is_not_flagged() {
        let raw = "<html><body><h1>404 Not Found</h1><p>The page you requested could not be located on this server.</p></body></html>";
        assert!(check(raw).is_none());
    }

    #[test]
    fn script_heavy_page_with_little_text_is_flagged() {
        let mut raw = String::from("<html><body><p>x</p><script>");
        raw.push_str(&"var x = 1;".repeat(200));
        raw.push_str("</script></body></html>");
        let reason = check(&raw).unwrap();
        assert!(reason.contains("Script-heavy page"));
    }
}
