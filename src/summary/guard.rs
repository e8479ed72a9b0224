//! Output guard
//!
//! Every summary, generated or deterministic, passes through the same gate
//! before it is accepted:
//!
//! ```text
//! raw ──▶ strip code fences ──▶ sanitize ──▶ section caps ──▶ + links
//!     ──▶ sanitize ──▶ truncate ──▶ validate ──▶ accept | reject(reasons)
//! ```
//!
//! Leak detection scans visible text only; `href` values are blanked first
//! so record URLs in the Links section never trip it.

use super::html::sanitize_html;
use crate::config::RenderConfig;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::sync::LazyLock;

/// Notice appended when a summary is cut to the storage ceiling
pub const TRUNCATION_NOTICE: &str = "\n<p><em>Summary truncated for storage limits.</em></p>";

static RE_HREF_VALUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*(?:"[^"]*"|'[^']*')"#).ok()
});

static RE_UNSAFE_ANCHOR: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)<\s*a\b[^>]*href\s*=\s*['"]\s*(?:javascript:|data:)"#).ok()
});

static RE_FENCE_OPEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^```[a-zA-Z]*\s*").ok());

static RE_FENCE_CLOSE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s*```$").ok());

static RE_LIST_ITEM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<li>.*?</li>").ok());

static RE_EMPTY_LIST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\s*<ul>\s*</ul>").ok());

/// Opening markup shared by every section heading
const HEADING_OPEN: &str = "<p><strong>";

static RE_SPACES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").ok());

/// The four mandatory summary sections, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionHeading {
    WhyCare,
    ScoreInterpretation,
    RecentEngagement,
    NextStep,
}

impl SectionHeading {
    pub const ALL: [SectionHeading; 4] = [
        SectionHeading::WhyCare,
        SectionHeading::ScoreInterpretation,
        SectionHeading::RecentEngagement,
        SectionHeading::NextStep,
    ];

    pub fn title(self) -> &'static str {
        match self {
            SectionHeading::WhyCare => "Why Sales Should Care",
            SectionHeading::ScoreInterpretation => "Score Interpretation",
            SectionHeading::RecentEngagement => "Most Recent Engagement",
            SectionHeading::NextStep => "Suggested Next Step",
        }
    }

    /// Bullet ceiling for the section
    pub fn max_items(self) -> usize {
        match self {
            SectionHeading::WhyCare => 6,
            SectionHeading::ScoreInterpretation => 6,
            SectionHeading::RecentEngagement => 12,
            SectionHeading::NextStep => 2,
        }
    }

    /// Heading markup as rendered and as required by validation
    pub fn marker(self) -> String {
        format!("<p><strong>{}</strong></p>", self.title())
    }
}

/// Why a summary was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    EmptyHtml,
    FieldOrIdLeak,
    UnsafeAnchorHref,
    MissingHeading(&'static str),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::EmptyHtml => f.write_str("empty_html"),
            RejectionReason::FieldOrIdLeak => f.write_str("field_or_id_leak"),
            RejectionReason::UnsafeAnchorHref => f.write_str("unsafe_anchor_href"),
            RejectionReason::MissingHeading(h) => write!(f, "missing_heading:{}", h),
        }
    }
}

impl Serialize for RejectionReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Validation verdict
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub ok: bool,
    pub reasons: Vec<RejectionReason>,
}

/// Keep at most the section's bullet ceiling across every list between
/// its heading and the next heading; lists left empty are dropped
pub fn enforce_section_caps(html: &str) -> String {
    let Some(item_re) = RE_LIST_ITEM.as_ref() else {
        return html.to_string();
    };
    let mut s = html.to_string();
    for heading in SectionHeading::ALL {
        let marker = heading.marker();
        let Some(idx) = s.find(&marker) else {
            continue;
        };
        let start = idx + marker.len();
        let end = s[start..]
            .find(HEADING_OPEN)
            .map_or(s.len(), |off| start + off);
        let max_items = heading.max_items();
        let mut seen = 0;
        let section = item_re.replace_all(&s[start..end], |caps: &regex::Captures| {
            seen += 1;
            if seen <= max_items {
                caps[0].to_string()
            } else {
                String::new()
            }
        });
        if seen <= max_items {
            continue;
        }
        let section = match RE_EMPTY_LIST.as_ref() {
            Some(re) => re.replace_all(&section, "").into_owned(),
            None => section.into_owned(),
        };
        s = format!("{}{}{}", &s[..start], section, &s[end..]);
    }
    s
}

/// Remove a Markdown code fence wrapped around generated output
pub fn strip_code_fences(raw: &str) -> String {
    let mut s = raw.trim().to_string();
    if let Some(re) = RE_FENCE_OPEN.as_ref() {
        s = re.replace(&s, "").into_owned();
    }
    if let Some(re) = RE_FENCE_CLOSE.as_ref() {
        s = re.replace(&s, "").into_owned();
    }
    s.trim().to_string()
}

/// Cut to `max_chars` on a tag boundary and append the truncation notice
pub fn truncate_html(html: &str, max_chars: usize) -> String {
    if html.chars().count() <= max_chars {
        return html.to_string();
    }
    let budget = max_chars.saturating_sub(TRUNCATION_NOTICE.chars().count());
    let cut = html
        .char_indices()
        .nth(budget)
        .map_or(html.len(), |(idx, _)| idx);
    let mut head = &html[..cut];
    if let Some(open) = head.rfind('<') {
        if head[open..].find('>').is_none() {
            head = &head[..open];
        }
    }
    format!("{}{}", head.trim_end(), TRUNCATION_NOTICE)
}

/// Sanitize, cap, scan and validate summary HTML
#[derive(Debug)]
pub struct OutputGuard {
    forbidden: Vec<Regex>,
    skipped_patterns: Vec<String>,
    max_html_chars: usize,
}

impl OutputGuard {
    /// Build the guard; invalid leak patterns are skipped with a warning
    pub fn new(config: &RenderConfig) -> Self {
        let mut forbidden = Vec::with_capacity(config.forbidden_patterns.len());
        let mut skipped_patterns = Vec::new();
        for pattern in &config.forbidden_patterns {
            match compile_leak_pattern(pattern) {
                Ok(re) => forbidden.push(re),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "Skipping invalid leak pattern");
                    skipped_patterns.push(pattern.clone());
                }
            }
        }
        Self {
            forbidden,
            skipped_patterns,
            max_html_chars: config.max_html_chars,
        }
    }

    /// Leak patterns that failed to compile
    pub fn skipped_patterns(&self) -> &[String] {
        &self.skipped_patterns
    }

    /// Storage ceiling in characters
    pub fn max_html_chars(&self) -> usize {
        self.max_html_chars
    }

    /// Whether any leak pattern appears outside `href` values
    pub fn contains_leak(&self, html: &str) -> bool {
        let scan = match RE_HREF_VALUE.as_ref() {
            Some(re) => re.replace_all(html, "href=\"\"").into_owned(),
            None => html.to_string(),
        };
        self.forbidden.iter().any(|re| re.is_match(&scan))
    }

    /// Remove every leak-pattern match from plain text
    pub fn scrub_text(&self, text: &str) -> String {
        let mut s = text.to_string();
        // Removal can join fragments into a new match; repeat until stable.
        for _ in 0..4 {
            let mut changed = false;
            for re in &self.forbidden {
                if re.is_match(&s) {
                    s = re.replace_all(&s, "").into_owned();
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        match RE_SPACES.as_ref() {
            Some(re) => re.replace_all(&s, " ").trim().to_string(),
            None => s.trim().to_string(),
        }
    }

    /// Check a finished summary against the acceptance rules
    pub fn validate(&self, html: &str) -> Validation {
        let mut reasons = Vec::new();
        if html.trim().is_empty() {
            reasons.push(RejectionReason::EmptyHtml);
        }
        if self.contains_leak(html) {
            reasons.push(RejectionReason::FieldOrIdLeak);
        }
        if RE_UNSAFE_ANCHOR.as_ref().is_some_and(|re| re.is_match(html)) {
            reasons.push(RejectionReason::UnsafeAnchorHref);
        }
        for heading in SectionHeading::ALL {
            if !html.contains(&heading.marker()) {
                reasons.push(RejectionReason::MissingHeading(heading.title()));
            }
        }
        Validation {
            ok: reasons.is_empty(),
            reasons,
        }
    }

    /// Sanitize and cap a summary body, append the links section, then
    /// sanitize and truncate the whole document
    pub fn finalize(&self, html: &str, links: Option<&str>) -> String {
        let mut out = enforce_section_caps(&sanitize_html(html));
        if let Some(links) = links.filter(|l| !l.is_empty()) {
            out = format!("{}\n{}", out, links);
        }
        truncate_html(&sanitize_html(&out), self.max_html_chars)
    }
}

fn compile_leak_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::Render(format!("Invalid leak pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> OutputGuard {
        OutputGuard::new(&RenderConfig::default())
    }

    fn complete(body: &str) -> String {
        SectionHeading::ALL
            .iter()
            .map(|h| format!("{}\n<ul><li>{}</li></ul>", h.marker(), body))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_validate_accepts_complete_summary() {
        let v = guard().validate(&complete("Reviewed pricing page"));
        assert!(v.ok, "{:?}", v.reasons);
    }

    #[test]
    fn test_validate_missing_heading() {
        let html = complete("x").replace("Suggested Next Step", "Next");
        let v = guard().validate(&html);
        assert!(!v.ok);
        assert_eq!(
            v.reasons,
            vec![RejectionReason::MissingHeading("Suggested Next Step")]
        );
        assert_eq!(v.reasons[0].to_string(), "missing_heading:Suggested Next Step");
    }

    #[test]
    fn test_validate_empty() {
        let v = guard().validate("   ");
        assert!(v.reasons.contains(&RejectionReason::EmptyHtml));
        assert_eq!(v.reasons.len(), 5);
    }

    #[test]
    fn test_leak_in_text_rejected() {
        let g = guard();
        for leak in [
            "Score field Lead_Score__c is high",
            "Pulled from Salesforce",
            "See hubspot data",
            "Record 003AB0000012345XYZ",
            "Via OpportunityContactRole",
        ] {
            let v = g.validate(&complete(leak));
            assert_eq!(v.reasons, vec![RejectionReason::FieldOrIdLeak], "{}", leak);
        }
    }

    #[test]
    fn test_leak_inside_href_ignored() {
        let html = format!(
            "{}\n<p><strong>Links</strong></p>\n<ul><li><a href=\"https://acme.my.example.com/006AB0000012345XYZ\" target=\"_blank\" rel=\"noopener\">Opportunity record</a></li></ul>",
            complete("ok")
        );
        assert!(guard().validate(&html).ok);
    }

    #[test]
    fn test_unsafe_anchor_flagged() {
        let html = format!("{}<a href=\"javascript:alert(1)\">x</a>", complete("ok"));
        assert!(guard()
            .validate(&html)
            .reasons
            .contains(&RejectionReason::UnsafeAnchorHref));
    }

    #[test]
    fn test_section_caps() {
        let items: String = (0..9).map(|i| format!("<li>step {}</li>", i)).collect();
        let html = format!(
            "{}\n<ul>{}</ul>\n{}\n<ul>{}</ul>",
            SectionHeading::NextStep.marker(),
            items,
            SectionHeading::WhyCare.marker(),
            items
        );
        let capped = enforce_section_caps(&html);
        assert_eq!(capped.matches("<li>").count(), 2 + 6);
        assert!(capped.contains("<li>step 1</li></ul>"));
    }

    #[test]
    fn test_section_caps_span_split_lists() {
        let list = |from: usize| -> String {
            let items: String = (from..from + 4).map(|i| format!("<li>next {}</li>", i)).collect();
            format!("<ul>{}</ul>", items)
        };
        let html = format!(
            "{}\n{}\n{}\n{}\n<ul><li>last</li></ul>",
            SectionHeading::NextStep.marker(),
            list(0),
            list(4),
            "<p><strong>Links</strong></p>"
        );
        let capped = enforce_section_caps(&html);
        assert!(capped.contains("<li>next 0</li><li>next 1</li></ul>"));
        assert!(!capped.contains("next 2"));
        assert!(!capped.contains("next 4"));
        assert!(!capped.contains("<ul></ul>"));
        assert!(capped.ends_with("<p><strong>Links</strong></p>\n<ul><li>last</li></ul>"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```html\n<p>x</p>\n```"), "<p>x</p>");
        assert_eq!(strip_code_fences("<p>x</p>"), "<p>x</p>");
    }

    #[test]
    fn test_truncate_on_tag_boundary() {
        let html = format!("<p>{}</p><ul><li>{}</li></ul>", "a".repeat(300), "b".repeat(300));
        let out = truncate_html(&html, 400);
        assert!(out.ends_with(TRUNCATION_NOTICE));
        assert!(out.chars().count() <= 400);
        let body = out.trim_end_matches(TRUNCATION_NOTICE);
        assert!(body.rfind('<').map_or(true, |i| body[i..].contains('>')));
        assert_eq!(truncate_html("<p>short</p>", 400), "<p>short</p>");
    }

    #[test]
    fn test_scrub_text() {
        let g = guard();
        assert_eq!(g.scrub_text("Synced from Salesforce  today"), "Synced from today");
        assert_eq!(g.scrub_text("Owner__c changed"), "Owner changed");
        assert!(!g.contains_leak(&g.scrub_text("HubSpot_Score__c via HubSpot")));
    }

    #[test]
    fn test_invalid_pattern_skipped() {
        let config = RenderConfig {
            forbidden_patterns: vec!["(unclosed".to_string(), r"__c\b".to_string()],
            ..Default::default()
        };
        let g = OutputGuard::new(&config);
        assert_eq!(g.skipped_patterns(), ["(unclosed".to_string()]);
        assert!(g.contains_leak("Foo__c"));
    }

    #[test]
    fn test_finalize_appends_links_and_sanitizes() {
        let g = guard();
        let out = g.finalize(
            "<div><p><strong>Why Sales Should Care</strong></p><ul><li onclick=\"x\">a</li></ul></div>",
            Some("<p><strong>Links</strong></p>\n<ul><li><a href=\"https://x.example/1\">l</a></li></ul>"),
        );
        assert!(out.starts_with("<p><strong>Why Sales Should Care</strong></p><ul><li>a</li></ul>"));
        assert!(out.contains("target=\"_blank\" rel=\"noopener\""));
    }
}
