//! Related-record links
//!
//! Links point only at validated record identifiers under an `https://`
//! instance URL. They are appended after the summary body is accepted.

use super::html::escape_html;
use crate::privacy::redact_inline_text;
use crate::timeline::{objects, OpportunityIndex, Record, SourceCapabilities, SourceRecords};
use regex::Regex;
use std::sync::LazyLock;

/// Maximum opportunity links
pub const MAX_OPPORTUNITY_LINKS: usize = 5;

const OPEN_FLAG_FIELD: &str = "Open_Opportunity__c";

static RE_RECORD_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{15,18}$").ok());

/// Whether a value has the fixed record-identifier shape
pub fn is_record_id(value: &str) -> bool {
    RE_RECORD_ID
        .as_ref()
        .is_some_and(|re| re.is_match(value.trim()))
}

/// Absolute record URL, or `None` unless the base is `https://` and the
/// identifier is record-shaped
pub fn record_url(instance_url: &str, record_id: &str) -> Option<String> {
    let base = instance_url.trim().trim_end_matches('/');
    if !base.starts_with("https://") || !is_record_id(record_id) {
        return None;
    }
    Some(format!("{}/{}", base, record_id.trim()))
}

/// One labeled record link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLink {
    pub label: String,
    pub href: String,
}

/// Product and opportunity links for a lead
pub fn related_record_links(
    instance_url: Option<&str>,
    records: &SourceRecords,
    caps: &SourceCapabilities,
    opportunities: &OpportunityIndex,
) -> Vec<RecordLink> {
    let Some(instance_url) = instance_url else {
        return Vec::new();
    };
    let mut links = Vec::new();
    let lead = records
        .lead
        .as_ref()
        .map(|v| Record::new(objects::LEAD, v, caps));

    if let Some(lead) = lead {
        if let Some(href) = lead
            .text("Product__c")
            .and_then(|id| record_url(instance_url, &id))
        {
            let label = match lead.text("Product_Name__c") {
                Some(name) => format!("Product: {}", name),
                None => "Product record".to_string(),
            };
            links.push(RecordLink { label, href });
        }
    }

    let roles: Vec<(&serde_json::Value, Record<'_>)> = records
        .opportunity_contact_roles
        .iter()
        .map(|v| (v, Record::new(objects::CONTACT_ROLE, v, caps)))
        .collect();
    let has_open_flag = caps.has_field(objects::CONTACT_ROLE, OPEN_FLAG_FIELD)
        && roles
            .iter()
            .any(|(raw, _)| raw.get(OPEN_FLAG_FIELD).is_some());

    let mut candidates: Vec<String> = Vec::new();
    if let Some(id) = lead.and_then(|l| l.text("Opportunity__c")) {
        candidates.push(id);
    }
    for (_, role) in &roles {
        let Some(id) = role.text("OpportunityId") else {
            continue;
        };
        if has_open_flag && role.flag(OPEN_FLAG_FIELD) != Some(true) {
            continue;
        }
        candidates.push(id);
    }
    let mut seen: Vec<String> = Vec::new();
    for id in candidates {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }

    for id in seen.into_iter().take(MAX_OPPORTUNITY_LINKS) {
        let Some(href) = record_url(instance_url, &id) else {
            continue;
        };
        let entry = opportunities.get(&id);
        let name = entry.and_then(|o| o.name.clone());
        let stage = entry.and_then(|o| o.stage.clone());
        let label = match (name, stage) {
            (Some(name), Some(stage)) => format!("Opportunity: {} ({})", name, stage),
            (Some(name), None) => format!("Opportunity: {}", name),
            _ => "Opportunity record".to_string(),
        };
        links.push(RecordLink { label, href });
    }

    links
}

/// Render the Links section; labels are redacted and passed through `clean`
/// before escaping
pub fn render_links<F>(links: &[RecordLink], clean: F) -> Option<String>
where
    F: Fn(&str) -> String,
{
    if links.is_empty() {
        return None;
    }
    let items: String = links
        .iter()
        .map(|link| {
            let label = clean(&redact_inline_text(&link.label).unwrap_or_default());
            let label = if label.is_empty() {
                "Record".to_string()
            } else {
                label
            };
            format!(
                "<li><a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a></li>",
                escape_html(&link.href),
                escape_html(&label)
            )
        })
        .collect();
    Some(format!("<p><strong>Links</strong></p>\n<ul>{}</ul>", items))
}
