//! Evidence extraction from activity text and marketing-profile properties
//!
//! Evidence is the only input to product-interest scoring. Every snippet is
//! redacted before it is constructed, URLs lose their query string and
//! fragment, and extraction is bounded per source so adversarial input
//! cannot blow up scoring cost.

use crate::privacy::{redact_inline_text, truncate_chars};
use crate::timeline::{objects, Record, SourceCapabilities, SourceRecords};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// Maximum characters in an evidence snippet
pub const EVIDENCE_MAX_CHARS: usize = 280;

/// Maximum characters in a sanitized URL
pub const URL_MAX_CHARS: usize = 240;

/// Maximum URLs taken from one free-text block
pub const MAX_URLS_PER_TEXT: usize = 30;

const MAX_WEB_ACTIVITY_RECORDS: usize = 3;
const MAX_CAMPAIGN_MEMBERS: usize = 30;

const PROFILE_URL_FIELDS: [&str; 4] = [
    "hs_analytics_first_url",
    "hs_analytics_last_url",
    "hs_analytics_first_referrer",
    "hs_analytics_last_referrer",
];

const PROFILE_TEXT_FIELDS: [&str; 10] = [
    "hs_analytics_first_touch_converting_campaign",
    "hs_analytics_last_touch_converting_campaign",
    "hs_analytics_source",
    "hs_analytics_source_data_1",
    "hs_analytics_source_data_2",
    "utm_campaign",
    "utm_source",
    "utm_medium",
    "first_conversion_event_name",
    "recent_conversion_event_name",
];

const CONTACT_CONVERSION_FIELDS: [(&str, &str); 2] = [
    ("HubSpot_First_Conversion__c", "HubSpot_First_Conversion_Date__c"),
    ("HubSpot_Recent_Conversion__c", "HubSpot_Recent_Conversion_Date__c"),
];

static RE_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhttps?://[^\s<>"')\]]+"#).ok());

/// Where a piece of evidence came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// URL mined from a web-activity summary
    WebActivityUrl,
    /// Campaign the contact is a member of
    CampaignName,
    /// URL-valued marketing-profile property
    ProfileUrl,
    /// Text-valued marketing-profile property
    ProfileText,
    /// Conversion name carried on the contact
    ContactConversion,
}

impl EvidenceKind {
    /// Scoring category of this kind
    pub fn category(self) -> EvidenceCategory {
        match self {
            EvidenceKind::WebActivityUrl | EvidenceKind::ProfileUrl => EvidenceCategory::Url,
            _ => EvidenceCategory::Text,
        }
    }
}

/// Evidence category that rules select on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceCategory {
    Url,
    Text,
}

/// A redacted, categorized snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub category: EvidenceCategory,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl Evidence {
    /// Build an evidence item; blank text yields `None`.
    pub fn new(kind: EvidenceKind, raw: &str, occurred_at: Option<DateTime<Utc>>) -> Option<Self> {
        let redacted = redact_inline_text(raw)?;
        let text = redacted.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            kind,
            category: kind.category(),
            text: truncate_chars(text, EVIDENCE_MAX_CHARS).to_string(),
            occurred_at,
        })
    }
}

/// Strip query and fragment, lower-case the host and cap the length.
///
/// Unparseable input yields `None`.
pub fn sanitize_url(raw: &str) -> Option<String> {
    let mut url = url::Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    // host is already lower-cased by the parser for http(s)
    url.set_query(None);
    url.set_fragment(None);
    Some(truncate_chars(url.as_str(), URL_MAX_CHARS).to_string())
}

/// Extract sanitized, deduplicated URLs from free text (at most 30).
pub fn extract_urls(text: &str) -> Vec<String> {
    let Some(re) = RE_URL.as_ref() else {
        return Vec::new();
    };
    let mut urls: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        if let Some(clean) = sanitize_url(m.as_str()) {
            if !urls.contains(&clean) {
                urls.push(clean);
            }
        }
        if urls.len() >= MAX_URLS_PER_TEXT {
            break;
        }
    }
    urls
}

/// Collects evidence from every supported source
pub struct EvidenceExtractor<'a> {
    caps: &'a SourceCapabilities,
}

impl<'a> EvidenceExtractor<'a> {
    /// Create an extractor for one environment
    pub fn new(caps: &'a SourceCapabilities) -> Self {
        Self { caps }
    }

    /// Extract evidence from the whole bundle, in source order
    pub fn extract(&self, records: &SourceRecords) -> Vec<Evidence> {
        let mut evidence = self.from_web_activity(&records.web_activity);
        evidence.extend(self.from_campaign_members(&records.campaign_members));
        if let Some(profile) = &records.marketing_profile {
            evidence.extend(self.from_marketing_profile(profile));
        }
        if let Some(contact) = &records.contact {
            evidence.extend(self.from_contact(contact));
        }
        tracing::debug!(evidence = evidence.len(), "Extracted evidence");
        evidence
    }

    /// URLs from the first three web-activity summaries
    pub fn from_web_activity(&self, rows: &[Value]) -> Vec<Evidence> {
        let mut evidence = Vec::new();
        for raw in rows.iter().take(MAX_WEB_ACTIVITY_RECORDS) {
            let record = Record::new(objects::WEB_ACTIVITY, raw, self.caps);
            let occurred_at = record.instant(&["Lead_Date__c", "CreatedDate"]);
            let Some(summary) = record.text("Web_Activity_Summary__c") else {
                continue;
            };
            evidence.extend(
                extract_urls(&summary)
                    .iter()
                    .filter_map(|url| Evidence::new(EvidenceKind::WebActivityUrl, url, occurred_at)),
            );
        }
        evidence
    }

    /// Campaign names from the first thirty memberships
    pub fn from_campaign_members(&self, members: &[Value]) -> Vec<Evidence> {
        members
            .iter()
            .take(MAX_CAMPAIGN_MEMBERS)
            .filter_map(|raw| {
                let record = Record::new(objects::CAMPAIGN_MEMBER, raw, self.caps);
                let name = record.text("Campaign.Name")?;
                let occurred_at = record.instant(&["FirstRespondedDate", "CreatedDate"]);
                Evidence::new(EvidenceKind::CampaignName, &name, occurred_at)
            })
            .collect()
    }

    /// URL and text properties of the marketing profile.
    ///
    /// Accepts either a flat property map or one nested under `properties`.
    pub fn from_marketing_profile(&self, profile: &Value) -> Vec<Evidence> {
        let props = match profile.get("properties") {
            Some(nested) if nested.is_object() => nested,
            _ => profile,
        };
        let record = Record::new(objects::MARKETING_PROFILE, props, self.caps);

        let urls = PROFILE_URL_FIELDS.iter().filter_map(|field| {
            let raw = record.text(field)?;
            let clean = sanitize_url(&raw)?;
            Evidence::new(EvidenceKind::ProfileUrl, &clean, None)
        });
        let texts = PROFILE_TEXT_FIELDS.iter().filter_map(|field| {
            let raw = record.text(field)?;
            Evidence::new(EvidenceKind::ProfileText, &raw, None)
        });
        urls.chain(texts).collect()
    }

    /// First and recent conversion names carried on the contact
    pub fn from_contact(&self, contact: &Value) -> Vec<Evidence> {
        let record = Record::new(objects::CONTACT, contact, self.caps);
        CONTACT_CONVERSION_FIELDS
            .iter()
            .filter_map(|(name_field, date_field)| {
                let name = record.text(name_field)?;
                Evidence::new(
                    EvidenceKind::ContactConversion,
                    &name,
                    record.instant(&[*date_field]),
                )
            })
            .collect()
    }
}
