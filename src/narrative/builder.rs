//! Narrative derivations
//!
//! Derives qualitative, audience-safe facts from lead/contact/account
//! scoring fields and the assembled timeline:
//!
//! 1. **Fit**: looks good iff both eligibility flags are explicitly false
//! 2. **Intent**: Strong if the engagement threshold is met or 3+ notable
//!    events happened in 14 days; Moderate if 2+ in 30 days; else Light
//! 3. **Key reasons**: fixed priority order, one bullet per satisfied check
//! 4. **Recent engagement**: dated highlights, newest first, at most 12
//!
//! Raw scores are compared here and never copied into the output.

use super::input::{
    EngagementItem, FitAssessment, IntentAssessment, NarrativeInput, OpportunityBrief,
    OpportunityContext, OpportunitySignals, ProductInterestView, ScoreSignal, Strength,
};
use super::labels::event_highlight;
use crate::interest::ProductInterest;
use crate::privacy::{redact_inline_text, scrub_identifiers};
use crate::timeline::{
    objects, EventType, OpportunityIndex, Record, SourceCapabilities, SourceRecords, Timeline,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashSet;

/// Maximum engagement bullets in the narrative
pub const MAX_RECENT_ENGAGEMENT: usize = 12;

const MAX_CONTEXT_OPPORTUNITIES: usize = 5;
const MAX_PRODUCTS_PER_OPPORTUNITY: usize = 4;
const MAX_STAGE_NAMES: usize = 5;
const INBOUND_MARKER: &str = "contact";

pub mod reasons {
    pub const INBOUND: &str = "They directly requested follow-up (inbound intent).";
    pub const ENGAGEMENT_THRESHOLD: &str =
        "Recent engagement meets the marketing engagement threshold.";
    pub const FIT_THRESHOLD: &str = "Role/person-level fit meets the fit threshold.";
    pub const BEHAVIOR: &str =
        "They have accumulated meaningful engagement over time (behavior score increased).";
    pub const RECENT_CONVERSION: &str = "They recently converted on a high-intent offer.";
}

pub mod concerns {
    pub const CONTACT_FLAGGED: &str =
        "Contact is flagged as not eligible for private-sector outreach.";
    pub const ACCOUNT_FLAGGED: &str =
        "Account is flagged as not eligible for private-sector outreach.";
    pub const CONTACT_UNCLEAR: &str = "Contact eligibility checks are missing or unclear.";
    pub const ACCOUNT_UNCLEAR: &str = "Account eligibility checks are missing or unclear.";
    pub const PLACEHOLDER_ACCOUNT: &str =
        "Company details may be incomplete (new or placeholder account).";
}

/// Builds the narrative input for one request
pub struct NarrativeBuilder<'a> {
    records: &'a SourceRecords,
    caps: &'a SourceCapabilities,
    now: DateTime<Utc>,
}

impl<'a> NarrativeBuilder<'a> {
    /// Create a builder; `now` anchors every recency comparison
    pub fn new(records: &'a SourceRecords, caps: &'a SourceCapabilities, now: DateTime<Utc>) -> Self {
        Self { records, caps, now }
    }

    fn view(&self, object_type: &'static str, value: Option<&'a Value>) -> Option<Record<'a>> {
        value.map(|v| Record::new(object_type, v, self.caps))
    }

    fn lead(&self) -> Option<Record<'a>> {
        self.view(objects::LEAD, self.records.lead.as_ref())
    }

    fn contact(&self) -> Option<Record<'a>> {
        self.view(objects::CONTACT, self.records.contact.as_ref())
    }

    fn account(&self) -> Option<Record<'a>> {
        self.view(objects::ACCOUNT, self.records.account.as_ref())
    }

    /// Assemble the complete narrative input
    pub fn build(
        &self,
        timeline: &Timeline,
        interest: &ProductInterest,
        opportunities: &OpportunityIndex,
    ) -> NarrativeInput {
        let fit = self.assess_fit();
        let engagement_met = self.threshold_met(
            "HubSpot_Engagement_Score__c",
            "HubSpot_Engagement_Score_Threshold__c",
        );
        let fit_met = self.threshold_met(
            "HubSpot_Private_Sector_Contact_Fit__c",
            "Contact_Fit_Threshold__c",
        );
        let behavior_positive = self
            .contact()
            .and_then(|c| c.number("HubSpot_Private_Sector_Behavior_Score__c"))
            .is_some_and(|score| score > 0.0);
        let recent_conversion = self
            .contact()
            .and_then(|c| c.text("HubSpot_Recent_Conversion__c"));

        let inbound = self.has_inbound_request(timeline);
        let strength = self.intent_strength(timeline, engagement_met == Some(true));

        let mut key_reasons = Vec::new();
        if inbound {
            key_reasons.push(reasons::INBOUND.to_string());
        }
        if engagement_met == Some(true) {
            key_reasons.push(reasons::ENGAGEMENT_THRESHOLD.to_string());
        }
        if fit_met == Some(true) {
            key_reasons.push(reasons::FIT_THRESHOLD.to_string());
        }
        if behavior_positive {
            key_reasons.push(reasons::BEHAVIOR.to_string());
        }
        if recent_conversion.is_some() {
            key_reasons.push(reasons::RECENT_CONVERSION.to_string());
        }

        let score_signals = score_signals(engagement_met, fit_met, behavior_positive, inbound);
        let score_interpretation =
            score_interpretation(fit.looks_good, strength, &score_signals, inbound);

        let contact = self.contact();
        let intent = IntentAssessment {
            strength,
            drivers: key_reasons.clone(),
            last_engagement_date: contact
                .and_then(|c| c.instant(&["HubSpot_Last_Engagement_Date__c"]))
                .map(calendar_date),
            recent_conversion: recent_conversion.as_deref().and_then(clean_text),
            recent_conversion_date: contact
                .and_then(|c| c.instant(&["HubSpot_Recent_Conversion_Date__c"]))
                .map(calendar_date),
        };

        let lead = self.lead();
        let product = lead
            .and_then(|l| l.text("Product_Name__c").or_else(|| l.text("Product__c")))
            .as_deref()
            .and_then(clean_text);

        let opportunity_context = opportunity_context(opportunities);

        NarrativeInput {
            product,
            product_interest: interest
                .has_evidence()
                .then(|| ProductInterestView::from(interest)),
            opportunity_context,
            lead_status: lead.and_then(|l| l.text("MQL_Status__c")),
            lead_created_date: lead
                .and_then(|l| l.instant(&["MQL_Date__c", "CreatedDate"]))
                .map(calendar_date),
            fit,
            intent,
            opportunity: self.opportunity_signals(),
            key_reasons,
            score_signals,
            score_interpretation,
            recent_engagement: recent_engagement(timeline),
        }
    }

    /// Eligibility flags on contact and account
    pub fn assess_fit(&self) -> FitAssessment {
        let contact_flag = self
            .contact()
            .and_then(|c| c.flag("Private_Sector_Non_Qual__c"));
        let account_flag = self
            .account()
            .and_then(|a| a.flag("Private_Sector_Non_Qual__c"));

        let mut concerns = Vec::new();
        if contact_flag == Some(true) {
            concerns.push(concerns::CONTACT_FLAGGED.to_string());
        }
        if account_flag == Some(true) {
            concerns.push(concerns::ACCOUNT_FLAGGED.to_string());
        }
        if contact_flag.is_none() {
            concerns.push(concerns::CONTACT_UNCLEAR.to_string());
        }
        if account_flag.is_none() {
            concerns.push(concerns::ACCOUNT_UNCLEAR.to_string());
        }
        let placeholder = self
            .account()
            .and_then(|a| a.flag("Placeholder_Account__c"))
            == Some(true);
        if placeholder {
            concerns.push(concerns::PLACEHOLDER_ACCOUNT.to_string());
        }

        FitAssessment {
            looks_good: contact_flag == Some(false) && account_flag == Some(false),
            concerns,
        }
    }

    /// `Some(met)` when both score and threshold are numeric
    fn threshold_met(&self, score_field: &str, threshold_field: &str) -> Option<bool> {
        let contact = self.contact()?;
        let score = contact.number(score_field)?;
        let threshold = contact.number(threshold_field)?;
        Some(score >= threshold)
    }

    /// Inbound event in the timeline, or an inbound marker in the lead source
    pub fn has_inbound_request(&self, timeline: &Timeline) -> bool {
        timeline.has_event_type(EventType::InboundRequest)
            || self
                .lead()
                .and_then(|l| l.text("Lead_Source__c"))
                .is_some_and(|source| source.to_lowercase().contains(INBOUND_MARKER))
    }

    /// Strong / Moderate / Light from thresholds and recent notable activity
    pub fn intent_strength(&self, timeline: &Timeline, engagement_met: bool) -> Strength {
        let notable_since = |days: i64| {
            let start = self.now - Duration::days(days);
            timeline
                .events
                .iter()
                .filter(|e| e.importance.is_notable() && e.occurred_at >= start)
                .count()
        };
        if engagement_met || notable_since(14) >= 3 {
            Strength::Strong
        } else if notable_since(30) >= 2 {
            Strength::Moderate
        } else {
            Strength::Light
        }
    }

    /// Open-opportunity flag, distinct opportunity count and stage names
    pub fn opportunity_signals(&self) -> OpportunitySignals {
        let roles: Vec<Record<'a>> = self
            .records
            .opportunity_contact_roles
            .iter()
            .map(|r| Record::new(objects::CONTACT_ROLE, r, self.caps))
            .collect();

        let has_open_opportunity = roles
            .iter()
            .any(|r| r.flag("Open_Opportunity__c") == Some(true));
        let open_opportunity_count = roles
            .iter()
            .filter_map(|r| r.text("OpportunityId"))
            .collect::<HashSet<_>>()
            .len();

        let mut stage_names: Vec<String> = Vec::new();
        for raw in &self.records.opportunities {
            let record = Record::new(objects::OPPORTUNITY, raw, self.caps);
            if let Some(stage) = record.text("StageName").as_deref().and_then(clean_text) {
                if !stage_names.contains(&stage) {
                    stage_names.push(stage);
                }
            }
        }
        stage_names.truncate(MAX_STAGE_NAMES);

        OpportunitySignals {
            has_open_opportunity,
            open_opportunity_count,
            stage_names,
        }
    }
}

/// Up to five opportunities with name, stage and products
pub fn opportunity_context(opportunities: &OpportunityIndex) -> Option<OpportunityContext> {
    let open_opportunities: Vec<OpportunityBrief> = opportunities
        .entries()
        .iter()
        .take(MAX_CONTEXT_OPPORTUNITIES)
        .map(|o| OpportunityBrief {
            name: o.name.as_deref().and_then(clean_text),
            stage: o.stage.as_deref().and_then(clean_text),
            products: o
                .product_names(MAX_PRODUCTS_PER_OPPORTUNITY)
                .iter()
                .filter_map(|p| clean_text(p))
                .collect(),
        })
        .collect();
    if open_opportunities.is_empty() {
        None
    } else {
        Some(OpportunityContext { open_opportunities })
    }
}

/// Dated highlights, newest first, at most twelve
pub fn recent_engagement(timeline: &Timeline) -> Vec<EngagementItem> {
    let mut events: Vec<_> = timeline.events.iter().collect();
    events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
    events
        .into_iter()
        .map(|e| EngagementItem {
            date: calendar_date(e.occurred_at),
            highlight: event_highlight(e),
        })
        .filter(|item| !item.highlight.is_empty())
        .take(MAX_RECENT_ENGAGEMENT)
        .collect()
}

fn score_signals(
    engagement_met: Option<bool>,
    fit_met: Option<bool>,
    behavior_positive: bool,
    inbound: bool,
) -> Vec<ScoreSignal> {
    let mut signals = Vec::new();
    if let Some(met) = engagement_met {
        signals.push(ScoreSignal {
            signal: "Engagement score".to_string(),
            qualitative: if met { "Strong" } else { "Building" }.to_string(),
            contributes_to_lead: met,
            implication: if met {
                "Recent activity is high enough to justify timely outreach while intent is active."
            } else {
                "Engagement is still building; lead with relevant content before a hard ask."
            }
            .to_string(),
        });
    }
    if let Some(met) = fit_met {
        signals.push(ScoreSignal {
            signal: "Fit score".to_string(),
            qualitative: if met { "Strong" } else { "Partial" }.to_string(),
            contributes_to_lead: met,
            implication: if met {
                "Their role and profile match the buyers this offering serves best."
            } else {
                "Role or profile fit is partial; confirm they can influence a purchase."
            }
            .to_string(),
        });
    }
    if behavior_positive {
        signals.push(ScoreSignal {
            signal: "Behavior score".to_string(),
            qualitative: "Accumulating".to_string(),
            contributes_to_lead: true,
            implication:
                "Repeated engagement over time suggests sustained interest rather than a one-off visit."
                    .to_string(),
        });
    }
    if inbound {
        signals.push(ScoreSignal {
            signal: "Inbound request".to_string(),
            qualitative: "Urgent".to_string(),
            contributes_to_lead: true,
            implication:
                "They asked for follow-up directly, so speed-to-contact is critical to preserve momentum."
                    .to_string(),
        });
    }
    signals
}

fn score_interpretation(
    fit_looks_good: bool,
    strength: Strength,
    signals: &[ScoreSignal],
    inbound: bool,
) -> Vec<String> {
    let mut bullets = vec![
        if fit_looks_good {
            "Fit: Looks good based on eligibility checks."
        } else {
            "Fit: Review needed due to eligibility concerns."
        }
        .to_string(),
        format!(
            "Intent: {}, based on recent engagement and conversions.",
            strength
        ),
    ];
    bullets.extend(
        signals
            .iter()
            .filter(|s| s.contributes_to_lead)
            .map(|s| format!("{}: {}. {}", s.signal, s.qualitative, s.implication)),
    );
    if inbound {
        bullets.push("Inbound request makes this time-sensitive, but still verify fit.".to_string());
    }
    bullets
}

fn calendar_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Redact and scrub identifiers from free text bound for the narrative
fn clean_text(text: &str) -> Option<String> {
    let redacted = redact_inline_text(text.trim())?;
    let scrubbed = scrub_identifiers(&redacted);
    (!scrubbed.trim().is_empty()).then_some(scrubbed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimelinePolicy;
    use crate::timeline::{Event, Importance, TimelineAssembler};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 15, 0, 0, 0).unwrap()
    }

    fn event(event_type: EventType, importance: Importance, at: &str) -> Event {
        Event {
            occurred_at: DateTime::parse_from_rfc3339(at).unwrap().with_timezone(&Utc),
            source_system: "crm".to_string(),
            source_object_type: "Task".to_string(),
            source_object_id: format!("{}-{}", event_type, at),
            event_type,
            title: event_type.to_string(),
            detail: None,
            importance,
        }
    }

    fn timeline(events: Vec<Event>) -> Timeline {
        let policy = TimelinePolicy::default();
        TimelineAssembler::new(&policy).assemble(events, now())
    }

    fn records(value: Value) -> SourceRecords {
        serde_json::from_value(value).unwrap()
    }

    fn build(records: &SourceRecords, timeline: &Timeline) -> NarrativeInput {
        let caps = SourceCapabilities::default();
        let opps = OpportunityIndex::build(&records.opportunities, &records.opportunity_line_items, &caps);
        NarrativeBuilder::new(records, &caps, now()).build(timeline, &ProductInterest::default(), &opps)
    }

    #[test]
    fn test_inbound_and_engagement_threshold() {
        let recs = records(json!({
            "lead": {"Id": "L1", "Lead_Source__c": "Fit and Behavior Threshold Reached"},
            "contact": {"Private_Sector_Non_Qual__c": false,
                        "HubSpot_Engagement_Score__c": 12,
                        "HubSpot_Engagement_Score_Threshold__c": 10},
            "account": {"Private_Sector_Non_Qual__c": false}
        }));
        let tl = timeline(vec![event(
            EventType::InboundRequest,
            Importance::High,
            "2026-02-12T00:00:00Z",
        )]);
        let input = build(&recs, &tl);

        assert!(input.key_reasons.contains(&reasons::INBOUND.to_string()));
        assert!(input
            .key_reasons
            .contains(&reasons::ENGAGEMENT_THRESHOLD.to_string()));
        assert_eq!(input.intent.strength, Strength::Strong);
        assert!(input.fit.looks_good);
        assert!(input.fit.concerns.is_empty());
        assert!(input
            .score_interpretation
            .iter()
            .any(|b| b.starts_with("Inbound request: Urgent.")));
    }

    #[test]
    fn test_key_reasons_priority_order() {
        let recs = records(json!({
            "lead": {"Id": "L1", "Lead_Source__c": "Contact Us"},
            "contact": {"HubSpot_Engagement_Score__c": "12",
                        "HubSpot_Engagement_Score_Threshold__c": "10",
                        "HubSpot_Private_Sector_Contact_Fit__c": 8,
                        "Contact_Fit_Threshold__c": 7,
                        "HubSpot_Private_Sector_Behavior_Score__c": 14,
                        "HubSpot_Recent_Conversion__c": "Navigator Guide"}
        }));
        let input = build(&recs, &timeline(vec![]));
        assert_eq!(
            input.key_reasons,
            vec![
                reasons::INBOUND,
                reasons::ENGAGEMENT_THRESHOLD,
                reasons::FIT_THRESHOLD,
                reasons::BEHAVIOR,
                reasons::RECENT_CONVERSION,
            ]
        );
        assert_eq!(input.intent.recent_conversion.as_deref(), Some("Navigator Guide"));
    }

    #[test]
    fn test_fit_concerns() {
        let recs = records(json!({
            "contact": {"Private_Sector_Non_Qual__c": true},
            "account": {"Placeholder_Account__c": true}
        }));
        let input = build(&recs, &timeline(vec![]));
        assert!(!input.fit.looks_good);
        assert_eq!(
            input.fit.concerns,
            vec![
                concerns::CONTACT_FLAGGED,
                concerns::ACCOUNT_UNCLEAR,
                concerns::PLACEHOLDER_ACCOUNT,
            ]
        );
        assert_eq!(
            input.score_interpretation[0],
            "Fit: Review needed due to eligibility concerns."
        );
    }

    #[test]
    fn test_intent_strength_from_activity() {
        let recs = records(json!({}));
        let strong = timeline(vec![
            event(EventType::MeetingLogged, Importance::High, "2026-02-14T00:00:00Z"),
            event(EventType::TaskCompleted, Importance::Medium, "2026-02-10T00:00:00Z"),
            event(EventType::EmailEngagement, Importance::Medium, "2026-02-05T00:00:00Z"),
        ]);
        assert_eq!(build(&recs, &strong).intent.strength, Strength::Strong);

        let moderate = timeline(vec![
            event(EventType::MeetingLogged, Importance::High, "2026-02-14T00:00:00Z"),
            event(EventType::TaskCompleted, Importance::Medium, "2026-01-20T00:00:00Z"),
            event(EventType::CampaignTouch, Importance::Low, "2026-02-13T00:00:00Z"),
        ]);
        assert_eq!(build(&recs, &moderate).intent.strength, Strength::Moderate);

        let light = timeline(vec![event(
            EventType::CampaignTouch,
            Importance::Low,
            "2026-02-14T00:00:00Z",
        )]);
        assert_eq!(build(&recs, &light).intent.strength, Strength::Light);
    }

    #[test]
    fn test_recent_engagement_newest_first() {
        let recs = records(json!({}));
        let tl = timeline(vec![
            event(EventType::CampaignTouch, Importance::Low, "2026-01-10T00:00:00Z"),
            event(EventType::InboundRequest, Importance::High, "2026-02-12T00:00:00Z"),
            event(EventType::MeetingLogged, Importance::High, "2026-02-05T00:00:00Z"),
        ]);
        let input = build(&recs, &tl);
        let dates: Vec<_> = input.recent_engagement.iter().map(|e| e.date.as_str()).collect();
        assert_eq!(dates, vec!["2026-02-12", "2026-02-05", "2026-01-10"]);
        assert_eq!(
            input.recent_engagement[0].highlight,
            "Inbound request (Contact Us)"
        );
    }

    #[test]
    fn test_opportunity_signals_and_context() {
        let recs = records(json!({
            "opportunityContactRoles": [
                {"OpportunityId": "006A", "Open_Opportunity__c": true},
                {"OpportunityId": "006A", "Open_Opportunity__c": true},
                {"OpportunityId": "006B", "Open_Opportunity__c": false}
            ],
            "opportunities": [
                {"Id": "006A", "Name": "Acme", "StageName": "Discovery", "Primary_Product__c": "Navigator"},
                {"Id": "006B", "Name": "Acme 2", "StageName": "Discovery"}
            ]
        }));
        let input = build(&recs, &timeline(vec![]));
        assert!(input.opportunity.has_open_opportunity);
        assert_eq!(input.opportunity.open_opportunity_count, 2);
        assert_eq!(input.opportunity.stage_names, vec!["Discovery"]);
        let ctx = input.opportunity_context.unwrap();
        assert_eq!(ctx.open_opportunities.len(), 2);
        assert_eq!(ctx.open_opportunities[0].products, vec!["Navigator"]);
    }

    #[test]
    fn test_payload_has_no_internal_tokens() {
        let recs = records(json!({
            "lead": {"Id": "a0X000000000001AAA", "Lead_Source__c": "Email", "Product_Name__c": "Navigator"},
            "contact": {"Private_Sector_Non_Qual__c": false,
                        "HubSpot_Engagement_Score__c": 12,
                        "HubSpot_Engagement_Score_Threshold__c": 10},
            "account": {"Private_Sector_Non_Qual__c": false}
        }));
        let input = build(&recs, &timeline(vec![]));
        let text = input.to_compact_json().unwrap().to_string();
        assert!(!text.contains("__c"));
        assert!(!text.contains("HubSpot_"));
        assert!(!text.contains("a0X000000000001AAA"));
        assert!(!text.contains("12"));
    }
}
