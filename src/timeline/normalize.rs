//! Event normalization
//!
//! Turns loosely-typed source records into canonical [`Event`]s. Each source
//! has exactly one narrow mapping function; all shape-specific branching
//! stays inside it. A record without a derivable timestamp produces no event.
//!
//! Timestamp candidates are tried in a fixed priority order per source
//! (primary activity date first, creation date last). Bare calendar dates
//! are promoted to start-of-day UTC.

use super::event::{Event, EventType};
use super::opportunity::OpportunityIndex;
use super::schema::SourceCapabilities;
use super::sources::SourceRecords;
use crate::config::TimelinePolicy;
use crate::privacy::{normalize_snippet, redact_email_address};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Maximum characters kept in an event detail
pub const DETAIL_MAX_CHARS: usize = 280;

/// Object type names as declared by the source environments
pub mod objects {
    pub const LEAD: &str = "MQL__c";
    pub const LEAD_HISTORY: &str = "MQL__History";
    pub const CONTACT: &str = "Contact";
    pub const ACCOUNT: &str = "Account";
    pub const CONTACT_ROLE: &str = "OpportunityContactRole";
    pub const OPPORTUNITY: &str = "Opportunity";
    pub const LINE_ITEM: &str = "OpportunityLineItem";
    pub const OPPORTUNITY_HISTORY: &str = "OpportunityFieldHistory";
    pub const TASK: &str = "Task";
    pub const MEETING: &str = "Event";
    pub const EMAIL: &str = "EmailMessage";
    pub const CAMPAIGN_MEMBER: &str = "CampaignMember";
    pub const INBOUND_REQUEST: &str = "Contact_Us__c";
    pub const WEB_ACTIVITY: &str = "Sales_Lead__c";
    pub const MARKETING_PROFILE: &str = "MarketingProfile";
}

const CRM: &str = "crm";

/// Parse any supported timestamp form into an instant.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS.fff+0000`, warehouse
/// `YYYY-MM-DD HH:MM:SS[.fff]` (UTC), bare `YYYY-MM-DD` and epoch millis.
pub fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => parse_instant_str(s),
        _ => None,
    }
}

fn parse_instant_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

/// Capability-aware read access to one raw record.
///
/// Fields the environment does not declare read as absent, as do nulls and
/// blank strings. Dotted paths walk nested objects.
#[derive(Clone, Copy)]
pub struct Record<'a> {
    object_type: &'a str,
    value: &'a Value,
    caps: &'a SourceCapabilities,
}

impl<'a> Record<'a> {
    /// Wrap a raw record of the given object type
    pub fn new(object_type: &'a str, value: &'a Value, caps: &'a SourceCapabilities) -> Self {
        Self {
            object_type,
            value,
            caps,
        }
    }

    /// Whether the field is declared for this object in the environment
    pub fn declares(&self, field: &str) -> bool {
        self.caps.has_field(self.object_type, field)
    }

    /// Raw non-null value at a path
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        let top = path.split('.').next()?;
        if !self.declares(top) {
            return None;
        }
        let mut current = self.value;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        (!current.is_null()).then_some(current)
    }

    /// Trimmed, non-empty text (numbers are rendered as text)
    pub fn text(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Boolean flag; accepts `true`/`false` strings
    pub fn flag(&self, path: &str) -> Option<bool> {
        match self.get(path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    /// Numeric value; accepts numeric strings
    pub fn number(&self, path: &str) -> Option<f64> {
        match self.get(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// First parseable instant among the candidate fields
    pub fn instant(&self, paths: &[&str]) -> Option<DateTime<Utc>> {
        paths
            .iter()
            .find_map(|path| self.get(path).and_then(parse_instant))
    }

    /// Record identifier, or `unknown`
    pub fn id(&self) -> String {
        self.text("Id").unwrap_or_else(|| "unknown".to_string())
    }
}

/// Join non-empty parts, redact, collapse whitespace and cap.
fn finish_detail<I>(parts: I, separator: &str) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let joined = parts
        .into_iter()
        .flatten()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(separator);
    normalize_snippet(&joined, DETAIL_MAX_CHARS - 3)
}

/// Maps raw source records to canonical events
pub struct Normalizer<'a> {
    policy: &'a TimelinePolicy,
    caps: &'a SourceCapabilities,
}

impl<'a> Normalizer<'a> {
    /// Create a normalizer for one environment
    pub fn new(policy: &'a TimelinePolicy, caps: &'a SourceCapabilities) -> Self {
        Self { policy, caps }
    }

    /// Normalize every source in the bundle
    pub fn normalize(&self, records: &SourceRecords, opportunities: &OpportunityIndex) -> Vec<Event> {
        let mut events = Vec::new();
        if let Some(lead) = &records.lead {
            events.extend(self.lead_events(lead, &records.lead_history));
        }
        events.extend(self.open_opportunity_events(&records.opportunity_contact_roles, opportunities));
        events.extend(self.stage_change_events(&records.opportunity_history));
        events.extend(self.task_events(&records.tasks, opportunities));
        events.extend(self.meeting_events(&records.meetings, opportunities));
        events.extend(self.email_events(&records.emails, opportunities));
        events.extend(self.campaign_events(&records.campaign_members));
        events.extend(self.inbound_events(&records.inbound_requests));

        tracing::debug!(events = events.len(), "Normalized source records");
        events
    }

    fn record<'r>(&'r self, object_type: &'r str, value: &'r Value) -> Record<'r> {
        Record::new(object_type, value, self.caps)
    }

    fn event(
        &self,
        occurred_at: DateTime<Utc>,
        record: &Record<'_>,
        event_type: EventType,
        title: &str,
        detail: Option<String>,
    ) -> Event {
        Event {
            occurred_at,
            source_system: CRM.to_string(),
            source_object_type: record.object_type.to_string(),
            source_object_id: record.id(),
            event_type,
            title: title.to_string(),
            detail,
            importance: self.policy.importance_for(event_type),
        }
    }

    /// Lead created / converted / rejected milestones
    pub fn lead_events(&self, lead: &Value, history: &[Value]) -> Vec<Event> {
        let record = self.record(objects::LEAD, lead);
        if record.text("Id").is_none() {
            return Vec::new();
        }
        let mut out = Vec::new();

        let created_at = record.instant(&["MQL_Date__c", "CreatedDate"]);
        if let Some(at) = created_at {
            let product = record.text("Product_Name__c").or_else(|| record.text("Product__c"));
            let detail = finish_detail([record.text("Lead_Source__c"), product], " | ");
            out.push(self.event(at, &record, EventType::LeadCreated, "Lead created", detail));
        }

        let status = record.text("MQL_Status__c").unwrap_or_default();
        if status.eq_ignore_ascii_case("converted") {
            let at = record
                .instant(&["Conversion_Date__c", "LastModifiedDate"])
                .or(created_at);
            if let Some(at) = at {
                let detail = finish_detail([record.text("Conversion_Type__c")], " | ");
                out.push(self.event(at, &record, EventType::LeadConverted, "Lead converted", detail));
            }
        } else if status.eq_ignore_ascii_case("rejected") {
            let rejected_in_history = history
                .iter()
                .map(|row| self.record(objects::LEAD_HISTORY, row))
                .filter(|row| {
                    row.text("Field").as_deref() == Some("MQL_Status__c")
                        && row.text("NewValue").as_deref() == Some("Rejected")
                })
                .filter_map(|row| row.instant(&["CreatedDate"]))
                .max();
            let at = rejected_in_history
                .or_else(|| record.instant(&["LastModifiedDate"]))
                .or(created_at);
            if let Some(at) = at {
                out.push(self.event(at, &record, EventType::LeadRejected, "Lead rejected", None));
            }
        }

        out
    }

    /// Contact roles flagged as sitting on an open opportunity
    pub fn open_opportunity_events(
        &self,
        roles: &[Value],
        opportunities: &OpportunityIndex,
    ) -> Vec<Event> {
        roles
            .iter()
            .filter_map(|raw| {
                let record = self.record(objects::CONTACT_ROLE, raw);
                if record.flag("Open_Opportunity__c") != Some(true) {
                    return None;
                }
                let opp_id = record.text("OpportunityId");
                let opp = opp_id.as_deref().and_then(|id| opportunities.get(id));
                let at = record
                    .instant(&["CreatedDate"])
                    .or_else(|| opp.and_then(|o| o.created_at))?;
                let detail = opp.and_then(|o| {
                    finish_detail(
                        [
                            o.name.clone(),
                            o.stage.clone(),
                            opportunities
                                .products_label(&o.id)
                                .map(|p| format!("Products: {}", p)),
                        ],
                        " | ",
                    )
                });
                Some(self.event(
                    at,
                    &record,
                    EventType::OpenOpportunityDetected,
                    "Open opportunity detected",
                    detail,
                ))
            })
            .collect()
    }

    /// Opportunity stage-history rows
    pub fn stage_change_events(&self, history: &[Value]) -> Vec<Event> {
        history
            .iter()
            .filter_map(|raw| {
                let record = self.record(objects::OPPORTUNITY_HISTORY, raw);
                if record.text("Field").as_deref() != Some("StageName") {
                    return None;
                }
                let at = record.instant(&["CreatedDate"])?;
                let detail = match (record.text("OldValue"), record.text("NewValue")) {
                    (Some(old), Some(new)) => Some(format!("{} -> {}", old, new)),
                    (None, Some(new)) => Some(format!("-> {}", new)),
                    (Some(old), None) => Some(format!("{} ->", old)),
                    (None, None) => None,
                };
                let mut event = self.event(
                    at,
                    &record,
                    EventType::OpportunityStageChanged,
                    "Opportunity stage changed",
                    finish_detail([detail], " "),
                );
                event.source_object_type = objects::OPPORTUNITY.to_string();
                event.source_object_id = record
                    .text("OpportunityId")
                    .unwrap_or_else(|| "unknown".to_string());
                Some(event)
            })
            .collect()
    }

    /// Completed tasks
    pub fn task_events(&self, tasks: &[Value], opportunities: &OpportunityIndex) -> Vec<Event> {
        tasks
            .iter()
            .filter_map(|raw| {
                let record = self.record(objects::TASK, raw);
                let status = record.text("Status")?;
                if !status.eq_ignore_ascii_case("completed") {
                    return None;
                }
                let at = record.instant(&["ActivityDate", "CreatedDate"])?;
                let detail = self.activity_detail(&record, &["WhatId"], opportunities);
                Some(self.event(at, &record, EventType::TaskCompleted, "Task completed", detail))
            })
            .collect()
    }

    /// Logged meetings
    pub fn meeting_events(&self, meetings: &[Value], opportunities: &OpportunityIndex) -> Vec<Event> {
        meetings
            .iter()
            .filter_map(|raw| {
                let record = self.record(objects::MEETING, raw);
                let at = record.instant(&["StartDateTime", "ActivityDate", "CreatedDate"])?;
                let detail = self.activity_detail(&record, &["WhatId"], opportunities);
                Some(self.event(at, &record, EventType::MeetingLogged, "Meeting logged", detail))
            })
            .collect()
    }

    /// Subject, description snippet and linked-opportunity context, ` - ` joined
    fn activity_detail(
        &self,
        record: &Record<'_>,
        link_fields: &[&str],
        opportunities: &OpportunityIndex,
    ) -> Option<String> {
        let description = record
            .text("Description")
            .and_then(|d| normalize_snippet(&d, 140));
        let context = self
            .linked_opportunity(record, link_fields, opportunities)
            .map(|ctx| format!("Opportunity: {}", ctx));
        finish_detail([record.text("Subject"), description, context], " - ")
    }

    fn linked_opportunity(
        &self,
        record: &Record<'_>,
        link_fields: &[&str],
        opportunities: &OpportunityIndex,
    ) -> Option<String> {
        let candidates: Vec<Option<String>> = link_fields.iter().map(|f| record.text(f)).collect();
        let linked = opportunities.linked(candidates.iter().map(|c| c.as_deref()))?;
        opportunities.context_label(&linked.id)
    }

    /// Email messages (metadata plus a redacted snippet)
    pub fn email_events(&self, emails: &[Value], opportunities: &OpportunityIndex) -> Vec<Event> {
        emails
            .iter()
            .filter_map(|raw| {
                let record = self.record(objects::EMAIL, raw);
                let at = record.instant(&["MessageDate", "CreatedDate"])?;
                let snippet = record
                    .text("TextBody")
                    .and_then(|body| normalize_snippet(&body, 160))
                    .map(|s| format!("Snippet: {}", s));
                let direction = record
                    .flag("Incoming")
                    .map(|incoming| (if incoming { "incoming" } else { "outgoing" }).to_string());
                let sender = record
                    .text("FromAddress")
                    .and_then(|addr| redact_email_address(&addr))
                    .map(|addr| format!("From: {}", addr));
                let context = self
                    .linked_opportunity(&record, &["RelatedToId", "ParentId"], opportunities)
                    .map(|ctx| format!("Opportunity: {}", ctx));
                let detail = finish_detail(
                    [record.text("Subject"), snippet, direction, sender, context],
                    " | ",
                );
                Some(self.event(at, &record, EventType::EmailEngagement, "Email", detail))
            })
            .collect()
    }

    /// Campaign memberships
    pub fn campaign_events(&self, members: &[Value]) -> Vec<Event> {
        members
            .iter()
            .filter_map(|raw| {
                let record = self.record(objects::CAMPAIGN_MEMBER, raw);
                let at = record.instant(&["FirstRespondedDate", "CreatedDate"])?;
                let responded = (record.flag("HasResponded") == Some(true))
                    .then(|| "responded".to_string());
                let detail = finish_detail(
                    [record.text("Campaign.Name"), record.text("Status"), responded],
                    " | ",
                );
                Some(self.event(at, &record, EventType::CampaignTouch, "Campaign touch", detail))
            })
            .collect()
    }

    /// Inbound request form submissions
    pub fn inbound_events(&self, submissions: &[Value]) -> Vec<Event> {
        submissions
            .iter()
            .filter_map(|raw| {
                let record = self.record(objects::INBOUND_REQUEST, raw);
                let at = record.instant(&["CreatedDate"])?;
                let detail =
                    finish_detail([record.text("Topic__c"), record.text("Source__c")], " | ");
                Some(self.event(
                    at,
                    &record,
                    EventType::InboundRequest,
                    "Inbound request submitted",
                    detail,
                ))
            })
            .collect()
    }
}
