//! Canonical timeline event model
//!
//! Every source record that survives normalization becomes exactly one
//! [`Event`]. Events are immutable once built and live only for the
//! duration of one summary request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of engagement an event represents.
///
/// Serialized in camelCase. Legacy names from older policy documents are
/// accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    /// Lead record created (qualification milestone)
    #[serde(alias = "mqlCreated")]
    LeadCreated,
    /// Lead converted to an opportunity
    #[serde(alias = "mqlConverted")]
    LeadConverted,
    /// Lead marked not a fit / not ready
    #[serde(alias = "mqlRejected")]
    LeadRejected,
    /// Contact already sits on an open opportunity
    OpenOpportunityDetected,
    /// Opportunity moved between stages
    OpportunityStageChanged,
    /// Completed sales task
    TaskCompleted,
    /// Logged meeting
    MeetingLogged,
    /// Email message
    EmailEngagement,
    /// Marketing campaign membership
    CampaignTouch,
    /// Inbound request form submission
    #[serde(alias = "contactUsSubmitted")]
    InboundRequest,
}

impl EventType {
    /// All event types, in declaration order
    pub const ALL: [EventType; 10] = [
        EventType::LeadCreated,
        EventType::LeadConverted,
        EventType::LeadRejected,
        EventType::OpenOpportunityDetected,
        EventType::OpportunityStageChanged,
        EventType::TaskCompleted,
        EventType::MeetingLogged,
        EventType::EmailEngagement,
        EventType::CampaignTouch,
        EventType::InboundRequest,
    ];

    /// Lifecycle milestones exempt from the recency window.
    pub fn is_always(self) -> bool {
        matches!(
            self,
            EventType::LeadCreated
                | EventType::LeadConverted
                | EventType::LeadRejected
                | EventType::OpenOpportunityDetected
                | EventType::OpportunityStageChanged
        )
    }

    /// Wire name of the event type
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::LeadCreated => "leadCreated",
            EventType::LeadConverted => "leadConverted",
            EventType::LeadRejected => "leadRejected",
            EventType::OpenOpportunityDetected => "openOpportunityDetected",
            EventType::OpportunityStageChanged => "opportunityStageChanged",
            EventType::TaskCompleted => "taskCompleted",
            EventType::MeetingLogged => "meetingLogged",
            EventType::EmailEngagement => "emailEngagement",
            EventType::CampaignTouch => "campaignTouch",
            EventType::InboundRequest => "inboundRequest",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Importance tier of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    #[default]
    Low,
}

impl Importance {
    /// High and medium events count toward intent strength
    pub fn is_notable(self) -> bool {
        matches!(self, Importance::High | Importance::Medium)
    }
}

/// A normalized engagement event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// When the activity happened
    pub occurred_at: DateTime<Utc>,
    /// Originating system (e.g. `crm`, `marketing`)
    pub source_system: String,
    /// Originating object type
    pub source_object_type: String,
    /// Originating record identifier (internal, never rendered)
    pub source_object_id: String,
    /// Event type
    pub event_type: EventType,
    /// Short title
    pub title: String,
    /// Redacted, length-capped detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Importance tier
    pub importance: Importance,
}

impl Event {
    /// Minute bucket used for duplicate detection
    pub fn minute_bucket(&self) -> i64 {
        self.occurred_at.timestamp().div_euclid(60)
    }

    /// Duplicate-detection key: type, source record and minute
    pub fn dedupe_key(&self) -> (EventType, &str, i64) {
        (self.event_type, self.source_object_id.as_str(), self.minute_bucket())
    }
}
