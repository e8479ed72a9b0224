//! Business-language labels for timeline events

use crate::privacy::{redact_inline_text, scrub_identifiers};
use crate::timeline::{Event, EventType};

/// Plain-English label for an event type
pub fn event_type_label(event_type: EventType) -> &'static str {
    match event_type {
        EventType::InboundRequest => "Inbound request (Contact Us)",
        EventType::LeadCreated => "Marketing qualified lead created",
        EventType::LeadConverted => "Converted to opportunity",
        EventType::LeadRejected => "Marked not a fit / not ready",
        EventType::OpenOpportunityDetected => "Already associated with an open opportunity",
        EventType::OpportunityStageChanged => "Opportunity moved stages",
        EventType::MeetingLogged => "Meeting logged",
        EventType::TaskCompleted => "Sales activity completed",
        EventType::EmailEngagement => "Email activity",
        EventType::CampaignTouch => "Marketing touch",
    }
}

/// Engagement highlight: type label plus redacted detail.
///
/// Record-identifier-shaped tokens are scrubbed from the result.
pub fn event_highlight(event: &Event) -> String {
    let base = event_type_label(event.event_type);
    let detail = event
        .detail
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .and_then(redact_inline_text);
    let label = match detail {
        Some(detail) => format!("{} - {}", base, detail),
        None => base.to_string(),
    };
    scrub_identifiers(&label)
}
