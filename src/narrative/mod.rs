//! Narrative input
//!
//! Turns the timeline, product interest and scoring fields into a compact,
//! business-language payload that is safe to hand to a text generator.
//!
//! ```text
//! Timeline ─┐
//! ProductInterest ─┼──▶ NarrativeBuilder ──▶ NarrativeInput ──▶ compact JSON
//! lead / contact / account ─┘
//! ```

pub mod builder;
pub mod compact;
pub mod input;
pub mod labels;

pub use builder::{opportunity_context, recent_engagement, NarrativeBuilder, MAX_RECENT_ENGAGEMENT};
pub use compact::compact_value;
pub use input::{
    EngagementItem, FitAssessment, IntentAssessment, NarrativeInput, OpportunityBrief,
    OpportunityContext, OpportunitySignals, ProductInterestItem, ProductInterestView, ScoreSignal,
    Strength,
};
pub use labels::{event_highlight, event_type_label};
