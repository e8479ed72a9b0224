//! Timeline assembly: dedupe, window, cap and order
//!
//! ```text
//! events ─┬─ always tier ──dedupe──sort asc──per-type caps──────────────┐
//!         └─ optional tier ─dedupe──window──sort desc──greedy select────┴─▶ sort desc
//! ```
//!
//! The always tier (lifecycle milestones) ignores the recency window but is
//! still capped per type, oldest first. The optional tier keeps the most
//! recent events within the window, up to the per-type caps and the
//! optional ceiling. Ties keep input order.

use super::event::{Event, EventType};
use crate::config::TimelinePolicy;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Bounds on a request-level recency override, in days
pub const MIN_WINDOW_DAYS: u32 = 1;
pub const MAX_WINDOW_DAYS: u32 = 365;

/// Counts of events kept per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedCounts {
    pub always: usize,
    pub optional: usize,
    pub total: usize,
}

/// How a timeline was bounded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMetadata {
    pub policy_version: Option<String>,
    pub recency_window_days: u32,
    pub max_optional_events: usize,
    pub included_counts: IncludedCounts,
}

/// Final newest-first timeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    pub events: Vec<Event>,
    pub metadata: TimelineMetadata,
}

impl Timeline {
    /// Whether any event has the given type
    pub fn has_event_type(&self, event_type: EventType) -> bool {
        self.events.iter().any(|e| e.event_type == event_type)
    }
}

/// Assembles a bounded timeline from normalized events
pub struct TimelineAssembler<'a> {
    policy: &'a TimelinePolicy,
    window_days: u32,
}

impl<'a> TimelineAssembler<'a> {
    /// Create an assembler using the policy's recency window
    pub fn new(policy: &'a TimelinePolicy) -> Self {
        Self {
            policy,
            window_days: policy.defaults.recency_window_days,
        }
    }

    /// Override the recency window, clamped to 1..=365 days
    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days.clamp(MIN_WINDOW_DAYS, MAX_WINDOW_DAYS);
        self
    }

    /// Effective recency window in days
    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Build the timeline as of `now`
    pub fn assemble(&self, events: Vec<Event>, now: DateTime<Utc>) -> Timeline {
        let (always, optional): (Vec<Event>, Vec<Event>) =
            events.into_iter().partition(|e| e.event_type.is_always());

        let mut always = dedupe(always);
        always.sort_by_key(|e| e.occurred_at);
        let always = self.apply_caps(always);

        let window_start = now - Duration::days(i64::from(self.window_days));
        let mut candidates: Vec<Event> = dedupe(optional)
            .into_iter()
            .filter(|e| e.occurred_at >= window_start)
            .collect();
        candidates.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        let optional = self.select_optional(candidates);

        let counts = IncludedCounts {
            always: always.len(),
            optional: optional.len(),
            total: always.len() + optional.len(),
        };

        let mut events = always;
        events.extend(optional);
        events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        tracing::debug!(
            always = counts.always,
            optional = counts.optional,
            window_days = self.window_days,
            "Assembled timeline"
        );

        Timeline {
            events,
            metadata: TimelineMetadata {
                policy_version: self.policy.version.clone(),
                recency_window_days: self.window_days,
                max_optional_events: self.policy.defaults.max_events,
                included_counts: counts,
            },
        }
    }

    /// Keep events in order while each type stays under its cap
    fn apply_caps(&self, events: Vec<Event>) -> Vec<Event> {
        let mut counts: HashMap<EventType, usize> = HashMap::new();
        events
            .into_iter()
            .filter(|e| {
                let n = counts.entry(e.event_type).or_insert(0);
                if *n >= self.policy.cap_for(e.event_type) {
                    return false;
                }
                *n += 1;
                true
            })
            .collect()
    }

    /// Greedy newest-first selection under per-type caps and the ceiling
    fn select_optional(&self, candidates: Vec<Event>) -> Vec<Event> {
        let ceiling = self.policy.defaults.max_events;
        let mut counts: HashMap<EventType, usize> = HashMap::new();
        let mut selected = Vec::new();
        for event in candidates {
            if selected.len() >= ceiling {
                break;
            }
            let n = counts.entry(event.event_type).or_insert(0);
            if *n >= self.policy.cap_for(event.event_type) {
                continue;
            }
            *n += 1;
            selected.push(event);
        }
        selected
    }
}

/// Drop later events sharing (type, source record, minute) with an earlier one
fn dedupe(events: Vec<Event>) -> Vec<Event> {
    let mut seen: HashSet<(EventType, String, i64)> = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert((e.event_type, e.source_object_id.clone(), e.minute_bucket())))
        .collect()
}
