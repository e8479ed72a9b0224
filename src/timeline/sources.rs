//! Source-record providers and concurrent fan-out
//!
//! Each timeline source (lead record, tasks, emails, campaign memberships,
//! web activity, ...) is fetched by its own [`SourceProvider`]. All providers
//! for a subject are issued concurrently and awaited together; a provider
//! that fails or exceeds its timeout contributes nothing and is recorded in
//! the [`SourceReport`] instead of failing the request.
//!
//! ```text
//! providers ──join_all──▶ [timeout(fetch)] ──▶ SourceRecords + Vec<SourceReport>
//! ```

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timeline source kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Lead,
    LeadHistory,
    Contact,
    Account,
    OpportunityContactRoles,
    Opportunities,
    OpportunityLineItems,
    OpportunityHistory,
    Tasks,
    Meetings,
    Emails,
    CampaignMembers,
    InboundRequests,
    WebActivity,
    MarketingProfile,
}

impl SourceKind {
    /// Kinds that carry a single record rather than a list
    pub fn is_single(self) -> bool {
        matches!(
            self,
            SourceKind::Lead | SourceKind::Contact | SourceKind::Account | SourceKind::MarketingProfile
        )
    }
}

/// Identifies the subject whose records are being fetched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceQuery {
    /// Lead record identifier
    pub lead_id: String,
    /// Contact identifier, when known
    #[serde(default)]
    pub contact_id: Option<String>,
    /// Account identifier, when known
    #[serde(default)]
    pub account_id: Option<String>,
    /// Activity lookback in days; unset or zero means the configured default
    #[serde(default)]
    pub since_days: Option<u32>,
}

/// Provider of raw records for one timeline source.
///
/// Implementations wrap a CRM query, a marketing-platform lookup or a
/// warehouse query. Records are returned as loosely-typed JSON; shape
/// handling is the normalizer's job.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Which source this provider feeds
    fn kind(&self) -> SourceKind;

    /// Fetch raw records for the subject
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<Value>>;
}

/// Provider backed by records already in memory
#[derive(Debug, Clone)]
pub struct StaticSource {
    kind: SourceKind,
    records: Vec<Value>,
}

impl StaticSource {
    /// Create a provider that always returns the given records
    pub fn new(kind: SourceKind, records: Vec<Value>) -> Self {
        Self { kind, records }
    }
}

#[async_trait]
impl SourceProvider for StaticSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<Value>> {
        Ok(self.records.clone())
    }
}

/// Raw records for one subject, grouped by source.
///
/// Any source may be absent; absent sources are simply empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceRecords {
    pub lead: Option<Value>,
    pub lead_history: Vec<Value>,
    pub contact: Option<Value>,
    pub account: Option<Value>,
    pub opportunity_contact_roles: Vec<Value>,
    pub opportunities: Vec<Value>,
    pub opportunity_line_items: Vec<Value>,
    pub opportunity_history: Vec<Value>,
    pub tasks: Vec<Value>,
    pub meetings: Vec<Value>,
    pub emails: Vec<Value>,
    pub campaign_members: Vec<Value>,
    pub inbound_requests: Vec<Value>,
    pub web_activity: Vec<Value>,
    pub marketing_profile: Option<Value>,
}

impl SourceRecords {
    /// Store fetched records under their source kind.
    ///
    /// Single-record sources keep the first non-null record.
    pub fn insert(&mut self, kind: SourceKind, records: Vec<Value>) {
        if kind.is_single() {
            let first = records.into_iter().find(|r| !r.is_null());
            match kind {
                SourceKind::Lead => self.lead = first,
                SourceKind::Contact => self.contact = first,
                SourceKind::Account => self.account = first,
                _ => self.marketing_profile = first,
            }
            return;
        }
        let slot = match kind {
            SourceKind::LeadHistory => &mut self.lead_history,
            SourceKind::OpportunityContactRoles => &mut self.opportunity_contact_roles,
            SourceKind::Opportunities => &mut self.opportunities,
            SourceKind::OpportunityLineItems => &mut self.opportunity_line_items,
            SourceKind::OpportunityHistory => &mut self.opportunity_history,
            SourceKind::Tasks => &mut self.tasks,
            SourceKind::Meetings => &mut self.meetings,
            SourceKind::Emails => &mut self.emails,
            SourceKind::CampaignMembers => &mut self.campaign_members,
            SourceKind::InboundRequests => &mut self.inbound_requests,
            _ => &mut self.web_activity,
        };
        slot.extend(records.into_iter().filter(|r| !r.is_null()));
    }

    /// Split the bundle into one in-memory provider per non-empty source
    pub fn into_providers(self) -> Vec<Arc<dyn SourceProvider>> {
        let singles = [
            (SourceKind::Lead, self.lead),
            (SourceKind::Contact, self.contact),
            (SourceKind::Account, self.account),
            (SourceKind::MarketingProfile, self.marketing_profile),
        ];
        let lists = [
            (SourceKind::LeadHistory, self.lead_history),
            (SourceKind::OpportunityContactRoles, self.opportunity_contact_roles),
            (SourceKind::Opportunities, self.opportunities),
            (SourceKind::OpportunityLineItems, self.opportunity_line_items),
            (SourceKind::OpportunityHistory, self.opportunity_history),
            (SourceKind::Tasks, self.tasks),
            (SourceKind::Meetings, self.meetings),
            (SourceKind::Emails, self.emails),
            (SourceKind::CampaignMembers, self.campaign_members),
            (SourceKind::InboundRequests, self.inbound_requests),
            (SourceKind::WebActivity, self.web_activity),
        ];

        let mut providers: Vec<Arc<dyn SourceProvider>> = Vec::new();
        for (kind, record) in singles {
            if let Some(record) = record {
                providers.push(Arc::new(StaticSource::new(kind, vec![record])));
            }
        }
        for (kind, records) in lists {
            if !records.is_empty() {
                providers.push(Arc::new(StaticSource::new(kind, records)));
            }
        }
        providers
    }
}

/// Outcome of a single source fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum FetchStatus {
    /// Fetched the given number of records
    Ok { records: usize },
    /// Provider returned an error
    Failed { error: String },
    /// Provider exceeded its time budget
    TimedOut,
}

/// Per-source fetch report, kept in the outcome metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: SourceKind,
    #[serde(flatten)]
    pub status: FetchStatus,
    pub elapsed_ms: u64,
}

impl SourceReport {
    /// Whether the source contributed nothing because of a failure
    pub fn is_degraded(&self) -> bool {
        !matches!(self.status, FetchStatus::Ok { .. })
    }
}

/// Fetch every source concurrently, each under its own timeout.
///
/// Failures and timeouts become empty contributions plus a report entry.
pub async fn fetch_all(
    providers: &[Arc<dyn SourceProvider>],
    query: &SourceQuery,
    per_fetch_timeout: Duration,
) -> (SourceRecords, Vec<SourceReport>) {
    let fetches = providers.iter().map(|provider| {
        let provider = Arc::clone(provider);
        async move {
            let started = Instant::now();
            let result = tokio::time::timeout(per_fetch_timeout, provider.fetch(query)).await;
            (provider.kind(), result, started.elapsed())
        }
    });

    let results = futures::future::join_all(fetches).await;

    let mut records = SourceRecords::default();
    let mut reports = Vec::with_capacity(results.len());
    for (kind, result, elapsed) in results {
        let status = match result {
            Ok(Ok(rows)) => {
                let count = rows.len();
                records.insert(kind, rows);
                FetchStatus::Ok { records: count }
            }
            Ok(Err(e)) => {
                tracing::warn!(source = ?kind, error = %e, "Source fetch failed; continuing without it");
                FetchStatus::Failed {
                    error: e.to_string(),
                }
            }
            Err(_) => {
                tracing::warn!(source = ?kind, "Source fetch timed out; continuing without it");
                FetchStatus::TimedOut
            }
        };
        reports.push(SourceReport {
            source: kind,
            status,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    tracing::debug!(
        sources = reports.len(),
        degraded = reports.iter().filter(|r| r.is_degraded()).count(),
        "Source fan-out complete"
    );

    (records, reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    struct FailingSource;

    #[async_trait]
    impl SourceProvider for FailingSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Emails
        }

        async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<Value>> {
            Err(Error::Source("query rejected".to_string()))
        }
    }

    struct SlowSource;

    #[async_trait]
    impl SourceProvider for SlowSource {
        fn kind(&self) -> SourceKind {
            SourceKind::WebActivity
        }

        async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<Value>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![json!({"summary": "late"})])
        }
    }

    fn query() -> SourceQuery {
        SourceQuery {
            lead_id: "L1".to_string(),
            since_days: Some(90),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_all_collects_records() {
        let providers: Vec<Arc<dyn SourceProvider>> = vec![
            Arc::new(StaticSource::new(SourceKind::Lead, vec![json!({"Id": "L1"})])),
            Arc::new(StaticSource::new(
                SourceKind::Tasks,
                vec![json!({"Id": "T1"}), json!({"Id": "T2"})],
            )),
        ];
        let (records, reports) = fetch_all(&providers, &query(), Duration::from_secs(1)).await;
        assert_eq!(records.lead.unwrap()["Id"], "L1");
        assert_eq!(records.tasks.len(), 2);
        assert!(reports.iter().all(|r| !r.is_degraded()));
    }

    #[tokio::test]
    async fn test_failed_and_slow_sources_degrade_to_empty() {
        let providers: Vec<Arc<dyn SourceProvider>> = vec![
            Arc::new(FailingSource),
            Arc::new(SlowSource),
            Arc::new(StaticSource::new(SourceKind::Meetings, vec![json!({"Id": "E1"})])),
        ];
        let (records, reports) =
            fetch_all(&providers, &query(), Duration::from_millis(50)).await;

        assert!(records.emails.is_empty());
        assert!(records.web_activity.is_empty());
        assert_eq!(records.meetings.len(), 1);

        assert!(matches!(reports[0].status, FetchStatus::Failed { .. }));
        assert_eq!(reports[1].status, FetchStatus::TimedOut);
        assert_eq!(reports[2].status, FetchStatus::Ok { records: 1 });
    }

    #[test]
    fn test_bundle_roundtrips_through_providers() {
        let bundle: SourceRecords = serde_json::from_value(json!({
            "lead": {"Id": "L1"},
            "tasks": [{"Id": "T1"}],
            "webActivity": [{"summary": "x"}]
        }))
        .unwrap();
        let providers = bundle.into_providers();
        let kinds: Vec<_> = providers.iter().map(|p| p.kind()).collect();
        assert_eq!(
            kinds,
            vec![SourceKind::Lead, SourceKind::Tasks, SourceKind::WebActivity]
        );
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = SourceReport {
            source: SourceKind::Emails,
            status: FetchStatus::Failed {
                error: "boom".to_string(),
            },
            elapsed_ms: 3,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["source"], "emails");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
    }
}
