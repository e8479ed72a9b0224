//! Summary engine
//!
//! Per-request orchestration of the whole pipeline:
//!
//! ```text
//! providers ──fan-out──▶ SourceRecords
//!     ├─▶ Normalizer ──▶ TimelineAssembler ──▶ Timeline ─────────┐
//!     ├─▶ EvidenceExtractor ──▶ ProductInterestEngine ───────────┼─▶ NarrativeBuilder
//!     └─▶ related record links                                   │        │
//!                                                                ▼        ▼
//!                                         SummaryRenderer (generator | deterministic)
//!                                                                │
//!                                                      SummaryOutcome + SummaryMeta
//! ```
//!
//! No state survives a request; the engine itself only holds configuration,
//! compiled rules and the optional generator.

use crate::config::LeadPulseConfig;
use crate::interest::{EvidenceExtractor, ProductInterest, ProductInterestEngine};
use crate::narrative::{NarrativeBuilder, NarrativeInput};
use crate::privacy::scrub_identifiers;
use crate::summary::{
    related_record_links, render_links, ChatCompletionsGenerator, GeneratorOutcome, OutputGuard,
    RenderPath, SummaryGenerator, SummaryRenderer,
};
use crate::timeline::{
    fetch_all, Normalizer, OpportunityIndex, SourceCapabilities, SourceProvider, SourceQuery,
    SourceRecords, SourceReport, Timeline, TimelineAssembler, TimelineMetadata,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Input for one summary run
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub records: SourceRecords,
    pub capabilities: SourceCapabilities,
    /// Recency-window override in days (clamped to 1..=365)
    pub since_days: Option<u32>,
    /// Reference instant for every recency comparison
    pub now: DateTime<Utc>,
    /// Fetch reports carried into the outcome metadata
    pub source_reports: Vec<SourceReport>,
}

impl SummaryRequest {
    pub fn new(records: SourceRecords, now: DateTime<Utc>) -> Self {
        Self {
            records,
            capabilities: SourceCapabilities::unrestricted(),
            since_days: None,
            now,
            source_reports: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_since_days(mut self, days: u32) -> Self {
        self.since_days = Some(days);
        self
    }

    pub fn with_source_reports(mut self, reports: Vec<SourceReport>) -> Self {
        self.source_reports = reports;
        self
    }
}

/// Degradation and provenance details for one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMeta {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub path: RenderPath,
    pub generator: GeneratorOutcome,
    pub timeline: TimelineMetadata,
    pub sources: Vec<SourceReport>,
    pub evidence_count: usize,
    pub rules_loaded: usize,
    pub skipped_rules: Vec<String>,
    pub link_count: usize,
}

/// Final result of a summary run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOutcome {
    pub summary_html: String,
    pub narrative: NarrativeInput,
    pub product_interest: ProductInterest,
    pub timeline: Timeline,
    pub meta: SummaryMeta,
}

/// Engagement-summary engine
pub struct SummaryEngine {
    config: LeadPulseConfig,
    interest: ProductInterestEngine,
    renderer: SummaryRenderer,
}

impl SummaryEngine {
    /// Build the engine; the generator comes from configuration when an
    /// API key is available
    pub fn new(config: LeadPulseConfig) -> Self {
        let generator: Option<Arc<dyn SummaryGenerator>> =
            match ChatCompletionsGenerator::from_config(&config.generator) {
                Ok(Some(g)) => Some(Arc::new(g)),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Generator unavailable; using deterministic summaries");
                    None
                }
            };
        Self::with_generator(config, generator)
    }

    /// Build the engine with an explicit generator (or none)
    pub fn with_generator(
        config: LeadPulseConfig,
        generator: Option<Arc<dyn SummaryGenerator>>,
    ) -> Self {
        let interest = ProductInterestEngine::new(&config.product_interest);
        let renderer = SummaryRenderer::new(
            OutputGuard::new(&config.render),
            generator,
            Duration::from_millis(config.generator.timeout_ms),
        );
        tracing::debug!(
            rules = interest.rule_count(),
            skipped = interest.skipped_rules().len(),
            generator = renderer.has_generator(),
            "Summary engine ready"
        );
        Self {
            config,
            interest,
            renderer,
        }
    }

    pub fn config(&self) -> &LeadPulseConfig {
        &self.config
    }

    pub fn guard(&self) -> &OutputGuard {
        self.renderer.guard()
    }

    /// Fetch every source concurrently with the configured per-fetch timeout
    pub async fn collect(
        &self,
        providers: &[Arc<dyn SourceProvider>],
        query: &SourceQuery,
    ) -> (SourceRecords, Vec<SourceReport>) {
        let timeout = Duration::from_millis(self.config.sources.fetch_timeout_ms);
        fetch_all(providers, query, timeout).await
    }

    /// Collect then summarize
    pub async fn run(
        &self,
        providers: &[Arc<dyn SourceProvider>],
        query: &SourceQuery,
        capabilities: SourceCapabilities,
        now: DateTime<Utc>,
    ) -> SummaryOutcome {
        let (records, reports) = self.collect(providers, query).await;
        let since_days = query
            .since_days
            .filter(|days| *days > 0)
            .unwrap_or(self.config.sources.default_since_days);
        let request = SummaryRequest::new(records, now)
            .with_capabilities(capabilities)
            .with_since_days(since_days)
            .with_source_reports(reports);
        self.summarize(request).await
    }

    /// Build the timeline, infer interest, compact the narrative and render
    pub async fn summarize(&self, request: SummaryRequest) -> SummaryOutcome {
        let SummaryRequest {
            records,
            capabilities: caps,
            since_days,
            now,
            source_reports,
        } = request;

        let opportunities =
            OpportunityIndex::build(&records.opportunities, &records.opportunity_line_items, &caps);

        let events = Normalizer::new(&self.config.timeline, &caps).normalize(&records, &opportunities);
        let mut assembler = TimelineAssembler::new(&self.config.timeline);
        if let Some(days) = since_days {
            assembler = assembler.with_window_days(days);
        }
        let timeline = assembler.assemble(events, now);

        let evidence = EvidenceExtractor::new(&caps).extract(&records);
        let product_interest = self.interest.infer(&evidence);

        let narrative = NarrativeBuilder::new(&records, &caps, now).build(
            &timeline,
            &product_interest,
            &opportunities,
        );

        let links = related_record_links(
            self.config.render.instance_url.as_deref(),
            &records,
            &caps,
            &opportunities,
        );
        let guard = self.renderer.guard();
        let links_html = render_links(&links, |label| guard.scrub_text(&scrub_identifiers(label)));

        let rendered = self.renderer.render(&narrative, links_html.as_deref()).await;

        tracing::info!(
            events = timeline.events.len(),
            evidence = evidence.len(),
            products = product_interest.top_products.len(),
            path = ?rendered.path,
            "Summary generated"
        );

        let meta = SummaryMeta {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            path: rendered.path,
            generator: rendered.outcome,
            timeline: timeline.metadata.clone(),
            sources: source_reports,
            evidence_count: evidence.len(),
            rules_loaded: self.interest.rule_count(),
            skipped_rules: self.interest.skipped_rules().to_vec(),
            link_count: links.len(),
        };

        SummaryOutcome {
            summary_html: rendered.html,
            narrative,
            product_interest,
            timeline,
            meta,
        }
    }
}
