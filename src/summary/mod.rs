//! Sales summary rendering
//!
//! ```text
//! NoGenerator ─────────────────────────────────────▶ Deterministic
//! GeneratorConfigured ──▶ Attempt ──┬─▶ Accepted
//!                                   └─▶ Rejected / Failed / TimedOut ──▶ Deterministic
//! ```
//!
//! Both paths end in [`OutputGuard::finalize`]; the links section is
//! appended only there, after the body has been sanitized and capped.

pub mod generator;
pub mod guard;
pub mod html;
pub mod links;
pub mod render;

pub use generator::{build_prompt, ChatCompletionsGenerator, PromptPair, SummaryGenerator};
pub use guard::{
    enforce_section_caps, strip_code_fences, truncate_html, OutputGuard, RejectionReason,
    SectionHeading, Validation, TRUNCATION_NOTICE,
};
pub use html::{escape_html, is_safe_href, sanitize_html};
pub use links::{is_record_id, record_url, related_record_links, render_links, RecordLink};
pub use render::{DeterministicRenderer, EMPTY_SECTION_BULLET};

use crate::narrative::NarrativeInput;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Which path produced the final HTML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPath {
    Deterministic,
    Generated,
}

/// What happened to the generator attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GeneratorOutcome {
    /// No generator configured; deterministic output is the designed default
    Unconfigured,
    Accepted { provider: String },
    Rejected {
        provider: String,
        reasons: Vec<RejectionReason>,
    },
    Failed { provider: String, error: String },
    TimedOut { provider: String },
}

/// Rendered summary with its provenance
#[derive(Debug, Clone)]
pub struct RenderedSummary {
    pub html: String,
    pub path: RenderPath,
    pub outcome: GeneratorOutcome,
}

/// Runs the generator (when configured) and falls back to the
/// deterministic renderer on any failure
pub struct SummaryRenderer {
    guard: OutputGuard,
    generator: Option<Arc<dyn SummaryGenerator>>,
    timeout: Duration,
}

impl SummaryRenderer {
    pub fn new(
        guard: OutputGuard,
        generator: Option<Arc<dyn SummaryGenerator>>,
        timeout: Duration,
    ) -> Self {
        Self {
            guard,
            generator,
            timeout,
        }
    }

    pub fn guard(&self) -> &OutputGuard {
        &self.guard
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Deterministic summary, finalized with links.
    ///
    /// When the storage ceiling cuts into the mandatory sections, the
    /// placeholder summary is returned instead.
    pub fn deterministic(&self, input: &NarrativeInput, links: Option<&str>) -> String {
        let renderer = DeterministicRenderer::new(&self.guard);
        let html = self.guard.finalize(&renderer.render(input), links);
        let validation = self.guard.validate(&html);
        if validation.ok {
            return html;
        }
        tracing::warn!(
            reasons = ?validation.reasons,
            chars = html.chars().count(),
            "Deterministic summary failed validation; using placeholder sections"
        );
        self.guard.finalize(&renderer.placeholder(), None)
    }

    /// Produce the final summary for a narrative input
    pub async fn render(&self, input: &NarrativeInput, links: Option<&str>) -> RenderedSummary {
        let deterministic = self.deterministic(input, links);
        let Some(generator) = &self.generator else {
            return RenderedSummary {
                html: deterministic,
                path: RenderPath::Deterministic,
                outcome: GeneratorOutcome::Unconfigured,
            };
        };
        let provider = generator.name().to_string();

        let outcome = match build_prompt(input) {
            Err(e) => GeneratorOutcome::Failed {
                provider,
                error: e.to_string(),
            },
            Ok(prompt) => {
                match tokio::time::timeout(self.timeout, generator.generate(&prompt)).await {
                    Err(_) => GeneratorOutcome::TimedOut { provider },
                    Ok(Err(e)) => GeneratorOutcome::Failed {
                        provider,
                        error: e.to_string(),
                    },
                    Ok(Ok(raw)) => {
                        let cleaned = strip_code_fences(&raw);
                        let finalized = if cleaned.is_empty() {
                            String::new()
                        } else {
                            self.guard.finalize(&cleaned, links)
                        };
                        let validation = self.guard.validate(&finalized);
                        if validation.ok {
                            tracing::debug!(provider = %provider, chars = finalized.len(), "Generated summary accepted");
                            return RenderedSummary {
                                html: finalized,
                                path: RenderPath::Generated,
                                outcome: GeneratorOutcome::Accepted { provider },
                            };
                        }
                        GeneratorOutcome::Rejected {
                            provider,
                            reasons: validation.reasons,
                        }
                    }
                }
            }
        };

        tracing::warn!(outcome = ?outcome, "Generated summary not used; falling back to deterministic");
        RenderedSummary {
            html: deterministic,
            path: RenderPath::Deterministic,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::error::{Error, Result};
    use crate::narrative::EngagementItem;
    use async_trait::async_trait;

    struct FixedGenerator(String);

    #[async_trait]
    impl SummaryGenerator for FixedGenerator {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &PromptPair) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl SummaryGenerator for FailingGenerator {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &PromptPair) -> Result<String> {
            Err(Error::Generator("upstream 500".to_string()))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl SummaryGenerator for SlowGenerator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &PromptPair) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    fn renderer(generator: Option<Arc<dyn SummaryGenerator>>) -> SummaryRenderer {
        SummaryRenderer::new(
            OutputGuard::new(&RenderConfig::default()),
            generator,
            Duration::from_millis(50),
        )
    }

    fn valid_generated() -> String {
        let body: Vec<String> = SectionHeading::ALL
            .iter()
            .map(|h| format!("{}<ul><li>Generated point</li></ul>", h.marker()))
            .collect();
        format!("```html\n{}\n```", body.join("\n"))
    }

    #[tokio::test]
    async fn test_no_generator_is_deterministic() {
        let r = renderer(None);
        let out = r.render(&NarrativeInput::default(), None).await;
        assert_eq!(out.path, RenderPath::Deterministic);
        assert_eq!(out.outcome, GeneratorOutcome::Unconfigured);
        assert!(r.guard().validate(&out.html).ok);
    }

    #[tokio::test]
    async fn test_valid_generated_output_accepted() {
        let r = renderer(Some(Arc::new(FixedGenerator(valid_generated()))));
        let out = r.render(&NarrativeInput::default(), None).await;
        assert_eq!(out.path, RenderPath::Generated);
        assert!(out.html.starts_with("<p><strong>Why Sales Should Care</strong></p>"));
        assert!(out.html.contains("Generated point"));
    }

    #[tokio::test]
    async fn test_leaking_output_falls_back() {
        let leaking = valid_generated().replace("Generated point", "Score from Lead_Score__c");
        let r = renderer(Some(Arc::new(FixedGenerator(leaking))));
        let input = NarrativeInput::default();
        let out = r.render(&input, None).await;
        assert_eq!(out.path, RenderPath::Deterministic);
        assert_eq!(out.html, r.deterministic(&input, None));
        match out.outcome {
            GeneratorOutcome::Rejected { reasons, .. } => {
                assert_eq!(reasons, vec![RejectionReason::FieldOrIdLeak])
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_heading_falls_back() {
        let partial = "<p><strong>Why Sales Should Care</strong></p><ul><li>x</li></ul>";
        let r = renderer(Some(Arc::new(FixedGenerator(partial.to_string()))));
        let out = r.render(&NarrativeInput::default(), None).await;
        assert_eq!(out.path, RenderPath::Deterministic);
        assert!(matches!(out.outcome, GeneratorOutcome::Rejected { ref reasons, .. } if reasons.len() == 3));
    }

    #[tokio::test]
    async fn test_empty_output_rejected() {
        let r = renderer(Some(Arc::new(FixedGenerator("```\n```".to_string()))));
        let out = r.render(&NarrativeInput::default(), None).await;
        match out.outcome {
            GeneratorOutcome::Rejected { reasons, .. } => {
                assert_eq!(reasons[0], RejectionReason::EmptyHtml)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_and_timeout_fall_back() {
        let failing = renderer(Some(Arc::new(FailingGenerator)));
        let out = failing.render(&NarrativeInput::default(), None).await;
        assert!(matches!(out.outcome, GeneratorOutcome::Failed { .. }));
        assert_eq!(out.path, RenderPath::Deterministic);

        let slow = renderer(Some(Arc::new(SlowGenerator)));
        let out = slow.render(&NarrativeInput::default(), None).await;
        assert!(matches!(out.outcome, GeneratorOutcome::TimedOut { .. }));
    }

    #[test]
    fn test_oversized_deterministic_summary_keeps_headings() {
        let guard = OutputGuard::new(&RenderConfig {
            max_html_chars: crate::config::MIN_HTML_CHARS,
            ..Default::default()
        });
        let r = SummaryRenderer::new(guard, None, Duration::from_millis(50));
        let input = NarrativeInput {
            recent_engagement: (0..12)
                .map(|i| EngagementItem {
                    date: format!("2026-01-{:02}", i + 1),
                    highlight: format!("Completed task {} {}", i, "about the rollout ".repeat(8)),
                })
                .collect(),
            ..Default::default()
        };
        let html = r.deterministic(&input, None);
        assert!(r.guard().validate(&html).ok);
        assert!(html.chars().count() <= crate::config::MIN_HTML_CHARS);
        assert!(html.contains(EMPTY_SECTION_BULLET));
    }

    #[tokio::test]
    async fn test_links_appended_after_acceptance() {
        let links = "<p><strong>Links</strong></p>\n<ul><li><a href=\"https://acme.my.example.com/006AB0000000001\" target=\"_blank\" rel=\"noopener\">Opportunity record</a></li></ul>";
        let r = renderer(Some(Arc::new(FixedGenerator(valid_generated()))));
        let out = r.render(&NarrativeInput::default(), Some(links)).await;
        assert_eq!(out.path, RenderPath::Generated);
        assert!(out.html.ends_with(links));
    }
}
