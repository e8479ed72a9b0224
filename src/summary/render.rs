//! Deterministic summary renderer
//!
//! Rule-based synthesis of the four mandatory sections from a
//! [`NarrativeInput`]. No external calls; the same input always yields the
//! same HTML, and that HTML passes [`OutputGuard::validate`] unless the
//! storage ceiling cuts into it.

use super::guard::{OutputGuard, SectionHeading};
use super::html::escape_html;
use crate::narrative::NarrativeInput;

/// Bullet used when a section has no qualifying content
pub const EMPTY_SECTION_BULLET: &str = "Not enough information available.";

const WHY_CARE_FALLBACK: &str = "Engagement and marketing signals suggest they may be evaluating solutions; review recent activity and prioritize outreach accordingly.";
const NEXT_STEP_INBOUND: &str = "Follow up quickly and reference their inbound request; confirm what prompted them to reach out and what timeline they are working on.";
const NEXT_STEP_DISCOVERY: &str = "Use recent engagement as the opener and propose a short discovery call; confirm what they are evaluating and who else is involved.";
const NEXT_STEP_VERIFY_FIT: &str = "Verify fit early (industry/eligibility, role, and company details) before investing a full-cycle effort.";
const NEXT_STEP_OPEN_OPPORTUNITY: &str = "Check whether there is already an active opportunity and align outreach to the current stage and owner.";

const MAX_INTEREST_NAMES: usize = 3;
const MAX_OPPORTUNITY_PRODUCTS: usize = 5;
const MAX_INTERPRETATION_BULLETS: usize = 5;
const MAX_CONCERN_BULLETS: usize = 3;

/// Renders the deterministic summary body
pub struct DeterministicRenderer<'a> {
    guard: &'a OutputGuard,
}

impl<'a> DeterministicRenderer<'a> {
    pub fn new(guard: &'a OutputGuard) -> Self {
        Self { guard }
    }

    /// Render all four sections, headings in fixed order
    pub fn render(&self, input: &NarrativeInput) -> String {
        let sections = [
            (SectionHeading::WhyCare, why_care(input)),
            (SectionHeading::ScoreInterpretation, score_bullets(input)),
            (SectionHeading::RecentEngagement, engagement_bullets(input)),
            (SectionHeading::NextStep, next_steps(input)),
        ];
        sections
            .iter()
            .map(|(heading, items)| format!("{}\n{}", heading.marker(), self.list(items, heading.max_items())))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All four headings with the placeholder bullet only
    pub fn placeholder(&self) -> String {
        SectionHeading::ALL
            .iter()
            .map(|heading| format!("{}\n{}", heading.marker(), self.list(&[], heading.max_items())))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn list(&self, items: &[String], max: usize) -> String {
        let bullets: Vec<String> = items
            .iter()
            .map(|item| self.guard.scrub_text(item))
            .filter(|item| !item.is_empty())
            .take(max)
            .collect();
        if bullets.is_empty() {
            return format!("<ul><li>{}</li></ul>", EMPTY_SECTION_BULLET);
        }
        let items: String = bullets
            .iter()
            .map(|b| format!("<li>{}</li>", escape_html(b)))
            .collect();
        format!("<ul>{}</ul>", items)
    }
}

fn why_care(input: &NarrativeInput) -> Vec<String> {
    let mut bullets = Vec::new();
    let interests = input.interest_names(MAX_INTEREST_NAMES);
    if !interests.is_empty() {
        bullets.push(format!(
            "Likely areas of interest based on recent web/marketing signals: {}.",
            interests.join(", ")
        ));
    }
    if let Some(context) = &input.opportunity_context {
        let products = context.product_names(MAX_OPPORTUNITY_PRODUCTS);
        if !products.is_empty() {
            bullets.push(format!(
                "Open opportunity product(s) on the account include: {}.",
                products.join(", ")
            ));
        }
    }
    let max = SectionHeading::WhyCare.max_items();
    for reason in input.key_reasons.iter().filter(|r| !r.trim().is_empty()) {
        if bullets.len() >= max {
            break;
        }
        bullets.push(reason.clone());
    }
    if bullets.is_empty() {
        bullets.push(WHY_CARE_FALLBACK.to_string());
    }
    bullets
}

fn score_bullets(input: &NarrativeInput) -> Vec<String> {
    let mut bullets: Vec<String> = input
        .score_interpretation
        .iter()
        .filter(|b| !b.trim().is_empty())
        .take(MAX_INTERPRETATION_BULLETS)
        .cloned()
        .collect();
    bullets.extend(input.fit.concerns.iter().take(MAX_CONCERN_BULLETS).cloned());
    bullets
}

fn engagement_bullets(input: &NarrativeInput) -> Vec<String> {
    input
        .recent_engagement
        .iter()
        .filter(|e| !e.date.is_empty())
        .map(|e| format!("{} - {}", e.date, e.highlight))
        .collect()
}

fn next_steps(input: &NarrativeInput) -> Vec<String> {
    let mut steps = vec![if input.has_inbound_request() {
        NEXT_STEP_INBOUND
    } else {
        NEXT_STEP_DISCOVERY
    }
    .to_string()];
    if !input.fit.concerns.is_empty() {
        steps.push(NEXT_STEP_VERIFY_FIT.to_string());
    }
    if input.opportunity.has_open_opportunity {
        steps.push(NEXT_STEP_OPEN_OPPORTUNITY.to_string());
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::narrative::{
        EngagementItem, FitAssessment, OpportunityBrief, OpportunityContext, OpportunitySignals,
        ProductInterestItem, ProductInterestView, Strength,
    };

    fn guard() -> OutputGuard {
        OutputGuard::new(&RenderConfig::default())
    }

    fn rich_input() -> NarrativeInput {
        NarrativeInput {
            product_interest: Some(ProductInterestView {
                top_products: vec![ProductInterestItem {
                    name: "Navigator".to_string(),
                    confidence: Strength::Strong,
                    evidence: vec![],
                }],
            }),
            opportunity_context: Some(OpportunityContext {
                open_opportunities: vec![OpportunityBrief {
                    name: Some("Acme".to_string()),
                    stage: Some("Discovery".to_string()),
                    products: vec!["Insider".to_string()],
                }],
            }),
            fit: FitAssessment {
                looks_good: false,
                concerns: vec!["Account eligibility checks are missing or unclear.".to_string()],
            },
            opportunity: OpportunitySignals {
                has_open_opportunity: true,
                ..Default::default()
            },
            key_reasons: vec!["They directly requested follow-up (inbound intent).".to_string()],
            score_interpretation: vec!["Fit: Review needed due to eligibility concerns.".to_string()],
            recent_engagement: (0..15)
                .map(|i| EngagementItem {
                    date: format!("2026-01-{:02}", 28 - i),
                    highlight: "Meeting logged".to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_input_renders_placeholders() {
        let g = guard();
        let html = DeterministicRenderer::new(&g).render(&NarrativeInput::default());
        assert!(html.contains(WHY_CARE_FALLBACK));
        assert!(html.contains(NEXT_STEP_DISCOVERY));
        assert_eq!(html.matches(EMPTY_SECTION_BULLET).count(), 2);
        assert!(g.validate(&html).ok);
    }

    #[test]
    fn test_rich_input_sections() {
        let g = guard();
        let html = DeterministicRenderer::new(&g).render(&rich_input());
        assert!(html.contains(
            "Likely areas of interest based on recent web/marketing signals: Navigator."
        ));
        assert!(html.contains("Open opportunity product(s) on the account include: Insider."));
        assert!(html.contains(NEXT_STEP_INBOUND));
        assert!(html.contains(NEXT_STEP_VERIFY_FIT));
        assert!(!html.contains(NEXT_STEP_OPEN_OPPORTUNITY));
        assert!(html.contains("<li>2026-01-28 - Meeting logged</li>"));
        assert!(!html.contains("2026-01-16"));
        assert!(g.validate(&html).ok);
    }

    #[test]
    fn test_headings_in_order() {
        let g = guard();
        let html = DeterministicRenderer::new(&g).render(&rich_input());
        let positions: Vec<usize> = SectionHeading::ALL
            .iter()
            .map(|h| html.find(&h.marker()).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_leaking_text_is_scrubbed() {
        let g = guard();
        let mut input = rich_input();
        input.recent_engagement = vec![EngagementItem {
            date: "2026-01-05".to_string(),
            highlight: "Email activity - Synced via HubSpot to Lead_Score__c".to_string(),
        }];
        let html = DeterministicRenderer::new(&g).render(&input);
        assert!(g.validate(&html).ok);
        assert!(html.contains("2026-01-05 - Email activity - Synced via to Lead_Score"));
    }

    #[test]
    fn test_escapes_bullet_text() {
        let g = guard();
        let mut input = NarrativeInput::default();
        input.key_reasons = vec!["Asked about <pricing> & terms".to_string()];
        let html = DeterministicRenderer::new(&g).render(&input);
        assert!(html.contains("<li>Asked about &lt;pricing&gt; &amp; terms</li>"));
    }
}
