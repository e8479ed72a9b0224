//! Narrative input contract
//!
//! The compacted, business-language payload handed to the summary renderer.
//! It carries qualitative facts only: no raw scores, field names or record
//! identifiers. Every date is a `YYYY-MM-DD` calendar date; items without a
//! derivable date are excluded rather than emitted with a placeholder.

use super::compact::compact_value;
use crate::error::Result;
use crate::interest::{Confidence, ProductInterest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Intent strength framing, consistent with product confidence tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strength {
    Strong,
    Moderate,
    #[default]
    Light,
}

impl Strength {
    pub fn as_str(self) -> &'static str {
        match self {
            Strength::Strong => "Strong",
            Strength::Moderate => "Moderate",
            Strength::Light => "Light",
        }
    }
}

impl From<Confidence> for Strength {
    fn from(confidence: Confidence) -> Self {
        match confidence {
            Confidence::High => Strength::Strong,
            Confidence::Moderate => Strength::Moderate,
            Confidence::Light => Strength::Light,
        }
    }
}

impl std::fmt::Display for Strength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked product, as the audience sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInterestItem {
    pub name: String,
    pub confidence: Strength,
    pub evidence: Vec<String>,
}

/// Ranked product interest without internal keys or raw scores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInterestView {
    pub top_products: Vec<ProductInterestItem>,
}

impl From<&ProductInterest> for ProductInterestView {
    fn from(interest: &ProductInterest) -> Self {
        Self {
            top_products: interest
                .top_products
                .iter()
                .map(|p| ProductInterestItem {
                    name: p.product_name.clone(),
                    confidence: p.confidence().into(),
                    evidence: p.evidence.clone(),
                })
                .collect(),
        }
    }
}

/// One opportunity summarized for context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityBrief {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<String>,
}

/// Opportunities on the account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityContext {
    pub open_opportunities: Vec<OpportunityBrief>,
}

impl OpportunityContext {
    /// Distinct product names across opportunities, in order, capped
    pub fn product_names(&self, max: usize) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.open_opportunities.iter().flat_map(|o| o.products.iter()) {
            if names.len() >= max {
                break;
            }
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

/// Eligibility assessment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitAssessment {
    pub looks_good: bool,
    pub concerns: Vec<String>,
}

/// Intent classification and its drivers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentAssessment {
    pub strength: Strength,
    pub drivers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_engagement_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_conversion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_conversion_date: Option<String>,
}

/// Open-opportunity signals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunitySignals {
    pub has_open_opportunity: bool,
    pub open_opportunity_count: usize,
    pub stage_names: Vec<String>,
}

/// Qualitative reading of one scoring signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSignal {
    pub signal: String,
    pub qualitative: String,
    pub contributes_to_lead: bool,
    pub implication: String,
}

/// Dated engagement bullet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementItem {
    /// `YYYY-MM-DD`
    pub date: String,
    pub highlight: String,
}

/// Complete narrative input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_interest: Option<ProductInterestView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opportunity_context: Option<OpportunityContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_created_date: Option<String>,
    pub fit: FitAssessment,
    pub intent: IntentAssessment,
    pub opportunity: OpportunitySignals,
    pub key_reasons: Vec<String>,
    pub score_signals: Vec<ScoreSignal>,
    pub score_interpretation: Vec<String>,
    pub recent_engagement: Vec<EngagementItem>,
}

impl NarrativeInput {
    /// Whether an inbound request drives this lead
    pub fn has_inbound_request(&self) -> bool {
        self.key_reasons
            .iter()
            .any(|r| r.to_lowercase().contains("inbound"))
    }

    /// Names of the ranked products of interest, best first
    pub fn interest_names(&self, max: usize) -> Vec<String> {
        self.product_interest
            .as_ref()
            .map(|pi| {
                pi.top_products
                    .iter()
                    .map(|p| p.name.trim())
                    .filter(|n| !n.is_empty())
                    .take(max)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Compacted JSON form (no null or blank leaves)
    pub fn to_compact_json(&self) -> Result<Value> {
        Ok(compact_value(serde_json::to_value(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::ProductMatch;

    #[test]
    fn test_strength_follows_confidence() {
        assert_eq!(Strength::from(Confidence::High), Strength::Strong);
        assert_eq!(Strength::from(Confidence::Moderate), Strength::Moderate);
        assert_eq!(Strength::from(Confidence::Light), Strength::Light);
    }

    #[test]
    fn test_interest_view_hides_ids_and_scores() {
        let interest = ProductInterest {
            top_products: vec![ProductMatch {
                product_id: "nav".to_string(),
                product_name: "Navigator".to_string(),
                score: 15.0,
                evidence: vec!["URL: https://example.com/navigator".to_string()],
            }],
        };
        let view = ProductInterestView::from(&interest);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["topProducts"][0]["confidence"], "Strong");
        assert!(json["topProducts"][0].get("score").is_none());
        assert!(json["topProducts"][0].get("productId").is_none());
    }

    #[test]
    fn test_compact_json_drops_blank_fields() {
        let input = NarrativeInput {
            lead_status: Some(" ".to_string()),
            key_reasons: vec!["They directly requested follow-up (inbound intent).".to_string()],
            ..Default::default()
        };
        let json = input.to_compact_json().unwrap();
        assert!(json.get("leadStatus").is_none());
        assert!(json.get("product").is_none());
        assert_eq!(json["intent"]["strength"], "Light");
        assert!(input.has_inbound_request());
    }

    #[test]
    fn test_opportunity_product_names_distinct() {
        let ctx = OpportunityContext {
            open_opportunities: vec![
                OpportunityBrief {
                    name: Some("A".to_string()),
                    stage: None,
                    products: vec!["Navigator".to_string(), "Insider".to_string()],
                },
                OpportunityBrief {
                    name: None,
                    stage: None,
                    products: vec!["Navigator".to_string(), "Events".to_string()],
                },
            ],
        };
        assert_eq!(ctx.product_names(5), vec!["Navigator", "Insider", "Events"]);
        assert_eq!(ctx.product_names(1), vec!["Navigator"]);
    }
}
