//! Rule-based product-interest inference
//!
//! Each evidence item is tested against every rule whose category set
//! includes the item's category. A match adds the rule's weight to the
//! product's aggregate and cites the snippet (`URL: ...` / `Signal: ...`)
//! while the product is under its citation cap. Aggregates are ranked by
//! score, descending, and the top products are kept.
//!
//! Inference is deterministic: aggregates keep first-seen order and ranking
//! uses a stable sort, so equal scores keep their evidence order.

use super::evidence::{Evidence, EvidenceCategory};
use crate::config::{ProductRule, RulesConfig};
use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Compiled-program size ceiling for user-supplied patterns
const RULE_SIZE_LIMIT: usize = 1 << 20;

/// Qualitative confidence tier for a product score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Light,
    Moderate,
    High,
}

impl Confidence {
    /// Score at or above which confidence is High
    pub const HIGH_THRESHOLD: f64 = 14.0;
    /// Score at or above which confidence is Moderate
    pub const MODERATE_THRESHOLD: f64 = 7.0;

    /// Fixed three-tier step function over score
    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH_THRESHOLD {
            Confidence::High
        } else if score >= Self::MODERATE_THRESHOLD {
            Confidence::Moderate
        } else {
            Confidence::Light
        }
    }
}

/// Aggregate for one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMatch {
    pub product_id: String,
    pub product_name: String,
    /// Sum of matching rule weights
    pub score: f64,
    /// Cited snippets, deduplicated, in match order
    pub evidence: Vec<String>,
}

impl ProductMatch {
    /// Confidence tier for this product's score
    pub fn confidence(&self) -> Confidence {
        Confidence::from_score(self.score)
    }
}

/// Ranked inference result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInterest {
    pub top_products: Vec<ProductMatch>,
}

impl ProductInterest {
    /// Whether any product matched
    pub fn has_evidence(&self) -> bool {
        !self.top_products.is_empty()
    }

    /// Names of the ranked products, best first
    pub fn product_names(&self) -> impl Iterator<Item = &str> {
        self.top_products.iter().map(|p| p.product_name.as_str())
    }
}

struct CompiledRule {
    product_id: String,
    product_name: String,
    weight: f64,
    categories: Vec<EvidenceCategory>,
    pattern: Regex,
}

/// Product-interest engine built from a rule document
pub struct ProductInterestEngine {
    rules: Vec<CompiledRule>,
    max_products: usize,
    max_evidence_per_product: usize,
    skipped_rules: Vec<String>,
}

impl ProductInterestEngine {
    /// Compile the rule set. Rules with invalid patterns are skipped.
    pub fn new(config: &RulesConfig) -> Self {
        let mut rules = Vec::with_capacity(config.rules.len());
        let mut skipped_rules = Vec::new();
        for rule in &config.rules {
            match Self::compile_rule(rule) {
                Ok(compiled) => rules.push(compiled),
                Err(e) => {
                    tracing::warn!(product = %rule.product_id, error = %e, "Skipping product rule");
                    skipped_rules.push(rule.product_id.clone());
                }
            }
        }
        Self {
            rules,
            max_products: config.max_products,
            max_evidence_per_product: config.max_evidence_per_product,
            skipped_rules,
        }
    }

    fn compile_rule(rule: &ProductRule) -> Result<CompiledRule> {
        let pattern = RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .size_limit(RULE_SIZE_LIMIT)
            .build()
            .map_err(|e| {
                Error::Rule(format!(
                    "Invalid pattern for product '{}': {}",
                    rule.product_id, e
                ))
            })?;
        let product_id = if rule.product_id.trim().is_empty() {
            rule.product_name.clone()
        } else {
            rule.product_id.clone()
        };
        let product_name = if rule.product_name.trim().is_empty() {
            product_id.clone()
        } else {
            rule.product_name.clone()
        };
        Ok(CompiledRule {
            product_id,
            product_name,
            weight: if rule.weight.is_finite() { rule.weight } else { 0.0 },
            categories: rule.evidence_categories.clone(),
            pattern,
        })
    }

    /// Identifiers of rules skipped because their pattern failed to compile
    pub fn skipped_rules(&self) -> &[String] {
        &self.skipped_rules
    }

    /// Number of active rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Score evidence and rank products
    pub fn infer(&self, evidence: &[Evidence]) -> ProductInterest {
        let mut aggregates: Vec<ProductMatch> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for item in evidence {
            if item.text.is_empty() {
                continue;
            }
            for rule in &self.rules {
                if !rule.categories.contains(&item.category) || !rule.pattern.is_match(&item.text) {
                    continue;
                }
                let slot = *index.entry(rule.product_id.as_str()).or_insert_with(|| {
                    aggregates.push(ProductMatch {
                        product_id: rule.product_id.clone(),
                        product_name: rule.product_name.clone(),
                        score: 0.0,
                        evidence: Vec::new(),
                    });
                    aggregates.len() - 1
                });
                let aggregate = &mut aggregates[slot];
                aggregate.score += rule.weight;
                if aggregate.evidence.len() < self.max_evidence_per_product {
                    let citation = cite(item);
                    if !aggregate.evidence.contains(&citation) {
                        aggregate.evidence.push(citation);
                    }
                }
            }
        }

        aggregates.sort_by(|a, b| b.score.total_cmp(&a.score));
        aggregates.truncate(self.max_products);

        tracing::debug!(
            evidence = evidence.len(),
            products = aggregates.len(),
            "Inferred product interest"
        );

        ProductInterest {
            top_products: aggregates,
        }
    }
}

fn cite(item: &Evidence) -> String {
    match item.category {
        EvidenceCategory::Url => format!("URL: {}", item.text),
        EvidenceCategory::Text => format!("Signal: {}", item.text),
    }
}
