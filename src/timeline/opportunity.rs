//! Opportunity lookup shared by activity normalization and narrative context

use super::normalize::{objects, Record};
use super::schema::SourceCapabilities;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Product fields read from the opportunity itself when it has no line items
const FALLBACK_PRODUCT_FIELDS: [&str; 4] = [
    "Opportunity_Product__c",
    "Primary_Product__c",
    "Product_Name__c",
    "Product__c",
];

/// One opportunity with its product names resolved
#[derive(Debug, Clone, Default)]
pub struct OpportunityEntry {
    pub id: String,
    pub name: Option<String>,
    pub stage: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Product names from line items, deduplicated in order
    pub line_item_products: Vec<String>,
    /// Product names carried directly on the opportunity
    pub field_products: Vec<String>,
}

impl OpportunityEntry {
    /// Line-item products (capped), or up to two field products when the
    /// opportunity has no line items
    pub fn product_names(&self, max: usize) -> Vec<String> {
        if self.line_item_products.is_empty() {
            self.field_products.iter().take(2.min(max)).cloned().collect()
        } else {
            self.line_item_products.iter().take(max).cloned().collect()
        }
    }
}

/// Opportunities by identifier, in input order
#[derive(Debug, Clone, Default)]
pub struct OpportunityIndex {
    entries: Vec<OpportunityEntry>,
    by_id: HashMap<String, usize>,
}

impl OpportunityIndex {
    /// Build the index from opportunity and line-item records
    pub fn build(
        opportunities: &[Value],
        line_items: &[Value],
        caps: &SourceCapabilities,
    ) -> Self {
        let mut index = Self::default();

        for raw in opportunities {
            let record = Record::new(objects::OPPORTUNITY, raw, caps);
            let Some(id) = record.text("Id") else {
                continue;
            };
            if index.by_id.contains_key(&id) {
                continue;
            }
            let field_products = FALLBACK_PRODUCT_FIELDS
                .iter()
                .filter_map(|field| record.text(field))
                .fold(Vec::new(), |mut acc: Vec<String>, name| {
                    if !acc.contains(&name) {
                        acc.push(name);
                    }
                    acc
                });
            index.by_id.insert(id.clone(), index.entries.len());
            index.entries.push(OpportunityEntry {
                id,
                name: record.text("Name"),
                stage: record.text("StageName"),
                created_at: record.instant(&["CreatedDate"]),
                line_item_products: Vec::new(),
                field_products,
            });
        }

        for raw in line_items {
            let record = Record::new(objects::LINE_ITEM, raw, caps);
            let (Some(opp_id), Some(product)) = (
                record.text("OpportunityId"),
                record.text("PricebookEntry.Product2.Name"),
            ) else {
                continue;
            };
            if let Some(&idx) = index.by_id.get(&opp_id) {
                let products = &mut index.entries[idx].line_item_products;
                if !products.contains(&product) {
                    products.push(product);
                }
            }
        }

        index
    }

    /// Look up an opportunity by identifier
    pub fn get(&self, id: &str) -> Option<&OpportunityEntry> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    /// Resolve the first candidate identifier that names a known opportunity
    pub fn linked<'a, I>(&self, candidates: I) -> Option<&OpportunityEntry>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        candidates.into_iter().flatten().find_map(|id| self.get(id))
    }

    /// All opportunities in input order
    pub fn entries(&self) -> &[OpportunityEntry] {
        &self.entries
    }

    /// Up to three line-item product names, comma-joined
    pub fn products_label(&self, id: &str) -> Option<String> {
        let entry = self.get(id)?;
        let names: Vec<&str> = entry
            .line_item_products
            .iter()
            .map(String::as_str)
            .take(3)
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join(", "))
        }
    }

    /// `name | stage | products` label for activity context
    pub fn context_label(&self, id: &str) -> Option<String> {
        let entry = self.get(id)?;
        let parts: Vec<String> = [
            entry.name.clone(),
            entry.stage.clone(),
            self.products_label(id),
        ]
        .into_iter()
        .flatten()
        .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        }
    }
}
