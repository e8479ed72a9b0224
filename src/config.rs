//! LeadPulse configuration management

use crate::error::{Error, Result};
use crate::interest::EvidenceCategory;
use crate::timeline::{EventType, Importance};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Smallest storage ceiling that still fits the placeholder summary
pub const MIN_HTML_CHARS: usize = 512;

/// Main LeadPulse configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadPulseConfig {
    /// Timeline policy (recency window, caps, importance recipe)
    #[serde(default)]
    pub timeline: TimelinePolicy,

    /// Product-interest rule set
    #[serde(default)]
    pub product_interest: RulesConfig,

    /// Summary rendering configuration
    #[serde(default)]
    pub render: RenderConfig,

    /// Summary generator configuration
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Source fetch configuration
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl LeadPulseConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Existence checks only; the documents are trusted configuration.
    pub fn validate(&self) -> Result<()> {
        if self.timeline.defaults.max_events == 0 {
            return Err(Error::Config(
                "timeline.defaults.maxEvents must be greater than zero".to_string(),
            ));
        }
        if self.render.max_html_chars < MIN_HTML_CHARS {
            return Err(Error::Config(format!(
                "render.max_html_chars must be at least {}",
                MIN_HTML_CHARS
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Timeline policy
// =============================================================================

/// Timeline policy document
///
/// ```json
/// { "defaults": { "recencyWindowDays": 365, "maxEvents": 25, "capsByEventType": {} },
///   "timelineRecipe": { "importance": { "high": [], "medium": [], "low": [] } } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePolicy {
    /// Policy document version
    #[serde(default)]
    pub version: Option<String>,

    /// Windowing and cap defaults
    #[serde(default)]
    pub defaults: TimelineDefaults,

    /// Importance recipe
    #[serde(default)]
    pub timeline_recipe: TimelineRecipe,
}

impl TimelinePolicy {
    /// Parse a timeline policy from its JSON document form
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Importance tier for an event type (unlisted types are low)
    pub fn importance_for(&self, event_type: EventType) -> Importance {
        let recipe = &self.timeline_recipe.importance;
        if recipe.high.contains(&event_type) {
            Importance::High
        } else if recipe.medium.contains(&event_type) {
            Importance::Medium
        } else {
            Importance::Low
        }
    }

    /// Per-type cap (unbounded when not configured)
    pub fn cap_for(&self, event_type: EventType) -> usize {
        self.defaults
            .caps_by_event_type
            .get(&event_type)
            .copied()
            .unwrap_or(usize::MAX)
    }
}

impl Default for TimelinePolicy {
    fn default() -> Self {
        Self {
            version: Some("v1".to_string()),
            defaults: TimelineDefaults::default(),
            timeline_recipe: TimelineRecipe::default(),
        }
    }
}

/// Windowing and cap defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDefaults {
    /// Recency window for optional-tier events, in days
    pub recency_window_days: u32,

    /// Maximum number of optional-tier events
    pub max_events: usize,

    /// Per-event-type caps
    #[serde(default)]
    pub caps_by_event_type: HashMap<EventType, usize>,
}

impl Default for TimelineDefaults {
    fn default() -> Self {
        let caps = HashMap::from([
            (EventType::OpenOpportunityDetected, 5),
            (EventType::OpportunityStageChanged, 6),
            (EventType::TaskCompleted, 8),
            (EventType::MeetingLogged, 6),
            (EventType::EmailEngagement, 8),
            (EventType::CampaignTouch, 6),
            (EventType::InboundRequest, 5),
        ]);
        Self {
            recency_window_days: 365,
            max_events: 25,
            caps_by_event_type: caps,
        }
    }
}

/// Importance recipe wrapper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineRecipe {
    /// Event types per importance tier
    #[serde(default)]
    pub importance: ImportanceRecipe,
}

/// Event types per importance tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceRecipe {
    #[serde(default)]
    pub high: Vec<EventType>,
    #[serde(default)]
    pub medium: Vec<EventType>,
    #[serde(default)]
    pub low: Vec<EventType>,
}

impl Default for ImportanceRecipe {
    fn default() -> Self {
        Self {
            high: vec![
                EventType::LeadCreated,
                EventType::LeadConverted,
                EventType::InboundRequest,
                EventType::OpenOpportunityDetected,
                EventType::MeetingLogged,
            ],
            medium: vec![
                EventType::LeadRejected,
                EventType::OpportunityStageChanged,
                EventType::TaskCompleted,
                EventType::EmailEngagement,
            ],
            low: vec![EventType::CampaignTouch],
        }
    }
}

// =============================================================================
// Product-interest rules
// =============================================================================

/// Product-interest rule document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesConfig {
    /// Rule document version
    #[serde(default)]
    pub version: Option<String>,

    /// Scoring rules
    #[serde(default)]
    pub rules: Vec<ProductRule>,

    /// Maximum number of ranked products to keep
    #[serde(default = "default_max_products")]
    pub max_products: usize,

    /// Maximum number of cited snippets per product
    #[serde(default = "default_max_evidence_per_product")]
    pub max_evidence_per_product: usize,
}

fn default_max_products() -> usize {
    4
}

fn default_max_evidence_per_product() -> usize {
    3
}

impl RulesConfig {
    /// Parse a rule document from its JSON form
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            version: Some("v1".to_string()),
            rules: default_product_rules(),
            max_products: default_max_products(),
            max_evidence_per_product: default_max_evidence_per_product(),
        }
    }
}

/// A single product-interest rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRule {
    /// Stable product key
    pub product_id: String,

    /// Display name
    pub product_name: String,

    /// Score added per matching evidence item
    pub weight: f64,

    /// Evidence categories this rule is tested against
    #[serde(default = "all_evidence_categories")]
    pub evidence_categories: Vec<EvidenceCategory>,

    /// Case-insensitive regular expression
    #[serde(alias = "regex")]
    pub pattern: String,
}

fn all_evidence_categories() -> Vec<EvidenceCategory> {
    vec![EvidenceCategory::Text, EvidenceCategory::Url]
}

/// Built-in product rules used when no rule document is supplied
pub fn default_product_rules() -> Vec<ProductRule> {
    vec![
        ProductRule {
            product_id: "navigator".to_string(),
            product_name: "Navigator".to_string(),
            weight: 7.0,
            evidence_categories: all_evidence_categories(),
            pattern: r"navigator".to_string(),
        },
        ProductRule {
            product_id: "market-intel".to_string(),
            product_name: "Market Intelligence".to_string(),
            weight: 5.0,
            evidence_categories: all_evidence_categories(),
            pattern: r"\b(?:rfp|bid|procurement|contract award)s?\b".to_string(),
        },
        ProductRule {
            product_id: "events".to_string(),
            product_name: "Events & Briefings".to_string(),
            weight: 4.0,
            evidence_categories: all_evidence_categories(),
            pattern: r"\b(?:webinar|briefing|summit|roundtable)s?\b".to_string(),
        },
        ProductRule {
            product_id: "research".to_string(),
            product_name: "Research Reports".to_string(),
            weight: 3.0,
            evidence_categories: vec![EvidenceCategory::Url],
            pattern: r"/(?:research|reports?|papers?)/".to_string(),
        },
    ]
}

// =============================================================================
// Rendering, generator, sources
// =============================================================================

/// Summary rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Base URL for record links (must be https to produce links)
    #[serde(default)]
    pub instance_url: Option<String>,

    /// Hard character ceiling for the final HTML
    pub max_html_chars: usize,

    /// Regexes that must never match visible summary text
    pub forbidden_patterns: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            instance_url: None,
            max_html_chars: 32000,
            forbidden_patterns: default_forbidden_patterns(),
        }
    }
}

/// Built-in leak patterns: field/relationship suffixes, system names,
/// and record-ID shapes.
pub fn default_forbidden_patterns() -> Vec<String> {
    vec![
        r"__c\b".to_string(),
        r"__r\b".to_string(),
        r"\bHubSpot_".to_string(),
        r"\bOpportunityContactRole\b".to_string(),
        r"\bMQL__c\b".to_string(),
        r"(?i)\bSalesforce\b".to_string(),
        r"(?i)\bHubSpot\b".to_string(),
        r"\b(?:003|00Q|00T|006|a0X)[A-Za-z0-9]{12,15}\b".to_string(),
    ]
}

/// Summary generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Enable the generator path
    pub enabled: bool,

    /// Chat-completions base URL
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion token budget
    pub max_tokens: u32,

    /// Time budget for one generation call, in milliseconds
    pub timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            max_tokens: 900,
            timeout_ms: 22_000,
        }
    }
}

impl GeneratorConfig {
    /// Resolve the API key from the environment.
    ///
    /// Tries the configured name, then its UPPER_CASE form.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .or_else(|_| std::env::var(self.api_key_env.to_uppercase()))
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Source fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Per-fetch timeout in milliseconds
    pub fetch_timeout_ms: u64,

    /// Default activity lookback when a request does not specify one
    pub default_since_days: u32,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 2500,
            default_since_days: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = LeadPulseConfig::default();
        assert_eq!(config.timeline.defaults.max_events, 25);
        assert_eq!(config.timeline.defaults.recency_window_days, 365);
        assert_eq!(config.product_interest.max_products, 4);
        assert_eq!(config.render.max_html_chars, 32000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_from_json_with_legacy_names() {
        let policy = TimelinePolicy::from_json_str(
            r#"{
                "defaults": { "recencyWindowDays": 30, "maxEvents": 10,
                              "capsByEventType": { "contactUsSubmitted": 2 } },
                "timelineRecipe": { "importance": { "high": ["mqlCreated", "taskCompleted"] } }
            }"#,
        )
        .unwrap();
        assert_eq!(policy.defaults.recency_window_days, 30);
        assert_eq!(policy.cap_for(EventType::InboundRequest), 2);
        assert_eq!(policy.cap_for(EventType::MeetingLogged), usize::MAX);
        assert_eq!(policy.importance_for(EventType::LeadCreated), Importance::High);
        assert_eq!(policy.importance_for(EventType::CampaignTouch), Importance::Low);
    }

    #[test]
    fn test_rules_from_json_regex_alias() {
        let rules = RulesConfig::from_json_str(
            r#"{ "rules": [ { "productId": "nav", "productName": "Navigator",
                              "weight": 7, "regex": "navigator" } ] }"#,
        )
        .unwrap();
        assert_eq!(rules.rules.len(), 1);
        assert_eq!(rules.rules[0].pattern, "navigator");
        assert_eq!(rules.rules[0].evidence_categories.len(), 2);
        assert_eq!(rules.max_products, 4);
        assert_eq!(rules.max_evidence_per_product, 3);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[render]
instance_url = "https://example.my.crm.test"
max_html_chars = 4000
forbidden_patterns = ["__c\\b"]

[generator]
enabled = false
base_url = "https://llm.internal/v1"
model = "small"
api_key_env = "LEADPULSE_TEST_KEY"
temperature = 0.0
max_tokens = 500
timeout_ms = 1000
"#
        )
        .unwrap();

        let config = LeadPulseConfig::load(file.path()).unwrap();
        assert_eq!(
            config.render.instance_url.as_deref(),
            Some("https://example.my.crm.test")
        );
        assert!(!config.generator.enabled);
        assert_eq!(config.timeline.defaults.max_events, 25);
    }

    #[test]
    fn test_validate_rejects_zero_max_events() {
        let mut config = LeadPulseConfig::default();
        config.timeline.defaults.max_events = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_tiny_html_ceiling() {
        let mut config = LeadPulseConfig::default();
        config.render.max_html_chars = MIN_HTML_CHARS - 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.render.max_html_chars = MIN_HTML_CHARS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let config = LeadPulseConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = LeadPulseConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.product_interest.rules.len(), config.product_interest.rules.len());
        assert_eq!(
            parsed.timeline.cap_for(EventType::TaskCompleted),
            config.timeline.cap_for(EventType::TaskCompleted)
        );
    }
}
