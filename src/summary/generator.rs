//! Text generator seam
//!
//! The generator receives a system/user instruction pair that embeds the
//! compacted narrative JSON and returns free text. Its output is untrusted
//! and always goes through the output guard.

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::narrative::NarrativeInput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// System and user instructions for one generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Produces summary HTML from a prompt
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    /// Short provider label for metadata
    fn name(&self) -> &str;

    /// Generate raw summary text
    async fn generate(&self, prompt: &PromptPair) -> Result<String>;
}

const SYSTEM_LINES: [&str; 8] = [
    "You are writing for Sales reps (non-technical).",
    "Use only the provided JSON; do not invent details.",
    "Return an HTML fragment only (no doctype/html/head/body).",
    "Use simple HTML only: <p>, <strong>, <ul>, <li>, <br/>, <em>.",
    "Do not include hyperlinks; record links are appended automatically.",
    "No CSS or styling (<style>, style=, class=, link/meta/script).",
    "Do not include CRM or marketing-platform field names, object names, IDs, or JSON keys in the output.",
    "Do not include raw numeric scores; keep score language qualitative (Strong/Moderate/Light).",
];

const USER_LINES: [&str; 23] = [
    "Write an HTML summary with these sections (use <p><strong>Section</strong></p> headings):",
    "1) Why Sales Should Care",
    "   - 3-6 bullets.",
    "   - Each bullet explains a SALES signal and why it matters (value-based).",
    "   - Avoid technical phrasing; write like a rep-to-rep handoff.",
    "   - If product-interest signals are present, include 1-2 bullets explicitly stating what they are likely evaluating and why (cite the evidence in plain language).",
    "   - If open opportunities include product names, call out the product(s) tied to those opportunities.",
    "2) Score Interpretation",
    "   - 3-4 bullets interpreting Fit and Intent qualitatively (Strong/Moderate/Light).",
    "   - If an inbound request exists, treat as time-sensitive, but still flag any fit concerns.",
    "3) Most Recent Engagement",
    "   - 5-12 bullets, newest-first (most recent first).",
    "   - Each bullet MUST start with a date (YYYY-MM-DD) then a short plain-English highlight.",
    "   - If an engagement is tied to a specific opportunity/product, mention that product in the highlight.",
    "4) Suggested Next Step",
    "   - 1-2 bullets: best outreach angle + what to verify + urgency.",
    "   - If product-interest signals exist, tailor the outreach angle to those likely interests.",
    "",
    "Important constraints:",
    "- Do not include any field names, IDs, JSON keys, or system names.",
    "- Do not include numeric scores or threshold values; describe them qualitatively only.",
    "- If something is unclear/missing, say so plainly (do not guess).",
    "",
];

/// Build the instruction pair for a narrative input
pub fn build_prompt(input: &NarrativeInput) -> Result<PromptPair> {
    let payload = serde_json::to_string(&input.to_compact_json()?)?;
    let mut user = USER_LINES.join("\n");
    user.push_str("\nStructured input JSON (do not echo keys):\n");
    user.push_str(&payload);
    Ok(PromptPair {
        system: SYSTEM_LINES.join("\n"),
        user,
    })
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by an OpenAI-compatible chat-completions endpoint
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionsGenerator {
    pub fn new(config: &GeneratorConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// `None` when generation is disabled or no API key is available
    pub fn from_config(config: &GeneratorConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        match config.resolve_api_key() {
            Some(key) => Self::new(config, key).map(Some),
            None => {
                tracing::debug!(env = %config.api_key_env, "No generator API key; using deterministic summaries");
                Ok(None)
            }
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SummaryGenerator for ChatCompletionsGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &PromptPair) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(500).collect();
            return Err(Error::Generator(format!(
                "Generator returned {}: {}",
                status, excerpt
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::Generator("Generator returned no content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_compact_json() {
        let input = NarrativeInput {
            key_reasons: vec!["They directly requested follow-up (inbound intent).".to_string()],
            lead_status: Some(String::new()),
            ..Default::default()
        };
        let prompt = build_prompt(&input).unwrap();
        assert!(prompt.system.starts_with("You are writing for Sales reps"));
        assert!(prompt.user.contains("1) Why Sales Should Care"));
        assert!(prompt.user.contains("\"keyReasons\":[\"They directly requested"));
        assert!(!prompt.user.contains("leadStatus"));
        assert!(!prompt.system.contains("Salesforce"));
    }

    #[test]
    fn test_from_config_disabled() {
        let config = GeneratorConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(ChatCompletionsGenerator::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_from_config_missing_key() {
        let config = GeneratorConfig {
            api_key_env: "LEADPULSE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        assert!(ChatCompletionsGenerator::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = GeneratorConfig {
            base_url: "https://llm.example.com/v1/".to_string(),
            ..Default::default()
        };
        let generator = ChatCompletionsGenerator::new(&config, "k".to_string()).unwrap();
        assert_eq!(generator.endpoint(), "https://llm.example.com/v1/chat/completions");
        assert_eq!(generator.name(), "gpt-4o-mini");
    }
}
