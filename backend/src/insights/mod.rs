//! Spending insights.
//!
//! Produces exactly three prioritized [`Suggestion`]s for an analysis, either
//! from a hosted language model ([`InsightClient`], Anthropic messages API)
//! or from the deterministic [`rule_based_suggestions`].
//!
//! ```rust,ignore
//! let client = InsightClient::from_settings(&settings)?;
//! let suggestions = client.generate(&transactions).await?;
//! ```

pub mod prompt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::api::logs::{log_info_indent, log_warning};
use crate::config::Settings;
use crate::error::{AiError, AiResult};
use crate::models::Transaction;
use crate::score::{Metric, ScoreResult};

pub use prompt::{format_transactions, system_prompt, user_prompt};

/// Every analysis carries exactly this many suggestions.
pub const SUGGESTION_COUNT: usize = 3;

/// Default number of attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

const API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Text used to pad a short model reply.
const FILLER_TEXT: &str =
    "Review spending patterns in your transaction data for optimization opportunities.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Priorities in position order.
    pub const ORDER: [Priority; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "High" => Some(Self::High),
            "Medium" => Some(Self::Medium),
            "Low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Priority assigned to the suggestion at `index`.
    pub fn for_position(index: usize) -> Self {
        Self::ORDER[index % Self::ORDER.len()]
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub priority: Priority,
    pub text: String,
}

impl Suggestion {
    pub fn new(priority: Priority, text: impl Into<String>) -> Self {
        Self { priority, text: text.into() }
    }
}

// =============================================================================
// Anthropic Client
// =============================================================================

/// Anthropic API client
#[derive(Clone)]
pub struct InsightClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    http: reqwest::Client,
}

/// Anthropic API response structure
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Anthropic API error response
#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl InsightClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: crate::config::DEFAULT_AI_MODEL.to_string(),
            max_tokens: 1000,
            http: reqwest::Client::new(),
        }
    }

    /// Build a client from settings. Fails when no API key is configured.
    pub fn from_settings(settings: &Settings) -> AiResult<Self> {
        let api_key = settings
            .anthropic_api_key
            .clone()
            .ok_or_else(|| AiError::MissingApiKey("ANTHROPIC_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key).with_model(&settings.ai_model))
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate suggestions for a transaction set (with retries).
    pub async fn generate(&self, transactions: &[Transaction]) -> AiResult<Vec<Suggestion>> {
        let mut last_error = None;

        for attempt in 1..=DEFAULT_MAX_RETRIES {
            match self.try_generate(transactions).await {
                Ok(suggestions) => return Ok(suggestions),
                Err(e) => {
                    log_warning(format!("Attempt {}/{} failed: {}", attempt, DEFAULT_MAX_RETRIES, e));
                    last_error = Some(e);

                    if attempt < DEFAULT_MAX_RETRIES {
                        tokio::time::sleep(tokio::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AiError::ApiError("Unknown error".to_string())))
    }

    async fn try_generate(&self, transactions: &[Transaction]) -> AiResult<Vec<Suggestion>> {
        let reply = self.call_api(&user_prompt(transactions)).await?;
        parse_suggestions(&reply)
    }

    async fn call_api(&self, user_message: &str) -> AiResult<String> {
        log_info_indent(format!("Calling Anthropic API ({})", self.model), 1);

        let request_body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system_prompt(),
            "messages": [{"role": "user", "content": user_message}]
        });

        let response = self
            .http
            .post(API_URL)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(AiError::ApiError(error.error.message));
            }
            return Err(AiError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        let response: AnthropicResponse =
            serde_json::from_str(&body).map_err(|e| AiError::InvalidResponse(e.to_string()))?;

        let text = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(AiError::InvalidResponse("Empty response".to_string()));
        }
        Ok(text)
    }
}

// =============================================================================
// Reply Parsing
// =============================================================================

/// Extract JSON from a reply that may wrap it in a markdown code block
pub fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```") {
        let after_fence = start + 3;
        // skip the language tag
        let content_start = text[after_fence..]
            .find('\n')
            .map(|i| after_fence + i + 1)
            .unwrap_or(after_fence);

        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }

    text.trim()
}

/// Coerce raw suggestion objects into exactly [`SUGGESTION_COUNT`] entries.
///
/// Items without string `priority` and `text` fields are dropped. An
/// unknown priority is replaced by the one for the item's position in the
/// raw list. Short lists are padded with generic advice.
pub fn validate_suggestions(raw: &[Value]) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = raw
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let priority = item.get("priority")?.as_str()?;
            let text = item.get("text")?.as_str()?;
            let priority = Priority::from_name(priority).unwrap_or_else(|| Priority::for_position(i));
            Some(Suggestion::new(priority, text))
        })
        .collect();

    while suggestions.len() < SUGGESTION_COUNT {
        suggestions.push(Suggestion::new(Priority::for_position(suggestions.len()), FILLER_TEXT));
    }
    suggestions.truncate(SUGGESTION_COUNT);
    suggestions
}

/// Parse a model reply of the form `{"suggestions": [...]}`.
pub fn parse_suggestions(reply: &str) -> AiResult<Vec<Suggestion>> {
    let json: Value = serde_json::from_str(extract_json(reply))
        .map_err(|e| AiError::InvalidResponse(format!("{} in: {}", e, truncate(reply, 200))))?;

    let items = json
        .get("suggestions")
        .and_then(Value::as_array)
        .ok_or_else(|| AiError::InvalidResponse("missing \"suggestions\" array".to_string()))?;

    Ok(validate_suggestions(items))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// =============================================================================
// Rule-based Suggestions
// =============================================================================

fn advice(metric: Metric, result: &ScoreResult) -> String {
    let summary = &result.transaction_summary;
    match metric {
        Metric::FrequencyScore => "Spending is concentrated in a few categories. Review the busiest categories for recurring costs that can be cut or renegotiated.".to_string(),
        Metric::CategoryDiversity => format!(
            "Transactions fall into {} categories. Categorize expenses consistently, aiming for 5 to 15 categories, so spending is easier to track.",
            summary.unique_category_count
        ),
        Metric::BudgetAdherence => format!(
            "Many transactions deviate strongly from your median spend of {:.2}. Set per-category limits to keep spending predictable.",
            summary.median_amount
        ),
        Metric::RedundancyDetection => "Repeated charges from the same vendor within a day were found. Check for duplicate billing or overlapping services.".to_string(),
        Metric::SpikeDetection => format!(
            "Some one-off expenses sit far above your typical transaction of {:.2}. Plan large purchases ahead and approve them explicitly.",
            summary.median_amount
        ),
        Metric::WasteRatio => "A large share of spend goes to non-essential categories like dining and entertainment. Cancel unused subscriptions and cap discretionary spend.".to_string(),
    }
}

/// Advice for the three weakest metrics, weakest first.
pub fn rule_based_suggestions(result: &ScoreResult) -> Vec<Suggestion> {
    let mut ranked: Vec<(Metric, f64)> = result.breakdown.iter().map(|(m, v)| (*m, *v)).collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    ranked
        .into_iter()
        .take(SUGGESTION_COUNT)
        .enumerate()
        .map(|(i, (metric, _))| Suggestion::new(Priority::for_position(i), advice(metric, result)))
        .collect()
}

/// Provider suggestions when a client is available, rule-based otherwise
/// or when the provider fails.
pub async fn suggestions_for(
    client: Option<&InsightClient>,
    transactions: &[Transaction],
    result: &ScoreResult,
) -> Vec<Suggestion> {
    let Some(client) = client else {
        return rule_based_suggestions(result);
    };

    match client.generate(transactions).await {
        Ok(suggestions) => suggestions,
        Err(e) => {
            log_warning(format!("AI insights unavailable ({}); using rule-based suggestions", e));
            rule_based_suggestions(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score;
    use serde_json::json;

    #[test]
    fn test_extract_json_from_code_block() {
        let reply = "Here you go:\n\n```json\n{\"suggestions\": []}\n```\n\nDone!";
        assert_eq!(extract_json(reply), "{\"suggestions\": []}");
    }

    #[test]
    fn test_extract_raw_json() {
        let reply = r#"Sure. {"suggestions": []} Hope it helps."#;
        assert_eq!(extract_json(reply), r#"{"suggestions": []}"#);
    }

    #[test]
    fn test_parse_suggestions() {
        let reply = r#"{"suggestions": [
            {"priority": "High", "text": "Cancel the duplicate Adobe seat"},
            {"priority": "Medium", "text": "Consolidate fuel cards"},
            {"priority": "Low", "text": "Batch small office orders"}
        ]}"#;
        let parsed = parse_suggestions(reply).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0], Suggestion::new(Priority::High, "Cancel the duplicate Adobe seat"));
    }

    #[test]
    fn test_invalid_priority_reassigned_by_position() {
        let raw = vec![
            json!({"priority": "Urgent", "text": "a"}),
            json!({"priority": "whatever", "text": "b"}),
            json!({"priority": "High", "text": "c"}),
        ];
        let validated = validate_suggestions(&raw);
        assert_eq!(validated[0].priority, Priority::High);
        assert_eq!(validated[1].priority, Priority::Medium);
        assert_eq!(validated[2].priority, Priority::High);
    }

    #[test]
    fn test_padding_and_truncation() {
        let short = validate_suggestions(&[json!({"priority": "Low", "text": "only one"}), json!("junk")]);
        assert_eq!(short.len(), SUGGESTION_COUNT);
        assert_eq!(short[1], Suggestion::new(Priority::Medium, FILLER_TEXT));
        assert_eq!(short[2].priority, Priority::Low);

        let long: Vec<Value> = (0..5).map(|i| json!({"priority": "Low", "text": i.to_string()})).collect();
        assert_eq!(validate_suggestions(&long).len(), SUGGESTION_COUNT);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_suggestions("I cannot help with that."),
            Err(AiError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_suggestions(r#"{"ideas": []}"#),
            Err(AiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_rule_based_targets_weakest_metrics() {
        let txs: Vec<Transaction> = [(100.0, "groceries"), (100.0, "groceries"), (5000.0, "entertainment")]
            .iter()
            .map(|(a, c)| Transaction::new(*a).unwrap().with_category(c))
            .collect();
        let result = score::score(&txs);
        let suggestions = rule_based_suggestions(&result);

        assert_eq!(suggestions.len(), 3);
        let priorities: Vec<Priority> = suggestions.iter().map(|s| s.priority).collect();
        assert_eq!(priorities, Priority::ORDER.to_vec());
        // waste ratio is the weakest metric here
        assert!(suggestions[0].text.contains("non-essential"));
    }

    #[tokio::test]
    async fn test_suggestions_without_client_are_rule_based() {
        let result = score::score(&[]);
        let suggestions = suggestions_for(None, &[], &result).await;
        assert_eq!(suggestions, rule_based_suggestions(&result));
    }
}
