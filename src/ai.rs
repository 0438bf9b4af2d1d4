use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmSettings;
use crate::errors::JobsiftError;
use crate::models::{ListingFields, RejectReason, ScreenedCandidate};
use crate::{deep_filter, prompts, screening};

// --- Pricing ---

/// USD per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub per_1m_input: f64,
    pub per_1m_output: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub model_id: String,
    pub pricing: Pricing,
}

pub fn resolve_model(name: &str) -> Result<ModelSpec> {
    let pricing = match name {
        "gpt-4.1-mini" => Pricing { per_1m_input: 0.4, per_1m_output: 1.6 },
        "gpt-5-mini" => Pricing { per_1m_input: 0.25, per_1m_output: 2.0 },
        _ => {
            return Err(anyhow!(
                "Unknown model '{}'. Available: gpt-4.1-mini, gpt-5-mini",
                name
            ));
        }
    };
    Ok(ModelSpec {
        model_id: name.to_string(),
        pricing,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

pub fn estimate_cost(pricing: &Pricing, usage: &TokenUsage) -> f64 {
    let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * pricing.per_1m_input;
    let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * pricing.per_1m_output;
    input_cost + output_cost
}

// --- Provider trait ---

#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub schema_name: &'static str,
    pub schema: Value,
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

pub trait AIProvider {
    fn complete_structured(&self, request: &StructuredRequest) -> Result<Completion>;
}

// --- OpenAI provider (Responses API) ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct InputMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'a str,
    name: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Debug, Serialize)]
struct TextOptions<'a> {
    format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct Reasoning<'a> {
    effort: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    text: TextOptions<'a>,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning<'a>>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

fn extract_completion(response: ResponsesResponse) -> Result<Completion> {
    if response.status.as_deref() == Some("incomplete") {
        let reason = response
            .incomplete_details
            .and_then(|d| d.reason)
            .unwrap_or_else(|| "unknown".to_string());
        return Err(JobsiftError::Service(format!("Response incomplete: {}", reason)).into());
    }

    let mut text = String::new();
    for item in response.output.iter().filter(|item| item.item_type == "message") {
        for content in &item.content {
            match content.content_type.as_str() {
                "output_text" => text.push_str(content.text.as_deref().unwrap_or("")),
                "refusal" => {
                    return Err(JobsiftError::Service(format!(
                        "Model refused: {}",
                        content.refusal.as_deref().unwrap_or("no detail")
                    ))
                    .into());
                }
                _ => {}
            }
        }
    }

    if text.trim().is_empty() {
        return Err(JobsiftError::Service("No output text in response".to_string()).into());
    }

    Ok(Completion {
        text,
        usage: response.usage.unwrap_or_default(),
    })
}

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    base_url: String,
    client: reqwest::blocking::Client,
    max_retries: u32,
    backoff: Duration,
}

impl OpenAIProvider {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            api_key: settings.api_key.clone(),
            base_url: OPENAI_API_URL.to_string(),
            client,
            max_retries: settings.max_retries,
            backoff: Duration::from_secs(2),
        })
    }

    /// Lists models to confirm the API key is accepted.
    pub fn verify(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .context("Failed to reach OpenAI API")?;

        if !response.status().is_success() {
            return Err(JobsiftError::Config(format!(
                "Invalid OpenAI API key (status {}).",
                response.status()
            ))
            .into());
        }
        Ok(())
    }

    fn send_once(&self, request: &StructuredRequest) -> Result<Completion> {
        let body = ResponsesRequest {
            model: &request.model,
            input: vec![
                InputMessage { role: "system", content: &request.system },
                InputMessage { role: "user", content: &request.user },
            ],
            text: TextOptions {
                format: ResponseFormat {
                    format_type: "json_schema",
                    name: request.schema_name,
                    schema: &request.schema,
                    strict: true,
                },
            },
            max_output_tokens: request.max_output_tokens,
            temperature: request.temperature,
            reasoning: request.reasoning_effort.map(|effort| Reasoning { effort }),
        };

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| JobsiftError::Transient(format!("Failed to send request to OpenAI API: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            let message = format!("OpenAI API request failed with status {}: {}", status, error_text);
            return Err(if is_transient_status(status) {
                JobsiftError::Transient(message)
            } else {
                JobsiftError::Service(message)
            }
            .into());
        }

        let api_response: ResponsesResponse = response
            .json()
            .map_err(|e| JobsiftError::Service(format!("Failed to parse OpenAI API response: {}", e)))?;

        extract_completion(api_response)
    }
}

impl AIProvider for OpenAIProvider {
    fn complete_structured(&self, request: &StructuredRequest) -> Result<Completion> {
        with_retry(self.max_retries, self.backoff, || self.send_once(request))
    }
}

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Doubles per attempt, capped at `MAX_BACKOFF`.
pub fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    base_delay.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_BACKOFF)
}

/// Runs `call`, retrying transient failures with exponential backoff.
pub fn with_retry<T, F>(max_retries: u32, base_delay: Duration, mut call: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries && JobsiftError::is_transient(&err) => {
                let delay = backoff_delay(base_delay, attempt);
                attempt += 1;
                warn!("Transient service error ({}); retry {}/{} in {:?}", err, attempt, max_retries, delay);
                thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}

// --- Reasoning service ---

/// Output of one reasoning call plus what it cost.
#[derive(Debug, Clone)]
pub struct Priced<T> {
    pub value: T,
    pub usage: TokenUsage,
    pub cost: f64,
}

/// Pre-screen output for one listing, index-aligned with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenRecord {
    pub fields: ListingFields,
    pub relevant: bool,
}

impl ScreenRecord {
    pub fn into_screened(self, job_id: String) -> ScreenedCandidate {
        ScreenedCandidate {
            job_id,
            fields: self.fields,
            relevant: self.relevant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepFilterVerdict {
    pub skills: Vec<String>,
    pub rejection: Option<RejectReason>,
}

pub trait ReasoningService {
    fn pre_screen(&self, listings: &[Vec<String>], target_roles: &[String]) -> Result<Priced<Vec<ScreenRecord>>>;

    fn deep_filter(
        &self,
        description: &str,
        position_title: &str,
        preferences: &[String],
    ) -> Result<Priced<DeepFilterVerdict>>;
}

/// `ReasoningService` backed by structured-output calls to an `AIProvider`.
pub struct LlmReasoner<'a> {
    provider: &'a dyn AIProvider,
    settings: &'a LlmSettings,
}

impl<'a> LlmReasoner<'a> {
    pub fn new(provider: &'a dyn AIProvider, settings: &'a LlmSettings) -> Self {
        Self { provider, settings }
    }

    fn priced<T>(&self, spec: &ModelSpec, value: T, usage: TokenUsage) -> Priced<T> {
        let cost = estimate_cost(&spec.pricing, &usage);
        debug!(
            "{}: {} input / {} output tokens, ${:.6}",
            spec.model_id, usage.input_tokens, usage.output_tokens, cost
        );
        Priced { value, usage, cost }
    }
}

impl ReasoningService for LlmReasoner<'_> {
    fn pre_screen(&self, listings: &[Vec<String>], target_roles: &[String]) -> Result<Priced<Vec<ScreenRecord>>> {
        let spec = &self.settings.prescreen_model;
        let request = StructuredRequest {
            model: spec.model_id.clone(),
            system: prompts::PRE_SCREEN_SYSTEM.to_string(),
            user: prompts::pre_screen_user(listings, target_roles)?,
            schema_name: "JobListingPreScreen",
            schema: screening::response_schema(),
            max_output_tokens: self.settings.prescreen_max_output_tokens,
            temperature: Some(0.1),
            reasoning_effort: None,
        };

        let completion = self.provider.complete_structured(&request)?;
        let records = screening::parse_response(&completion.text)?;
        Ok(self.priced(spec, records, completion.usage))
    }

    fn deep_filter(
        &self,
        description: &str,
        position_title: &str,
        preferences: &[String],
    ) -> Result<Priced<DeepFilterVerdict>> {
        let spec = &self.settings.deep_filter_model;
        let request = StructuredRequest {
            model: spec.model_id.clone(),
            system: prompts::DEEP_FILTER_SYSTEM.to_string(),
            user: prompts::deep_filter_user(description, position_title, preferences),
            schema_name: "JobDescriptionFilter",
            schema: deep_filter::response_schema(),
            max_output_tokens: self.settings.deep_filter_max_output_tokens,
            temperature: None,
            reasoning_effort: Some("low"),
        };

        let completion = self.provider.complete_structured(&request)?;
        let verdict = deep_filter::parse_response(&completion.text)?;
        Ok(self.priced(spec, verdict, completion.usage))
    }
}
