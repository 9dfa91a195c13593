//! Nurse-facing summaries from a hosted chat-completion model.
//!
//! The model gets the patient's transcript as the primary source and the
//! current vitals as context, and is told not to diagnose. A failed call
//! never loses an earlier summary: [`SummaryPanel`] keeps it and records the
//! error, and calling `generate` again retries.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use vitalsync_types::VitalsSnapshot;

use crate::data::units::MISSING;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_TOKENS: u32 = 350;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_PROMPT: &str = "You are an assistant to a nurse, receiving patient vitals and \
transcripts of their statements. Summarize and highlight key issues, actionable concerns, and \
positive outcomes, repeating any important details explicitly. Ensure clarity, accuracy, and \
neutral language, and flag critical changes or urgent topics for follow-up. Do not make any \
diagnoses";

const INSTRUCTIONS: &str = "Make sure to: (1) repeat important patient statements explicitly, \
(2) list actionable concerns first, (3) include positive/normal findings, and (4) flag anything \
urgent clearly (without diagnosing). Always answer in 1 small paragraph with no text editing. \
Always display temperature in Fahrenheit.";

/// Errors from generating a summary.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// No API key configured.
    #[error("OPENAI_API_KEY not set")]
    MissingApiKey,

    /// The model endpoint answered with an error status.
    #[error("OpenAI error: {status} {body}")]
    Status { status: u16, body: String },

    /// The request could not be sent or the response not read.
    #[error("AI summary failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for SummaryError {
    fn from(err: reqwest::Error) -> Self {
        SummaryError::Request(err.to_string())
    }
}

/// Vitals as sent to the summarizer. Values pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryVitals {
    pub hr: Option<f64>,
    pub spo2: Option<f64>,
    #[serde(rename = "tempC")]
    pub temp_c: Option<f64>,
}

/// Input to a summary: the transcript and the current vitals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryRequest {
    pub transcript: Option<String>,
    pub vitals: SummaryVitals,
}

impl SummaryRequest {
    /// Build a request from a live snapshot.
    pub fn from_snapshot(snapshot: &VitalsSnapshot) -> Self {
        Self {
            transcript: snapshot.transcript.clone(),
            vitals: SummaryVitals {
                hr: snapshot.heart_rate,
                spo2: snapshot.spo2,
                temp_c: snapshot.skin_temperature_c,
            },
        }
    }

    /// The transcript, trimmed, if it has any content.
    pub fn transcript(&self) -> Option<&str> {
        self.transcript
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// The user message sent to the model.
    pub fn user_message(&self) -> String {
        format!(
            "Using the rules above, create a concise nursing-facing summary with bullet points.\n\n\
             PATIENT TRANSCRIPT (primary source):\n{}\n\n\
             CURRENT VITALS (secondary, for context):\n\
             • HR: {} bpm\n\
             • SpO₂: {} %\n\
             • Temp: {} °C\n\
             \n{}",
            self.transcript().unwrap_or("(none provided)"),
            raw(self.vitals.hr),
            raw(self.vitals.spo2),
            raw(self.vitals.temp_c),
            INSTRUCTIONS,
        )
    }
}

fn raw(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| v.to_string())
}

/// Something that turns a transcript and vitals into a summary.
#[async_trait]
pub trait Summarizer: Send + Sync + Debug {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummaryError>;
}

/// Summarizer backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct ChatSummarizer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl Debug for ChatSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSummarizer")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ChatSummarizer {
    /// Create a new builder for configuring the summarizer.
    pub fn builder() -> ChatSummarizerBuilder {
        ChatSummarizerBuilder::default()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummaryError> {
        let user_message = request.user_message();
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_message,
                },
            ],
        };

        debug!(model = %self.model, "Requesting summary");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Summary request rejected");
            return Err(SummaryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatResponse = response.json().await?;
        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default())
    }
}

/// Builder for ChatSummarizer.
#[derive(Debug, Default)]
pub struct ChatSummarizerBuilder {
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
}

impl ChatSummarizerBuilder {
    /// Set the chat-completions URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the bearer API key. Required.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the model (default: "gpt-4o-mini").
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature (default: 0.2).
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the completion token cap (default: 350).
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the request timeout (default: 30 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the summarizer. Fails without a non-empty API key.
    pub fn build(self) -> Result<ChatSummarizer, SummaryError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(SummaryError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(ChatSummarizer {
            client,
            endpoint: self.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }
}

/// State of the summary shown next to the live vitals.
#[derive(Debug, Default)]
pub struct SummaryPanel {
    summary: Option<String>,
    error: Option<String>,
}

impl SummaryPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generating needs a transcript, unless there is a summary to refresh.
    pub fn can_generate(&self, transcript: Option<&str>) -> bool {
        self.summary.is_some() || transcript.is_some_and(|t| !t.trim().is_empty())
    }

    /// Request a summary. On failure the previous summary stays and the
    /// error is recorded; call again to retry.
    pub async fn generate(&mut self, summarizer: &dyn Summarizer, request: &SummaryRequest) {
        self.error = None;
        match summarizer.summarize(request).await {
            Ok(summary) if summary.trim().is_empty() => {
                debug!("Summary came back empty");
                self.summary = None;
            }
            Ok(summary) => self.summary = Some(summary),
            Err(e) => {
                warn!(error = %e, "Summary generation failed");
                self.error = Some(e.to_string());
            }
        }
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True when the last attempt failed.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}
