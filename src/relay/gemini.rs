//! Gemini API client for text answers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::relay::completion::{Completion, CompletionError};
use crate::relay::context::{ConversationTurn, Prompt, Role};

/// Connect/read limit of the HTTP client itself; the engine applies the
/// configured completion timeout on top.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

pub struct GeminiClient {
    api_key: String,
    api_base: String,
    model: String,
    max_output_tokens: Option<u32>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn to_content(turn: &ConversationTurn) -> Content {
    Content {
        role: gemini_role(turn.role),
        parts: vec![Part { text: turn.content.clone() }],
    }
}

impl GeminiClient {
    pub fn new(api_key: String, api_base: String, model: String, max_output_tokens: Option<u32>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { api_key, api_base, model, max_output_tokens, client }
    }

    fn build_request(&self, prompt: &Prompt) -> GenerateRequest {
        GenerateRequest {
            system_instruction: prompt.system.as_ref().map(|text| SystemInstruction {
                parts: vec![Part { text: text.clone() }],
            }),
            contents: prompt.turns.iter().map(to_content).collect(),
            generation_config: self
                .max_output_tokens
                .map(|max_output_tokens| GenerationConfig { max_output_tokens }),
        }
    }

    /// Generate an answer for the assembled prompt.
    pub async fn generate(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        info!("🤖 Asking {} ({} turn(s))", self.model, prompt.turns.len());

        let request = self.build_request(prompt);
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Http(format!("failed to read response: {e}")))?;

        debug!("Gemini response status: {status}");

        if !status.is_success() {
            let detail = serde_json::from_str::<GenerateResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(CompletionError::Api(format!("{status}: {detail}")));
        }

        let text = extract_text(&body)?;
        info!("🤖 Answer: {} chars", text.chars().count());
        Ok(text)
    }
}

impl Completion for GeminiClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        self.generate(prompt).await
    }
}

/// Pull the answer out of a `generateContent` response body.
///
/// Text parts of the first candidate are joined with newlines and trimmed.
fn extract_text(body: &str) -> Result<String, CompletionError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::Parse(e.to_string()))?;

    if let Some(error) = parsed.error {
        return Err(CompletionError::Api(error.message));
    }

    let candidates = parsed.candidates.ok_or(CompletionError::Empty)?;
    let candidate = candidates.first().ok_or(CompletionError::Empty)?;
    let content = candidate.content.as_ref().ok_or(CompletionError::Empty)?;

    let text = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    if text.is_empty() {
        Err(CompletionError::Empty)
    } else {
        Ok(text)
    }
}
