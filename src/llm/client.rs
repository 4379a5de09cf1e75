//! Gemini-backed implementation of the structured-extraction capability.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::capabilities::StructuredExtractor;
use crate::error::{ReportError, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    /// Fails immediately when no API key is configured; a silently broken
    /// extractor is worse than a startup error.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ReportError::MissingCredentials("GEMINI_API_KEY".into()));
        }
        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn generate_content(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: user_text.to_string(),
                }],
            }],
            system_instruction: Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let res = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ReportError::ExtractionFailed(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let err_text = res
                .text()
                .await
                .map_err(|e| ReportError::ExtractionFailed(e.to_string()))?;
            return Err(ReportError::ExtractionFailed(format!(
                "Gemini API error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res
            .json()
            .await
            .map_err(|e| ReportError::ExtractionFailed(e.to_string()))?;

        body.candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| ReportError::ExtractionFailed("no candidates returned".to_string()))
    }
}

#[async_trait]
impl StructuredExtractor for GeminiClient {
    async fn extract(&self, prompt: &str, schema_json: &str) -> Result<serde_json::Value> {
        let system = format!(
            "You return only JSON conforming to this schema:\n{}",
            schema_json
        );
        let raw = self.generate_content(&system, prompt).await?;
        let cleaned = clean_json_output(&raw);
        serde_json::from_str(&cleaned)
            .map_err(|e| ReportError::ExtractionFailed(format!("malformed JSON response: {}", e)))
    }
}

/// Models occasionally wrap JSON in prose or code fences; keep only the
/// outermost object.
fn clean_json_output(raw: &str) -> String {
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start <= end {
            return raw[start..=end].to_string();
        }
    }
    raw.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_aborts() {
        assert!(matches!(
            GeminiClient::new("  "),
            Err(ReportError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_clean_json_output_strips_fences() {
        let raw = "```json\n{\"weather\": \"cloudy\"}\n```";
        assert_eq!(clean_json_output(raw), "{\"weather\": \"cloudy\"}");
        assert_eq!(clean_json_output("no json here"), "no json here");
    }
}
