//! Vision API request and response envelopes.
//!
//! Supports OpenAI-compatible chat completions (OpenAI, Groq, local
//! gateways) and Google Gemini `generateContent`. Both carry the image inline
//! as base64 and ask for a JSON-only answer.

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::transport::RequestSpec;
use super::ExtractionError;

/// Vision API flavor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionProvider {
    /// OpenAI-compatible `/chat/completions`.
    #[default]
    OpenAi,
    /// Google Gemini `models/{model}:generateContent`.
    Gemini,
}

impl VisionProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisionProvider::OpenAi => "openai",
            VisionProvider::Gemini => "gemini",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "open-ai" | "groq" => Some(VisionProvider::OpenAi),
            "gemini" | "google" => Some(VisionProvider::Gemini),
            _ => None,
        }
    }

    /// Conventional environment variable holding this provider's key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            VisionProvider::OpenAi => "OPENAI_API_KEY",
            VisionProvider::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            VisionProvider::OpenAi => "https://api.openai.com/v1",
            VisionProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            VisionProvider::OpenAi => "gpt-4o-mini",
            VisionProvider::Gemini => "gemini-1.5-flash",
        }
    }

    /// Build the request specification for one image.
    pub fn build_request(
        &self,
        endpoint: &str,
        model: &str,
        api_key: &str,
        instruction: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<RequestSpec, ExtractionError> {
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image);
        let endpoint = endpoint.trim_end_matches('/');

        match self {
            VisionProvider::OpenAi => {
                let request = ChatRequest {
                    model: model.to_string(),
                    messages: vec![ChatMessage {
                        role: "user".to_string(),
                        content: vec![
                            ChatContent::Text {
                                text: instruction.to_string(),
                            },
                            ChatContent::ImageUrl {
                                image_url: ChatImageUrl {
                                    url: format!("data:{};base64,{}", mime_type, image_base64),
                                },
                            },
                        ],
                    }],
                    max_tokens: 8192,
                    temperature: 0.0,
                    response_format: ChatResponseFormat {
                        kind: "json_object".to_string(),
                    },
                };
                let body = serde_json::to_vec(&request)
                    .map_err(|e| ExtractionError::InvalidRequest(e.to_string()))?;
                Ok(
                    RequestSpec::post_json(format!("{}/chat/completions", endpoint), body)
                        .with_header("Authorization", format!("Bearer {}", api_key)),
                )
            }
            VisionProvider::Gemini => {
                let request = GeminiRequest {
                    contents: vec![GeminiContent {
                        parts: vec![
                            GeminiPart::Text {
                                text: instruction.to_string(),
                            },
                            GeminiPart::InlineData {
                                inline_data: GeminiInlineData {
                                    mime_type: mime_type.to_string(),
                                    data: image_base64,
                                },
                            },
                        ],
                    }],
                    generation_config: GeminiGenerationConfig {
                        temperature: 0.0,
                        max_output_tokens: 8192,
                        response_mime_type: "application/json".to_string(),
                    },
                };
                let body = serde_json::to_vec(&request)
                    .map_err(|e| ExtractionError::InvalidRequest(e.to_string()))?;
                Ok(RequestSpec::post_json(
                    format!("{}/models/{}:generateContent", endpoint, model),
                    body,
                )
                .with_header("x-goog-api-key", api_key))
            }
        }
    }

    /// Pull the model's text answer out of a success response body.
    pub fn extract_message(&self, body: &str) -> Result<String, ExtractionError> {
        let envelope_error = |message: String| ExtractionError::Envelope {
            provider: *self,
            message,
        };

        match self {
            VisionProvider::OpenAi => {
                let response: ChatResponse = serde_json::from_str(body)
                    .map_err(|e| envelope_error(format!("Failed to parse response: {}", e)))?;
                if let Some(error) = response.error {
                    return Err(envelope_error(error.message));
                }
                response
                    .choices
                    .and_then(|c| c.into_iter().next())
                    .and_then(|c| c.message.content)
                    .filter(|text| !text.trim().is_empty())
                    .ok_or_else(|| envelope_error("response has no message content".to_string()))
            }
            VisionProvider::Gemini => {
                let response: GeminiResponse = serde_json::from_str(body)
                    .map_err(|e| envelope_error(format!("Failed to parse response: {}", e)))?;
                if let Some(error) = response.error {
                    return Err(envelope_error(error.message));
                }
                let text: String = response
                    .candidates
                    .and_then(|c| c.into_iter().next())
                    .and_then(|c| c.content)
                    .map(|content| {
                        content
                            .parts
                            .into_iter()
                            .filter_map(|p| p.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
                if text.trim().is_empty() {
                    return Err(envelope_error("response has no candidate text".to_string()));
                }
                Ok(text)
            }
        }
    }
}

impl std::fmt::Display for VisionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    response_format: ChatResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ChatImageUrl },
}

#[derive(Debug, Serialize)]
struct ChatImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}
