//! Vision-based text transcription.
//!
//! Used as the OCR fallback for scanned PDFs and as the only extraction
//! path for raster images and legacy binary Office files. One call per
//! document: the model is asked to transcribe everything visible, keeping
//! row/column structure with `|` separators, and to add no commentary.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{Error, Result};

/// Instruction sent with every transcription request. Fixed on purpose:
/// retrieval quality depends on the output being raw content, not prose
/// about the content.
const TRANSCRIBE_PROMPT: &str = "Extract ALL text content from this image or document. \
If there are tables, timetables, or structured data, convert them into a clear text format. \
If there are rows and columns, preserve the structure using | separators. \
If there is handwritten text, do your best to transcribe it. \
Include every piece of information visible. \
Do NOT add any commentary - just extract the raw content.";

/// A multimodal model that can read text out of document bytes.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Transcribe the visible text of `bytes` (interpreted per `mime`).
    async fn transcribe(&self, mime: &str, bytes: &[u8]) -> Result<String>;
}

/// Gemini transcription client (generative language API, API-key auth).
pub struct GeminiVision {
    client: reqwest::Client,
    model: String,
    api_key: String,
}

impl GeminiVision {
    /// Reads the API key from `GEMINI_API_KEY`.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| Error::config("GEMINI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: reqwest::Client::new(),
            model: model.into(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        )
    }
}

#[derive(serde::Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(serde::Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    Text(String),
    InlineData(InlineData),
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(serde::Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(serde::Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl VisionModel for GeminiVision {
    async fn transcribe(&self, mime: &str, bytes: &[u8]) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text(TRANSCRIBE_PROMPT.to_string()),
                    Part::InlineData(InlineData {
                        mime_type: mime.to_string(),
                        data: BASE64.encode(bytes),
                    }),
                ],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::extraction(format!("vision request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::extraction(format!(
                "vision transcription failed ({}): {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let gen_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::extraction(format!("failed to parse vision response: {}", e)))?;

        let text = gen_response
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(text)
    }
}
