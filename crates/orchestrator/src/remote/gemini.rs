use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};

use super::http::HttpTransport;
use super::prompts::{
    DRAFTS_SYSTEM_PROMPT, IMAGE_SYSTEM_PROMPT, SUMMARY_SYSTEM_PROMPT, non_empty_text,
    parse_drafts_output, parse_summary_output, summary_user_prompt,
};
use super::{
    RemoteCredentials, RemoteFuture, RemoteImage, RemoteProvider, RemoteProviderError,
    RemoteProviderKind, RemoteSummary,
};
use crate::config::RemoteProviderConfig;
use crate::drafts::Draft;

#[derive(Clone)]
pub struct GeminiProvider {
    transport: HttpTransport,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(config: &RemoteProviderConfig) -> Result<Self, RemoteProviderError> {
        Ok(Self {
            transport: HttpTransport::new(RemoteProviderKind::Gemini, config)?,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn generate_content(
        &self,
        credentials: &RemoteCredentials,
        system_prompt: &str,
        parts: Value,
        json_output: bool,
    ) -> Result<String, RemoteProviderError> {
        let api_key = credentials.api_key()?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url,
            credentials.model()
        );
        let mut request_body = json!({
            "systemInstruction": { "parts": [ { "text": system_prompt } ] },
            "contents": [ { "role": "user", "parts": parts } ]
        });
        if json_output {
            request_body["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }

        let body = self
            .transport
            .send(|client| {
                client
                    .post(&url)
                    .header("x-goog-api-key", api_key)
                    .json(&request_body)
            })
            .await?;

        let parsed: GenerateContentResponse = serde_json::from_str(&body).map_err(|_| {
            RemoteProviderError::UnparseableOutput("response_json_parse_failed".to_string())
        })?;
        let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
            RemoteProviderError::UnparseableOutput("missing_candidate".to_string())
        })?;
        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        non_empty_text(text)
    }
}

impl RemoteProvider for GeminiProvider {
    fn kind(&self) -> RemoteProviderKind {
        RemoteProviderKind::Gemini
    }

    fn summarize<'a>(
        &'a self,
        text: &'a str,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, RemoteSummary> {
        Box::pin(async move {
            let parts = json!([ { "text": summary_user_prompt(text) } ]);
            let raw = self
                .generate_content(credentials, SUMMARY_SYSTEM_PROMPT, parts, true)
                .await?;
            parse_summary_output(&raw)
        })
    }

    fn generate_drafts<'a>(
        &'a self,
        prompt: &'a str,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, Vec<Draft>> {
        Box::pin(async move {
            let parts = json!([ { "text": prompt } ]);
            let raw = self
                .generate_content(credentials, DRAFTS_SYSTEM_PROMPT, parts, true)
                .await?;
            parse_drafts_output(&raw)
        })
    }

    fn describe_image<'a>(
        &'a self,
        image: &'a RemoteImage,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, String> {
        Box::pin(async move {
            let parts = json!([
                {
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": BASE64_STANDARD.encode(&image.bytes)
                    }
                },
                { "text": image.instruction }
            ]);
            self.generate_content(credentials, IMAGE_SYSTEM_PROMPT, parts, false)
                .await
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
