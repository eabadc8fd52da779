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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 2_048;

#[derive(Clone)]
pub struct AnthropicProvider {
    transport: HttpTransport,
    messages_url: String,
}

impl AnthropicProvider {
    pub fn new(config: &RemoteProviderConfig) -> Result<Self, RemoteProviderError> {
        Ok(Self {
            transport: HttpTransport::new(RemoteProviderKind::Anthropic, config)?,
            messages_url: format!("{}/messages", config.anthropic_base_url.trim_end_matches('/')),
        })
    }

    async fn message(
        &self,
        credentials: &RemoteCredentials,
        system_prompt: &str,
        content: Value,
    ) -> Result<String, RemoteProviderError> {
        let api_key = credentials.api_key()?;
        let request_body = json!({
            "model": credentials.model(),
            "max_tokens": MAX_OUTPUT_TOKENS,
            "system": system_prompt,
            "messages": [
                { "role": "user", "content": content }
            ]
        });

        let body = self
            .transport
            .send(|client| {
                client
                    .post(&self.messages_url)
                    .header("x-api-key", api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&request_body)
            })
            .await?;

        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|_| {
            RemoteProviderError::UnparseableOutput("response_json_parse_failed".to_string())
        })?;
        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        non_empty_text(text)
    }
}

impl RemoteProvider for AnthropicProvider {
    fn kind(&self) -> RemoteProviderKind {
        RemoteProviderKind::Anthropic
    }

    fn summarize<'a>(
        &'a self,
        text: &'a str,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, RemoteSummary> {
        Box::pin(async move {
            let raw = self
                .message(
                    credentials,
                    SUMMARY_SYSTEM_PROMPT,
                    Value::String(summary_user_prompt(text)),
                )
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
            let raw = self
                .message(
                    credentials,
                    DRAFTS_SYSTEM_PROMPT,
                    Value::String(prompt.to_string()),
                )
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
            let content = json!([
                {
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": image.mime_type,
                        "data": BASE64_STANDARD.encode(&image.bytes)
                    }
                },
                { "type": "text", "text": image.instruction }
            ]);
            self.message(credentials, IMAGE_SYSTEM_PROMPT, content).await
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}
