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

const TEMPERATURE: f64 = 0.3;

/// Chat-completions wire format. Pointing the base URL at OpenRouter or any
/// other compatible gateway works unchanged.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    transport: HttpTransport,
    chat_completions_url: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &RemoteProviderConfig) -> Result<Self, RemoteProviderError> {
        Ok(Self {
            transport: HttpTransport::new(RemoteProviderKind::OpenAi, config)?,
            chat_completions_url: format!(
                "{}/chat/completions",
                config.openai_base_url.trim_end_matches('/')
            ),
        })
    }

    async fn complete(
        &self,
        credentials: &RemoteCredentials,
        system_prompt: &str,
        user_content: Value,
        json_output: bool,
    ) -> Result<String, RemoteProviderError> {
        let api_key = credentials.api_key()?;
        let mut request_body = json!({
            "model": credentials.model(),
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_content }
            ],
            "temperature": TEMPERATURE
        });
        if json_output {
            request_body["response_format"] = json!({ "type": "json_object" });
        }

        let body = self
            .transport
            .send(|client| {
                client
                    .post(&self.chat_completions_url)
                    .bearer_auth(api_key)
                    .json(&request_body)
            })
            .await?;

        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|_| {
            RemoteProviderError::UnparseableOutput("response_json_parse_failed".to_string())
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RemoteProviderError::UnparseableOutput("missing_choice".to_string()))?
            .message
            .content;

        match content {
            Some(Value::String(text)) => non_empty_text(text),
            Some(value @ (Value::Object(_) | Value::Array(_))) => Ok(value.to_string()),
            _ => Err(RemoteProviderError::UnparseableOutput(
                "unsupported_content_shape".to_string(),
            )),
        }
    }
}

impl RemoteProvider for OpenAiCompatibleProvider {
    fn kind(&self) -> RemoteProviderKind {
        RemoteProviderKind::OpenAi
    }

    fn summarize<'a>(
        &'a self,
        text: &'a str,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, RemoteSummary> {
        Box::pin(async move {
            let raw = self
                .complete(
                    credentials,
                    SUMMARY_SYSTEM_PROMPT,
                    Value::String(summary_user_prompt(text)),
                    true,
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
                .complete(
                    credentials,
                    DRAFTS_SYSTEM_PROMPT,
                    Value::String(prompt.to_string()),
                    true,
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
            let data_url = format!(
                "data:{};base64,{}",
                image.mime_type,
                BASE64_STANDARD.encode(&image.bytes)
            );
            let content = json!([
                { "type": "text", "text": image.instruction },
                { "type": "image_url", "image_url": { "url": data_url } }
            ]);
            self.complete(credentials, IMAGE_SYSTEM_PROMPT, content, false)
                .await
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<Value>,
}
