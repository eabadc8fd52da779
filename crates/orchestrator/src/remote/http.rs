use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{RemoteProviderError, RemoteProviderKind};
use crate::config::RemoteProviderConfig;

/// Shared HTTP plumbing: one client per provider, status classification and
/// the opt-in retry on transient failures.
#[derive(Clone)]
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    provider: RemoteProviderKind,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl HttpTransport {
    pub(crate) fn new(
        provider: RemoteProviderKind,
        config: &RemoteProviderConfig,
    ) -> Result<Self, RemoteProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| RemoteProviderError::HttpClient(err.to_string()))?;

        Ok(Self {
            client,
            provider,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    /// Sends the request built by `build` and returns the success body. `build`
    /// runs once per attempt.
    pub(crate) async fn send<F>(&self, build: F) -> Result<String, RemoteProviderError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let mut attempt = 0_u32;

        loop {
            match self.send_once(&build).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    if err.retryable && attempt < self.max_retries {
                        let backoff_ms = self
                            .retry_backoff_ms
                            .saturating_mul(2_u64.saturating_pow(attempt));
                        debug!(
                            provider = %self.provider,
                            attempt,
                            "retrying remote provider request: {}",
                            err.error
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }

                    warn!(provider = %self.provider, "remote provider request failed: {}", err.error);
                    return Err(err.error);
                }
            }
        }
    }

    async fn send_once<F>(&self, build: &F) -> Result<String, SendAttemptError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let response = build(&self.client).send().await.map_err(|err| {
            if err.is_timeout() {
                SendAttemptError::retryable(RemoteProviderError::Timeout)
            } else {
                SendAttemptError::retryable(RemoteProviderError::Transport(
                    "request_unavailable".to_string(),
                ))
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|_| {
            SendAttemptError::non_retryable(RemoteProviderError::Transport(
                "response_body_read_failed".to_string(),
            ))
        })?;

        if status.is_success() {
            return Ok(body);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SendAttemptError::non_retryable(
                RemoteProviderError::InvalidCredentials,
            ));
        }

        let details = parse_provider_error(&body);
        Err(SendAttemptError {
            error: RemoteProviderError::Http {
                status: status.as_u16(),
                code: details.code,
                message: details.message,
            },
            retryable: is_retryable_status(status),
        })
    }
}

#[derive(Debug)]
struct SendAttemptError {
    error: RemoteProviderError,
    retryable: bool,
}

impl SendAttemptError {
    fn retryable(error: RemoteProviderError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn non_retryable(error: RemoteProviderError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ProviderErrorDetails {
    pub(crate) code: String,
    pub(crate) message: String,
}

/// Reads the `error` envelope all three providers use. OpenAI carries `code`,
/// Gemini `status`, Anthropic only a `type`.
pub(crate) fn parse_provider_error(body: &str) -> ProviderErrorDetails {
    #[derive(Deserialize)]
    struct ProviderErrorEnvelope {
        error: Option<ProviderErrorBody>,
    }

    #[derive(Deserialize)]
    struct ProviderErrorBody {
        code: Option<Value>,
        status: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        message: Option<String>,
    }

    let Some(error) = serde_json::from_str::<ProviderErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
    else {
        return ProviderErrorDetails {
            code: "unknown".to_string(),
            message: "no error details".to_string(),
        };
    };

    let code = match error.code {
        Some(Value::String(code)) if !code.trim().is_empty() => Some(code),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    }
    .or(error.status)
    .or(error.kind)
    .unwrap_or_else(|| "unknown".to_string());

    ProviderErrorDetails {
        code,
        message: error
            .message
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| "no error details".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ProviderErrorDetails, parse_provider_error};

    #[test]
    fn parses_openai_error_envelope() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#;
        assert_eq!(
            parse_provider_error(body),
            ProviderErrorDetails {
                code: "rate_limit_exceeded".to_string(),
                message: "Rate limit reached".to_string(),
            }
        );
    }

    #[test]
    fn parses_gemini_and_anthropic_envelopes() {
        let gemini = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(parse_provider_error(gemini).code, "400");

        let anthropic = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let details = parse_provider_error(anthropic);
        assert_eq!(details.code, "overloaded_error");
        assert_eq!(details.message, "Overloaded");
    }

    #[test]
    fn unstructured_bodies_report_unknown() {
        let details = parse_provider_error("<html>bad gateway</html>");
        assert_eq!(details.code, "unknown");
    }
}
