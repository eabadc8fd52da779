use std::env;
use std::str::FromStr;

use crate::config::ConfigError;

/// Unset and blank variables are treated the same.
pub(crate) fn optional_trimmed_env(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub(crate) fn parse_number_env<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    let Some(raw) = optional_trimmed_env(key) else {
        return Ok(default);
    };
    raw.parse::<T>().map_err(|_| ConfigError::ParseInt {
        key: key.to_string(),
        value: raw,
    })
}

/// Base URLs are stored without a trailing slash so endpoint paths can be appended.
pub(crate) fn parse_url_env(key: &str, default: &str) -> Result<String, ConfigError> {
    let value = optional_trimmed_env(key).unwrap_or_else(|| default.to_string());
    let parsed = url::Url::parse(&value).map_err(|err| {
        ConfigError::InvalidConfiguration(format!("{key} is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidConfiguration(format!(
            "{key} must start with http:// or https://"
        )));
    }

    Ok(value.trim_end_matches('/').to_string())
}
