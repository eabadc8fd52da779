//! Maps raw failure text onto a small set of messages that are safe to show a user.

use std::sync::LazyLock;

use regex::Regex;

pub const GENERIC_MESSAGE: &str = "Something went wrong while processing this email. Please try again.";

const MIN_READABLE_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    StackTrace,
    Credentials,
    RateLimit,
    Downloading,
    CapabilityUnavailable,
    Timeout,
    Session,
    MalformedJson,
    ProviderOutage,
    Network,
    Permission,
    ContentTooShort,
    ContentTooLarge,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StackTrace => "stack_trace",
            Self::Credentials => "credentials",
            Self::RateLimit => "rate_limit",
            Self::Downloading => "downloading",
            Self::CapabilityUnavailable => "capability_unavailable",
            Self::Timeout => "timeout",
            Self::Session => "session",
            Self::MalformedJson => "malformed_json",
            Self::ProviderOutage => "provider_outage",
            Self::Network => "network",
            Self::Permission => "permission",
            Self::ContentTooShort => "content_too_short",
            Self::ContentTooLarge => "content_too_large",
        }
    }
}

struct SanitizerRule {
    category: ErrorCategory,
    pattern: Regex,
    message: &'static str,
}

/// First match wins, so the more specific rules come first.
static RULE_SOURCES: [(ErrorCategory, &str, &str); 13] = [
    (
        ErrorCategory::StackTrace,
        r"(?im)^\s*at\s+\S+.*:\d+|stack backtrace:|panicked at|^\s*\d+:\s+0x[0-9a-f]+|Traceback \(most recent call last\)",
        GENERIC_MESSAGE,
    ),
    (
        ErrorCategory::Credentials,
        r"(?i)credentials|api[ _-]?key|unauthori[sz]ed|\b401\b|invalid[ _]authentication",
        "The AI provider rejected the API key. Check the key in your settings.",
    ),
    (
        ErrorCategory::RateLimit,
        r"(?i)rate[ _-]?limit|too many requests|\b429\b|quota",
        "The AI provider is limiting requests right now. Please wait a moment and try again.",
    ),
    (
        ErrorCategory::Downloading,
        r"(?i)download",
        "The on-device AI model is still downloading. Please wait a few minutes and try again.",
    ),
    (
        ErrorCategory::CapabilityUnavailable,
        r"(?i)\b(capability|model|on-device|ai)\b.*\b(unavailable|not available|not supported)\b",
        "On-device AI is not available right now. You can add a remote provider in your settings.",
    ),
    (
        ErrorCategory::Timeout,
        r"(?i)timed out|timeout|did not respond within|deadline",
        "The AI took too long to respond. Please try again.",
    ),
    (
        ErrorCategory::Session,
        r"(?i)session",
        "The AI session ended unexpectedly. Please try again.",
    ),
    (
        ErrorCategory::MalformedJson,
        r"(?i)json|unexpected token|could not be parsed|schema",
        "The AI returned a response that could not be read. Please try again.",
    ),
    (
        ErrorCategory::ProviderOutage,
        r"(?i)status 5\d\d|overloaded|bad gateway|service unavailable",
        "The AI provider is having trouble right now. Please try again later.",
    ),
    (
        ErrorCategory::Network,
        r"(?i)network|fetch|connection|unreachable|request failed|dns|econnrefused",
        "Could not reach the AI provider. Check your connection and try again.",
    ),
    (
        ErrorCategory::Permission,
        r"(?i)permission|not allowed|forbidden|\b403\b|access denied",
        "Permission was denied for this action.",
    ),
    (
        ErrorCategory::ContentTooShort,
        r"(?i)too short",
        "There is not enough text in this email to work with.",
    ),
    (
        ErrorCategory::ContentTooLarge,
        r"(?i)too large|too long|exceeds",
        "This email is too long to process on this device.",
    ),
];

static RULES: LazyLock<Vec<SanitizerRule>> = LazyLock::new(|| {
    RULE_SOURCES
        .iter()
        .filter_map(|(category, pattern, message)| {
            Regex::new(pattern).ok().map(|pattern| SanitizerRule {
                category: *category,
                pattern,
                message: *message,
            })
        })
        .collect()
});

static STACK_FRAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(at\s+\S+.*|\d+:\s+0x[0-9a-f]+.*|File .*, line \d+.*)$").ok()
});
static ERROR_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[A-Z][A-Za-z0-9]*)?Error:\s*").ok());
static ALL_CAPS_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9_]+$").ok());
static CREDENTIAL_MATERIAL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)sk-[a-z0-9_-]{8,}|AIza[0-9a-z_-]{20,}|bearer\s+\S+|api[_-]?key\s*[:=]\s*\S+|[a-z0-9+/_-]{32,}",
    )
    .ok()
});

pub fn classify(raw: &str) -> Option<ErrorCategory> {
    RULES
        .iter()
        .find(|rule| rule.pattern.is_match(raw))
        .map(|rule| rule.category)
}

/// Never returns raw provider or capability text that could leak a stack frame,
/// an exception class name, or a key.
pub fn sanitize(raw: &str) -> String {
    if let Some(rule) = RULES.iter().find(|rule| rule.pattern.is_match(raw)) {
        return rule.message.to_string();
    }

    readable_first_line(raw).unwrap_or_else(|| GENERIC_MESSAGE.to_string())
}

fn readable_first_line(raw: &str) -> Option<String> {
    let without_frames = match STACK_FRAME.as_ref() {
        Some(stack_frame) => stack_frame.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    };
    let first_line = without_frames
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?;
    let line = match ERROR_PREFIX.as_ref() {
        Some(error_prefix) => error_prefix.replace(first_line, "").trim().to_string(),
        None => first_line.to_string(),
    };

    if line.chars().count() < MIN_READABLE_CHARS {
        return None;
    }
    if ALL_CAPS_TOKEN
        .as_ref()
        .is_none_or(|all_caps| all_caps.is_match(&line))
    {
        return None;
    }
    if CREDENTIAL_MATERIAL
        .as_ref()
        .is_none_or(|credential| credential.is_match(&line))
    {
        return None;
    }

    Some(line)
}

#[cfg(test)]
mod tests {
    use super::{ErrorCategory, GENERIC_MESSAGE, classify, sanitize};

    #[test]
    fn stack_traces_become_the_generic_message() {
        let raw = "TypeError: Cannot read properties of undefined\n    at summarize (content.js:120:15)\n    at async run (content.js:40:3)";
        assert_eq!(classify(raw), Some(ErrorCategory::StackTrace));
        assert_eq!(sanitize(raw), GENERIC_MESSAGE);
    }

    #[test]
    fn known_categories_use_canned_messages() {
        let cases = [
            ("summarize model is still downloading", ErrorCategory::Downloading),
            (
                "summarize capability is unavailable: not supported on this device",
                ErrorCategory::CapabilityUnavailable,
            ),
            ("remote provider credentials are missing or were rejected", ErrorCategory::Credentials),
            ("remote provider returned status 429 (code=rate_limit_exceeded): slow down", ErrorCategory::RateLimit),
            ("capability did not respond within 60000 ms", ErrorCategory::Timeout),
            ("capability session failed: NotReadableError", ErrorCategory::Session),
            ("Unexpected token < in JSON at position 0", ErrorCategory::MalformedJson),
            ("remote provider returned status 503 (code=unknown): no error details", ErrorCategory::ProviderOutage),
            ("remote provider request failed: request_unavailable", ErrorCategory::Network),
            ("Permission denied by user", ErrorCategory::Permission),
            ("content is too short to summarize: 40 chars, minimum 50", ErrorCategory::ContentTooShort),
        ];

        for (raw, expected) in cases {
            assert_eq!(classify(raw), Some(expected), "{raw}");
            assert_ne!(sanitize(raw), raw);
        }
    }

    #[test]
    fn unmatched_readable_messages_keep_their_first_line() {
        assert_eq!(
            sanitize("RangeError: thread has no attachment at index 3\nmore detail"),
            "thread has no attachment at index 3"
        );
    }

    #[test]
    fn unreadable_or_secret_bearing_messages_are_generic() {
        assert_eq!(sanitize("E_INTERNAL_FAILURE"), GENERIC_MESSAGE);
        assert_eq!(sanitize("oops"), GENERIC_MESSAGE);
        assert_eq!(sanitize(""), GENERIC_MESSAGE);
        assert_eq!(
            sanitize("upstream echoed sk-proj-abcdefghijklmnop back to us"),
            GENERIC_MESSAGE
        );
    }
}
