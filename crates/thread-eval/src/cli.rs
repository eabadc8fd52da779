use orchestrator::models::OperationKind;
use thiserror::Error;

/// Where cases get their capability and provider answers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Scripted on-device capabilities and a scripted remote provider.
    Mocked,
    /// On-device capabilities report unavailable; smoke cases hit a real provider.
    Live,
}

impl EvalMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mocked => "mocked",
            Self::Live => "live",
        }
    }
}

/// Which fixture cases to run and how.
#[derive(Debug, Clone)]
pub struct CliOptions {
    pub mode: EvalMode,
    pub update_goldens: bool,
    /// Only run cases whose id contains this substring.
    pub case_filter: Option<String>,
    pub operation_filter: Option<OperationKind>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("unrecognized flag {0}")]
    UnknownFlag(String),
    #[error("{0} needs a value")]
    FlagNeedsValue(&'static str),
    #[error("no eval mode named {0:?}; expected mocked or live")]
    UnknownMode(String),
    #[error("no operation named {0:?}; expected summarize, draft or analyze_attachment")]
    UnknownOperation(String),
    #[error("--case filter is empty")]
    EmptyCaseFilter,
    #[error("goldens are recorded from mocked runs only; drop --update-goldens or --mode live")]
    GoldenUpdateInLiveMode,
    #[error("help requested")]
    HelpRequested,
}

impl CliOptions {
    pub fn parse<I>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self {
            mode: EvalMode::Mocked,
            update_goldens: false,
            case_filter: None,
            operation_filter: None,
        };

        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--help" | "-h" => return Err(CliError::HelpRequested),
                "--mode" => {
                    let value = args.next().ok_or(CliError::FlagNeedsValue("--mode"))?;
                    options.mode = parse_mode(&value)?;
                }
                "--case" => {
                    let value = args.next().ok_or(CliError::FlagNeedsValue("--case"))?;
                    let value = value.trim();
                    if value.is_empty() {
                        return Err(CliError::EmptyCaseFilter);
                    }
                    options.case_filter = Some(value.to_string());
                }
                "--operation" => {
                    let value = args.next().ok_or(CliError::FlagNeedsValue("--operation"))?;
                    options.operation_filter = Some(parse_operation(&value)?);
                }
                "--update-goldens" => options.update_goldens = true,
                other => return Err(CliError::UnknownFlag(other.to_string())),
            }
        }

        if options.update_goldens && options.mode == EvalMode::Live {
            return Err(CliError::GoldenUpdateInLiveMode);
        }
        Ok(options)
    }

    /// Whether a fixture case passes the `--case` and `--operation` filters.
    pub fn selects(&self, case_id: &str, operation: OperationKind) -> bool {
        self.case_filter
            .as_deref()
            .is_none_or(|filter| case_id.contains(filter))
            && self
                .operation_filter
                .is_none_or(|wanted| wanted == operation)
    }

    pub fn describe_filters(&self) -> String {
        match (self.case_filter.as_deref(), self.operation_filter) {
            (Some(case), Some(operation)) => format!("case {case:?} and operation {operation}"),
            (Some(case), None) => format!("case {case:?}"),
            (None, Some(operation)) => format!("operation {operation}"),
            (None, None) => "no filter".to_string(),
        }
    }
}

pub fn usage() -> &'static str {
    "Usage: cargo run -p thread-eval -- [--mode mocked|live] [--case <id-substring>]\n\
     \x20                                 [--operation summarize|draft|analyze_attachment] [--update-goldens]\n\
     \n\
     Runs the email-thread fixture cases in fixtures/cases through the orchestrator.\n\
     \n\
     Modes:\n\
     - mocked (default): scripted on-device capabilities and remote provider,\n\
     \x20 expectation checks, quality checks and golden snapshot comparison\n\
     - live: only cases marked include_in_live_smoke, routed to a real remote provider\n\
     \n\
     Live mode reads THREADWISE_REMOTE_PROVIDER (openai|anthropic|gemini),\n\
     THREADWISE_REMOTE_API_KEY and optionally THREADWISE_REMOTE_MODEL.\n\
     \n\
     Flags:\n\
     - --case <substr>      Only run cases whose id contains <substr>\n\
     - --operation <kind>   Only run cases for one orchestrator operation\n\
     - --update-goldens     Record mocked-mode snapshots into fixtures/goldens\n\
     - --help               Show this help text\n\
     \n\
     Exit status: 0 all cases pass, 1 a case failed, 2 the harness could not run."
}

fn parse_mode(value: &str) -> Result<EvalMode, CliError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "mocked" => Ok(EvalMode::Mocked),
        "live" => Ok(EvalMode::Live),
        _ => Err(CliError::UnknownMode(value.to_string())),
    }
}

fn parse_operation(value: &str) -> Result<OperationKind, CliError> {
    match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "summarize" | "summary" => Ok(OperationKind::Summarize),
        "draft" | "drafts" => Ok(OperationKind::Draft),
        "analyze_attachment" | "attachment" => Ok(OperationKind::AnalyzeAttachment),
        _ => Err(CliError::UnknownOperation(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use orchestrator::models::OperationKind;

    use super::{CliError, CliOptions, EvalMode};

    fn parse(args: &[&str]) -> Result<CliOptions, CliError> {
        CliOptions::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn no_flags_runs_every_case_mocked() {
        let options = parse(&[]).expect("empty args should parse");
        assert_eq!(options.mode, EvalMode::Mocked);
        assert!(!options.update_goldens);
        assert!(options.selects("summarize_too_short", OperationKind::Summarize));
        assert_eq!(options.describe_filters(), "no filter");
    }

    #[test]
    fn case_and_operation_filters_combine() {
        let options = parse(&["--mode", "LIVE", "--case", "remote", "--operation", "draft"])
            .expect("args should parse");

        assert_eq!(options.mode, EvalMode::Live);
        assert!(options.selects("draft_remote_outage_uses_fallback", OperationKind::Draft));
        assert!(!options.selects("draft_model_output", OperationKind::Draft));
        assert!(!options.selects(
            "summarize_local_failure_uses_remote",
            OperationKind::Summarize
        ));
        assert_eq!(
            options.describe_filters(),
            "case \"remote\" and operation draft"
        );
    }

    #[test]
    fn operation_names_accept_short_forms() {
        let options = parse(&["--operation", "Attachment"]).expect("args should parse");
        assert_eq!(
            options.operation_filter,
            Some(OperationKind::AnalyzeAttachment)
        );
        assert_eq!(
            parse(&["--operation", "translate"]).unwrap_err(),
            CliError::UnknownOperation("translate".to_string())
        );
    }

    #[test]
    fn goldens_cannot_be_recorded_from_live_runs() {
        assert_eq!(
            parse(&["--mode", "live", "--update-goldens"]).unwrap_err(),
            CliError::GoldenUpdateInLiveMode
        );
    }

    #[test]
    fn malformed_flags_are_reported() {
        assert_eq!(
            parse(&["--mode"]).unwrap_err(),
            CliError::FlagNeedsValue("--mode")
        );
        assert_eq!(
            parse(&["--case", "  "]).unwrap_err(),
            CliError::EmptyCaseFilter
        );
        assert_eq!(
            parse(&["--verbose"]).unwrap_err(),
            CliError::UnknownFlag("--verbose".to_string())
        );
    }
}
