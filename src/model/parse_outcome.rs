use thiserror::Error;

/// One `<message .../>` entry from the parser's error payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserMessage {
    pub importance: String,
    pub kind: String,
    pub sentence: Option<String>,
    pub token: Option<String>,
    pub value: String,
    pub repair: Option<String>,
}

impl ParserMessage {
    pub fn is_error(&self) -> bool {
        self.importance == "error"
    }
}

/// Why the parse stage produced no logic.
///
/// `Display` keeps the legacy "ACE parser error: " wording so the text can be
/// handed to the adjustment stage unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("ACE parser error: request timed out")]
    Timeout,

    #[error("ACE parser error: connection refused ({0})")]
    ConnectionRefused(String),

    #[error("ACE parser error: HTTP status {0}")]
    HttpStatus(u16),

    #[error("ACE parser error: {}", summarize(.messages))]
    Grammar {
        messages: Vec<ParserMessage>,
        raw: String,
    },

    #[error("ACE parser error: binary not found at {0}")]
    BinaryNotFound(String),

    #[error("ACE parser error: parser exited with {}: {stderr}", describe_code(.code))]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("ACE parser error: {0}")]
    Other(String),
}

pub type ParseResult = Result<String, ParseFailure>;

fn summarize(messages: &[ParserMessage]) -> String {
    let errors: Vec<String> = messages
        .iter()
        .filter(|m| m.is_error())
        .map(|m| match &m.repair {
            Some(repair) if !repair.is_empty() => format!("{} ({})", m.value, repair),
            _ => m.value.clone(),
        })
        .collect();

    if errors.is_empty() {
        "grammar error".to_string()
    } else {
        errors.join("; ")
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_legacy_prefix() {
        let failure = ParseFailure::ConnectionRefused("127.0.0.1:9".into());
        assert!(failure.to_string().starts_with("ACE parser error: "));
        assert_eq!(
            ParseFailure::HttpStatus(500).to_string(),
            "ACE parser error: HTTP status 500"
        );
    }

    #[test]
    fn grammar_display_lists_errors_only() {
        let failure = ParseFailure::Grammar {
            messages: vec![
                ParserMessage {
                    importance: "error".into(),
                    kind: "sentence".into(),
                    value: "Every sentence must end with a period.".into(),
                    repair: Some("Add a period.".into()),
                    ..Default::default()
                },
                ParserMessage {
                    importance: "warning".into(),
                    kind: "anaphor".into(),
                    value: "unresolved".into(),
                    ..Default::default()
                },
            ],
            raw: String::new(),
        };

        assert_eq!(
            failure.to_string(),
            "ACE parser error: Every sentence must end with a period. (Add a period.)"
        );
    }

    #[test]
    fn exit_status_without_code_mentions_signal() {
        let failure = ParseFailure::ExitStatus {
            code: None,
            stderr: "killed".into(),
        };
        assert_eq!(
            failure.to_string(),
            "ACE parser error: parser exited with a signal: killed"
        );
    }
}
