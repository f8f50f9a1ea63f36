use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub parser: ParserSettings,
    pub pipeline: PipelineSettings,
}

/// Chat-completions endpoint used by the rewrite and adjustment stages.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,

    // Name of the variable holding the key, never the key itself.
    pub api_key_env: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            temperature: 0.3,
            timeout_secs: 60,
            api_key_env: "OPENAI_API_KEY".into(),
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParserMode {
    /// Long-running HTTP server on an ephemeral port.
    #[default]
    Server,
    /// One process per sentence, sentence on stdin, logic on stdout.
    Oneshot,
}

/// How to launch and talk to the APE binary.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ParserSettings {
    pub executable: String,
    pub host: String,
    pub mode: ParserMode,

    /// `{port}` is replaced with the chosen port.
    pub server_args: Vec<String>,
    pub oneshot_args: Vec<String>,

    pub request_timeout_secs: u64,
    pub ready_timeout_secs: u64,
    pub ready_poll_ms: u64,
    pub stop_timeout_secs: u64,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            executable: "./ape.exe".into(),
            host: "127.0.0.1".into(),
            mode: ParserMode::Server,
            server_args: vec!["-httpserver".into(), "-port".into(), "{port}".into()],
            oneshot_args: vec!["-solo".into(), "fol".into()],
            request_timeout_secs: 30,
            ready_timeout_secs: 10,
            ready_poll_ms: 100,
            stop_timeout_secs: 5,
        }
    }
}

impl ParserSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn server_args_for(&self, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.server_args
            .iter()
            .map(|arg| arg.replace("{port}", &port))
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Run the adjustment stage on the mock logic instead of returning it as is.
    pub adjust_in_mock: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_placeholder_is_substituted() {
        let parser = ParserSettings::default();
        assert_eq!(
            parser.server_args_for(40123),
            vec!["-httpserver", "-port", "40123"]
        );
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "parser": { "mode": "oneshot", "executable": "/opt/ape" } }"#)
                .unwrap();

        assert_eq!(settings.parser.mode, ParserMode::Oneshot);
        assert_eq!(settings.parser.executable, "/opt/ape");
        assert_eq!(settings.parser.request_timeout_secs, 30);
        assert_eq!(settings.llm, LlmSettings::default());
        assert!(!settings.pipeline.adjust_in_mock);
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let parser = ParserSettings {
            ready_poll_ms: 0,
            ..Default::default()
        };
        assert_eq!(parser.ready_poll_interval(), Duration::from_millis(1));
    }
}
