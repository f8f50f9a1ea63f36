use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::Url;

use crate::model::parse_outcome::{ParseFailure, ParseResult, ParserMessage};

/// Fixed logic returned in mock mode, independent of the sentence.
pub const MOCK_FOL: &str = "exists x (report(x) ∧ write(alice, x)).\nexists y (data(y) ∧ review(alice, x) ∧ before(write(alice, x), review(alice, y))).";

static MESSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<message\b([^>]*?)/?>").expect("valid regex"));
static ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*"([^"]*)""#).expect("valid regex"));

/// HTTP client for an APE server started with `-httpserver`.
pub struct ParserClient {
    http: Client,
}

impl ParserClient {
    pub fn new(timeout: Duration) -> Result<Self, ParseFailure> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParseFailure::Other(e.to_string()))?;
        Ok(Self { http })
    }

    /// `GET http://{endpoint}/?text=...&solo=fol`, spaces encoded as `+`.
    pub fn parse(&self, sentence: &str, endpoint: &str) -> ParseResult {
        let url = Url::parse_with_params(
            &format!("http://{}/", endpoint),
            &[("text", sentence), ("solo", "fol")],
        )
        .map_err(|e| ParseFailure::Other(format!("invalid parser endpoint {}: {}", endpoint, e)))?;
        tracing::debug!(%url, "querying parser");

        let resp = self.http.get(url).send().map_err(transport_failure)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ParseFailure::HttpStatus(status.as_u16()));
        }

        let body = resp.text().map_err(transport_failure)?;
        classify_response(&body)
    }
}

/// Parse `sentence`, or return [`MOCK_FOL`] without any I/O when `mock` is set.
pub fn parse(sentence: &str, endpoint: &str, mock: bool, timeout: Duration) -> ParseResult {
    if mock {
        return Ok(MOCK_FOL.to_string());
    }
    ParserClient::new(timeout)?.parse(sentence, endpoint)
}

fn transport_failure(e: reqwest::Error) -> ParseFailure {
    if e.is_timeout() {
        ParseFailure::Timeout
    } else if e.is_connect() {
        ParseFailure::ConnectionRefused(e.to_string())
    } else if let Some(status) = e.status() {
        ParseFailure::HttpStatus(status.as_u16())
    } else {
        ParseFailure::Other(e.to_string())
    }
}

/// Split a parser reply into logic or a grammar failure.
///
/// APE reports problems as `<messages><message importance="error" .../></messages>`;
/// warnings alone do not make the reply a failure.
pub fn classify_response(body: &str) -> ParseResult {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::Other("empty response".into()));
    }

    if !trimmed.contains("<messages") {
        return Ok(trimmed.to_string());
    }

    let messages = parse_messages(trimmed);
    if messages.iter().any(ParserMessage::is_error) {
        return Err(ParseFailure::Grammar {
            messages,
            raw: trimmed.to_string(),
        });
    }

    Ok(trimmed.to_string())
}

fn parse_messages(body: &str) -> Vec<ParserMessage> {
    MESSAGE_RE
        .captures_iter(body)
        .map(|caps| {
            let mut message = ParserMessage::default();
            for attr in ATTR_RE.captures_iter(&caps[1]) {
                let value = unescape(&attr[2]);
                match &attr[1] {
                    "importance" => message.importance = value,
                    "type" => message.kind = value,
                    "sentence" => message.sentence = Some(value),
                    "token" => message.token = Some(value),
                    "value" => message.value = value,
                    "repair" => message.repair = Some(value),
                    _ => {}
                }
            }
            message
        })
        .collect()
}

fn unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
