use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};

use crate::cli::args::Args;
use crate::cli::input;
use crate::config::settings::Settings;
use crate::config::settings_io::{load_settings, save_settings, settings_path};
use crate::engine::llm_client::{ChatClient, LanguageModel, LlmError};
use crate::engine::pipeline::Pipeline;
use crate::model::parse_outcome::ParseFailure;
use crate::model::pipeline_output::PipelineOutput;

/// How a completed run ended, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    ParserFailed,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::ParserFailed => ExitCode::from(2),
        }
    }
}

/// Used when the run never reaches the LLM, so no API key is required.
struct OfflineModel {
    api_key_env: String,
}

impl LanguageModel for OfflineModel {
    fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::MissingApiKey(self.api_key_env.clone()))
    }
}

pub fn run(args: Args) -> Result<Outcome> {
    let path = args.config.clone().unwrap_or_else(settings_path);

    if args.init_config {
        save_settings(&path, &Settings::default())?;
        println!("Wrote default settings to {}", path.display());
        return Ok(Outcome::Success);
    }

    let mut settings = load_settings(&path)?;
    if args.adjust_in_mock {
        settings.pipeline.adjust_in_mock = true;
    }

    if args.check {
        let client = ChatClient::from_settings(&settings.llm)?;
        println!("{}", client.check_connection()?);
        return Ok(Outcome::Success);
    }

    let stdin = io::stdin();
    execute(&args, &settings, stdin.lock(), io::stdout().lock())
}

fn execute<R: BufRead, W: Write>(
    args: &Args,
    settings: &Settings,
    stdin: R,
    mut out: W,
) -> Result<Outcome> {
    let text = match &args.file {
        Some(path) => input::read_file(path)?,
        None => {
            eprintln!("Enter your sentence (Ctrl+D to end):");
            input::read_lines(stdin).context("failed to read stdin")?
        }
    };
    if text.is_empty() {
        bail!("no input sentence given");
    }

    let llm: Box<dyn LanguageModel> = if args.mock && !settings.pipeline.adjust_in_mock {
        Box::new(OfflineModel {
            api_key_env: settings.llm.api_key_env.clone(),
        })
    } else {
        Box::new(ChatClient::from_settings(&settings.llm)?)
    };

    let output = Pipeline::new(llm.as_ref(), settings).run(
        &text,
        args.use_http_ape.as_deref(),
        args.mock,
    )?;

    tracing::debug!(rewritten = ?output.rewritten, "pipeline finished");
    print_output(&mut out, &output)?;
    Ok(outcome(&output))
}

fn print_output<W: Write>(out: &mut W, output: &PipelineOutput) -> io::Result<()> {
    writeln!(out, "\n--- Final Adjusted Logic ---")?;
    writeln!(out, "{}", output.adjusted)?;
    out.flush()
}

fn outcome(output: &PipelineOutput) -> Outcome {
    match &output.parse {
        Ok(_) => Outcome::Success,
        Err(failure) => {
            tracing::error!("parse stage failed: {}", failure);
            if let ParseFailure::Grammar { messages, raw } = failure {
                for m in messages {
                    tracing::info!(
                        importance = %m.importance,
                        kind = %m.kind,
                        sentence = ?m.sentence,
                        token = ?m.token,
                        repair = ?m.repair,
                        "{}",
                        m.value
                    );
                }
                tracing::debug!(%raw, "raw parser reply");
            }
            Outcome::ParserFailed
        }
    }
}
