use thiserror::Error;

use crate::config::settings::{ParserMode, Settings};
use crate::engine::llm_client::{LanguageModel, LlmError};
use crate::engine::parser_client::{self, MOCK_FOL};
use crate::engine::parser_process::{run_oneshot, ParserServer, ProcessError};
use crate::engine::stages;
use crate::model::parse_outcome::ParseResult;
use crate::model::pipeline_output::PipelineOutput;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Rewrite, parse, adjust. Owns nothing but borrowed dependencies.
pub struct Pipeline<'a> {
    llm: &'a dyn LanguageModel,
    settings: &'a Settings,
}

impl<'a> Pipeline<'a> {
    pub fn new(llm: &'a dyn LanguageModel, settings: &'a Settings) -> Self {
        Self { llm, settings }
    }

    /// Convert `sentence` to adjusted logic.
    ///
    /// With `endpoint`, the running parser there is used and left alone;
    /// otherwise one is started for this call and stopped before returning.
    /// A parser failure does not end the run: its text is adjusted like logic
    /// would be, and the failure is kept in [`PipelineOutput::parse`].
    pub fn run(
        &self,
        sentence: &str,
        endpoint: Option<&str>,
        mock: bool,
    ) -> Result<PipelineOutput, PipelineError> {
        if mock {
            return self.run_mock(sentence);
        }

        let rewritten = stages::rewrite(self.llm, sentence)?;
        tracing::info!(%rewritten, "rewrite stage done");

        let parse = self.parse(&rewritten, endpoint)?;
        let logic = match &parse {
            Ok(logic) => logic.clone(),
            Err(failure) => {
                tracing::warn!("{}", failure);
                failure.to_string()
            }
        };

        let adjusted = stages::adjust(self.llm, sentence, &logic)?;
        tracing::info!("adjustment stage done");

        Ok(PipelineOutput {
            rewritten: Some(rewritten),
            parse,
            adjusted,
        })
    }

    // The mock logic does not depend on the sentence, so the rewrite is skipped too.
    fn run_mock(&self, sentence: &str) -> Result<PipelineOutput, PipelineError> {
        let parse = parser_client::parse(
            sentence,
            "",
            true,
            self.settings.parser.request_timeout(),
        );

        let adjusted = if self.settings.pipeline.adjust_in_mock {
            stages::adjust(self.llm, sentence, MOCK_FOL)?
        } else {
            MOCK_FOL.to_string()
        };

        Ok(PipelineOutput {
            rewritten: None,
            parse,
            adjusted,
        })
    }

    fn parse(&self, sentence: &str, endpoint: Option<&str>) -> Result<ParseResult, PipelineError> {
        let parser = &self.settings.parser;

        if let Some(endpoint) = endpoint {
            tracing::debug!(endpoint, "reusing running parser");
            return Ok(parser_client::parse(
                sentence,
                endpoint,
                false,
                parser.request_timeout(),
            ));
        }

        match parser.mode {
            ParserMode::Oneshot => Ok(run_oneshot(parser, sentence)),
            ParserMode::Server => {
                // Dropping `server` on any early return stops the process.
                let mut server = ParserServer::start(parser)?;
                tracing::debug!(port = server.port(), "waiting for parser server");
                server.wait_ready(parser.ready_timeout(), parser.ready_poll_interval())?;

                let result = parser_client::parse(
                    sentence,
                    &server.endpoint(),
                    false,
                    parser.request_timeout(),
                );

                if let Err(e) = server.stop() {
                    tracing::warn!("failed to stop parser server: {}", e);
                }
                Ok(result)
            }
        }
    }
}
