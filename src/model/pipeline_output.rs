use crate::model::parse_outcome::ParseResult;

/// Everything a pipeline run produced, stage by stage.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// `None` when the rewrite stage was skipped (mock mode).
    pub rewritten: Option<String>,
    pub parse: ParseResult,
    pub adjusted: String,
}
