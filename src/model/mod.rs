pub mod parse_outcome;
pub mod pipeline_output;
