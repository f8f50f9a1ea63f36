pub mod llm_client;
pub mod output_parser;
pub mod parser_client;
pub mod parser_process;
pub mod pipeline;
pub mod prompt_builder;
pub mod stages;
