use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "ace-llm-logic",
    about = "Convert English to adjusted logic using ACE and an LLM"
)]
pub struct Args {
    /// Input file with English text (stdin when omitted)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Use mock logic output instead of calling the parser
    #[arg(long)]
    pub mock: bool,

    /// Reuse a running APE HTTP server instead of starting one
    #[arg(long = "use-http-ape", value_name = "HOST:PORT")]
    pub use_http_ape: Option<String>,

    /// Run the adjustment stage on the mock logic as well
    #[arg(long)]
    pub adjust_in_mock: bool,

    /// Settings file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the default settings file and exit
    #[arg(long)]
    pub init_config: bool,

    /// Check that the LLM endpoint is reachable and exit
    #[arg(long)]
    pub check: bool,

    #[arg(short, long)]
    pub verbose: bool,
}
