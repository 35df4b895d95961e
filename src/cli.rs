use clap::{Parser, Subcommand, ValueEnum};

/// Course enrollment scrapers for university registrars and aggregator sites.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Comma-separated university keys to run (default: all)
    #[arg(long, value_delimiter = ',')]
    pub universities: Vec<String>,

    /// Scrape only a small slice of each site
    #[arg(long)]
    pub test_mode: bool,

    /// Skip universities whose output files already exist
    #[arg(long)]
    pub skip_existing: bool,

    /// List available universities and exit
    #[arg(long)]
    pub list: bool,

    /// Run sites that normally require the proxy even when no API key is configured
    #[arg(long, global = true)]
    pub allow_direct: bool,

    /// Skip every pacing delay (dry runs against local fixtures)
    #[arg(long, global = true)]
    pub no_delay: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = default_tracing_format(), global = true)]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Re-scrape one term for one university and merge it into the existing dataset
    Update {
        /// University key, e.g. `princeton`
        #[arg(long)]
        site: String,
        /// Term code or a fragment of its label, e.g. `1262` or `25-26 Fall`
        #[arg(long)]
        term: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    /// Human-readable output
    Pretty,
    /// Newline-delimited JSON
    Json,
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}
