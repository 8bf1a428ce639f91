use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the first of the standard locations)
    #[clap(long, value_parser)]
    pub config: Option<PathBuf>,

    /// Directory holding engine descriptor files
    #[clap(long, value_parser)]
    pub engines_dir: Option<PathBuf>,

    /// Upstream search backend for descriptor engines without an endpoint
    #[clap(long, value_parser)]
    pub upstream: Option<String>,

    #[clap(long, value_parser)]
    pub log: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve JSON-RPC requests on stdin/stdout
    Serve,
    /// List registered engines
    List,
    /// Run one aggregated search and print the response as JSON
    Search {
        query: String,

        /// Restrict the search to these engines
        #[clap(long = "engine", value_parser)]
        engines: Vec<String>,

        #[clap(long, value_parser)]
        categories: Vec<String>,

        #[clap(long, value_parser, default_value_t = 1)]
        page: u32,

        #[clap(long, value_parser)]
        language: Option<String>,
    },
}
