//! CLI command definitions for the `factbank` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod memory;
pub mod status;

use clap::{Parser, Subcommand};

/// Reconciling long-term memory for LLM applications.
#[derive(Parser)]
#[command(name = "factbank", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract facts from text and reconcile them with stored memories.
    Add {
        /// Free-form text, e.g. a conversation turn.
        content: String,
    },

    /// Semantic search over stored memories.
    Search {
        query: String,

        /// Maximum number of results.
        #[arg(long, short = 'k')]
        top_k: Option<usize>,

        /// Maximum cosine distance for a hit.
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// List stored memories, oldest first.
    #[command(alias = "ls")]
    List {
        /// Start after this memory id.
        #[arg(long)]
        cursor: Option<String>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = factbank_types::memory::DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Show a single memory.
    Get {
        id: String,
    },

    /// Delete a memory.
    #[command(alias = "rm")]
    Delete {
        id: String,
    },

    /// Show configuration and store status.
    Status,

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(long, short, default_value_t = 3000)]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_parse_search_with_options() {
        let cli = Cli::try_parse_from([
            "factbank", "search", "tea", "-k", "3", "--threshold", "0.4", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Search {
                query,
                top_k,
                threshold,
            } => {
                assert_eq!(query, "tea");
                assert_eq!(top_k, Some(3));
                assert_eq!(threshold, Some(0.4));
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_parse_list_defaults() {
        let cli = Cli::try_parse_from(["factbank", "-vv", "ls"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::List {
                cursor,
                offset,
                limit,
            } => {
                assert!(cursor.is_none());
                assert_eq!(offset, 0);
                assert_eq!(limit, factbank_types::memory::DEFAULT_LIST_LIMIT);
            }
            _ => panic!("expected list"),
        }
    }
}
