//! Tessera CLI
//!
//! Translates a SQL statement or a search-DSL request body and prints the
//! canonical query tree and aggregation pipeline as JSON.
//!
//! # Usage
//!
//! ```bash
//! tessera --help
//! tessera sql "SELECT host, count(*) FROM logs GROUP BY host"
//! tessera dsl --file request.json
//! echo '{"query": {"match_all": {}}}' | tessera dsl
//! ```

#![deny(unsafe_code)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use shared::clock::SystemClock;
use shared::config::TranslatorConfig;
use shared::query::{
    parse_request, translate_sql, AggregationPipeline, QueryNode, TranslateContext,
};
use std::io::Read;
use std::path::PathBuf;

/// Tessera CLI - translate SQL and search-DSL queries
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Column holding the event time
    #[arg(long, env = "TESSERA_TIMESTAMP_KEY")]
    timestamp_key: Option<String>,

    /// Treat the request as a trace query (time column `startTimeMillis`)
    #[arg(long)]
    trace_query: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a SQL statement
    Sql {
        /// The statement, e.g. "SELECT * FROM logs LIMIT 10"
        statement: String,
    },
    /// Translate a search-DSL request body read from a file or stdin
    Dsl {
        /// File holding the request body
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct SqlOutput<'a> {
    query: &'a QueryNode,
    pipeline: &'a AggregationPipeline,
    columns: &'a [String],
}

#[derive(Serialize)]
struct DslOutput<'a> {
    query: &'a QueryNode,
    pipeline: &'a AggregationPipeline,
    size: u64,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = TranslatorConfig::from_env().context("Failed to load translator config")?;
    if let Some(key) = &cli.timestamp_key {
        config = config.with_timestamp_key(key.clone());
    }
    let ctx = TranslateContext::new(1, &config, &SystemClock).with_trace_query(cli.trace_query);

    let output = match &cli.command {
        Commands::Sql { statement } => {
            let translation =
                translate_sql(statement, &ctx).context("Failed to translate SQL statement")?;
            serde_json::to_string_pretty(&SqlOutput {
                query: &translation.query,
                pipeline: &translation.pipeline,
                columns: &translation.columns,
            })?
        }
        Commands::Dsl { file } => {
            let body = read_body(file.as_ref())?;
            let translation =
                parse_request(&body, &ctx, None).context("Failed to translate search request")?;
            serde_json::to_string_pretty(&DslOutput {
                query: &translation.query,
                pipeline: &translation.pipeline,
                size: translation.size,
            })?
        }
    };
    println!("{output}");

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_body(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read request body from stdin")?;
            Ok(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_sql_command() {
        let cli = Cli::try_parse_from(["tessera", "sql", "SELECT * FROM logs"]).unwrap();
        match cli.command {
            Commands::Sql { statement } => assert_eq!(statement, "SELECT * FROM logs"),
            Commands::Dsl { .. } => panic!("Expected sql command"),
        }
        assert!(!cli.trace_query);
    }

    #[test]
    fn test_cli_dsl_command_with_file() {
        let cli = Cli::try_parse_from([
            "tessera",
            "--trace-query",
            "--json-logs",
            "dsl",
            "--file",
            "body.json",
        ])
        .unwrap();
        assert!(cli.trace_query);
        assert!(cli.json_logs);
        match cli.command {
            Commands::Dsl { file } => assert_eq!(file, Some(PathBuf::from("body.json"))),
            Commands::Sql { .. } => panic!("Expected dsl command"),
        }
    }

    #[test]
    fn test_cli_timestamp_key_flag() {
        let cli = Cli::try_parse_from(["tessera", "--timestamp-key", "ts", "dsl"]).unwrap();
        assert_eq!(cli.timestamp_key.as_deref(), Some("ts"));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["tessera"]).is_err());
    }
}
