//! CLI argument definitions for quotesync.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch snapshots once through the sync pipeline |
//! | `watch` | Page through symbols like a UI and stream every update |
//! | `config` | Print the effective configuration |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | JSON config file layered over defaults |
//! | `--source` | `demo` | Data source (demo, http) |
//! | `--base-url` | none | Snapshot endpoint base URL for `--source http` |
//! | `--identity` | from config | Caller identity charged by the rate limiter |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! quotesync fetch AAPL MSFT --pretty
//! quotesync watch AAPL MSFT NVDA --dwell-ms 2000 --rounds 2
//! quotesync --source http --base-url https://md.example.com fetch AAPL
//! RUST_LOG=quotesync=debug quotesync watch TSLA
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// quotesync - market data sync with caching, coalescing and rate limiting
#[derive(Debug, Parser)]
#[command(
    name = "quotesync",
    author,
    version,
    about = "Market data sync with caching, coalescing and rate limiting",
    long_about = "quotesync fetches market data snapshots through a resilience layer:\n\
\n\
  • TTL result cache and in-flight request coalescing\n\
  • Classified retries with linear or exponential backoff\n\
  • Per-identity rate limiting with a local fallback\n\
  • Debounced, periodically refreshed watching\n\
\n\
Use 'quotesync <command> --help' for command-specific help."
)]
pub struct Cli {
    /// JSON config file; QUOTESYNC_* environment variables override it.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Data source to fetch from.
    #[arg(long, global = true, value_enum, default_value_t = SourceSelector::Demo)]
    pub source: SourceSelector,

    /// Base URL of the snapshot endpoint (required with `--source http`).
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Vendor quota per minute for `--source http`; calls beyond it fail fast.
    #[arg(long, global = true, value_name = "N")]
    pub vendor_quota: Option<u32>,

    /// Simulated latency of the demo source in milliseconds.
    #[arg(long, global = true, default_value_t = 150)]
    pub demo_latency_ms: u64,

    /// Caller identity charged by the rate limiter.
    #[arg(long, global = true)]
    pub identity: Option<String>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceSelector {
    /// Deterministic synthetic snapshots, no network.
    Demo,
    /// JSON snapshot endpoint at `{base-url}/snapshot/{symbol}`.
    Http,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the snapshot for one or more symbols once.
    ///
    /// Prints a JSON array with one result per symbol. Exits with code 3
    /// if any fetch failed.
    ///
    /// # Examples
    ///
    ///   quotesync fetch AAPL
    ///   quotesync fetch AAPL MSFT AAPL --pretty
    Fetch(FetchArgs),

    /// Page through symbols and stream scheduler updates as NDJSON.
    ///
    /// Declares interest in each symbol in turn, waits `--dwell-ms`, and
    /// moves on, the way a user swipes through cards.
    ///
    /// # Examples
    ///
    ///   quotesync watch AAPL MSFT --dwell-ms 3000
    ///   quotesync watch NVDA --dwell-ms 130000 --rounds 1
    Watch(WatchArgs),

    /// Print the effective configuration after file and environment overrides.
    Config,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// One or more market symbols (e.g., AAPL, MSFT, BRK.B).
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Symbols to page through, in order.
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,

    /// How long to stay on each symbol, in milliseconds.
    #[arg(long, default_value_t = 1_500)]
    pub dwell_ms: u64,

    /// How many times to cycle through the symbols.
    #[arg(long, default_value_t = 1)]
    pub rounds: u32,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() {
        let cli = Cli::parse_from([
            "quotesync",
            "watch",
            "AAPL",
            "MSFT",
            "--dwell-ms",
            "250",
            "--source",
            "http",
            "--base-url",
            "http://localhost:8080",
        ]);

        assert_eq!(cli.source, SourceSelector::Http);
        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:8080"));
        match cli.command {
            Command::Watch(args) => {
                assert_eq!(args.symbols, ["AAPL", "MSFT"]);
                assert_eq!(args.dwell_ms, 250);
                assert_eq!(args.rounds, 1);
            }
            other => panic!("expected watch, got {other:?}"),
        }
    }
}
