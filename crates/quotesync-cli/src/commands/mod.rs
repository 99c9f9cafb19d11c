mod config;
mod fetch;
mod watch;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use quotesync_core::{
    DataSource, HttpSnapshotSource, MarketDataSync, SyncConfig, SyntheticSource, ThrottledSource,
};
use tracing::debug;

use crate::cli::{Cli, Command, SourceSelector};
use crate::error::CliError;

const VENDOR_QUOTA_WINDOW: Duration = Duration::from_secs(60);

pub async fn run(cli: &Cli) -> Result<ExitCode, CliError> {
    let config = load_config(cli)?;

    match &cli.command {
        Command::Fetch(args) => fetch::run(args, &build_sync(cli, &config)?, cli.pretty).await,
        Command::Watch(args) => watch::run(args, build_sync(cli, &config)?, &config).await,
        Command::Config => config::run(&config, cli.pretty),
    }
}

/// File and environment layers, then command-line overrides.
fn load_config(cli: &Cli) -> Result<SyncConfig, CliError> {
    let mut config = SyncConfig::load(cli.config.as_deref())?;
    if let Some(identity) = &cli.identity {
        config.identity = identity.clone();
    }
    config.validate()?;
    Ok(config)
}

fn build_source(cli: &Cli, config: &SyncConfig) -> Result<Arc<dyn DataSource>, CliError> {
    match cli.source {
        SourceSelector::Demo => Ok(Arc::new(SyntheticSource::with_latency(
            Duration::from_millis(cli.demo_latency_ms),
        ))),
        SourceSelector::Http => {
            let base_url = cli.base_url.as_deref().ok_or_else(|| {
                CliError::Usage(String::from("--base-url is required with --source http"))
            })?;
            let source = HttpSnapshotSource::new(base_url).with_timeout(config.request_timeout());
            match cli.vendor_quota {
                Some(0) => Err(CliError::Usage(String::from(
                    "--vendor-quota must be greater than zero",
                ))),
                Some(quota) => {
                    debug!(quota, "pacing http source against vendor quota");
                    Ok(Arc::new(ThrottledSource::new(
                        source,
                        VENDOR_QUOTA_WINDOW,
                        quota,
                    )))
                }
                None => Ok(Arc::new(source)),
            }
        }
    }
}

fn build_sync(cli: &Cli, config: &SyncConfig) -> Result<MarketDataSync, CliError> {
    let source = build_source(cli, config)?;
    Ok(MarketDataSync::builder(source)
        .config(config.clone())
        .build()?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;

    use super::*;

    #[test]
    fn identity_flag_overrides_the_config_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"identity": "from-file", "cache_ttl_ms": 5000}}"#).expect("write");
        let path = file.path().to_string_lossy().into_owned();

        let cli = Cli::parse_from(["quotesync", "--config", &path, "--identity", "desk-7", "config"]);
        let config = load_config(&cli).expect("config loads");

        assert_eq!(config.identity, "desk-7");
        assert_eq!(config.cache_ttl_ms, 5_000);
    }

    #[test]
    fn http_source_requires_a_base_url() {
        let cli = Cli::parse_from(["quotesync", "--source", "http", "fetch", "AAPL"]);
        let error = build_source(&cli, &SyncConfig::default())
            .err()
            .expect("missing base url is rejected");

        assert!(matches!(error, CliError::Usage(_)));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn zero_vendor_quota_is_a_usage_error() {
        let cli = Cli::parse_from([
            "quotesync",
            "--source",
            "http",
            "--base-url",
            "http://localhost:9",
            "--vendor-quota",
            "0",
            "fetch",
            "AAPL",
        ]);

        assert!(matches!(
            build_source(&cli, &SyncConfig::default()),
            Err(CliError::Usage(_))
        ));
    }
}
