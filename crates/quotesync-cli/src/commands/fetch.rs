use std::process::ExitCode;
use std::sync::Arc;

use quotesync_core::{FetchError, FetchErrorKind, FetchOutcome, MarketDataSync, Snapshot, Symbol};
use serde::Serialize;

use crate::cli::FetchArgs;
use crate::error::{CliError, FETCH_FAILED};
use crate::output;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum FetchReport {
    Ok {
        symbol: Symbol,
        from_cache: bool,
        retry_count: u32,
        snapshot: Arc<Snapshot>,
    },
    Error {
        symbol: Symbol,
        code: &'static str,
        kind: FetchErrorKind,
        message: String,
        retries: u32,
        retry_after_ms: Option<u64>,
    },
}

impl FetchReport {
    fn new(symbol: Symbol, result: Result<FetchOutcome, FetchError>) -> Self {
        match result {
            Ok(outcome) => Self::Ok {
                symbol,
                from_cache: outcome.from_cache,
                retry_count: outcome.retry_count,
                snapshot: outcome.snapshot,
            },
            Err(error) => Self::Error {
                symbol,
                code: error.code(),
                kind: error.kind(),
                message: error.user_message(),
                retries: error.retries(),
                retry_after_ms: error
                    .retry_after()
                    .map(|wait| u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)),
            },
        }
    }

    fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

pub async fn run(args: &FetchArgs, sync: &MarketDataSync, pretty: bool) -> Result<ExitCode, CliError> {
    // Reject the whole batch before touching the network.
    let symbols = args
        .symbols
        .iter()
        .map(|input| Symbol::parse(input))
        .collect::<Result<Vec<_>, _>>()?;

    let mut reports = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let result = sync.fetch(&symbol).await;
        reports.push(FetchReport::new(symbol, result));
    }

    output::render(&reports, pretty)?;

    if reports.iter().any(FetchReport::is_error) {
        Ok(ExitCode::from(FETCH_FAILED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
