use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use quotesync_core::{
    ChannelSubscriber, FetchScheduler, MarketDataSync, Symbol, SyncConfig, Update,
};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use crate::cli::WatchArgs;
use crate::error::{CliError, FETCH_FAILED};
use crate::output::NdjsonWriter;

#[derive(Debug, Serialize)]
struct WatchEvent<'a> {
    symbol: &'a Symbol,
    update: &'a Update,
}

struct EventSink<W: io::Write> {
    writer: NdjsonWriter<W>,
    saw_error: bool,
}

impl<W: io::Write> EventSink<W> {
    fn record(&mut self, symbol: &Symbol, update: &Update) -> Result<(), CliError> {
        if matches!(update, Update::State(state) if state.is_error()) {
            self.saw_error = true;
        }
        self.writer.emit(&WatchEvent { symbol, update })
    }
}

pub async fn run(
    args: &WatchArgs,
    sync: MarketDataSync,
    config: &SyncConfig,
) -> Result<ExitCode, CliError> {
    let symbols = args
        .symbols
        .iter()
        .map(|input| Symbol::parse(input))
        .collect::<Result<Vec<_>, _>>()?;
    let dwell = Duration::from_millis(args.dwell_ms);

    let _sweeper = sync.spawn_sweeper();
    let (subscriber, mut updates) = ChannelSubscriber::channel();
    let scheduler = FetchScheduler::new(
        sync,
        Arc::new(subscriber),
        config.debounce(),
        config.refresh_interval(),
    );
    let mut sink = EventSink {
        writer: NdjsonWriter::new(io::stdout()),
        saw_error: false,
    };

    for round in 1..=args.rounds {
        for symbol in &symbols {
            info!(round, symbol = %symbol, dwell_ms = args.dwell_ms, "watching");
            scheduler.on_interest(symbol.clone());
            dwell_on(&mut updates, &mut sink, dwell).await?;
        }
    }

    scheduler.shutdown();
    while let Ok((symbol, update)) = updates.try_recv() {
        sink.record(&symbol, &update)?;
    }

    if sink.saw_error {
        Ok(ExitCode::from(FETCH_FAILED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Streams updates until `dwell` elapses.
async fn dwell_on<W: io::Write>(
    updates: &mut UnboundedReceiver<(Symbol, Update)>,
    sink: &mut EventSink<W>,
    dwell: Duration,
) -> Result<(), CliError> {
    let deadline = tokio::time::sleep(dwell);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return Ok(()),
            received = updates.recv() => match received {
                Some((symbol, update)) => sink.record(&symbol, &update)?,
                None => return Ok(()),
            },
        }
    }
}
