// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::error::Error;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use stateful_tail::init::args::TailArgs;
use stateful_tail::tail::dispatch::{DEFAULT_QUEUE_DEPTH, WorkerPool};
use stateful_tail::tail::{
    FileRecord, InMemoryOffsetStore, LifecycleEvent, RecordConsumer, StatefulReader, TailConfig,
};

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(name = "stateful-tail")]
#[command(bin_name = "stateful-tail")]
#[command(version, about, long_about = None)]
/// Reads `<kind> <path>` lifecycle events from stdin and writes the records
/// of the named files to stdout
struct Arguments {
    #[arg(
        value_enum,
        long,
        env = "STATEFUL_TAIL_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[arg(long, env = "STATEFUL_TAIL_WORKERS", default_value = "4")]
    /// Number of worker threads
    workers: usize,

    #[arg(long, env = "STATEFUL_TAIL_QUEUE_DEPTH", default_value_t = DEFAULT_QUEUE_DEPTH)]
    /// Events queued per worker before the feed blocks
    queue_depth: usize,

    #[arg(long, env = "STATEFUL_TAIL_PRINT_OFFSETS", default_value = "false")]
    /// Print `start end path` for each record instead of its content
    print_offsets: bool,

    #[command(flatten)]
    tail: TailArgs,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

/// Writes records to stdout, one record per locked write
struct StdoutConsumer {
    print_offsets: bool,
    out: io::Stdout,
}

impl StdoutConsumer {
    fn new(print_offsets: bool) -> Self {
        Self {
            print_offsets,
            out: io::stdout(),
        }
    }
}

impl RecordConsumer for StdoutConsumer {
    fn accept(&mut self, record: &FileRecord) {
        let mut out = self.out.lock();
        let result = if self.print_offsets {
            writeln!(
                out,
                "{} {} {}",
                record.start_offset(),
                record.end_offset(),
                record.path().display()
            )
        } else {
            out.write_all(record.payload()).and_then(|_| {
                // cut records carry no delimiter
                if record.is_terminated() {
                    Ok(())
                } else {
                    out.write_all(b"\n")
                }
            })
        };

        if let Err(e) = result {
            warn!(path = ?record.path(), error = %e, "Failed to write record");
        }
    }
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let _guard = match setup_logging(&opt.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(&opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Stateful tail failed.");
            ExitCode::from(1)
        }
    }
}

fn run(opt: &Arguments) -> Result<(), BoxError> {
    let config = TailConfig::from(&opt.tail);
    let print_offsets = opt.print_offsets;
    let consumers = move || StdoutConsumer::new(print_offsets);

    let reader = if opt.tail.tail_in_memory {
        StatefulReader::with_store(Arc::new(InMemoryOffsetStore::new()), &config, consumers)?
    } else {
        StatefulReader::open(&opt.tail.tail_state_path, &config, consumers)?
    };

    info!(
        version = get_version(),
        workers = opt.workers,
        in_memory = opt.tail.tail_in_memory,
        state_path = ?opt.tail.tail_state_path,
        "Starting stateful tail"
    );

    let pool = WorkerPool::spawn(&reader, opt.workers, opt.queue_depth)?;
    let fed = feed(&pool);
    let joined = pool.join();

    if let Err(e) = reader.close() {
        error!(error = %e, "Failed to close stateful reader");
    }

    // A failed worker also fails the feed; report the worker's cause first
    joined?;
    let events = fed?;
    info!(events, "Event feed drained");
    Ok(())
}

/// Read lifecycle events from stdin until EOF and hand them to the pool.
fn feed(pool: &WorkerPool<StdoutConsumer>) -> Result<u64, BoxError> {
    let mut events = 0;
    for line in io::stdin().lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let event: LifecycleEvent = trimmed.parse()?;
        pool.dispatch(event)?;
        events += 1;
    }
    Ok(events)
}

fn setup_logging(log_format: &LogFormatArg) -> Result<WorkerGuard, BoxError> {
    LogTracer::init()?;

    // stdout carries the records
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(io::stderr());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // Skip color codes when not in a terminal
        let use_ansi = io::stderr().is_terminal();

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}
