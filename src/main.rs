use std::{
    env,
    ffi::OsString,
    fs,
    io::{self, IsTerminal},
    path::PathBuf,
    process::ExitCode,
};

use cachesim::{Cache, CacheConfig, ConfigError, StatsReport, Trace, TraceError};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Args(#[from] pico_args::Error),
    #[error("{name} must be an integer, got {value:?}")]
    NotANumber { name: &'static str, value: OsString },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not open trace {}: {source}", path.display())]
    OpenTrace { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error("could not write stats to {}: {source}", path.display())]
    WriteStats { path: PathBuf, source: io::Error },
    #[error("could not serialize stats: {0}")]
    Json(#[from] serde_json::Error),
}

struct Options {
    json: Option<PathBuf>,
    heartbeat: u64,
    buffer_size: usize,
    queue_size: usize,
    trace: PathBuf,
    config: CacheConfig,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,cachesim=info")),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let prog = env::args_os()
        .next()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cachesim".to_string());

    let result = match parse_args(pico_args::Arguments::from_env()) {
        Ok(Some(opts)) => run(opts),
        Ok(None) => {
            eprintln!("Usage:\n  {prog} <trace> <block size(bytes)> <cache size(bytes)> <ways>");
            return ExitCode::from(1);
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{prog}: {err}");
            ExitCode::from(1)
        }
    }
}

/// `Ok(None)` when the positional arguments are not exactly
/// `<trace> <block size> <cache size> <ways>`.
fn parse_args(mut args: pico_args::Arguments) -> Result<Option<Options>, CliError> {
    let json: Option<PathBuf> = args.opt_value_from_str("--json")?;
    let heartbeat: u64 = args.opt_value_from_str("--heartbeat")?.unwrap_or(0);
    let buffer_size: usize = args
        .opt_value_from_str("--buffer-size")?
        .unwrap_or(1024 * 16);
    let queue_size: usize = args.opt_value_from_str("--queue-size")?.unwrap_or(32);

    let Ok([trace, block_size, cache_size, ways]) = <[OsString; 4]>::try_from(args.finish())
    else {
        return Ok(None);
    };

    let config = CacheConfig::new(
        parse_size("block size", block_size)?,
        parse_size("cache size", cache_size)?,
        parse_size("ways", ways)?,
    )?;

    Ok(Some(Options {
        json,
        heartbeat,
        buffer_size,
        queue_size,
        trace: trace.into(),
        config,
    }))
}

fn parse_size(name: &'static str, value: OsString) -> Result<usize, CliError> {
    let parsed = value.to_str().and_then(|s| s.parse().ok());
    parsed.ok_or(CliError::NotANumber { name, value })
}

fn run(opts: Options) -> Result<(), CliError> {
    // Fail before replaying anything if the report has nowhere to go
    let stats_file = match &opts.json {
        Some(path) => Some(fs::File::create(path).map_err(|source| CliError::WriteStats {
            path: path.clone(),
            source,
        })?),
        None => None,
    };
    let trace = Trace::open(&opts.trace, opts.buffer_size, opts.queue_size).map_err(|source| {
        CliError::OpenTrace {
            path: opts.trace.clone(),
            source,
        }
    })?;
    let mut cache = Cache::new(opts.config);
    let mut next_heartbeat = opts.heartbeat;

    for block in trace.blocks() {
        cache.replay(&block?);

        let accesses = cache.stats().accesses;
        if opts.heartbeat != 0 && accesses >= next_heartbeat {
            info!(accesses, "heartbeat");
            while next_heartbeat <= accesses {
                next_heartbeat += opts.heartbeat;
            }
        }
    }
    trace.finish()?;

    let stats = cache.stats();
    debug!(
        accesses = stats.accesses,
        miss_rate = stats.miss_rate(),
        "finished trace"
    );
    if let Some(stats_file) = stats_file {
        serde_json::to_writer_pretty(stats_file, &StatsReport::new(cache.config(), stats))?;
    }
    println!("{stats}");
    Ok(())
}
