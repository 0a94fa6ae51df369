//! Stderr logger for capture runs.
//!
//! Each line reads `[unix_ms +elapsed LEVEL target] message`. The wall-clock
//! column uses the same millisecond epoch as the pair timestamps in stereo
//! file names, so a log line can be matched to the images it produced.
//! Install once at startup with [`init_with_level`].

use std::fmt;
use std::io::Write;
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

struct CaptureLogger {
    level: LevelFilter,
    started: Instant,
}

/// Crate name of a `module::path` target.
fn short_target(target: &str) -> &str {
    target.split("::").next().unwrap_or(target)
}

fn write_line(
    out: &mut impl Write,
    unix_ms: u64,
    elapsed_s: f64,
    level: log::Level,
    target: &str,
    args: fmt::Arguments<'_>,
) -> std::io::Result<()> {
    writeln!(
        out,
        "[{unix_ms} +{elapsed_s:.3}s {level:>5} {}] {args}",
        short_target(target)
    )
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut stderr = std::io::stderr().lock();
        let _ = write_line(
            &mut stderr,
            unix_ms,
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            *record.args(),
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<CaptureLogger> = OnceLock::new();

/// Install the capture logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| CaptureLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install a `tracing` subscriber; `log` records are forwarded into it and
/// every instrumented capture step reports its duration when it closes.
///
/// The filter is taken from `RUST_LOG`, falling back to `default_filter`.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
            .finish()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .with_writer(std::io::stderr)
            .finish()
            .try_init();
    }
}
