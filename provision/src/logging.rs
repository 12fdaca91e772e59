//! Operator-facing log output.
//!
//! Every event goes to two places through one formatter: the console (stdout,
//! coloured when it is a terminal) and the install log file (appended, never
//! coloured). `RUST_LOG` narrows or widens the filter; the default is `info`.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

pub const DEFAULT_FILTER: &str = "info";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const GREEN: &str = "\x1b[0;32m";
const YELLOW: &str = "\x1b[1;33m";
const RED: &str = "\x1b[0;31m";
const RESET: &str = "\x1b[0m";

/// `[YYYY-mm-dd HH:MM:SS] LABEL: message`, one event per line.
#[derive(Debug, Clone, Copy)]
pub struct StampedFormat {
    ansi: bool,
}

impl StampedFormat {
    pub fn new(ansi: bool) -> Self {
        Self { ansi }
    }
}

fn style(level: Level) -> (Option<&'static str>, &'static str) {
    match level {
        Level::ERROR => (Some(RED), "ERROR: "),
        Level::WARN => (Some(YELLOW), "WARNING: "),
        Level::INFO => (Some(GREEN), ""),
        Level::DEBUG => (None, "DEBUG: "),
        Level::TRACE => (None, "TRACE: "),
    }
}

impl<S, N> FormatEvent<S, N> for StampedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let (color, label) = style(*event.metadata().level());
        let color = color.filter(|_| self.ansi);
        if let Some(color) = color {
            write!(writer, "{color}")?;
        }
        write!(
            writer,
            "[{}] {label}",
            Local::now().format(TIMESTAMP_FORMAT)
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        if color.is_some() {
            write!(writer, "{RESET}")?;
        }
        writeln!(writer)
    }
}

/// Registry with the filter, an optional console layer and the file layer.
pub fn build_subscriber(
    filter: EnvFilter,
    file: File,
    console: bool,
) -> impl Subscriber + Send + Sync {
    let console_layer = console.then(|| {
        let ansi = std::io::stdout().is_terminal();
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(ansi)
            .event_format(StampedFormat::new(ansi))
    });
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .event_format(StampedFormat::new(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
}

/// Install the global subscriber, appending to `log_file`.
pub fn init(log_file: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("open log file {}", log_file.display()))?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    build_subscriber(filter, file, true)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
