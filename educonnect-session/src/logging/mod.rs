//! Logging setup.
//!
//! Installs a `tracing_subscriber` registry with an `EnvFilter` and either a
//! human-readable or a JSON fmt layer. Timestamps use the local timezone.

use std::sync::OnceLock;

use chrono::Local;
use tracing::debug;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "educonnect_session=info,reqwest=warn";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value. Anything other than `json` is text.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Options for [`init_logging`].
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset. Falls back to
    /// [`DEFAULT_LOG_FILTER`].
    pub directive: Option<String>,
}

/// Initialize the global subscriber.
///
/// Only the first call installs anything; later calls (and calls made after
/// another subscriber was installed, e.g. by a test harness) are no-ops.
pub fn init_logging(options: &LoggingOptions) {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let directive = options
            .directive
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&directive))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        let fmt_layer = match options.format {
            LogFormat::Text => fmt::layer().with_timer(LocalTimer).with_target(true).boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_timer(LocalTimer)
                .with_current_span(true)
                .boxed(),
        };

        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            // Safe to ignore: another subscriber is already installed.
            debug!(error = %e, "Global tracing subscriber already set");
        }
    });
}
