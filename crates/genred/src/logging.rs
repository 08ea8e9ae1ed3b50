//! Subscriber setup for the events the reduction stack emits.
//!
//! Targets and what they carry:
//!
//! | target | level | events |
//! |---|---|---|
//! | `genred`, `genred_engine` | debug | `reduce` and `backward` spans, backend choice, kernel products |
//! | `genred_engine::cache` | debug | plan compilations (cache misses) |
//! | `genred_engine::backend` | trace | tile fan-out per call |
//! | `genred_engine::dispatch` | warn | host staging of device-resident arguments |
//!
//! Available with the `structured-logging` feature:
//!
//! ```no_run
//! use genred::logging::{LogFormat, TracingLogger};
//! use tracing::Level;
//!
//! let _logger = TracingLogger::builder()
//!     .with_format(LogFormat::Json)
//!     .with_engine_level(Level::DEBUG)
//!     .with_reduction_timings(true)
//!     .build()
//!     .expect("logger");
//! ```

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use genred_engine::{ReductionError, ReductionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// One line per event, no colors
    Compact,
    /// JSON lines
    Json,
}

#[derive(Debug, Clone)]
pub struct TracingLoggerBuilder {
    format: LogFormat,
    engine_level: Level,
    plan_cache: bool,
    tiles: bool,
    reduction_timings: bool,
    directives: Option<String>,
}

impl Default for TracingLoggerBuilder {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            engine_level: Level::INFO,
            plan_cache: false,
            tiles: false,
            reduction_timings: false,
            directives: None,
        }
    }
}

impl TracingLoggerBuilder {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Level for the `genred` and `genred_engine` targets. Other crates log at warn.
    pub fn with_engine_level(mut self, level: Level) -> Self {
        self.engine_level = level;
        self
    }

    /// Report every plan compilation.
    pub fn with_plan_cache(mut self, enabled: bool) -> Self {
        self.plan_cache = enabled;
        self
    }

    /// Report how each tiled call was split into blocks.
    pub fn with_tiles(mut self, enabled: bool) -> Self {
        self.tiles = enabled;
        self
    }

    /// Log `reduce`/`backward` span close with busy and idle times.
    ///
    /// The spans are debug level, so this raises the engine level to at
    /// least debug.
    pub fn with_reduction_timings(mut self, enabled: bool) -> Self {
        self.reduction_timings = enabled;
        self
    }

    /// Raw filter directives; replace everything derived from the other options.
    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    /// The filter directives this builder installs.
    pub fn directives(&self) -> String {
        if let Some(raw) = &self.directives {
            return raw.clone();
        }
        let level = if self.reduction_timings && self.engine_level < Level::DEBUG {
            Level::DEBUG
        } else {
            self.engine_level
        };
        let level = level.as_str().to_ascii_lowercase();
        let mut directives = format!("warn,genred={level},genred_engine={level}");
        if self.plan_cache {
            directives.push_str(",genred_engine::cache=debug");
        }
        if self.tiles {
            directives.push_str(",genred_engine::backend=trace");
        }
        directives
    }

    /// Install the subscriber. Fails if one is already installed.
    pub fn build(self) -> ReductionResult<TracingLogger> {
        let filter = EnvFilter::try_new(self.directives())
            .map_err(|e| ReductionError::config(format!("invalid log filter: {}", e)))?;
        let span_events = if self.reduction_timings {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_thread_ids(self.tiles)
            .with_span_events(span_events);
        let registry = tracing_subscriber::registry().with(filter);

        match self.format {
            LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
            LogFormat::Compact => registry.with(layer.with_ansi(false).compact()).try_init(),
            LogFormat::Json => registry.with(layer.json()).try_init(),
        }
        .map_err(|e| ReductionError::config(format!("failed to initialize tracing: {}", e)))?;

        Ok(TracingLogger {
            format: self.format,
        })
    }
}

/// Handle of an installed subscriber.
#[derive(Debug)]
pub struct TracingLogger {
    format: LogFormat,
}

impl TracingLogger {
    pub fn builder() -> TracingLoggerBuilder {
        TracingLoggerBuilder::default()
    }

    /// Compact output; `RUST_LOG` replaces the default filter when set.
    pub fn init() -> ReductionResult<Self> {
        match std::env::var("RUST_LOG") {
            Ok(raw) => Self::builder().with_directives(raw).build(),
            Err(_) => Self::builder().build(),
        }
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            TracingLogger::builder().directives(),
            "warn,genred=info,genred_engine=info"
        );
    }

    #[test]
    fn test_engine_targets() {
        let directives = TracingLogger::builder()
            .with_engine_level(Level::DEBUG)
            .with_plan_cache(true)
            .with_tiles(true)
            .directives();
        assert_eq!(
            directives,
            "warn,genred=debug,genred_engine=debug,genred_engine::cache=debug,genred_engine::backend=trace"
        );
    }

    #[test]
    fn test_timings_raise_level_to_debug() {
        let builder = TracingLogger::builder()
            .with_engine_level(Level::WARN)
            .with_reduction_timings(true);
        assert!(builder.directives().contains("genred_engine=debug"));

        let builder = builder.with_engine_level(Level::TRACE);
        assert!(builder.directives().contains("genred_engine=trace"));
    }

    #[test]
    fn test_raw_directives_win() {
        let builder = TracingLogger::builder()
            .with_plan_cache(true)
            .with_directives("genred_engine::dispatch=warn");
        assert_eq!(builder.directives(), "genred_engine::dispatch=warn");
    }

    #[test]
    fn test_invalid_filter() {
        let err = TracingLogger::builder()
            .with_directives("genred=loudest")
            .build()
            .unwrap_err();
        assert!(matches!(err, ReductionError::Config(_)));
    }
}
