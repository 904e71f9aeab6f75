use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Crates whose events honour `--log-level` in full.
const WORKSPACE_TARGETS: [&str; 4] = [
    "aoalink",
    "aoalink_frame",
    "aoalink_session",
    "aoalink_transport",
];

/// Ceiling for events from dependencies.
const DEPENDENCY_CEILING: LevelFilter = LevelFilter::WARN;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Diagnostics written to stderr; stdout carries command output only.
#[derive(Copy, Clone, Debug)]
pub struct LogSettings {
    format: LogFormat,
    level: LogLevel,
}

impl LogSettings {
    pub fn new(format: LogFormat, level: LogLevel) -> Self {
        Self { format, level }
    }

    /// Workspace crates log at the chosen level. Dependencies stay at or
    /// below warnings so `--log-level trace` shows link traffic, not
    /// runtime internals.
    fn targets(&self) -> Targets {
        let level = LevelFilter::from(self.level);
        Targets::new()
            .with_default(level.min(DEPENDENCY_CEILING))
            .with_targets(WORKSPACE_TARGETS.map(|target| (target, level)))
    }

    pub fn init(self) {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_thread_names(true);

        // A second init (tests, embedding) keeps the first subscriber.
        let _ = match self.format {
            LogFormat::Text => tracing_subscriber::registry()
                .with(layer.compact().with_target(false))
                .with(self.targets())
                .try_init(),
            LogFormat::Json => tracing_subscriber::registry()
                .with(layer.json().flatten_event(true).with_current_span(false))
                .with(self.targets())
                .try_init(),
        };
    }
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn workspace_crates_follow_requested_level() {
        let targets = LogSettings::new(LogFormat::Text, LogLevel::Trace).targets();
        assert!(targets.would_enable("aoalink_transport::link", &Level::TRACE));
        assert!(targets.would_enable("aoalink_session::manager", &Level::DEBUG));
        assert!(targets.would_enable("aoalink", &Level::TRACE));
    }

    #[test]
    fn dependencies_are_capped_at_warn() {
        let targets = LogSettings::new(LogFormat::Json, LogLevel::Debug).targets();
        assert!(targets.would_enable("tokio::runtime", &Level::WARN));
        assert!(!targets.would_enable("tokio::runtime", &Level::INFO));
    }

    #[test]
    fn quiet_level_applies_everywhere() {
        let targets = LogSettings::new(LogFormat::Text, LogLevel::Error).targets();
        assert!(!targets.would_enable("aoalink_session", &Level::WARN));
        assert!(!targets.would_enable("crossbeam_channel", &Level::WARN));
        assert!(targets.would_enable("aoalink_session", &Level::ERROR));
    }
}
