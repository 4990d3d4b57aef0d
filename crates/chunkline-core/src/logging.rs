//! Logging setup: env_logger behind the `log` facade, routed around progress lines

use indicatif::MultiProgress;

/// Verbosity picked from CLI flags; `RUST_LOG` still wins when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Debug,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if debug {
            Self::Debug
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    fn default_filter(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Debug => "debug",
        }
    }
}

fn level_label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

fn level_color(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    }
}

/// Logger that prints through indicatif's `MultiProgress` so stream status
/// lines are not torn by log output.
pub struct ProgressLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl log::Log for ProgressLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{}{}\x1b[0m] {}",
            level_color(record.level()),
            level_label(record.level()),
            record.args()
        );
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

fn builder(verbosity: Verbosity) -> env_logger::Builder {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(verbosity.default_filter()),
    )
}

/// Install the global logger.
///
/// With a `MultiProgress` (TTY) lines are colored and printed above the
/// progress area; without one (pipes, log collectors) lines are plain and
/// timestamped.
pub fn init_logging(verbosity: Verbosity, multi: Option<&MultiProgress>) {
    use std::io::Write;

    match multi {
        Some(multi) => {
            let inner = builder(verbosity).build();
            let max_level = inner.filter();
            let logger = ProgressLogger {
                inner,
                multi: multi.clone(),
            };
            if log::set_boxed_logger(Box::new(logger)).is_ok() {
                log::set_max_level(max_level);
            }
        }
        None => {
            let _ = builder(verbosity)
                .format(|buf, record| {
                    writeln!(
                        buf,
                        "{} [{}] {}",
                        buf.timestamp_millis(),
                        level_label(record.level()),
                        record.args()
                    )
                })
                .try_init();
        }
    }
}
