//! Logging setup for the `formlogic` binary.
//!
//! Events go to stderr so `--json` output on stdout stays parseable. The
//! crate's own targets follow the `-q`/`-v` flags; everything else is held at
//! `warn`. Engine pass and rule-match events are emitted at `trace`, so they
//! only appear with `-vv`.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// How much the CLI logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// `-q`: errors only.
    Quiet,
    /// No flag: warnings, including rules that did not settle.
    #[default]
    Normal,
    /// `-v`: storage writes, editor changes and convergence summaries.
    Verbose,
    /// `-vv`: every evaluation pass and matched rule.
    Trace,
}

impl Verbosity {
    /// Level applied to `formlogic` targets.
    #[must_use]
    pub fn level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::ERROR,
            Self::Normal => LevelFilter::WARN,
            Self::Verbose => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    #[must_use]
    pub fn filter_directive(self) -> String {
        format!("warn,formlogic={}", self.level())
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides `verbosity`.
///
/// Calling it again after a subscriber is installed does nothing.
///
/// ```no_run
/// use formlogic::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    // Module targets only help once debug events are visible.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity >= Verbosity::Verbose)
        .try_init();
}

/// Route warnings to the test harness's captured output.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(Verbosity::Normal.filter_directive())
        .with_test_writer()
        .try_init();
}
