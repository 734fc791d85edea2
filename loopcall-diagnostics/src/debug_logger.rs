//! Structured logging setup

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "loopcall=info,loopcall_core=info,loopcall_media=info,loopcall_signaling=info";

/// Installs the global `tracing` subscriber
#[derive(Debug, Clone)]
pub struct DebugLogger {
    directive: String,
    with_target: bool,
}

impl DebugLogger {
    /// Logger with the default directive
    pub fn new() -> Self {
        Self {
            directive: DEFAULT_DIRECTIVE.to_string(),
            with_target: false,
        }
    }

    /// Filter directive used when `RUST_LOG` is unset
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }

    /// Print event targets
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Active filter: `RUST_LOG` if set and valid, the configured directive otherwise
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.directive))
    }

    /// Install the subscriber; returns `false` if one was already installed
    pub fn init(&self) -> bool {
        tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_target(self.with_target)
            .try_init()
            .is_ok()
    }

    /// Install the subscriber with default settings
    pub fn init_logging() -> bool {
        Self::default().init()
    }
}

impl Default for DebugLogger {
    fn default() -> Self {
        Self::new()
    }
}
