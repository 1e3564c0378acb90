//! Logging for the authorization code client.
//!
//! Every message goes to `tracing`. Hosts that want the raw lines can also
//! register a callback, which receives the level, the message and whether
//! the message contains personally identifiable information. PII-bearing
//! messages are dropped entirely unless PII logging has been enabled.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Severity of a log message, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Failures.
    Error,
    /// Recoverable problems.
    Warning,
    /// Flow milestones.
    Info,
    /// Diagnostic detail.
    Verbose,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
            Self::Verbose => write!(f, "verbose"),
        }
    }
}

/// Host callback: `(level, message, contains_pii)`.
pub type LoggerCallback = Arc<dyn Fn(LogLevel, &str, bool) + Send + Sync>;

/// Logger configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerOptions {
    /// Most verbose level forwarded to the callback.
    pub level: LogLevel,

    /// Whether PII-bearing messages may be emitted at all.
    pub pii_logging_enabled: bool,

    /// Optional host callback.
    #[serde(skip)]
    pub callback: Option<LoggerCallback>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            pii_logging_enabled: false,
            callback: None,
        }
    }
}

impl LoggerOptions {
    /// Sets the level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Enables or disables PII logging.
    #[must_use]
    pub fn with_pii_logging(mut self, enabled: bool) -> Self {
        self.pii_logging_enabled = enabled;
        self
    }

    /// Registers a host callback.
    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(LogLevel, &str, bool) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for LoggerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerOptions")
            .field("level", &self.level)
            .field("pii_logging_enabled", &self.pii_logging_enabled)
            .field("callback", &self.callback.as_ref().map(|_| "..."))
            .finish()
    }
}

/// Logger shared by the client modules.
#[derive(Clone, Debug)]
pub struct Logger {
    options: LoggerOptions,
    correlation_id: Option<String>,
}

impl Logger {
    /// Creates a logger from options.
    #[must_use]
    pub fn new(options: LoggerOptions) -> Self {
        Self {
            options,
            correlation_id: None,
        }
    }

    /// Returns a copy scoped to one correlation id.
    #[must_use]
    pub fn with_correlation_id(&self, correlation_id: impl Into<String>) -> Self {
        Self {
            options: self.options.clone(),
            correlation_id: Some(correlation_id.into()),
        }
    }

    /// The correlation id this logger is scoped to, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns `true` if PII messages are emitted.
    #[must_use]
    pub fn is_pii_enabled(&self) -> bool {
        self.options.pii_logging_enabled
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, false);
    }

    pub fn error_pii(&self, message: &str) {
        self.log(LogLevel::Error, message, true);
    }

    pub fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message, false);
    }

    pub fn warning_pii(&self, message: &str) {
        self.log(LogLevel::Warning, message, true);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, false);
    }

    pub fn info_pii(&self, message: &str) {
        self.log(LogLevel::Info, message, true);
    }

    pub fn verbose(&self, message: &str) {
        self.log(LogLevel::Verbose, message, false);
    }

    pub fn verbose_pii(&self, message: &str) {
        self.log(LogLevel::Verbose, message, true);
    }

    fn log(&self, level: LogLevel, message: &str, contains_pii: bool) {
        if contains_pii && !self.options.pii_logging_enabled {
            return;
        }

        let correlation_id = self.correlation_id.as_deref().unwrap_or("");
        match level {
            LogLevel::Error => tracing::error!(correlation_id, contains_pii, "{}", message),
            LogLevel::Warning => tracing::warn!(correlation_id, contains_pii, "{}", message),
            LogLevel::Info => tracing::info!(correlation_id, contains_pii, "{}", message),
            LogLevel::Verbose => tracing::debug!(correlation_id, contains_pii, "{}", message),
        }

        if level > self.options.level {
            return;
        }

        if let Some(callback) = &self.options.callback {
            let line = match &self.correlation_id {
                Some(id) => format!("[{}] {}", id, message),
                None => message.to_string(),
            };
            callback(level, &line, contains_pii);
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LoggerOptions::default())
    }
}
