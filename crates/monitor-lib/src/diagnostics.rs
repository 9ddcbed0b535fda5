//! Diagnostics sink for feed errors and warnings
//!
//! Reporting is fire-and-forget: feeds never look at the outcome and keep
//! running whether or not a sink is installed.

use crate::observability::StructuredLogger;

/// Where a reported error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// The query against the member failed
    Poll {
        /// Failures in a row, including this one
        consecutive: u64,
    },
    /// An augmentation function panicked
    Augmentation,
    /// A listener returned an error or panicked
    Listener,
}

/// Context attached to a reported error
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub feed: String,
    pub target: String,
    pub source: ErrorSource,
}

/// Receives errors and warnings raised while feeds run
pub trait DiagnosticsSink: Send + Sync {
    fn report_error(&self, error: &anyhow::Error, context: &ErrorContext);

    fn warn(&self, message: &str);
}

/// Sink that writes everything to the structured log
#[derive(Debug, Clone)]
pub struct TracingSink {
    logger: StructuredLogger,
}

impl TracingSink {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }
}

impl DiagnosticsSink for TracingSink {
    fn report_error(&self, error: &anyhow::Error, context: &ErrorContext) {
        let error = format!("{:#}", error);
        match context.source {
            ErrorSource::Poll { consecutive } => {
                self.logger
                    .log_poll_failed(&context.feed, &context.target, &error, consecutive)
            }
            ErrorSource::Augmentation | ErrorSource::Listener => {
                self.logger.log_listener_failed(&context.feed, &error)
            }
        }
    }

    fn warn(&self, message: &str) {
        self.logger.log_warning(message);
    }
}

/// Report to the sink if one is installed, otherwise straight to tracing
pub(crate) fn report(
    sink: Option<&dyn DiagnosticsSink>,
    error: &anyhow::Error,
    context: &ErrorContext,
) {
    match sink {
        Some(sink) => sink.report_error(error, context),
        None => tracing::warn!(
            feed = %context.feed,
            target = %context.target,
            source = ?context.source,
            error = %error,
            "Feed error"
        ),
    }
}

pub(crate) fn warn(sink: Option<&dyn DiagnosticsSink>, message: &str) {
    match sink {
        Some(sink) => sink.warn(message),
        None => tracing::warn!("{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_sink_accepts_both_sources() {
        let sink = TracingSink::new(StructuredLogger::new("test"));
        let mut context = ErrorContext {
            feed: "heap".to_string(),
            target: "core-1".to_string(),
            source: ErrorSource::Poll { consecutive: 2 },
        };

        sink.report_error(&anyhow::anyhow!("connection refused"), &context);
        context.source = ErrorSource::Listener;
        sink.report_error(&anyhow::anyhow!("listener failed"), &context);
        sink.warn("feed is falling behind");
    }

    #[test]
    fn test_report_without_sink_does_not_panic() {
        let context = ErrorContext {
            feed: "heap".to_string(),
            target: "core-1".to_string(),
            source: ErrorSource::Listener,
        };
        report(None, &anyhow::anyhow!("boom"), &context);
        warn(None, "slow");
    }
}
