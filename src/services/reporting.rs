use crate::models::error::{FarmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Receives `(severity, message)` pairs from the core. An interactive host
/// points this at its status bar or report panel; it must not panic.
pub trait ReportSink: Send + Sync {
    fn report(&self, severity: Severity, message: &str);
}

impl<F> ReportSink for F
where
    F: Fn(Severity, &str) + Send + Sync,
{
    fn report(&self, severity: Severity, message: &str) {
        self(severity, message)
    }
}

/// How failures leave the core. Chosen explicitly by the caller:
/// `Sink` converts errors into report messages and lets control flow
/// continue (embedded in a host UI); `Propagate` raises them as error
/// values and drops informational messages (headless batch use).
pub enum Reporter {
    Sink(Box<dyn ReportSink>),
    Propagate,
}

impl Reporter {
    pub fn sink(sink: impl ReportSink + 'static) -> Self {
        Reporter::Sink(Box::new(sink))
    }

    pub fn info(&self, message: &str) {
        if let Reporter::Sink(sink) = self {
            sink.report(Severity::Info, message);
        }
    }

    /// Absorb `err` into the sink, or hand it back to the caller when no
    /// sink was supplied.
    pub fn error(&self, err: FarmError) -> Result<()> {
        match self {
            Reporter::Sink(sink) => {
                sink.report(Severity::Error, &err.to_string());
                Ok(())
            }
            Reporter::Propagate => Err(err),
        }
    }
}
