//! Anomaly reporting for events that are not errors toward any caller.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

/// Something the transport noticed but did not raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// An inbound message was discarded by an endpoint.
    MessageDropped {
        endpoint: String,
        active: bool,
        has_listener: bool,
        count: usize,
    },

    /// A holder was settled a second time; the later result was ignored.
    DuplicateResult { kept: bool, ignored: bool },

    /// An inbound message addressed an endpoint this transport does not host.
    UnknownDestination { uri: String },
}

/// Receives transport anomalies.
///
/// Implementations must not block: sinks are called from send workers and
/// inbound reader threads.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

/// Default sink: logs every diagnostic at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn record(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::MessageDropped {
                endpoint,
                active,
                has_listener,
                count,
            } => warn!(
                %endpoint,
                active,
                has_listener,
                count,
                "discarding inbound message"
            ),
            Diagnostic::DuplicateResult { kept, ignored } => {
                warn!(kept, ignored, "outgoing message result set twice")
            }
            Diagnostic::UnknownDestination { uri } => {
                warn!(%uri, "no endpoint for inbound message")
            }
        }
    }
}

/// Sink that keeps every diagnostic in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingDiagnostics {
    events: Arc<Mutex<Vec<Diagnostic>>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DiagnosticSink for RecordingDiagnostics {
    fn record(&self, diagnostic: Diagnostic) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}

/// Shared handle to the default sink.
pub fn tracing_sink() -> Arc<dyn DiagnosticSink> {
    Arc::new(TracingDiagnostics)
}
