use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::diagnostics::{tracing_sink, Diagnostic, DiagnosticSink};

/// An encoded message waiting for transmission, plus its one-shot outcome.
///
/// The sending side posts `true` or `false` exactly once with
/// [`set_result`](Self::set_result); the submitting side blocks on
/// [`get_result`](Self::get_result). A second post is reported to the
/// diagnostics sink and otherwise ignored.
pub struct OutgoingMessageHolder {
    payload: Bytes,
    slot: Mutex<Option<bool>>,
    settled: Condvar,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl OutgoingMessageHolder {
    pub fn new(payload: Bytes) -> Self {
        Self::with_diagnostics(payload, tracing_sink())
    }

    pub fn with_diagnostics(payload: Bytes, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            payload,
            slot: Mutex::new(None),
            settled: Condvar::new(),
            diagnostics,
        }
    }

    /// The encoded message.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Post the transmission outcome. Only the first call counts.
    pub fn set_result(&self, sent: bool) {
        let mut slot = self.lock_slot();
        if let Some(kept) = *slot {
            drop(slot);
            self.diagnostics.record(Diagnostic::DuplicateResult {
                kept,
                ignored: sent,
            });
            return;
        }
        *slot = Some(sent);
        drop(slot);
        self.settled.notify_all();
    }

    /// Block until an outcome has been posted.
    pub fn get_result(&self) -> bool {
        let mut slot = self.lock_slot();
        loop {
            if let Some(sent) = *slot {
                return sent;
            }
            slot = self
                .settled
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`get_result`](Self::get_result), giving up after `timeout`.
    pub fn get_result_timeout(&self, timeout: Duration) -> Option<bool> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock_slot();
        loop {
            if let Some(sent) = *slot {
                return Some(sent);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = self
                .settled
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// The posted outcome, if any, without waiting.
    pub fn try_result(&self) -> Option<bool> {
        *self.lock_slot()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<bool>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for OutgoingMessageHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingMessageHolder")
            .field("payload_len", &self.payload.len())
            .field("result", &self.try_result())
            .finish()
    }
}
