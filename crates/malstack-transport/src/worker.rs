use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::holder::OutgoingMessageHolder;
use crate::sender::{Interrupt, MessageSender};

/// How long shutdown waits for the worker before escalating.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Owns one sender binding on a dedicated thread.
///
/// Submissions are written in the order they arrive. Every holder that is
/// accepted gets exactly one result, even if the binding panics.
pub(crate) struct SenderWorker {
    label: String,
    queue: Mutex<Option<Sender<Arc<OutgoingMessageHolder>>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    exited: Mutex<Option<Receiver<()>>>,
    interrupt: Option<Arc<dyn Interrupt>>,
}

impl SenderWorker {
    pub(crate) fn spawn(label: String, sender: Box<dyn MessageSender>) -> std::io::Result<Self> {
        let interrupt = sender.interrupt_handle();
        let (tx, rx) = mpsc::channel();
        // Dropped when the thread ends, whether it returns or unwinds.
        let (exit_tx, exit_rx) = mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name(format!("malstack-send:{label}"))
            .spawn({
                let label = label.clone();
                move || {
                    let _exit = exit_tx;
                    run(&label, sender, rx)
                }
            })?;
        debug!(binding = %label, "sender worker started");
        Ok(Self {
            label,
            queue: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
            exited: Mutex::new(Some(exit_rx)),
            interrupt,
        })
    }

    /// Queue a holder; hands it back if the worker has stopped.
    pub(crate) fn submit(
        &self,
        holder: Arc<OutgoingMessageHolder>,
    ) -> Result<(), Arc<OutgoingMessageHolder>> {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.as_ref() {
            Some(tx) => tx.send(holder).map_err(|err| err.0),
            None => Err(holder),
        }
    }

    /// Stop accepting work and close the binding.
    ///
    /// Queued writes get a grace period to finish. A worker still blocked
    /// after that is interrupted, and if it stays blocked it is detached
    /// rather than joined; it settles its remaining holders when the write
    /// finally returns.
    pub(crate) fn shutdown(&self) {
        drop(
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(thread) = thread else {
            return;
        };
        let exited = self
            .exited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(exited) = exited {
            if !finished_within_grace(&exited) {
                match &self.interrupt {
                    Some(interrupt) => {
                        debug!(binding = %self.label, "interrupting blocked sender");
                        interrupt.interrupt();
                    }
                    None => debug!(binding = %self.label, "blocked sender has no interrupt"),
                }
                if !finished_within_grace(&exited) {
                    warn!(binding = %self.label, "sender worker still blocked, detaching");
                    return;
                }
            }
        }

        if thread.join().is_err() {
            warn!(binding = %self.label, "sender worker panicked");
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for SenderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn finished_within_grace(exited: &Receiver<()>) -> bool {
    !matches!(
        exited.recv_timeout(SHUTDOWN_GRACE),
        Err(RecvTimeoutError::Timeout)
    )
}

fn run(label: &str, mut sender: Box<dyn MessageSender>, rx: Receiver<Arc<OutgoingMessageHolder>>) {
    let mut poisoned = false;
    // Runs until every queue handle is gone, so nothing accepted is left unsettled.
    for holder in rx {
        if poisoned {
            holder.set_result(false);
            continue;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            sender.send_encoded_message(&holder)
        }));
        match outcome {
            Ok(Ok(())) => holder.set_result(true),
            Ok(Err(err)) => {
                warn!(binding = %label, error = %err, "failed to send encoded message");
                holder.set_result(false);
            }
            Err(_) => {
                error!(binding = %label, "sender panicked, failing all further messages");
                holder.set_result(false);
                poisoned = true;
            }
        }
    }

    if !poisoned && panic::catch_unwind(AssertUnwindSafe(|| sender.close())).is_err() {
        error!(binding = %label, "sender panicked while closing");
    }
    debug!(binding = %label, poisoned, "sender worker stopped");
}

#[cfg(test)]
mod tests {
    use std::io;

    use bytes::Bytes;

    use super::*;
    use crate::sender::{MemorySender, MemorySink};

    struct Refusing;

    impl MessageSender for Refusing {
        fn send_encoded_message(&mut self, _holder: &OutgoingMessageHolder) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"))
        }

        fn close(&mut self) {}
    }

    struct Exploding;

    impl MessageSender for Exploding {
        fn send_encoded_message(&mut self, _holder: &OutgoingMessageHolder) -> io::Result<()> {
            panic!("binding bug");
        }

        fn close(&mut self) {}
    }

    /// Blocks each write until released; the interrupt releases it with a failure.
    struct Gate {
        entered: mpsc::Sender<()>,
        release: Receiver<()>,
        interrupt: Arc<GateInterrupt>,
    }

    struct GateInterrupt(Mutex<Option<mpsc::Sender<()>>>);

    impl Interrupt for GateInterrupt {
        fn interrupt(&self) {
            self.0.lock().unwrap().take();
        }
    }

    impl MessageSender for Gate {
        fn send_encoded_message(&mut self, _holder: &OutgoingMessageHolder) -> io::Result<()> {
            let _ = self.entered.send(());
            self.release
                .recv()
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "interrupted"))
        }

        fn close(&mut self) {}

        fn interrupt_handle(&self) -> Option<Arc<dyn Interrupt>> {
            let interrupt: Arc<dyn Interrupt> = self.interrupt.clone();
            Some(interrupt)
        }
    }

    fn holder(byte: u8) -> Arc<OutgoingMessageHolder> {
        Arc::new(OutgoingMessageHolder::new(Bytes::from(vec![byte])))
    }

    #[test]
    fn settles_each_holder_in_order() {
        let sink = MemorySink::new();
        let worker =
            SenderWorker::spawn("mem".into(), Box::new(MemorySender::new(sink.clone()))).unwrap();

        let holders: Vec<_> = (0u8..5).map(holder).collect();
        for holder in &holders {
            worker.submit(Arc::clone(holder)).unwrap();
        }
        assert!(holders.iter().all(|h| h.get_result()));
        assert_eq!(
            sink.payloads(),
            (0u8..5).map(|i| Bytes::from(vec![i])).collect::<Vec<_>>()
        );
    }

    #[test]
    fn write_failure_settles_false() {
        let worker = SenderWorker::spawn("refusing".into(), Box::new(Refusing)).unwrap();
        let holder = holder(1);
        worker.submit(Arc::clone(&holder)).unwrap();
        assert!(!holder.get_result());
    }

    #[test]
    fn submit_after_shutdown_returns_holder() {
        let worker = SenderWorker::spawn("gone".into(), Box::new(Refusing)).unwrap();
        worker.shutdown();
        worker.shutdown();
        let returned = worker.submit(holder(0)).unwrap_err();
        assert_eq!(returned.try_result(), None);
        assert_eq!(worker.label(), "gone");
    }

    #[test]
    fn panicking_sender_still_settles_every_holder() {
        let worker = SenderWorker::spawn("exploding".into(), Box::new(Exploding)).unwrap();
        let first = holder(1);
        let second = holder(2);
        worker.submit(Arc::clone(&first)).unwrap();
        worker.submit(Arc::clone(&second)).unwrap();

        assert_eq!(first.get_result_timeout(Duration::from_secs(5)), Some(false));
        assert_eq!(second.get_result_timeout(Duration::from_secs(5)), Some(false));

        let late = holder(3);
        worker.submit(Arc::clone(&late)).unwrap();
        assert_eq!(late.get_result_timeout(Duration::from_secs(5)), Some(false));
        worker.shutdown();
    }

    #[test]
    fn shutdown_interrupts_blocked_write() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Gate {
            entered: entered_tx,
            release: release_rx,
            interrupt: Arc::new(GateInterrupt(Mutex::new(Some(release_tx)))),
        };
        let worker = SenderWorker::spawn("gate".into(), Box::new(gate)).unwrap();

        let pending = holder(1);
        worker.submit(Arc::clone(&pending)).unwrap();
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        worker.shutdown();
        assert_eq!(pending.try_result(), Some(false));
    }

    #[test]
    fn shutdown_detaches_sender_without_interrupt() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        struct Stuck(Receiver<()>);
        impl MessageSender for Stuck {
            fn send_encoded_message(&mut self, _holder: &OutgoingMessageHolder) -> io::Result<()> {
                let _ = self.0.recv();
                Ok(())
            }

            fn close(&mut self) {}
        }

        let worker = SenderWorker::spawn("stuck".into(), Box::new(Stuck(release_rx))).unwrap();
        let pending = holder(1);
        worker.submit(Arc::clone(&pending)).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            worker.shutdown();
            let _ = done_tx.send(());
        });
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("shutdown returns even though the write is stuck");
        assert_eq!(pending.try_result(), None);

        drop(release_tx);
        assert_eq!(pending.get_result_timeout(Duration::from_secs(5)), Some(true));
    }
}
