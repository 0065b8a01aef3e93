//! Generic MO transport.
//!
//! Endpoints build and send messages through a [`GenericTransport`], which
//! encodes them with the configured wire format and hands the bytes to the
//! sender binding whose URI prefix matches the destination. Each binding
//! runs on its own worker thread; the sending thread blocks on an
//! [`OutgoingMessageHolder`] until the write completes.
//!
//! Inbound buffers are decoded and delivered to the endpoint named by the
//! destination URI, subject to that endpoint's delivery gate.

pub mod config;
pub mod diagnostics;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod holder;
pub mod sender;
pub mod transport;
mod worker;

#[cfg(unix)]
pub mod socket;
#[cfg(unix)]
pub mod uds;

pub use config::TransportConfig;
pub use diagnostics::{tracing_sink, Diagnostic, DiagnosticSink, RecordingDiagnostics, TracingDiagnostics};
pub use endpoint::{BatchHandle, Endpoint, MessageListener, MessageTransmitter};
pub use error::{standard, FrameError, MultipleTransmitError, Result, TransmitError, TransportError};
pub use frame::{FrameConfig, FrameReader, FrameWriter};
pub use holder::OutgoingMessageHolder;
pub use sender::{Interrupt, MemorySender, MemorySink, MessageSender, StreamSender};
pub use transport::{GenericTransport, InboundDispatcher};

#[cfg(unix)]
pub use sender::UdsSender;
#[cfg(unix)]
pub use socket::SocketStream;
#[cfg(unix)]
pub use uds::UdsListener;
