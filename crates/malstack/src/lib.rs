//! MO message transport core.
//!
//! malstack moves typed MO messages between endpoints over pluggable links,
//! using one of three binary wire encodings.
//!
//! # Crate Structure
//!
//! - [`encoding`]: element codecs (`binary`, `fixed`, `spp`), cursors and streams
//! - [`message`]: message header, body and operation descriptors
//! - [`transport`]: endpoints, the send pipeline and socket bindings

/// Re-export encoding types.
pub mod encoding {
    pub use malstack_encoding::*;
}

/// Re-export message types.
pub mod message {
    pub use malstack_message::*;
}

/// Re-export transport types.
pub mod transport {
    pub use malstack_transport::*;
}
