use std::path::Path;
use std::time::Duration;

use malstack_encoding::{StreamFactory, UnknownEncoding};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};
use crate::frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};

/// Settings for a [`GenericTransport`](crate::GenericTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Wire encoding: `binary`, `fixed` or `spp`.
    pub encoding: String,
    /// Encode each body part separately and wrap it in a Blob.
    pub wrap_body_parts: bool,
    /// Largest frame payload accepted or produced on socket bindings.
    pub max_payload_size: usize,
    /// Socket write timeout in milliseconds.
    pub write_timeout_ms: Option<u64>,
    /// How long a send waits for its binding before failing as timed out.
    pub delivery_timeout_ms: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            encoding: "binary".to_string(),
            wrap_body_parts: false,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            write_timeout_ms: None,
            delivery_timeout_ms: None,
        }
    }
}

impl TransportConfig {
    /// Load from a JSON file; absent keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw).map_err(|source| TransportError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn stream_factory(&self) -> std::result::Result<StreamFactory, UnknownEncoding> {
        StreamFactory::for_name(&self.encoding)
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_timeout_ms: None,
            write_timeout_ms: self.write_timeout_ms,
        }
    }

    pub fn delivery_timeout(&self) -> Option<Duration> {
        self.delivery_timeout_ms.map(Duration::from_millis)
    }
}
