use malstack_encoding::{DecodeError, EncodeError};

use crate::operation::LookupError;
use crate::structures::InteractionType;

/// Errors raised while building, encoding or decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    /// The operation descriptor could not be resolved to header numbers.
    #[error("cannot build header for operation '{operation}': {source}")]
    Operation {
        operation: String,
        source: LookupError,
    },

    /// The interaction stage is outside the range of its interaction type.
    #[error("stage {stage} is not valid for {interaction} interactions")]
    InvalidStage {
        interaction: InteractionType,
        stage: u8,
    },

    /// The header or body could not be encoded.
    #[error("message encoding failed: {0}")]
    Encode(#[from] EncodeError),

    /// The received bytes are not a valid message.
    #[error("message decoding failed: {0}")]
    Decode(#[from] DecodeError),
}

pub type Result<T> = std::result::Result<T, ConstructionError>;
