//! MO messages: header, body and the descriptors used to build them.

pub mod error;
pub mod header;
pub mod message;
pub mod operation;
pub mod structures;

pub use error::{ConstructionError, Result};
pub use header::{HeaderFields, MessageHeader, OperationFields};
pub use message::{body_part, BodyPart, BodyReader, Message, MessageBody, QosProperties};
pub use operation::{Area, LookupError, Operation, ResolvedOperation, Service};
pub use structures::{InteractionType, QoSLevel, SessionType};
