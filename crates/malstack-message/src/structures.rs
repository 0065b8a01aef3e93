//! MAL enumerations carried in every message header.
//!
//! Each enumeration is encoded as its zero-based ordinal in one UOctet.

use std::fmt;

use malstack_encoding::{DecodeError, DecodeResult, Decodable, Decoder, Encodable, EncodeResult, Encoder};

macro_rules! mal_enumeration {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Zero-based position, as written on the wire.
            pub fn ordinal(self) -> u8 {
                self as u8
            }

            pub fn from_ordinal(ordinal: u8) -> Option<Self> {
                Self::ALL.get(usize::from(ordinal)).copied()
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl Encodable for $name {
            fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
                encoder.encode_uoctet(self.ordinal());
                Ok(())
            }
        }

        impl Decodable for $name {
            fn decode(decoder: &mut Decoder<'_>) -> DecodeResult<Self> {
                let ordinal = decoder.decode_uoctet()?;
                Self::from_ordinal(ordinal).ok_or(DecodeError::InvalidEnum {
                    kind: stringify!($name),
                    ordinal,
                })
            }
        }
    };
}

mal_enumeration!(
    /// Delivery quality requested for a message.
    QoSLevel {
        BestEffort = "BESTEFFORT",
        Assured = "ASSURED",
        Queued = "QUEUED",
        Timely = "TIMELY",
    }
);

mal_enumeration!(
    /// Whether a message belongs to live operations or a simulation/replay.
    SessionType {
        Live = "LIVE",
        Simulation = "SIMULATION",
        Replay = "REPLAY",
    }
);

mal_enumeration!(
    /// Messaging pattern a message takes part in.
    InteractionType {
        Send = "SEND",
        Submit = "SUBMIT",
        Request = "REQUEST",
        Invoke = "INVOKE",
        Progress = "PROGRESS",
        PubSub = "PUBSUB",
    }
);

impl InteractionType {
    /// Highest interaction stage this pattern defines. Stages start at 1.
    pub fn max_stage(self) -> u8 {
        match self {
            InteractionType::Send => 1,
            InteractionType::Submit | InteractionType::Request => 2,
            InteractionType::Invoke => 3,
            InteractionType::Progress => 4,
            // register/ack, publish-register/ack, publish, notify,
            // deregister/ack, publish-deregister/ack
            InteractionType::PubSub => 10,
        }
    }

    pub fn is_valid_stage(self, stage: u8) -> bool {
        (1..=self.max_stage()).contains(&stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use malstack_encoding::{StreamFactory, BINARY};

    #[test]
    fn ordinals_follow_declaration_order() {
        assert_eq!(QoSLevel::BestEffort.ordinal(), 0);
        assert_eq!(QoSLevel::Timely.ordinal(), 3);
        assert_eq!(SessionType::from_ordinal(2), Some(SessionType::Replay));
        assert_eq!(InteractionType::from_ordinal(6), None);
        assert_eq!(InteractionType::PubSub.to_string(), "PUBSUB");
    }

    #[test]
    fn stage_ranges() {
        assert!(InteractionType::Send.is_valid_stage(1));
        assert!(!InteractionType::Send.is_valid_stage(2));
        assert!(!InteractionType::Request.is_valid_stage(0));
        assert!(InteractionType::PubSub.is_valid_stage(10));
    }

    #[test]
    fn invalid_ordinal_is_a_decode_fault() {
        let factory = StreamFactory::new(BINARY);
        let err = factory.decode::<SessionType>(&[9]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidEnum {
                kind: "SessionType",
                ordinal: 9
            }
        ));
    }
}
