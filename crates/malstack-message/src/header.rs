use malstack_encoding::{
    Blob, DecodeError, DecodeResult, Decodable, Decoder, Encodable, EncodeResult, Encoder,
    Identifier, Time, Uri,
};

use crate::error::{ConstructionError, Result};
use crate::operation::{Operation, ResolvedOperation};
use crate::structures::{InteractionType, QoSLevel, SessionType};

/// Every header field except the sender URI, given explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderFields {
    pub authentication_id: Blob,
    pub uri_to: Uri,
    pub timestamp: Time,
    pub qos_level: QoSLevel,
    pub priority: u32,
    pub domain: Vec<Identifier>,
    pub network_zone: Identifier,
    pub session: SessionType,
    pub session_name: Identifier,
    pub interaction_type: InteractionType,
    pub interaction_stage: u8,
    pub transaction_id: i64,
    pub service_area: u16,
    pub service: u16,
    pub operation: u16,
    pub service_version: u8,
    pub is_error: bool,
}

impl Default for HeaderFields {
    fn default() -> Self {
        Self {
            authentication_id: Blob::default(),
            uri_to: Uri::default(),
            timestamp: Time::default(),
            qos_level: QoSLevel::BestEffort,
            priority: 0,
            domain: Vec::new(),
            network_zone: Identifier::default(),
            session: SessionType::Live,
            session_name: Identifier::default(),
            interaction_type: InteractionType::Send,
            interaction_stage: 1,
            transaction_id: 0,
            service_area: 0,
            service: 0,
            operation: 0,
            service_version: 0,
            is_error: false,
        }
    }
}

/// Header fields that an [`Operation`] does not supply.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationFields {
    pub authentication_id: Blob,
    pub uri_to: Uri,
    pub timestamp: Time,
    pub qos_level: QoSLevel,
    pub priority: u32,
    pub domain: Vec<Identifier>,
    pub network_zone: Identifier,
    pub session: SessionType,
    pub session_name: Identifier,
    pub interaction_stage: u8,
    pub transaction_id: i64,
    pub is_error: bool,
}

impl Default for OperationFields {
    fn default() -> Self {
        let defaults = HeaderFields::default();
        Self {
            authentication_id: defaults.authentication_id,
            uri_to: defaults.uri_to,
            timestamp: defaults.timestamp,
            qos_level: defaults.qos_level,
            priority: defaults.priority,
            domain: defaults.domain,
            network_zone: defaults.network_zone,
            session: defaults.session,
            session_name: defaults.session_name,
            interaction_stage: defaults.interaction_stage,
            transaction_id: defaults.transaction_id,
            is_error: defaults.is_error,
        }
    }
}

impl OperationFields {
    /// Merge with the numbers resolved from an operation descriptor.
    pub fn into_header_fields(self, op: ResolvedOperation) -> HeaderFields {
        HeaderFields {
            authentication_id: self.authentication_id,
            uri_to: self.uri_to,
            timestamp: self.timestamp,
            qos_level: self.qos_level,
            priority: self.priority,
            domain: self.domain,
            network_zone: self.network_zone,
            session: self.session,
            session_name: self.session_name,
            interaction_type: op.interaction_type,
            interaction_stage: self.interaction_stage,
            transaction_id: self.transaction_id,
            service_area: op.area,
            service: op.service,
            operation: op.operation,
            service_version: op.area_version,
            is_error: self.is_error,
        }
    }
}

/// A validated, immutable message header.
///
/// Both constructors end in the same validation step, so equivalent inputs
/// always produce the same header and the same encoded bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    uri_from: Uri,
    fields: HeaderFields,
}

impl MessageHeader {
    /// Header from explicit field values.
    pub fn new(uri_from: Uri, fields: HeaderFields) -> Result<Self> {
        Self::validated(uri_from, fields)
    }

    /// Header whose interaction type and service numbers come from `op`.
    pub fn for_operation(uri_from: Uri, op: &Operation, fields: OperationFields) -> Result<Self> {
        let resolved = op.resolve().map_err(|source| ConstructionError::Operation {
            operation: op.name.clone(),
            source,
        })?;
        Self::validated(uri_from, fields.into_header_fields(resolved))
    }

    fn validated(uri_from: Uri, fields: HeaderFields) -> Result<Self> {
        check_stage(fields.interaction_type, fields.interaction_stage)?;
        Ok(Self { uri_from, fields })
    }

    pub fn uri_from(&self) -> &Uri {
        &self.uri_from
    }

    pub fn uri_to(&self) -> &Uri {
        &self.fields.uri_to
    }

    pub fn interaction_type(&self) -> InteractionType {
        self.fields.interaction_type
    }

    pub fn interaction_stage(&self) -> u8 {
        self.fields.interaction_stage
    }

    pub fn transaction_id(&self) -> i64 {
        self.fields.transaction_id
    }

    pub fn is_error(&self) -> bool {
        self.fields.is_error
    }

    /// All remaining fields.
    pub fn fields(&self) -> &HeaderFields {
        &self.fields
    }
}

fn check_stage(interaction: InteractionType, stage: u8) -> Result<()> {
    if interaction.is_valid_stage(stage) {
        Ok(())
    } else {
        Err(ConstructionError::InvalidStage { interaction, stage })
    }
}

// Header fields are written directly, in wire order, without presence flags.
impl Encodable for MessageHeader {
    fn encode(&self, enc: &mut Encoder<'_>) -> EncodeResult<()> {
        let f = &self.fields;
        enc.encode_uri(&self.uri_from)?;
        enc.encode_blob(&f.authentication_id)?;
        enc.encode_uri(&f.uri_to)?;
        enc.encode_time(f.timestamp)?;
        enc.encode_element(&f.qos_level)?;
        enc.encode_uinteger(f.priority);
        enc.encode_list(&f.domain)?;
        enc.encode_identifier(&f.network_zone)?;
        enc.encode_element(&f.session)?;
        enc.encode_identifier(&f.session_name)?;
        enc.encode_element(&f.interaction_type)?;
        enc.encode_uoctet(f.interaction_stage);
        enc.encode_long(f.transaction_id);
        enc.encode_ushort(f.service_area);
        enc.encode_ushort(f.service);
        enc.encode_ushort(f.operation);
        enc.encode_uoctet(f.service_version);
        enc.encode_bool(f.is_error);
        Ok(())
    }
}

impl Decodable for MessageHeader {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let uri_from = dec.decode_uri()?;
        let fields = HeaderFields {
            authentication_id: dec.decode_blob()?,
            uri_to: dec.decode_uri()?,
            timestamp: dec.decode_time()?,
            qos_level: dec.decode_element()?,
            priority: dec.decode_uinteger()?,
            domain: dec.decode_list()?,
            network_zone: dec.decode_identifier()?,
            session: dec.decode_element()?,
            session_name: dec.decode_identifier()?,
            interaction_type: dec.decode_element()?,
            interaction_stage: dec.decode_uoctet()?,
            transaction_id: dec.decode_long()?,
            service_area: dec.decode_ushort()?,
            service: dec.decode_ushort()?,
            operation: dec.decode_ushort()?,
            service_version: dec.decode_uoctet()?,
            is_error: dec.decode_bool()?,
        };

        let stage = fields.interaction_stage;
        Self::validated(uri_from, fields).map_err(|_| DecodeError::OutOfRange {
            kind: "InteractionStage",
            value: i128::from(stage),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Area, Service};
    use malstack_encoding::{StreamFactory, BINARY, SPP};

    fn sample_fields() -> HeaderFields {
        HeaderFields {
            authentication_id: Blob::from(vec![0xA5; 4]),
            uri_to: Uri::new("maluds:///tmp/ground.sock/archive"),
            timestamp: Time::from_millis(1_000_500),
            qos_level: QoSLevel::Assured,
            priority: 3,
            domain: vec![Identifier::new("esa"), Identifier::new("mission")],
            network_zone: Identifier::new("ground"),
            session: SessionType::Live,
            session_name: Identifier::new("LIVE"),
            interaction_type: InteractionType::Request,
            interaction_stage: 1,
            transaction_id: 77,
            service_area: 2,
            service: 3,
            operation: 4,
            service_version: 1,
            is_error: false,
        }
    }

    #[test]
    fn invalid_stage_is_rejected() {
        let fields = HeaderFields {
            interaction_type: InteractionType::Send,
            interaction_stage: 2,
            ..HeaderFields::default()
        };
        let err = MessageHeader::new(Uri::new("a"), fields).unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::InvalidStage {
                interaction: InteractionType::Send,
                stage: 2
            }
        ));
    }

    #[test]
    fn unresolved_operation_wraps_cause() {
        let op = Operation {
            name: "orphan".into(),
            number: 1,
            interaction_type: InteractionType::Send,
            service: None,
        };
        let err = MessageHeader::for_operation(Uri::new("a"), &op, OperationFields::default())
            .unwrap_err();
        assert!(matches!(err, ConstructionError::Operation { .. }));
        assert!(err.to_string().contains("orphan"));
    }

    #[test]
    fn header_roundtrips_in_binary_and_spp() {
        let header = MessageHeader::new(Uri::new("maluds:///tmp/sat.sock/app"), sample_fields())
            .expect("header");
        for factory in [StreamFactory::new(BINARY), StreamFactory::new(SPP)] {
            let bytes = factory.encode(&header).expect("encode");
            let decoded: MessageHeader = factory.decode(&bytes).expect("decode");
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn decoded_header_with_bad_stage_is_rejected() {
        let header = MessageHeader::new(Uri::new("a"), sample_fields()).expect("header");
        let factory = StreamFactory::new(SPP);
        let mut bytes = factory.encode(&header).expect("encode").to_vec();
        // Under SPP the stage is followed by a long, three ushorts, the
        // version and the error flag.
        let stage_at = bytes.len() - (1 + 8 + 2 * 3 + 1 + 1);
        bytes[stage_at] = 9;
        assert!(matches!(
            factory.decode::<MessageHeader>(&bytes),
            Err(DecodeError::OutOfRange {
                kind: "InteractionStage",
                value: 9
            })
        ));
    }

    #[test]
    fn operation_path_matches_explicit_path() {
        let area = Area::new("COM", 2, 1);
        let service = Service::new("Archive", 3, &area);
        let op = Operation::new("retrieve", 4, InteractionType::Request, &service);

        let explicit = sample_fields();
        let via_op = OperationFields {
            authentication_id: explicit.authentication_id.clone(),
            uri_to: explicit.uri_to.clone(),
            timestamp: explicit.timestamp,
            qos_level: explicit.qos_level,
            priority: explicit.priority,
            domain: explicit.domain.clone(),
            network_zone: explicit.network_zone.clone(),
            session: explicit.session,
            session_name: explicit.session_name.clone(),
            interaction_stage: explicit.interaction_stage,
            transaction_id: explicit.transaction_id,
            is_error: explicit.is_error,
        };

        let from = Uri::new("maluds:///tmp/sat.sock/app");
        let a = MessageHeader::new(from.clone(), explicit).expect("explicit");
        let b = MessageHeader::for_operation(from, &op, via_op).expect("operation");
        assert_eq!(a, b);

        for format in malstack_encoding::WireFormat::ALL {
            let factory = StreamFactory::new(format);
            assert_eq!(
                factory.encode(&a).expect("encode a"),
                factory.encode(&b).expect("encode b")
            );
        }
    }
}
