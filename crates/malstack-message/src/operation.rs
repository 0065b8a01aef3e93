//! Service area, service and operation descriptors.
//!
//! A message header can be filled from an [`Operation`] instead of explicit
//! numbers. The descriptor chain may be incomplete (an operation registered
//! before its service, for example), so lookups can fail.

use std::sync::Arc;

use crate::structures::InteractionType;

/// A service area: the top-level numbering scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Area {
    pub name: String,
    pub number: u16,
    pub version: u8,
}

/// A service within an area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub number: u16,
    pub area: Option<Arc<Area>>,
}

/// An operation within a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub number: u16,
    pub interaction_type: InteractionType,
    pub service: Option<Arc<Service>>,
}

/// Numbers a header needs from an operation descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOperation {
    pub area: u16,
    pub area_version: u8,
    pub service: u16,
    pub operation: u16,
    pub interaction_type: InteractionType,
}

/// Why an operation descriptor could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("operation '{0}' has no owning service")]
    MissingService(String),

    #[error("service '{0}' has no owning area")]
    MissingArea(String),
}

impl Area {
    pub fn new(name: impl Into<String>, number: u16, version: u8) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            number,
            version,
        })
    }
}

impl Service {
    pub fn new(name: impl Into<String>, number: u16, area: &Arc<Area>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            number,
            area: Some(Arc::clone(area)),
        })
    }
}

impl Operation {
    pub fn new(
        name: impl Into<String>,
        number: u16,
        interaction_type: InteractionType,
        service: &Arc<Service>,
    ) -> Self {
        Self {
            name: name.into(),
            number,
            interaction_type,
            service: Some(Arc::clone(service)),
        }
    }

    /// Walk operation → service → area and collect the header numbers.
    pub fn resolve(&self) -> Result<ResolvedOperation, LookupError> {
        let service = self
            .service
            .as_ref()
            .ok_or_else(|| LookupError::MissingService(self.name.clone()))?;
        let area = service
            .area
            .as_ref()
            .ok_or_else(|| LookupError::MissingArea(service.name.clone()))?;

        Ok(ResolvedOperation {
            area: area.number,
            area_version: area.version,
            service: service.number,
            operation: self.number,
            interaction_type: self.interaction_type,
        })
    }
}
