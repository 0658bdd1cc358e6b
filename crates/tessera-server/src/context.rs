//! Per-request state
//!
//! One [`RequestContext`] lives for one request batch. It carries the caller's
//! credential and the ID placeholder: the identifier most recently assigned
//! while processing the batch, used by later items that name no target.

use uuid::Uuid;

use tessera_core::{Credential, KmsError, KmsResult, UniqueIdentifier};
use tessera_logging::CorrelationContext;

/// State shared by the items of one request batch
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    credential: Option<Credential>,
    placeholder: Option<UniqueIdentifier>,
    correlation: CorrelationContext,
}

impl RequestContext {
    pub fn new(credential: Option<Credential>) -> Self {
        let request_id = Uuid::new_v4();
        Self {
            request_id,
            credential,
            placeholder: None,
            correlation: CorrelationContext::with_trace_id(request_id),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Root correlation context of the batch
    pub fn correlation(&self) -> &CorrelationContext {
        &self.correlation
    }

    pub fn placeholder(&self) -> Option<&UniqueIdentifier> {
        self.placeholder.as_ref()
    }

    /// Record a newly assigned identifier
    pub fn set_placeholder(&mut self, id: UniqueIdentifier) {
        self.placeholder = Some(id);
    }

    /// The explicit target, or the placeholder when none is given
    pub fn resolve(&self, explicit: Option<&str>) -> KmsResult<UniqueIdentifier> {
        match explicit {
            Some(id) => Ok(UniqueIdentifier::from(id)),
            None => self
                .placeholder
                .clone()
                .ok_or(KmsError::UniqueIdentifierMissing),
        }
    }
}
