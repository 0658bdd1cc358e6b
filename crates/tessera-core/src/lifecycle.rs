//! Lifecycle engine
//!
//! State transitions and accounting shared by every cryptographic object:
//!
//! ```text
//! PreActive -> Active -> { Deactivated, Compromised } -> { Destroyed, DestroyedCompromised }
//! ```
//!
//! Every method takes `now` in POSIX seconds and stamps the Last Change Date
//! when it succeeds. A failed call leaves the object untouched. Templates have
//! no lifecycle and reject every operation here except destroy, archive,
//! and recover.

use tracing::debug;

use crate::attribute::{Attribute, AttributeName};
use crate::enums::{RevocationReasonCode, State, UsageMask};
use crate::error::{KmsError, KmsResult};
use crate::object::{CryptographicObject, ManagedObject, ObjectKind};
use crate::primitive::PrimitiveValue;
use crate::typed::{RevocationReason, UsageLimits};

/// What the store must do with an object after destroy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// Logically destroyed, keep the row for audit
    Retain,
    /// Physically delete the row
    Remove,
}

/// Initial state from activation and deactivation dates.
///
/// Absent dates never arrive, so they cannot force a state.
pub fn initial_state(activation: Option<i64>, deactivation: Option<i64>, now: i64) -> State {
    if deactivation.is_some_and(|d| d <= now) {
        State::Deactivated
    } else if activation.is_some_and(|a| a <= now) {
        State::Active
    } else {
        State::PreActive
    }
}

impl ManagedObject {
    fn lifecycle_mut(&mut self, operation: &str) -> KmsResult<&mut CryptographicObject> {
        let id = self.unique_id.clone();
        self.cryptographic_mut().ok_or_else(|| {
            KmsError::illegal(format!("{operation} is not defined for template {id}"))
        })
    }

    fn lifecycle(&self, operation: &str) -> KmsResult<&CryptographicObject> {
        self.cryptographic().ok_or_else(|| {
            KmsError::illegal(format!(
                "{operation} is not defined for template {}",
                self.unique_id
            ))
        })
    }

    /// PreActive -> Active
    pub fn activate(&mut self, now: i64) -> KmsResult<()> {
        let body = self.lifecycle_mut("Activate")?;
        if body.state != State::PreActive {
            return Err(KmsError::ObjectNotPreActive(body.state));
        }
        body.state = State::Active;
        body.activation_date = Some(now);
        self.last_change_date = now;
        debug!(unique_id = %self.unique_id, "Object activated");
        Ok(())
    }

    /// Revoke with a reason.
    ///
    /// Key compromise marks the object compromised from any state, including
    /// destroyed ones. Any other reason deactivates a non-terminal object.
    pub fn revoke(
        &mut self,
        reason: RevocationReason,
        compromise_occurrence_date: Option<i64>,
        now: i64,
    ) -> KmsResult<()> {
        let body = self.lifecycle_mut("Revoke")?;
        if reason.code == RevocationReasonCode::KeyCompromise {
            body.state = match body.state {
                State::Destroyed | State::DestroyedCompromised => State::DestroyedCompromised,
                _ => State::Compromised,
            };
            body.compromise_date = Some(now);
            body.compromise_occurrence_date = Some(compromise_occurrence_date.unwrap_or(now));
        } else {
            if body.state.is_terminal() {
                return Err(KmsError::illegal(format!(
                    "cannot revoke an object in state {}",
                    body.state
                )));
            }
            body.state = State::Deactivated;
            body.deactivation_date = Some(now);
        }
        let state = body.state;
        body.revocation_reason = Some(reason);
        self.last_change_date = now;
        debug!(unique_id = %self.unique_id, %state, "Object revoked");
        Ok(())
    }

    /// Destroy the object's key material, or mark a template for removal
    pub fn destroy(&mut self, now: i64) -> KmsResult<DestroyOutcome> {
        let body = match &mut self.kind {
            ObjectKind::Template(_) => return Ok(DestroyOutcome::Remove),
            ObjectKind::SymmetricKey(c)
            | ObjectKind::PrivateKey(c)
            | ObjectKind::PublicKey(c)
            | ObjectKind::SecretData(c) => c,
        };
        body.state = match body.state {
            State::Destroyed | State::DestroyedCompromised => {
                return Err(KmsError::illegal(format!(
                    "object is already in state {}",
                    body.state
                )));
            }
            State::Compromised => State::DestroyedCompromised,
            _ => State::Destroyed,
        };
        body.destroy_date = Some(now);
        body.key_block.destroy_material();
        self.last_change_date = now;
        debug!(unique_id = %self.unique_id, "Object destroyed");
        Ok(DestroyOutcome::Retain)
    }

    /// Set the archive flag
    pub fn archive(&mut self, now: i64) {
        self.archive_date = Some(now);
        self.last_change_date = now;
    }

    /// Clear the archive flag
    pub fn recover(&mut self, now: i64) {
        self.archive_date = None;
        self.last_change_date = now;
    }

    /// Reads fail while the object is archived
    pub fn ensure_readable(&self) -> KmsResult<()> {
        if self.is_archived() {
            return Err(KmsError::ObjectArchived(self.unique_id.to_string()));
        }
        Ok(())
    }

    /// Grant a lease on an active object, returning the lease time in seconds
    pub fn obtain_lease(&mut self, now: i64) -> KmsResult<u32> {
        let body = self.lifecycle_mut("Obtain Lease")?;
        if body.state != State::Active {
            return Err(KmsError::denied(format!(
                "lease requires an active object, state is {}",
                body.state
            )));
        }
        let lease = body.lease_time.unwrap_or(0);
        self.last_change_date = now;
        Ok(lease)
    }

    /// Consume `requested` units from the usage limits.
    ///
    /// Returns the remaining count, or `None` when the object is unlimited.
    pub fn get_usage_allocation(&mut self, requested: i64, now: i64) -> KmsResult<Option<i64>> {
        let body = self.lifecycle_mut("Get Usage Allocation")?;
        if requested < 0 {
            return Err(KmsError::invalid_field(format!(
                "requested usage {requested} is negative"
            )));
        }
        let remaining = match body.usage_limits.as_mut() {
            Some(limits) => {
                limits.consume(requested)?;
                Some(limits.count())
            }
            None => None,
        };
        self.last_change_date = now;
        Ok(remaining)
    }

    /// Candidate attributes that violate the stored constraints, in input order
    pub fn check(&self, candidates: &[Attribute]) -> KmsResult<Vec<Attribute>> {
        let body = self.lifecycle("Check")?;
        let mut violations = Vec::new();
        for candidate in candidates {
            if exceeds(body, candidate)? {
                violations.push(candidate.clone());
            }
        }
        Ok(violations)
    }
}

fn exceeds(body: &CryptographicObject, candidate: &Attribute) -> KmsResult<bool> {
    let violated = match candidate.kind() {
        AttributeName::UsageLimits => {
            let requested = UsageLimits::from_attribute(candidate)?.count();
            body.usage_limits
                .is_some_and(|limits| requested > limits.count())
        }
        AttributeName::CryptographicUsageMask => {
            let requested = candidate
                .value()
                .and_then(PrimitiveValue::as_integer)
                .map(UsageMask)
                .ok_or_else(|| KmsError::invalid_field("usage mask candidate has no value"))?;
            !requested.is_subset_of(body.usage_mask.unwrap_or_default())
        }
        AttributeName::LeaseTime => {
            let requested = candidate
                .value()
                .and_then(PrimitiveValue::as_interval)
                .ok_or_else(|| KmsError::invalid_field("lease time candidate has no value"))?;
            requested > body.lease_time.unwrap_or(0)
        }
        _ => false,
    };
    Ok(violated)
}
