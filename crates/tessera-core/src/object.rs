//! Managed objects
//!
//! A [`ManagedObject`] carries the identity and bookkeeping shared by every
//! kind of object; [`ObjectKind`] closes over the concrete kinds. The four
//! cryptographic kinds share [`CryptographicObject`], which owns the lifecycle
//! slots and the [`KeyBlock`]. A [`Template`] only holds a flat list of
//! attributes used as a creation preset.

use serde::{Deserialize, Serialize};

use crate::attribute::{Attribute, AttributeName, AttributeSet};
use crate::enums::{CryptographicAlgorithm, KmipEnum, ObjectType, State, UsageMask};
use crate::error::{KmsError, KmsResult};
use crate::identifier::UniqueIdentifier;
use crate::key::KeyBlock;
use crate::primitive::PrimitiveValue;
use crate::typed::{Link, RevocationReason, UsageLimits, name_value};

/// Lifecycle-bearing part of symmetric keys, key pair halves, and secret data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptographicObject {
    pub state: State,
    pub usage_mask: Option<UsageMask>,
    pub lease_time: Option<u32>,
    pub activation_date: Option<i64>,
    pub process_start_date: Option<i64>,
    pub protect_stop_date: Option<i64>,
    pub deactivation_date: Option<i64>,
    pub compromise_occurrence_date: Option<i64>,
    pub compromise_date: Option<i64>,
    pub destroy_date: Option<i64>,
    pub links: Vec<Link>,
    pub revocation_reason: Option<RevocationReason>,
    pub usage_limits: Option<UsageLimits>,
    pub key_block: KeyBlock,
    /// Client attributes with no dedicated slot
    pub other: AttributeSet,
}

impl CryptographicObject {
    /// A pre-active object around `key_block`
    pub fn new(key_block: KeyBlock) -> Self {
        Self {
            state: State::PreActive,
            usage_mask: None,
            lease_time: None,
            activation_date: None,
            process_start_date: None,
            protect_stop_date: None,
            deactivation_date: None,
            compromise_occurrence_date: None,
            compromise_date: None,
            destroy_date: None,
            links: Vec::new(),
            revocation_reason: None,
            usage_limits: None,
            key_block,
            other: AttributeSet::new(),
        }
    }

    /// Add a link unless an identical one is present
    pub fn add_link(&mut self, link: Link) {
        if !self.links.contains(&link) {
            self.links.push(link);
        }
    }

    fn route(&mut self, attribute: Attribute) -> KmsResult<()> {
        let kind = attribute.kind();
        match kind {
            AttributeName::CryptographicAlgorithm => {
                self.ensure_no_material(kind)?;
                let algorithm = attribute
                    .value()
                    .and_then(PrimitiveValue::as_enumeration)
                    .and_then(|e| e.to::<CryptographicAlgorithm>())
                    .ok_or_else(|| wrong_type(kind))?;
                self.key_block.algorithm = Some(algorithm);
            }
            AttributeName::CryptographicLength => {
                self.ensure_no_material(kind)?;
                let length = attribute
                    .value()
                    .and_then(PrimitiveValue::as_integer)
                    .ok_or_else(|| wrong_type(kind))?;
                if length <= 0 {
                    return Err(KmsError::invalid_field(format!(
                        "cryptographic length {length} must be positive"
                    )));
                }
                self.key_block.length = Some(length);
            }
            AttributeName::CryptographicUsageMask => {
                let bits = attribute
                    .value()
                    .and_then(PrimitiveValue::as_integer)
                    .ok_or_else(|| wrong_type(kind))?;
                set_once(&mut self.usage_mask, UsageMask(bits), kind)?;
            }
            AttributeName::LeaseTime => {
                let lease = attribute
                    .value()
                    .and_then(PrimitiveValue::as_interval)
                    .ok_or_else(|| wrong_type(kind))?;
                set_once(&mut self.lease_time, lease, kind)?;
            }
            AttributeName::UsageLimits => {
                let limits = UsageLimits::from_attribute(&attribute)?;
                set_once(&mut self.usage_limits, limits, kind)?;
            }
            AttributeName::ActivationDate => {
                set_once(&mut self.activation_date, date(&attribute)?, kind)?;
            }
            AttributeName::ProcessStartDate => {
                set_once(&mut self.process_start_date, date(&attribute)?, kind)?;
            }
            AttributeName::ProtectStopDate => {
                set_once(&mut self.protect_stop_date, date(&attribute)?, kind)?;
            }
            AttributeName::DeactivationDate => {
                set_once(&mut self.deactivation_date, date(&attribute)?, kind)?;
            }
            AttributeName::Link => {
                self.add_link(Link::from_attribute(&attribute)?);
            }
            AttributeName::ObjectGroup
            | AttributeName::ApplicationSpecificInformation
            | AttributeName::Custom => {
                self.other.insert(attribute);
            }
            AttributeName::ContactInformation | AttributeName::OperationPolicyName => {
                if self.other.named(attribute.name()).next().is_some() {
                    return Err(already_present(kind));
                }
                self.other.insert(attribute);
            }
            AttributeName::Name => {
                return Err(KmsError::illegal("names are held by the managed object"));
            }
            AttributeName::UniqueIdentifier
            | AttributeName::ObjectType
            | AttributeName::State
            | AttributeName::InitialDate
            | AttributeName::DestroyDate
            | AttributeName::CompromiseOccurrenceDate
            | AttributeName::CompromiseDate
            | AttributeName::ArchiveDate
            | AttributeName::LastChangeDate
            | AttributeName::RevocationReason
            | AttributeName::Digest => {
                return Err(KmsError::ReadOnlyAttribute(attribute.name().to_string()));
            }
        }
        Ok(())
    }

    fn ensure_no_material(&self, kind: AttributeName) -> KmsResult<()> {
        if self.key_block.material().is_some() {
            return Err(KmsError::illegal(format!(
                "'{kind}' is fixed once key material exists"
            )));
        }
        Ok(())
    }

    fn render(&self, out: &mut Vec<Attribute>) -> KmsResult<()> {
        out.push(Attribute::single(
            AttributeName::State,
            PrimitiveValue::Enumeration(self.state.into()),
        )?);
        if let Some(algorithm) = self.key_block.algorithm {
            out.push(Attribute::single(
                AttributeName::CryptographicAlgorithm,
                PrimitiveValue::Enumeration(algorithm.into()),
            )?);
        }
        if let Some(length) = self.key_block.length {
            out.push(Attribute::single(
                AttributeName::CryptographicLength,
                PrimitiveValue::Integer(length),
            )?);
        }
        if let Some(mask) = self.usage_mask {
            out.push(Attribute::single(
                AttributeName::CryptographicUsageMask,
                PrimitiveValue::Integer(mask.bits()),
            )?);
        }
        if let Some(lease) = self.lease_time {
            out.push(Attribute::single(
                AttributeName::LeaseTime,
                PrimitiveValue::Interval(lease),
            )?);
        }
        if let Some(limits) = &self.usage_limits {
            out.push(limits.to_attribute()?);
        }
        let dates = [
            (AttributeName::ActivationDate, self.activation_date),
            (AttributeName::ProcessStartDate, self.process_start_date),
            (AttributeName::ProtectStopDate, self.protect_stop_date),
            (AttributeName::DeactivationDate, self.deactivation_date),
            (
                AttributeName::CompromiseOccurrenceDate,
                self.compromise_occurrence_date,
            ),
            (AttributeName::CompromiseDate, self.compromise_date),
            (AttributeName::DestroyDate, self.destroy_date),
        ];
        for (name, value) in dates {
            if let Some(seconds) = value {
                out.push(Attribute::single(name, PrimitiveValue::DateTime(seconds))?);
            }
        }
        if let Some(reason) = &self.revocation_reason {
            out.push(reason.to_attribute()?);
        }
        if let Some(digest) = self.key_block.digest() {
            out.push(digest.to_attribute()?);
        }
        for link in &self.links {
            out.push(link.to_attribute()?);
        }
        out.extend(self.other.iter().cloned());
        Ok(())
    }
}

/// Creation preset: a flat list of attributes, no lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub attributes: Vec<Attribute>,
}

impl Template {
    fn add(&mut self, attribute: Attribute) {
        if attribute.kind().is_multi_instance() {
            if !self.attributes.contains(&attribute) {
                self.attributes.push(attribute);
            }
        } else if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.name() == attribute.name())
        {
            *existing = attribute;
        } else {
            self.attributes.push(attribute);
        }
    }
}

/// The concrete kind of a managed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    SymmetricKey(CryptographicObject),
    PrivateKey(CryptographicObject),
    PublicKey(CryptographicObject),
    SecretData(CryptographicObject),
    Template(Template),
}

impl ObjectKind {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectKind::SymmetricKey(_) => ObjectType::SymmetricKey,
            ObjectKind::PrivateKey(_) => ObjectType::PrivateKey,
            ObjectKind::PublicKey(_) => ObjectType::PublicKey,
            ObjectKind::SecretData(_) => ObjectType::SecretData,
            ObjectKind::Template(_) => ObjectType::Template,
        }
    }

    pub fn cryptographic(&self) -> Option<&CryptographicObject> {
        match self {
            ObjectKind::SymmetricKey(c)
            | ObjectKind::PrivateKey(c)
            | ObjectKind::PublicKey(c)
            | ObjectKind::SecretData(c) => Some(c),
            ObjectKind::Template(_) => None,
        }
    }

    pub fn cryptographic_mut(&mut self) -> Option<&mut CryptographicObject> {
        match self {
            ObjectKind::SymmetricKey(c)
            | ObjectKind::PrivateKey(c)
            | ObjectKind::PublicKey(c)
            | ObjectKind::SecretData(c) => Some(c),
            ObjectKind::Template(_) => None,
        }
    }

    /// Same variant wrapping a different cryptographic body
    pub fn with_body(&self, body: CryptographicObject) -> KmsResult<ObjectKind> {
        match self {
            ObjectKind::SymmetricKey(_) => Ok(ObjectKind::SymmetricKey(body)),
            ObjectKind::PrivateKey(_) => Ok(ObjectKind::PrivateKey(body)),
            ObjectKind::PublicKey(_) => Ok(ObjectKind::PublicKey(body)),
            ObjectKind::SecretData(_) => Ok(ObjectKind::SecretData(body)),
            ObjectKind::Template(_) => Err(KmsError::illegal("templates have no key block")),
        }
    }
}

/// A server-tracked object with identity and lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedObject {
    pub unique_id: UniqueIdentifier,
    pub initial_date: i64,
    pub last_change_date: i64,
    pub names: AttributeSet,
    pub archive_date: Option<i64>,
    pub kind: ObjectKind,
}

impl ManagedObject {
    pub fn new(unique_id: UniqueIdentifier, kind: ObjectKind, now: i64) -> Self {
        Self {
            unique_id,
            initial_date: now,
            last_change_date: now,
            names: AttributeSet::new(),
            archive_date: None,
            kind,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.kind.object_type()
    }

    pub fn cryptographic(&self) -> Option<&CryptographicObject> {
        self.kind.cryptographic()
    }

    pub fn cryptographic_mut(&mut self) -> Option<&mut CryptographicObject> {
        self.kind.cryptographic_mut()
    }

    /// Lifecycle state, `None` for templates
    pub fn state(&self) -> Option<State> {
        self.cryptographic().map(|c| c.state)
    }

    pub fn is_archived(&self) -> bool {
        self.archive_date.is_some()
    }

    /// Name Values of every Name attribute
    pub fn name_values(&self) -> Vec<String> {
        self.names
            .iter()
            .filter_map(name_value)
            .map(str::to_string)
            .collect()
    }

    /// Route a client attribute to its slot
    pub fn add_attribute(&mut self, attribute: Attribute) -> KmsResult<()> {
        let kind = attribute.kind();
        if kind.is_server_managed() {
            return Err(KmsError::ReadOnlyAttribute(attribute.name().to_string()));
        }
        if kind != AttributeName::UsageLimits {
            attribute.require_complete()?;
        }
        if kind == AttributeName::Name {
            self.names.insert(attribute);
            return Ok(());
        }
        match &mut self.kind {
            ObjectKind::Template(template) => {
                template.add(attribute);
                Ok(())
            }
            ObjectKind::SymmetricKey(c)
            | ObjectKind::PrivateKey(c)
            | ObjectKind::PublicKey(c)
            | ObjectKind::SecretData(c) => c.route(attribute),
        }
    }

    /// Render every stored value as attributes
    pub fn attributes(&self) -> KmsResult<Vec<Attribute>> {
        let mut out = vec![
            Attribute::single(
                AttributeName::UniqueIdentifier,
                PrimitiveValue::TextString(self.unique_id.to_string()),
            )?,
            Attribute::single(
                AttributeName::ObjectType,
                PrimitiveValue::Enumeration(self.object_type().into()),
            )?,
        ];
        out.extend(self.names.iter().cloned());
        out.push(Attribute::single(
            AttributeName::InitialDate,
            PrimitiveValue::DateTime(self.initial_date),
        )?);
        match &self.kind {
            ObjectKind::Template(template) => out.extend(template.attributes.iter().cloned()),
            ObjectKind::SymmetricKey(c)
            | ObjectKind::PrivateKey(c)
            | ObjectKind::PublicKey(c)
            | ObjectKind::SecretData(c) => c.render(&mut out)?,
        }
        if let Some(archived) = self.archive_date {
            out.push(Attribute::single(
                AttributeName::ArchiveDate,
                PrimitiveValue::DateTime(archived),
            )?);
        }
        out.push(Attribute::single(
            AttributeName::LastChangeDate,
            PrimitiveValue::DateTime(self.last_change_date),
        )?);
        Ok(out)
    }

    /// Distinct attribute names present on this object
    pub fn attribute_names(&self) -> KmsResult<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for attribute in self.attributes()? {
            if !names.iter().any(|n| n == attribute.name()) {
                names.push(attribute.name().to_string());
            }
        }
        Ok(names)
    }
}

impl std::fmt::Display for ManagedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.object_type().name(), self.unique_id)
    }
}

fn date(attribute: &Attribute) -> KmsResult<i64> {
    attribute
        .value()
        .and_then(PrimitiveValue::as_date_time)
        .ok_or_else(|| wrong_type(attribute.kind()))
}

fn wrong_type(kind: AttributeName) -> KmsError {
    KmsError::invalid_field(format!("'{kind}' holds a value of the wrong type"))
}

fn already_present(kind: AttributeName) -> KmsError {
    KmsError::illegal(format!("'{kind}' is already present"))
}

fn set_once<T>(slot: &mut Option<T>, value: T, kind: AttributeName) -> KmsResult<()> {
    if slot.is_some() {
        return Err(already_present(kind));
    }
    *slot = Some(value);
    Ok(())
}
