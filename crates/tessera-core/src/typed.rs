//! Typed views of structured attributes
//!
//! The lifecycle engine stores these typed forms in its slots and converts
//! to and from [`Attribute`] at the edges.

use serde::{Deserialize, Serialize};

use crate::attribute::{Attribute, AttributeName};
use crate::enums::{KmipEnum, LinkType, NameType, RevocationReasonCode, UsageLimitsUnit};
use crate::error::{KmsError, KmsResult};
use crate::identifier::UniqueIdentifier;
use crate::primitive::PrimitiveValue;

fn member<'a>(attribute: &'a Attribute, name: &str) -> KmsResult<&'a PrimitiveValue> {
    attribute.get_value(Some(name))?.ok_or_else(|| {
        KmsError::invalid_field(format!("'{}' is missing '{name}'", attribute.name()))
    })
}

fn enum_member<E: KmipEnum>(attribute: &Attribute, name: &str) -> KmsResult<E> {
    member(attribute, name)?
        .as_enumeration()
        .and_then(|e| e.to::<E>())
        .ok_or_else(|| KmsError::invalid_field(format!("'{name}' has the wrong type")))
}

fn expect_kind(attribute: &Attribute, kind: AttributeName) -> KmsResult<()> {
    if attribute.kind() == kind {
        Ok(())
    } else {
        Err(KmsError::invalid_field(format!(
            "expected '{kind}', got '{}'",
            attribute.name()
        )))
    }
}

/// Consumable usage quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimits {
    unit: UsageLimitsUnit,
    count: i64,
    total: i64,
}

impl UsageLimits {
    /// Build a quota, enforcing `0 <= count <= total`
    pub fn new(unit: UsageLimitsUnit, count: i64, total: i64) -> KmsResult<Self> {
        if count < 0 || count > total {
            return Err(KmsError::invalid_field(format!(
                "usage limits count {count} outside 0..={total}"
            )));
        }
        Ok(Self { unit, count, total })
    }

    pub fn unit(&self) -> UsageLimitsUnit {
        self.unit
    }

    /// Remaining count
    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    /// Consume `requested` units; fails with `PermissionDenied` when not enough remain
    pub fn consume(&mut self, requested: i64) -> KmsResult<()> {
        if requested < 0 {
            return Err(KmsError::invalid_field(format!(
                "requested usage {requested} is negative"
            )));
        }
        if requested > self.count {
            return Err(KmsError::denied(format!(
                "requested usage {requested} exceeds remaining {}",
                self.count
            )));
        }
        self.count -= requested;
        Ok(())
    }

    /// Same unit and total with the count restored to the total
    pub fn replenished(&self) -> Self {
        Self {
            count: self.total,
            ..*self
        }
    }

    pub fn to_attribute(&self) -> KmsResult<Attribute> {
        Attribute::of(AttributeName::UsageLimits)
            .with_value(
                PrimitiveValue::Enumeration(self.unit.into()),
                Some("Usage Limits Unit"),
            )?
            .with_value(
                PrimitiveValue::LongInteger(self.count),
                Some("Usage Limits Count"),
            )?
            .with_value(
                PrimitiveValue::LongInteger(self.total),
                Some("Usage Limits Total"),
            )
    }

    /// Read a usage limits attribute.
    ///
    /// A candidate may omit the unit or total; a missing total defaults to the
    /// count and a missing unit to `Object`.
    pub fn from_attribute(attribute: &Attribute) -> KmsResult<Self> {
        expect_kind(attribute, AttributeName::UsageLimits)?;
        let count = member(attribute, "Usage Limits Count")?
            .as_long_integer()
            .ok_or_else(|| KmsError::invalid_field("'Usage Limits Count' has the wrong type"))?;
        let total = match attribute.get_value(Some("Usage Limits Total"))? {
            Some(v) => v
                .as_long_integer()
                .ok_or_else(|| KmsError::invalid_field("'Usage Limits Total' has the wrong type"))?,
            None => count,
        };
        let unit = match attribute.get_value(Some("Usage Limits Unit"))? {
            Some(_) => enum_member(attribute, "Usage Limits Unit")?,
            None => UsageLimitsUnit::Object,
        };
        Self::new(unit, count, total)
    }
}

/// Typed reference to another managed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub link_type: LinkType,
    pub linked_object: UniqueIdentifier,
}

impl Link {
    pub fn new(link_type: LinkType, linked_object: UniqueIdentifier) -> Self {
        Self {
            link_type,
            linked_object,
        }
    }

    pub fn to_attribute(&self) -> KmsResult<Attribute> {
        Attribute::of(AttributeName::Link)
            .with_value(
                PrimitiveValue::Enumeration(self.link_type.into()),
                Some("Link Type"),
            )?
            .with_value(
                PrimitiveValue::TextString(self.linked_object.to_string()),
                Some("Linked Object Identifier"),
            )
    }

    pub fn from_attribute(attribute: &Attribute) -> KmsResult<Self> {
        expect_kind(attribute, AttributeName::Link)?;
        let link_type = enum_member(attribute, "Link Type")?;
        let linked = member(attribute, "Linked Object Identifier")?
            .as_text()
            .ok_or_else(|| KmsError::invalid_field("'Linked Object Identifier' has the wrong type"))?;
        Ok(Self::new(link_type, UniqueIdentifier::from(linked)))
    }
}

/// Why an object was revoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationReason {
    pub code: RevocationReasonCode,
    pub message: Option<String>,
}

impl RevocationReason {
    pub fn new(code: RevocationReasonCode, message: Option<String>) -> Self {
        Self { code, message }
    }

    pub fn to_attribute(&self) -> KmsResult<Attribute> {
        let attribute = Attribute::of(AttributeName::RevocationReason).with_value(
            PrimitiveValue::Enumeration(self.code.into()),
            Some("Revocation Reason Code"),
        )?;
        match &self.message {
            Some(message) => attribute.with_value(
                PrimitiveValue::TextString(message.clone()),
                Some("Revocation Message"),
            ),
            None => Ok(attribute),
        }
    }
}

/// Build a text-string Name attribute
pub fn name_attribute(value: impl Into<String>) -> KmsResult<Attribute> {
    Attribute::of(AttributeName::Name)
        .with_value(PrimitiveValue::TextString(value.into()), Some("Name Value"))?
        .with_value(
            PrimitiveValue::Enumeration(NameType::UninterpretedTextString.into()),
            Some("Name Type"),
        )
}

/// The Name Value of a Name attribute
pub fn name_value(attribute: &Attribute) -> Option<&str> {
    if attribute.kind() != AttributeName::Name {
        return None;
    }
    attribute
        .get_value(Some("Name Value"))
        .ok()
        .flatten()
        .and_then(PrimitiveValue::as_text)
}
