//! Attribute model
//!
//! An [`Attribute`] is a named, typed structure of one or more members, each
//! holding an optional [`PrimitiveValue`]. Single-value attributes such as
//! "Lease Time" have exactly one member named after the attribute itself;
//! structured attributes such as "Usage Limits" address their members by name.
//!
//! The known attributes and their member layouts live in the
//! [`AttributeName`] registry. Names starting with `x-` or `y-` are custom
//! attributes holding a single text string.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::enums::{EnumKind, normalize_name};
use crate::error::{KmsError, KmsResult};
use crate::primitive::{PrimitiveType, PrimitiveValue};

/// Tag carried by every custom attribute
pub const CUSTOM_ATTRIBUTE_TAG: u32 = 0x0042_002D;

/// Every attribute the server understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeName {
    UniqueIdentifier,
    Name,
    ObjectType,
    CryptographicAlgorithm,
    CryptographicLength,
    CryptographicUsageMask,
    LeaseTime,
    UsageLimits,
    State,
    InitialDate,
    ActivationDate,
    ProcessStartDate,
    ProtectStopDate,
    DeactivationDate,
    DestroyDate,
    CompromiseOccurrenceDate,
    CompromiseDate,
    ArchiveDate,
    LastChangeDate,
    RevocationReason,
    Digest,
    Link,
    ObjectGroup,
    ApplicationSpecificInformation,
    ContactInformation,
    OperationPolicyName,
    Custom,
}

type MemberLayout = &'static [(&'static str, PrimitiveType)];

impl AttributeName {
    /// Every registered attribute except [`AttributeName::Custom`]
    pub const KNOWN: &'static [AttributeName] = &[
        AttributeName::UniqueIdentifier,
        AttributeName::Name,
        AttributeName::ObjectType,
        AttributeName::CryptographicAlgorithm,
        AttributeName::CryptographicLength,
        AttributeName::CryptographicUsageMask,
        AttributeName::LeaseTime,
        AttributeName::UsageLimits,
        AttributeName::State,
        AttributeName::InitialDate,
        AttributeName::ActivationDate,
        AttributeName::ProcessStartDate,
        AttributeName::ProtectStopDate,
        AttributeName::DeactivationDate,
        AttributeName::DestroyDate,
        AttributeName::CompromiseOccurrenceDate,
        AttributeName::CompromiseDate,
        AttributeName::ArchiveDate,
        AttributeName::LastChangeDate,
        AttributeName::RevocationReason,
        AttributeName::Digest,
        AttributeName::Link,
        AttributeName::ObjectGroup,
        AttributeName::ApplicationSpecificInformation,
        AttributeName::ContactInformation,
        AttributeName::OperationPolicyName,
    ];

    /// Canonical attribute name
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeName::UniqueIdentifier => "Unique Identifier",
            AttributeName::Name => "Name",
            AttributeName::ObjectType => "Object Type",
            AttributeName::CryptographicAlgorithm => "Cryptographic Algorithm",
            AttributeName::CryptographicLength => "Cryptographic Length",
            AttributeName::CryptographicUsageMask => "Cryptographic Usage Mask",
            AttributeName::LeaseTime => "Lease Time",
            AttributeName::UsageLimits => "Usage Limits",
            AttributeName::State => "State",
            AttributeName::InitialDate => "Initial Date",
            AttributeName::ActivationDate => "Activation Date",
            AttributeName::ProcessStartDate => "Process Start Date",
            AttributeName::ProtectStopDate => "Protect Stop Date",
            AttributeName::DeactivationDate => "Deactivation Date",
            AttributeName::DestroyDate => "Destroy Date",
            AttributeName::CompromiseOccurrenceDate => "Compromise Occurrence Date",
            AttributeName::CompromiseDate => "Compromise Date",
            AttributeName::ArchiveDate => "Archive Date",
            AttributeName::LastChangeDate => "Last Change Date",
            AttributeName::RevocationReason => "Revocation Reason",
            AttributeName::Digest => "Digest",
            AttributeName::Link => "Link",
            AttributeName::ObjectGroup => "Object Group",
            AttributeName::ApplicationSpecificInformation => "Application Specific Information",
            AttributeName::ContactInformation => "Contact Information",
            AttributeName::OperationPolicyName => "Operation Policy Name",
            AttributeName::Custom => "Custom Attribute",
        }
    }

    /// Protocol tag
    pub fn tag(self) -> u32 {
        match self {
            AttributeName::UniqueIdentifier => 0x0042_0094,
            AttributeName::Name => 0x0042_0053,
            AttributeName::ObjectType => 0x0042_0057,
            AttributeName::CryptographicAlgorithm => 0x0042_0028,
            AttributeName::CryptographicLength => 0x0042_002A,
            AttributeName::CryptographicUsageMask => 0x0042_002C,
            AttributeName::LeaseTime => 0x0042_0049,
            AttributeName::UsageLimits => 0x0042_0095,
            AttributeName::State => 0x0042_008D,
            AttributeName::InitialDate => 0x0042_0042,
            AttributeName::ActivationDate => 0x0042_0001,
            AttributeName::ProcessStartDate => 0x0042_0067,
            AttributeName::ProtectStopDate => 0x0042_0068,
            AttributeName::DeactivationDate => 0x0042_002F,
            AttributeName::DestroyDate => 0x0042_0033,
            AttributeName::CompromiseOccurrenceDate => 0x0042_0022,
            AttributeName::CompromiseDate => 0x0042_0021,
            AttributeName::ArchiveDate => 0x0042_0005,
            AttributeName::LastChangeDate => 0x0042_0048,
            AttributeName::RevocationReason => 0x0042_0081,
            AttributeName::Digest => 0x0042_0034,
            AttributeName::Link => 0x0042_004A,
            AttributeName::ObjectGroup => 0x0042_0056,
            AttributeName::ApplicationSpecificInformation => 0x0042_0004,
            AttributeName::ContactInformation => 0x0042_0020,
            AttributeName::OperationPolicyName => 0x0042_005D,
            AttributeName::Custom => CUSTOM_ATTRIBUTE_TAG,
        }
    }

    /// Member names and types, in positional order.
    ///
    /// Single-value attributes report one member named after the attribute.
    fn layout(self) -> MemberLayout {
        use PrimitiveType as T;
        match self {
            AttributeName::UniqueIdentifier => &[("Unique Identifier", T::TextString)],
            AttributeName::Name => &[
                ("Name Value", T::TextString),
                ("Name Type", T::Enumeration(EnumKind::NameType)),
            ],
            AttributeName::ObjectType => &[("Object Type", T::Enumeration(EnumKind::ObjectType))],
            AttributeName::CryptographicAlgorithm => &[(
                "Cryptographic Algorithm",
                T::Enumeration(EnumKind::CryptographicAlgorithm),
            )],
            AttributeName::CryptographicLength => &[("Cryptographic Length", T::Integer)],
            AttributeName::CryptographicUsageMask => &[("Cryptographic Usage Mask", T::Integer)],
            AttributeName::LeaseTime => &[("Lease Time", T::Interval)],
            AttributeName::UsageLimits => &[
                (
                    "Usage Limits Unit",
                    T::Enumeration(EnumKind::UsageLimitsUnit),
                ),
                ("Usage Limits Count", T::LongInteger),
                ("Usage Limits Total", T::LongInteger),
            ],
            AttributeName::State => &[("State", T::Enumeration(EnumKind::State))],
            AttributeName::InitialDate => &[("Initial Date", T::DateTime)],
            AttributeName::ActivationDate => &[("Activation Date", T::DateTime)],
            AttributeName::ProcessStartDate => &[("Process Start Date", T::DateTime)],
            AttributeName::ProtectStopDate => &[("Protect Stop Date", T::DateTime)],
            AttributeName::DeactivationDate => &[("Deactivation Date", T::DateTime)],
            AttributeName::DestroyDate => &[("Destroy Date", T::DateTime)],
            AttributeName::CompromiseOccurrenceDate => {
                &[("Compromise Occurrence Date", T::DateTime)]
            }
            AttributeName::CompromiseDate => &[("Compromise Date", T::DateTime)],
            AttributeName::ArchiveDate => &[("Archive Date", T::DateTime)],
            AttributeName::LastChangeDate => &[("Last Change Date", T::DateTime)],
            AttributeName::RevocationReason => &[
                (
                    "Revocation Reason Code",
                    T::Enumeration(EnumKind::RevocationReasonCode),
                ),
                ("Revocation Message", T::TextString),
            ],
            AttributeName::Digest => &[
                (
                    "Hashing Algorithm",
                    T::Enumeration(EnumKind::HashingAlgorithm),
                ),
                ("Digest Value", T::ByteString),
            ],
            AttributeName::Link => &[
                ("Link Type", T::Enumeration(EnumKind::LinkType)),
                ("Linked Object Identifier", T::TextString),
            ],
            AttributeName::ObjectGroup => &[("Object Group", T::TextString)],
            AttributeName::ApplicationSpecificInformation => &[
                ("Application Namespace", T::TextString),
                ("Application Data", T::TextString),
            ],
            AttributeName::ContactInformation => &[("Contact Information", T::TextString)],
            AttributeName::OperationPolicyName => &[("Operation Policy Name", T::TextString)],
            AttributeName::Custom => &[("Custom Attribute", T::TextString)],
        }
    }

    /// Member names in positional order
    pub fn member_names(self) -> impl Iterator<Item = &'static str> {
        self.layout().iter().map(|(name, _)| *name)
    }

    /// True for attributes with more than one member
    pub fn is_structure(self) -> bool {
        self.layout().len() > 1
    }

    /// Attributes an object may carry several instances of
    pub fn is_multi_instance(self) -> bool {
        matches!(
            self,
            AttributeName::Name
                | AttributeName::Link
                | AttributeName::ObjectGroup
                | AttributeName::ApplicationSpecificInformation
                | AttributeName::Custom
        )
    }

    /// Attributes only the server may set
    pub fn is_server_managed(self) -> bool {
        matches!(
            self,
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
                | AttributeName::Digest
        )
    }

    /// Resolve a client-supplied attribute name
    pub fn lookup(name: &str) -> Option<AttributeName> {
        if is_custom_name(name) {
            return Some(AttributeName::Custom);
        }
        let wanted = normalize_name(name);
        AttributeName::KNOWN
            .iter()
            .copied()
            .find(|a| normalize_name(a.as_str()) == wanted)
    }

    /// Resolve a member name to its attribute and the canonical member name
    pub fn lookup_member(member: &str) -> Option<(AttributeName, &'static str)> {
        let wanted = normalize_name(member);
        AttributeName::KNOWN.iter().copied().find_map(|a| {
            a.member_names()
                .find(|m| normalize_name(m) == wanted)
                .map(|m| (a, m))
        })
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custom attribute names carry an `x-` (client) or `y-` (server) prefix
pub fn is_custom_name(name: &str) -> bool {
    let lower = name.trim_start().to_ascii_lowercase();
    lower.starts_with("x-") || lower.starts_with("y-")
}

/// Shape of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Single,
    Structure,
}

/// One named, typed slot of an attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeMember {
    pub name: String,
    pub ty: PrimitiveType,
    pub value: Option<PrimitiveValue>,
}

/// A named, typed attribute made of one or more members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    kind: AttributeName,
    tag: u32,
    members: Vec<AttributeMember>,
    index: Option<u32>,
}

impl Attribute {
    /// An empty attribute of a registered kind
    pub fn of(kind: AttributeName) -> Self {
        let members = kind
            .layout()
            .iter()
            .map(|(name, ty)| AttributeMember {
                name: (*name).to_string(),
                ty: *ty,
                value: None,
            })
            .collect();
        Self {
            name: kind.as_str().to_string(),
            kind,
            tag: kind.tag(),
            members,
            index: None,
        }
    }

    /// An empty attribute resolved from a client-supplied name
    pub fn new(name: &str) -> KmsResult<Self> {
        match AttributeName::lookup(name) {
            Some(AttributeName::Custom) => Ok(Self::custom_empty(name.trim())),
            Some(kind) => Ok(Self::of(kind)),
            None => Err(KmsError::UnknownAttribute(name.to_string())),
        }
    }

    fn custom_empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AttributeName::Custom,
            tag: CUSTOM_ATTRIBUTE_TAG,
            members: vec![AttributeMember {
                name: name.to_string(),
                ty: PrimitiveType::TextString,
                value: None,
            }],
            index: None,
        }
    }

    /// A custom attribute with its text value
    pub fn custom(name: &str, value: impl Into<String>) -> KmsResult<Self> {
        if !is_custom_name(name) {
            return Err(KmsError::UnknownAttribute(name.to_string()));
        }
        let mut attribute = Self::custom_empty(name.trim());
        attribute.set_value(PrimitiveValue::TextString(value.into()), None)?;
        Ok(attribute)
    }

    /// A single-value attribute holding `value`
    pub fn single(kind: AttributeName, value: PrimitiveValue) -> KmsResult<Self> {
        let mut attribute = Self::of(kind);
        attribute.set_value(value, None)?;
        Ok(attribute)
    }

    /// Builder form of [`Attribute::set_value`]
    pub fn with_value(mut self, value: PrimitiveValue, member: Option<&str>) -> KmsResult<Self> {
        self.set_value(value, member)?;
        Ok(self)
    }

    /// Attach a protocol display index
    pub fn with_index(mut self, index: Option<u32>) -> Self {
        self.index = index;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttributeName {
        self.kind
    }

    pub fn shape(&self) -> AttributeKind {
        if self.members.len() > 1 {
            AttributeKind::Structure
        } else {
            AttributeKind::Single
        }
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }

    pub fn members(&self) -> &[AttributeMember] {
        &self.members
    }

    fn member_position(&self, member: &str) -> KmsResult<usize> {
        let wanted = normalize_name(member);
        self.members
            .iter()
            .position(|m| normalize_name(&m.name) == wanted)
            .ok_or_else(|| KmsError::UnknownAttributeMember {
                attribute: self.name.clone(),
                member: member.to_string(),
            })
    }

    /// Set the sole value, or the named member of a structured attribute
    pub fn set_value(&mut self, value: PrimitiveValue, member: Option<&str>) -> KmsResult<()> {
        let position = match member {
            Some(member) => self.member_position(member)?,
            None if self.members.len() == 1 => 0,
            None => {
                return Err(KmsError::illegal(format!(
                    "'{}' has several members; a member name is required",
                    self.name
                )));
            }
        };
        let slot = &mut self.members[position];
        if value.primitive_type() != slot.ty {
            return Err(KmsError::invalid_field(format!(
                "'{}' expects {:?}, got {:?}",
                slot.name,
                slot.ty,
                value.primitive_type()
            )));
        }
        slot.value = Some(value);
        Ok(())
    }

    /// The sole value, or the named member's value
    pub fn get_value(&self, member: Option<&str>) -> KmsResult<Option<&PrimitiveValue>> {
        let position = match member {
            Some(member) => self.member_position(member)?,
            None if self.members.len() == 1 => 0,
            None => {
                return Err(KmsError::illegal(format!(
                    "'{}' has several members; a member name is required",
                    self.name
                )));
            }
        };
        Ok(self.members[position].value.as_ref())
    }

    /// The first member's value
    pub fn value(&self) -> Option<&PrimitiveValue> {
        self.members.first().and_then(|m| m.value.as_ref())
    }

    /// True when every member holds a value
    pub fn is_complete(&self) -> bool {
        self.members.iter().all(|m| m.value.is_some())
    }

    /// Fail with `InvalidField` unless every member holds a value
    pub fn require_complete(&self) -> KmsResult<()> {
        match self.members.iter().find(|m| m.value.is_none()) {
            Some(missing) => Err(KmsError::invalid_field(format!(
                "'{}' is missing '{}'",
                self.name, missing.name
            ))),
            None => Ok(()),
        }
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.members.len() == other.members.len()
            && self
                .members
                .iter()
                .zip(&other.members)
                .all(|(a, b)| a.value == b.value)
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        for member in &self.members {
            member.value.hash(state);
        }
    }
}

/// Insertion-ordered collection of attributes with set semantics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet {
    items: Vec<Attribute>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless an equal attribute is present; returns whether it was added
    pub fn insert(&mut self, attribute: Attribute) -> bool {
        if self.items.contains(&attribute) {
            return false;
        }
        self.items.push(attribute);
        true
    }

    /// Remove an equal attribute; returns whether one was present
    pub fn remove(&mut self, attribute: &Attribute) -> bool {
        let before = self.items.len();
        self.items.retain(|a| a != attribute);
        before != self.items.len()
    }

    pub fn contains(&self, attribute: &Attribute) -> bool {
        self.items.contains(attribute)
    }

    /// All attributes with the given name, in insertion order
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Attribute> + 'a {
        self.items.iter().filter(move |a| a.name == name)
    }

    /// Move every attribute out, leaving the set empty
    pub fn take(&mut self) -> AttributeSet {
        std::mem::take(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        let mut set = AttributeSet::new();
        for attribute in iter {
            set.insert(attribute);
        }
        set
    }
}

impl IntoIterator for AttributeSet {
    type Item = Attribute;
    type IntoIter = std::vec::IntoIter<Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{NameType, UsageLimitsUnit};

    fn name(value: &str) -> Attribute {
        Attribute::of(AttributeName::Name)
            .with_value(PrimitiveValue::TextString(value.into()), Some("Name Value"))
            .unwrap()
            .with_value(
                PrimitiveValue::Enumeration(NameType::UninterpretedTextString.into()),
                Some("Name Type"),
            )
            .unwrap()
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(
            AttributeName::lookup("usage limits"),
            Some(AttributeName::UsageLimits)
        );
        assert_eq!(
            AttributeName::lookup("ActivationDate"),
            Some(AttributeName::ActivationDate)
        );
        assert_eq!(AttributeName::lookup("x-purpose"), Some(AttributeName::Custom));
        assert_eq!(AttributeName::lookup("Colour"), None);
        assert_eq!(
            AttributeName::lookup_member("usage limits count"),
            Some((AttributeName::UsageLimits, "Usage Limits Count"))
        );
    }

    #[test]
    fn test_set_value_single() {
        let mut lease = Attribute::of(AttributeName::LeaseTime);
        lease.set_value(PrimitiveValue::Interval(3600), None).unwrap();
        assert_eq!(lease.value(), Some(&PrimitiveValue::Interval(3600)));
        assert_eq!(lease.shape(), AttributeKind::Single);
    }

    #[test]
    fn test_set_value_on_structure_requires_member() {
        let mut limits = Attribute::of(AttributeName::UsageLimits);
        let err = limits
            .set_value(PrimitiveValue::LongInteger(5), None)
            .unwrap_err();
        assert!(matches!(err, KmsError::IllegalOperation(_)));

        limits
            .set_value(PrimitiveValue::LongInteger(5), Some(" usage LIMITS count "))
            .unwrap();
        assert_eq!(
            limits.get_value(Some("Usage Limits Count")).unwrap(),
            Some(&PrimitiveValue::LongInteger(5))
        );
        assert!(!limits.is_complete());
    }

    #[test]
    fn test_set_value_unknown_member() {
        let mut limits = Attribute::of(AttributeName::UsageLimits);
        let err = limits
            .set_value(PrimitiveValue::LongInteger(5), Some("Usage Limits Remaining"))
            .unwrap_err();
        assert!(matches!(err, KmsError::UnknownAttributeMember { .. }));
    }

    #[test]
    fn test_set_value_type_mismatch() {
        let mut limits = Attribute::of(AttributeName::UsageLimits);
        let err = limits
            .set_value(PrimitiveValue::Integer(5), Some("Usage Limits Count"))
            .unwrap_err();
        assert!(matches!(err, KmsError::InvalidField(_)));

        let err = limits
            .set_value(
                PrimitiveValue::Enumeration(NameType::Uri.into()),
                Some("Usage Limits Unit"),
            )
            .unwrap_err();
        assert!(matches!(err, KmsError::InvalidField(_)));

        limits
            .set_value(
                PrimitiveValue::Enumeration(UsageLimitsUnit::Byte.into()),
                Some("Usage Limits Unit"),
            )
            .unwrap();
    }

    #[test]
    fn test_equality_ignores_index() {
        let a = name("alpha");
        let b = name("alpha").with_index(Some(3));
        assert_eq!(a, b);
        assert_ne!(a, name("beta"));
    }

    #[test]
    fn test_equality_is_positional() {
        let mut a = Attribute::of(AttributeName::ApplicationSpecificInformation);
        a.set_value(PrimitiveValue::TextString("ns".into()), Some("Application Namespace"))
            .unwrap();
        a.set_value(PrimitiveValue::TextString("data".into()), Some("Application Data"))
            .unwrap();

        let mut b = Attribute::of(AttributeName::ApplicationSpecificInformation);
        b.set_value(PrimitiveValue::TextString("data".into()), Some("Application Namespace"))
            .unwrap();
        b.set_value(PrimitiveValue::TextString("ns".into()), Some("Application Data"))
            .unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_attribute_set_semantics() {
        let mut set = AttributeSet::new();
        assert!(set.insert(name("alpha")));
        assert!(!set.insert(name("alpha").with_index(Some(1))));
        assert!(set.insert(name("beta")));
        assert_eq!(set.len(), 2);

        let order: Vec<_> = set
            .iter()
            .map(|a| a.get_value(Some("Name Value")).unwrap().cloned())
            .collect();
        assert_eq!(
            order,
            vec![
                Some(PrimitiveValue::TextString("alpha".into())),
                Some(PrimitiveValue::TextString("beta".into()))
            ]
        );

        assert!(set.remove(&name("alpha")));
        assert!(!set.remove(&name("alpha")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_custom_attribute() {
        let custom = Attribute::custom("x-owner", "ops").unwrap();
        assert_eq!(custom.kind(), AttributeName::Custom);
        assert_eq!(custom.name(), "x-owner");
        assert_eq!(custom.tag(), CUSTOM_ATTRIBUTE_TAG);
        assert!(Attribute::custom("owner", "ops").is_err());

        let err = Attribute::new("Colour").unwrap_err();
        assert!(matches!(err, KmsError::UnknownAttribute(_)));
    }
}
