//! Request and response envelopes over flat attribute maps
//!
//! Every batch item carries a `key -> text` map. Single-member attributes are
//! keyed by their attribute name (`Activation Date`), structured ones by their
//! member names (`Usage Limits Count`). A further instance of a multi-instance
//! attribute gets a `#n` suffix (`Name Value#1`). A handful of keys carry
//! operation parameters instead of attributes; see [`keys`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use tessera_core::{
    Attribute, AttributeName, Credential, KmipEnum, KmsError, KmsResult, NameType,
    PrimitiveType, PrimitiveValue, ResultReason, ResultStatus, is_custom_name, normalize_name,
};

use crate::error::ServerResult;

pub type AttributeMap = BTreeMap<String, String>;

/// Well-known request and response keys
pub mod keys {
    pub const UNIQUE_IDENTIFIER: &str = "Unique Identifier";
    pub const PRIVATE_KEY_UNIQUE_IDENTIFIER: &str = "Private Key Unique Identifier";
    pub const PUBLIC_KEY_UNIQUE_IDENTIFIER: &str = "Public Key Unique Identifier";
    pub const OBJECT_TYPE: &str = "Object Type";
    pub const TEMPLATE: &str = "Template";
    pub const KEY_MATERIAL: &str = "Key Material";
    pub const OFFSET: &str = "Offset";
    pub const REVOCATION_REASON_CODE: &str = "Revocation Reason Code";
    pub const REVOCATION_MESSAGE: &str = "Revocation Message";
    pub const COMPROMISE_OCCURRENCE_DATE: &str = "Compromise Occurrence Date";
    pub const ATTRIBUTE_NAMES: &str = "Attribute Names";
    pub const LEASE_TIME: &str = "Lease Time";
    pub const USAGE_LIMITS_COUNT: &str = "Usage Limits Count";
    pub const NAME_VALUE: &str = "Name Value";
    pub const CRYPTOGRAPHIC_ALGORITHM: &str = "Cryptographic Algorithm";
    pub const CRYPTOGRAPHIC_LENGTH: &str = "Cryptographic Length";
}

/// Keys that never describe attributes
const PARAMETER_KEYS: &[&str] = &[
    keys::UNIQUE_IDENTIFIER,
    keys::OBJECT_TYPE,
    keys::TEMPLATE,
    keys::KEY_MATERIAL,
    keys::OFFSET,
    keys::REVOCATION_REASON_CODE,
    keys::REVOCATION_MESSAGE,
    keys::COMPROMISE_OCCURRENCE_DATE,
    keys::ATTRIBUTE_NAMES,
];

fn is_parameter_key(base: &str) -> bool {
    let wanted = normalize_name(base);
    PARAMETER_KEYS.iter().any(|p| normalize_name(p) == wanted)
}

/// Split `Name Value#2` into `("Name Value", 2)`
fn split_instance(key: &str) -> KmsResult<(&str, u32)> {
    match key.rsplit_once('#') {
        Some((base, n)) => {
            let instance = n.trim().parse().map_err(|_| {
                KmsError::invalid_field(format!("'{key}' has a malformed instance suffix"))
            })?;
            Ok((base.trim(), instance))
        }
        None => Ok((key.trim(), 0)),
    }
}

/// Resolve a key to its attribute and, for structures, its member
fn resolve_key(base: &str) -> KmsResult<(AttributeName, Option<&'static str>)> {
    if is_custom_name(base) {
        return Ok((AttributeName::Custom, None));
    }
    let by_name = AttributeName::lookup(base);
    if let Some(kind) = by_name
        && !kind.is_structure()
    {
        return Ok((kind, None));
    }
    if let Some((kind, member)) = AttributeName::lookup_member(base) {
        return Ok((kind, Some(member)));
    }
    match by_name {
        Some(kind) => Err(KmsError::invalid_field(format!(
            "'{kind}' is structured; supply its members ({})",
            kind.member_names().collect::<Vec<_>>().join(", ")
        ))),
        None => Err(KmsError::UnknownAttribute(base.to_string())),
    }
}

/// Render attributes as a flat map
pub fn flatten<'a>(attributes: impl IntoIterator<Item = &'a Attribute>) -> AttributeMap {
    let mut map = AttributeMap::new();
    let mut instances: BTreeMap<String, u32> = BTreeMap::new();
    for attribute in attributes {
        let counter = instances.entry(attribute.name().to_string()).or_insert(0);
        let suffix = match *counter {
            0 => String::new(),
            n => format!("#{n}"),
        };
        *counter += 1;
        for member in attribute.members() {
            if let Some(value) = &member.value {
                map.insert(format!("{}{suffix}", member.name), value.to_text());
            }
        }
    }
    map
}

/// Parse the attribute keys of a flat map, skipping parameter keys
pub fn unflatten(map: &AttributeMap) -> KmsResult<Vec<Attribute>> {
    let mut groups: Vec<(String, u32, Attribute)> = Vec::new();

    for (key, text) in map {
        let (base, instance) = split_instance(key)?;
        if is_parameter_key(base) {
            continue;
        }
        let (kind, member) = resolve_key(base)?;
        let group = match kind {
            AttributeName::Custom => base.to_string(),
            _ => kind.as_str().to_string(),
        };

        let position = match groups
            .iter()
            .position(|(name, i, _)| *i == instance && normalize_name(name) == normalize_name(&group))
        {
            Some(position) => position,
            None => {
                let attribute = match kind {
                    AttributeName::Custom => Attribute::new(base)?,
                    _ => Attribute::of(kind),
                };
                let attribute = match instance {
                    0 => attribute,
                    n => attribute.with_index(Some(n)),
                };
                groups.push((group, instance, attribute));
                groups.len() - 1
            }
        };

        let attribute = &mut groups[position].2;
        let ty = match member {
            Some(member) => attribute.members().iter().find(|m| m.name == member),
            None => attribute.members().first(),
        }
        .map(|m| m.ty)
        .ok_or_else(|| KmsError::UnknownAttribute(base.to_string()))?;
        attribute.set_value(PrimitiveValue::parse_text(text, ty)?, member)?;
    }

    let mut attributes = Vec::with_capacity(groups.len());
    for (_, _, mut attribute) in groups {
        if attribute.kind() == AttributeName::Name
            && attribute.get_value(Some("Name Type"))?.is_none()
        {
            attribute.set_value(
                PrimitiveValue::Enumeration(NameType::UninterpretedTextString.into()),
                Some("Name Type"),
            )?;
        }
        attributes.push(attribute);
    }
    Ok(attributes)
}

/// Typed access to the parameter keys of a flat map
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    map: &'a AttributeMap,
}

impl<'a> Params<'a> {
    pub fn new(map: &'a AttributeMap) -> Self {
        Self { map }
    }

    /// Raw text under `key` (case and whitespace insensitive)
    pub fn get(&self, key: &str) -> Option<&'a str> {
        if let Some(value) = self.map.get(key) {
            return Some(value.as_str());
        }
        let wanted = normalize_name(key);
        self.map
            .iter()
            .find(|(k, _)| normalize_name(k) == wanted)
            .map(|(_, v)| v.as_str())
    }

    pub fn required(&self, key: &str) -> KmsResult<&'a str> {
        self.get(key)
            .ok_or_else(|| KmsError::invalid_field(format!("missing '{key}'")))
    }

    pub fn value(&self, key: &str, ty: PrimitiveType) -> KmsResult<Option<PrimitiveValue>> {
        self.get(key)
            .map(|text| PrimitiveValue::parse_text(text, ty))
            .transpose()
    }

    pub fn enumeration<E: KmipEnum>(&self, key: &str) -> KmsResult<Option<E>> {
        match self.value(key, PrimitiveType::Enumeration(E::KIND))? {
            Some(value) => value
                .as_enumeration()
                .and_then(|e| e.to::<E>())
                .map(Some)
                .ok_or_else(|| KmsError::invalid_field(format!("'{key}' has the wrong type"))),
            None => Ok(None),
        }
    }

    pub fn integer(&self, key: &str) -> KmsResult<Option<i32>> {
        Ok(self
            .value(key, PrimitiveType::Integer)?
            .and_then(|v| v.as_integer()))
    }

    pub fn long_integer(&self, key: &str) -> KmsResult<Option<i64>> {
        Ok(self
            .value(key, PrimitiveType::LongInteger)?
            .and_then(|v| v.as_long_integer()))
    }

    pub fn interval(&self, key: &str) -> KmsResult<Option<u32>> {
        Ok(self
            .value(key, PrimitiveType::Interval)?
            .and_then(|v| v.as_interval()))
    }

    pub fn date_time(&self, key: &str) -> KmsResult<Option<i64>> {
        Ok(self
            .value(key, PrimitiveType::DateTime)?
            .and_then(|v| v.as_date_time()))
    }

    /// Hex-encoded bytes under `key`
    pub fn bytes(&self, key: &str) -> KmsResult<Option<Vec<u8>>> {
        Ok(self
            .value(key, PrimitiveType::ByteString)?
            .and_then(|v| v.as_bytes().map(<[u8]>::to_vec)))
    }

    /// Comma separated list under `key`
    pub fn list(&self, key: &str) -> Vec<&'a str> {
        self.get(key)
            .map(|text| {
                text.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Operations understood by the lifecycle service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    CreateKeyPair,
    Register,
    Get,
    GetAttributes,
    GetAttributeList,
    AddAttribute,
    Locate,
    Activate,
    Revoke,
    Destroy,
    Archive,
    Recover,
    Check,
    ObtainLease,
    GetUsageAllocation,
    ReKey,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Create => "Create",
            Operation::CreateKeyPair => "CreateKeyPair",
            Operation::Register => "Register",
            Operation::Get => "Get",
            Operation::GetAttributes => "GetAttributes",
            Operation::GetAttributeList => "GetAttributeList",
            Operation::AddAttribute => "AddAttribute",
            Operation::Locate => "Locate",
            Operation::Activate => "Activate",
            Operation::Revoke => "Revoke",
            Operation::Destroy => "Destroy",
            Operation::Archive => "Archive",
            Operation::Recover => "Recover",
            Operation::Check => "Check",
            Operation::ObtainLease => "ObtainLease",
            Operation::GetUsageAllocation => "GetUsageAllocation",
            Operation::ReKey => "ReKey",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One operation of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestItem {
    pub operation: Operation,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl RequestItem {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            attributes: AttributeMap::new(),
        }
    }

    /// Add a key to the item's map
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A batch of operations sharing one credential and one ID placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub credential: Option<Credential>,
    pub items: Vec<RequestItem>,
}

impl Request {
    pub fn new(items: Vec<RequestItem>) -> Self {
        Self {
            credential: None,
            items,
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Parse a JSON batch
    pub fn from_json(text: &str) -> ServerResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Outcome of one batch item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result")]
pub enum ResponseItem {
    Success {
        operation: Operation,
        attributes: AttributeMap,
    },
    Failure {
        operation: Operation,
        status: ResultStatus,
        reason: ResultReason,
        message: String,
    },
}

impl ResponseItem {
    pub fn failure(operation: Operation, error: &KmsError) -> Self {
        ResponseItem::Failure {
            operation,
            status: ResultStatus::OperationFailed,
            reason: error.reason(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseItem::Success { .. })
    }

    pub fn attributes(&self) -> Option<&AttributeMap> {
        match self {
            ResponseItem::Success { attributes, .. } => Some(attributes),
            ResponseItem::Failure { .. } => None,
        }
    }

    /// Value under `key` of a successful item
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes()
            .and_then(|attributes| attributes.get(key))
            .map(String::as_str)
    }

    pub fn reason(&self) -> Option<ResultReason> {
        match self {
            ResponseItem::Success { .. } => None,
            ResponseItem::Failure { reason, .. } => Some(*reason),
        }
    }
}

/// Outcomes of a batch, in request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub items: Vec<ResponseItem>,
}
