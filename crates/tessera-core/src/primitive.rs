//! Primitive values and their canonical byte encoding
//!
//! Every attribute member is a [`PrimitiveValue`]. Encoded values are
//! big-endian and zero-padded on the right to the next multiple of 8 bytes;
//! the unpadded semantic length travels alongside the bytes in
//! [`EncodedValue`] for length-prefixed framing.
//!
//! Enumerations keep their 32-bit value in the high four bytes of an
//! eight-byte field, with zeros in the low four.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{EnumKind, Enumerated};
use crate::error::{KmsError, KmsResult};

/// Alignment of every encoded value
pub const ALIGNMENT: usize = 8;

/// Declared type of an attribute member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Integer,
    LongInteger,
    BigInteger,
    Enumeration(EnumKind),
    Boolean,
    TextString,
    ByteString,
    DateTime,
    Interval,
}

impl PrimitiveType {
    /// Semantic length of fixed-width types; `None` for variable-length ones
    pub fn fixed_length(self) -> Option<usize> {
        match self {
            PrimitiveType::Integer | PrimitiveType::Enumeration(_) | PrimitiveType::Interval => {
                Some(4)
            }
            PrimitiveType::LongInteger | PrimitiveType::Boolean | PrimitiveType::DateTime => {
                Some(8)
            }
            PrimitiveType::BigInteger | PrimitiveType::TextString | PrimitiveType::ByteString => {
                None
            }
        }
    }
}

/// A typed scalar value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveValue {
    Integer(i32),
    LongInteger(i64),
    /// Big-endian two's complement bytes
    BigInteger(Vec<u8>),
    Enumeration(Enumerated),
    Boolean(bool),
    TextString(String),
    ByteString(Vec<u8>),
    /// POSIX seconds
    DateTime(i64),
    /// Seconds
    Interval(u32),
}

/// Padded bytes plus the unpadded semantic length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    pub length: usize,
    pub bytes: Vec<u8>,
}

fn padded_len(length: usize) -> usize {
    length.div_ceil(ALIGNMENT) * ALIGNMENT
}

impl PrimitiveValue {
    /// The declared type of this value
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            PrimitiveValue::Integer(_) => PrimitiveType::Integer,
            PrimitiveValue::LongInteger(_) => PrimitiveType::LongInteger,
            PrimitiveValue::BigInteger(_) => PrimitiveType::BigInteger,
            PrimitiveValue::Enumeration(e) => PrimitiveType::Enumeration(e.kind()),
            PrimitiveValue::Boolean(_) => PrimitiveType::Boolean,
            PrimitiveValue::TextString(_) => PrimitiveType::TextString,
            PrimitiveValue::ByteString(_) => PrimitiveType::ByteString,
            PrimitiveValue::DateTime(_) => PrimitiveType::DateTime,
            PrimitiveValue::Interval(_) => PrimitiveType::Interval,
        }
    }

    /// Encode to canonical big-endian bytes, padded to a multiple of 8
    pub fn encode(&self) -> EncodedValue {
        let (length, mut bytes) = match self {
            PrimitiveValue::Integer(v) => (4, v.to_be_bytes().to_vec()),
            PrimitiveValue::LongInteger(v) => (8, v.to_be_bytes().to_vec()),
            PrimitiveValue::BigInteger(v) => (v.len(), v.clone()),
            PrimitiveValue::Enumeration(e) => (4, e.value().to_be_bytes().to_vec()),
            PrimitiveValue::Boolean(v) => (8, u64::from(*v).to_be_bytes().to_vec()),
            PrimitiveValue::TextString(v) => (v.len(), v.as_bytes().to_vec()),
            PrimitiveValue::ByteString(v) => (v.len(), v.clone()),
            PrimitiveValue::DateTime(v) => (8, v.to_be_bytes().to_vec()),
            PrimitiveValue::Interval(v) => (4, v.to_be_bytes().to_vec()),
        };
        bytes.resize(padded_len(length), 0);
        assert_eq!(
            bytes.len() % ALIGNMENT,
            0,
            "encoded primitive is not 8-byte aligned"
        );
        EncodedValue { length, bytes }
    }

    /// Decode padded bytes of the given semantic length and type
    pub fn decode(bytes: &[u8], length: usize, ty: PrimitiveType) -> KmsResult<Self> {
        if bytes.len() % ALIGNMENT != 0 {
            return Err(KmsError::malformed(format!(
                "{} bytes is not a multiple of {ALIGNMENT}",
                bytes.len()
            )));
        }
        if let Some(fixed) = ty.fixed_length()
            && fixed != length
        {
            return Err(KmsError::malformed(format!(
                "{ty:?} requires length {fixed}, got {length}"
            )));
        }
        if bytes.len() != padded_len(length) {
            return Err(KmsError::malformed(format!(
                "length {length} pads to {}, buffer holds {}",
                padded_len(length),
                bytes.len()
            )));
        }
        let (value, padding) = bytes.split_at(length);
        if padding.iter().any(|b| *b != 0) {
            return Err(KmsError::malformed("non-zero padding"));
        }

        let decoded = match ty {
            PrimitiveType::Integer => PrimitiveValue::Integer(i32::from_be_bytes(array(value)?)),
            PrimitiveType::LongInteger => {
                PrimitiveValue::LongInteger(i64::from_be_bytes(array(value)?))
            }
            PrimitiveType::BigInteger => PrimitiveValue::BigInteger(value.to_vec()),
            PrimitiveType::Enumeration(kind) => {
                let raw = i32::from_be_bytes(array(value)?);
                let e = Enumerated::new(kind, raw).ok_or_else(|| {
                    KmsError::malformed(format!("{raw:#x} is not a valid {kind:?} value"))
                })?;
                PrimitiveValue::Enumeration(e)
            }
            PrimitiveType::Boolean => match u64::from_be_bytes(array(value)?) {
                0 => PrimitiveValue::Boolean(false),
                1 => PrimitiveValue::Boolean(true),
                other => {
                    return Err(KmsError::malformed(format!("boolean value {other}")));
                }
            },
            PrimitiveType::TextString => PrimitiveValue::TextString(
                String::from_utf8(value.to_vec())
                    .map_err(|e| KmsError::malformed(format!("text string: {e}")))?,
            ),
            PrimitiveType::ByteString => PrimitiveValue::ByteString(value.to_vec()),
            PrimitiveType::DateTime => PrimitiveValue::DateTime(i64::from_be_bytes(array(value)?)),
            PrimitiveType::Interval => PrimitiveValue::Interval(u32::from_be_bytes(array(value)?)),
        };
        Ok(decoded)
    }

    /// Decode a fixed-width type whose length is implied by the type
    pub fn decode_fixed(bytes: &[u8], ty: PrimitiveType) -> KmsResult<Self> {
        let length = ty
            .fixed_length()
            .ok_or_else(|| KmsError::malformed(format!("{ty:?} is not fixed-width")))?;
        Self::decode(bytes, length, ty)
    }

    /// Render as text for flat attribute maps
    pub fn to_text(&self) -> String {
        match self {
            PrimitiveValue::Integer(v) => v.to_string(),
            PrimitiveValue::LongInteger(v) => v.to_string(),
            PrimitiveValue::BigInteger(v) | PrimitiveValue::ByteString(v) => hex::encode(v),
            PrimitiveValue::Enumeration(e) => e.name().to_string(),
            PrimitiveValue::Boolean(v) => v.to_string(),
            PrimitiveValue::TextString(v) => v.clone(),
            PrimitiveValue::DateTime(v) => DateTime::<Utc>::from_timestamp(*v, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| v.to_string()),
            PrimitiveValue::Interval(v) => v.to_string(),
        }
    }

    /// Parse the text form produced by [`PrimitiveValue::to_text`]
    pub fn parse_text(text: &str, ty: PrimitiveType) -> KmsResult<Self> {
        let text = text.trim();
        let bad = |what: &str| KmsError::invalid_field(format!("'{text}' is not a valid {what}"));
        let value = match ty {
            PrimitiveType::Integer => {
                PrimitiveValue::Integer(text.parse().map_err(|_| bad("integer"))?)
            }
            PrimitiveType::LongInteger => {
                PrimitiveValue::LongInteger(text.parse().map_err(|_| bad("long integer"))?)
            }
            PrimitiveType::BigInteger => {
                PrimitiveValue::BigInteger(hex::decode(text).map_err(|_| bad("big integer"))?)
            }
            PrimitiveType::Enumeration(kind) => {
                let e = Enumerated::from_name(kind, text)
                    .or_else(|| {
                        text.parse::<i32>()
                            .ok()
                            .and_then(|v| Enumerated::new(kind, v))
                    })
                    .ok_or_else(|| bad(&format!("{kind:?}")))?;
                PrimitiveValue::Enumeration(e)
            }
            PrimitiveType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" => PrimitiveValue::Boolean(true),
                "false" => PrimitiveValue::Boolean(false),
                _ => return Err(bad("boolean")),
            },
            PrimitiveType::TextString => PrimitiveValue::TextString(text.to_string()),
            PrimitiveType::ByteString => {
                PrimitiveValue::ByteString(hex::decode(text).map_err(|_| bad("byte string"))?)
            }
            PrimitiveType::DateTime => {
                let seconds = match DateTime::parse_from_rfc3339(text) {
                    Ok(dt) => dt.timestamp(),
                    Err(_) => text.parse().map_err(|_| bad("date-time"))?,
                };
                PrimitiveValue::DateTime(seconds)
            }
            PrimitiveType::Interval => {
                PrimitiveValue::Interval(text.parse().map_err(|_| bad("interval"))?)
            }
        };
        Ok(value)
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            PrimitiveValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long_integer(&self) -> Option<i64> {
        match self {
            PrimitiveValue::LongInteger(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<i64> {
        match self {
            PrimitiveValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_interval(&self) -> Option<u32> {
        match self {
            PrimitiveValue::Interval(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PrimitiveValue::TextString(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PrimitiveValue::ByteString(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enumeration(&self) -> Option<Enumerated> {
        match self {
            PrimitiveValue::Enumeration(e) => Some(*e),
            _ => None,
        }
    }
}

fn array<const N: usize>(value: &[u8]) -> KmsResult<[u8; N]> {
    value
        .try_into()
        .map_err(|_| KmsError::malformed(format!("expected {N} bytes, got {}", value.len())))
}
