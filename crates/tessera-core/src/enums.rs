//! Enumerations with symbolic names
//!
//! Each enumeration maps a symbolic name to its 32-bit protocol value in both
//! directions. Name lookup ignores case and whitespace, so `"pre-active"`,
//! `"Pre-Active"` and `"PRE - ACTIVE"` all resolve to [`State::PreActive`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalize a symbolic name for comparison (lowercase, whitespace removed)
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Common behaviour of every protocol enumeration
pub trait KmipEnum: Copy + Sized + 'static {
    /// The kind tag used when the enumeration travels as a primitive value
    const KIND: EnumKind;

    /// All variants, in declaration order
    fn all() -> &'static [Self];

    /// The protocol value
    fn value(self) -> i32;

    /// The symbolic name
    fn name(self) -> &'static str;

    /// Look up a variant by protocol value
    fn from_value(value: i32) -> Option<Self> {
        Self::all().iter().copied().find(|v| v.value() == value)
    }

    /// Look up a variant by symbolic name (case and whitespace insensitive)
    fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize_name(name);
        Self::all()
            .iter()
            .copied()
            .find(|v| normalize_name(v.name()) == wanted)
    }
}

macro_rules! kmip_enumeration {
    (
        $(#[$meta:meta])*
        $name:ident : $kind:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl KmipEnum for $name {
            const KIND: EnumKind = EnumKind::$kind;

            fn all() -> &'static [Self] {
                &[$( $name::$variant ),+]
            }

            fn value(self) -> i32 {
                match self {
                    $( $name::$variant => $value ),+
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(KmipEnum::name(*self))
            }
        }
    };
}

/// Identifies which enumeration an [`Enumerated`] value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnumKind {
    ObjectType,
    State,
    CryptographicAlgorithm,
    RevocationReasonCode,
    LinkType,
    NameType,
    UsageLimitsUnit,
    KeyFormatType,
    HashingAlgorithm,
    SecretDataType,
    ResultStatus,
    ResultReason,
}

impl EnumKind {
    /// Symbolic name of `value` within this enumeration
    pub fn name_of(self, value: i32) -> Option<&'static str> {
        fn lookup<E: KmipEnum>(value: i32) -> Option<&'static str> {
            E::from_value(value).map(E::name)
        }
        match self {
            EnumKind::ObjectType => lookup::<ObjectType>(value),
            EnumKind::State => lookup::<State>(value),
            EnumKind::CryptographicAlgorithm => lookup::<CryptographicAlgorithm>(value),
            EnumKind::RevocationReasonCode => lookup::<RevocationReasonCode>(value),
            EnumKind::LinkType => lookup::<LinkType>(value),
            EnumKind::NameType => lookup::<NameType>(value),
            EnumKind::UsageLimitsUnit => lookup::<UsageLimitsUnit>(value),
            EnumKind::KeyFormatType => lookup::<KeyFormatType>(value),
            EnumKind::HashingAlgorithm => lookup::<HashingAlgorithm>(value),
            EnumKind::SecretDataType => lookup::<SecretDataType>(value),
            EnumKind::ResultStatus => lookup::<ResultStatus>(value),
            EnumKind::ResultReason => lookup::<ResultReason>(value),
        }
    }

    /// Protocol value of the symbolic `name` within this enumeration
    pub fn value_of(self, name: &str) -> Option<i32> {
        fn lookup<E: KmipEnum>(name: &str) -> Option<i32> {
            E::from_name(name).map(E::value)
        }
        match self {
            EnumKind::ObjectType => lookup::<ObjectType>(name),
            EnumKind::State => lookup::<State>(name),
            EnumKind::CryptographicAlgorithm => lookup::<CryptographicAlgorithm>(name),
            EnumKind::RevocationReasonCode => lookup::<RevocationReasonCode>(name),
            EnumKind::LinkType => lookup::<LinkType>(name),
            EnumKind::NameType => lookup::<NameType>(name),
            EnumKind::UsageLimitsUnit => lookup::<UsageLimitsUnit>(name),
            EnumKind::KeyFormatType => lookup::<KeyFormatType>(name),
            EnumKind::HashingAlgorithm => lookup::<HashingAlgorithm>(name),
            EnumKind::SecretDataType => lookup::<SecretDataType>(name),
            EnumKind::ResultStatus => lookup::<ResultStatus>(name),
            EnumKind::ResultReason => lookup::<ResultReason>(name),
        }
    }
}

/// An enumeration value carried as a primitive: kind plus protocol value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Enumerated {
    kind: EnumKind,
    value: i32,
}

impl Enumerated {
    /// Create from a raw value, validating it against the kind's table
    pub fn new(kind: EnumKind, value: i32) -> Option<Self> {
        kind.name_of(value).map(|_| Self { kind, value })
    }

    /// Create from a symbolic name
    pub fn from_name(kind: EnumKind, name: &str) -> Option<Self> {
        kind.value_of(name).map(|value| Self { kind, value })
    }

    pub fn kind(&self) -> EnumKind {
        self.kind
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    /// Symbolic name of this value
    pub fn name(&self) -> &'static str {
        // Construction validates the value, so the lookup cannot miss.
        self.kind.name_of(self.value).unwrap_or("Unknown")
    }

    /// Convert to a typed enumeration, if the kinds match
    pub fn to<E: KmipEnum>(&self) -> Option<E> {
        if self.kind == E::KIND {
            E::from_value(self.value)
        } else {
            None
        }
    }
}

impl<E: KmipEnum> From<E> for Enumerated {
    fn from(e: E) -> Self {
        Self {
            kind: E::KIND,
            value: e.value(),
        }
    }
}

impl fmt::Display for Enumerated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

kmip_enumeration! {
    /// Kind of managed object
    ObjectType: ObjectType {
        SymmetricKey = 0x0000_0002 => "Symmetric Key",
        PublicKey = 0x0000_0003 => "Public Key",
        PrivateKey = 0x0000_0004 => "Private Key",
        Template = 0x0000_0006 => "Template",
        SecretData = 0x0000_0007 => "Secret Data",
    }
}

kmip_enumeration! {
    /// Lifecycle state of a cryptographic object
    State: State {
        PreActive = 0x0000_0001 => "Pre-Active",
        Active = 0x0000_0002 => "Active",
        Deactivated = 0x0000_0003 => "Deactivated",
        Compromised = 0x0000_0004 => "Compromised",
        Destroyed = 0x0000_0005 => "Destroyed",
        DestroyedCompromised = 0x0000_0006 => "Destroyed Compromised",
    }
}

impl State {
    /// Destroyed states admit no further transitions except compromise marking
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Destroyed | State::DestroyedCompromised)
    }
}

kmip_enumeration! {
    CryptographicAlgorithm: CryptographicAlgorithm {
        Des = 0x0000_0001 => "DES",
        TripleDes = 0x0000_0002 => "3DES",
        Aes = 0x0000_0003 => "AES",
        Rsa = 0x0000_0004 => "RSA",
        Dsa = 0x0000_0005 => "DSA",
        Ecdsa = 0x0000_0006 => "ECDSA",
        HmacSha1 = 0x0000_0007 => "HMAC-SHA1",
        HmacSha224 = 0x0000_0008 => "HMAC-SHA224",
        HmacSha256 = 0x0000_0009 => "HMAC-SHA256",
        HmacSha384 = 0x0000_000A => "HMAC-SHA384",
        HmacSha512 = 0x0000_000B => "HMAC-SHA512",
        HmacMd5 = 0x0000_000C => "HMAC-MD5",
        Dh = 0x0000_000D => "DH",
        Ecdh = 0x0000_000E => "ECDH",
    }
}

kmip_enumeration! {
    RevocationReasonCode: RevocationReasonCode {
        Unspecified = 0x0000_0001 => "Unspecified",
        KeyCompromise = 0x0000_0002 => "Key Compromise",
        CaCompromise = 0x0000_0003 => "CA Compromise",
        AffiliationChanged = 0x0000_0004 => "Affiliation Changed",
        Superseded = 0x0000_0005 => "Superseded",
        CessationOfOperation = 0x0000_0006 => "Cessation Of Operation",
        PrivilegeWithdrawn = 0x0000_0007 => "Privilege Withdrawn",
    }
}

kmip_enumeration! {
    LinkType: LinkType {
        CertificateLink = 0x0000_0101 => "Certificate Link",
        PublicKeyLink = 0x0000_0102 => "Public Key Link",
        PrivateKeyLink = 0x0000_0103 => "Private Key Link",
        DerivationBaseObjectLink = 0x0000_0104 => "Derivation Base Object Link",
        DerivedKeyLink = 0x0000_0105 => "Derived Key Link",
        ReplacementObjectLink = 0x0000_0106 => "Replacement Object Link",
        ReplacedObjectLink = 0x0000_0107 => "Replaced Object Link",
    }
}

kmip_enumeration! {
    NameType: NameType {
        UninterpretedTextString = 0x0000_0001 => "Uninterpreted Text String",
        Uri = 0x0000_0002 => "URI",
    }
}

kmip_enumeration! {
    UsageLimitsUnit: UsageLimitsUnit {
        Byte = 0x0000_0001 => "Byte",
        Object = 0x0000_0002 => "Object",
    }
}

kmip_enumeration! {
    KeyFormatType: KeyFormatType {
        Raw = 0x0000_0001 => "Raw",
        Opaque = 0x0000_0002 => "Opaque",
        Pkcs1 = 0x0000_0003 => "PKCS#1",
        Pkcs8 = 0x0000_0004 => "PKCS#8",
        X509 = 0x0000_0005 => "X.509",
        EcPrivateKey = 0x0000_0006 => "ECPrivateKey",
        TransparentSymmetricKey = 0x0000_0007 => "Transparent Symmetric Key",
    }
}

kmip_enumeration! {
    HashingAlgorithm: HashingAlgorithm {
        Md2 = 0x0000_0001 => "MD2",
        Md4 = 0x0000_0002 => "MD4",
        Md5 = 0x0000_0003 => "MD5",
        Sha1 = 0x0000_0004 => "SHA-1",
        Sha224 = 0x0000_0005 => "SHA-224",
        Sha256 = 0x0000_0006 => "SHA-256",
        Sha384 = 0x0000_0007 => "SHA-384",
        Sha512 = 0x0000_0008 => "SHA-512",
    }
}

kmip_enumeration! {
    SecretDataType: SecretDataType {
        Password = 0x0000_0001 => "Password",
        Seed = 0x0000_0002 => "Seed",
    }
}

kmip_enumeration! {
    ResultStatus: ResultStatus {
        Success = 0x0000_0000 => "Success",
        OperationFailed = 0x0000_0001 => "Operation Failed",
        OperationPending = 0x0000_0002 => "Operation Pending",
        OperationUndone = 0x0000_0003 => "Operation Undone",
    }
}

kmip_enumeration! {
    ResultReason: ResultReason {
        ItemNotFound = 0x0000_0001 => "Item Not Found",
        ResponseTooLarge = 0x0000_0002 => "Response Too Large",
        AuthenticationNotSuccessful = 0x0000_0003 => "Authentication Not Successful",
        InvalidMessage = 0x0000_0004 => "Invalid Message",
        OperationNotSupported = 0x0000_0005 => "Operation Not Supported",
        MissingData = 0x0000_0006 => "Missing Data",
        InvalidField = 0x0000_0007 => "Invalid Field",
        FeatureNotSupported = 0x0000_0008 => "Feature Not Supported",
        OperationCanceledByRequester = 0x0000_0009 => "Operation Canceled By Requester",
        CryptographicFailure = 0x0000_000A => "Cryptographic Failure",
        IllegalOperation = 0x0000_000B => "Illegal Operation",
        PermissionDenied = 0x0000_000C => "Permission Denied",
        ObjectArchived = 0x0000_000D => "Object Archived",
        IndexOutOfBounds = 0x0000_000E => "Index Out Of Bounds",
        GeneralFailure = 0x0000_0100 => "General Failure",
    }
}

/// Cryptographic Usage Mask bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UsageMask(pub i32);

impl UsageMask {
    pub const SIGN: UsageMask = UsageMask(0x0000_0001);
    pub const VERIFY: UsageMask = UsageMask(0x0000_0002);
    pub const ENCRYPT: UsageMask = UsageMask(0x0000_0004);
    pub const DECRYPT: UsageMask = UsageMask(0x0000_0008);
    pub const WRAP_KEY: UsageMask = UsageMask(0x0000_0010);
    pub const UNWRAP_KEY: UsageMask = UsageMask(0x0000_0020);
    pub const EXPORT: UsageMask = UsageMask(0x0000_0040);
    pub const MAC_GENERATE: UsageMask = UsageMask(0x0000_0080);
    pub const MAC_VERIFY: UsageMask = UsageMask(0x0000_0100);
    pub const DERIVE_KEY: UsageMask = UsageMask(0x0000_0200);
    pub const CONTENT_COMMITMENT: UsageMask = UsageMask(0x0000_0400);
    pub const KEY_AGREEMENT: UsageMask = UsageMask(0x0000_0800);
    pub const CERTIFICATE_SIGN: UsageMask = UsageMask(0x0000_1000);
    pub const CRL_SIGN: UsageMask = UsageMask(0x0000_2000);

    pub fn bits(self) -> i32 {
        self.0
    }

    /// True when every bit of `self` is also set in `other`
    pub fn is_subset_of(self, other: UsageMask) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn contains(self, other: UsageMask) -> bool {
        other.is_subset_of(self)
    }
}

impl std::ops::BitOr for UsageMask {
    type Output = UsageMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        UsageMask(self.0 | rhs.0)
    }
}
