//! Rekey: derive a successor object from an existing cryptographic object
//!
//! The successor keeps the source's schedule shape. Every lifecycle date
//! present on the source is shifted by the same amount, so that the new
//! Activation Date lands on `now + offset`. Dates absent on the source stay
//! absent and never force the successor's initial state.

use tracing::debug;

use crate::enums::{CryptographicAlgorithm, LinkType, ObjectType};
use crate::error::{KmsError, KmsResult};
use crate::identifier::UniqueIdentifier;
use crate::key::KeyBlock;
use crate::lifecycle::initial_state;
use crate::object::{CryptographicObject, ManagedObject};
use crate::traits::KeyMaterialProvider;
use crate::typed::Link;

/// Parameters of a rekey
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RekeyRequest {
    /// Seconds between now and the successor's activation
    pub offset: Option<u32>,
    /// Overrides the source's cryptographic algorithm
    pub algorithm: Option<CryptographicAlgorithm>,
    /// Overrides the source's cryptographic length
    pub length: Option<i32>,
}

/// Shift every present date by `A2 - A1`, failing on overflow
fn shifted_schedule(
    dates: [Option<i64>; 4],
    anchor: i64,
    new_activation: i64,
) -> KmsResult<[Option<i64>; 4]> {
    let out_of_range = || KmsError::invalid_field("rekeyed schedule is out of range");
    let delta = new_activation.checked_sub(anchor).ok_or_else(out_of_range)?;
    let mut shifted = [None; 4];
    for (slot, date) in shifted.iter_mut().zip(dates) {
        *slot = date
            .map(|d| d.checked_add(delta).ok_or_else(out_of_range))
            .transpose()?;
    }
    Ok(shifted)
}

/// Build the successor of `source`, linking the two and moving its names.
///
/// Key pair halves are rejected: a successor for one half would have no
/// counterpart. Key material and the shifted schedule are computed before
/// `source` is touched, so a failure leaves the source unchanged.
pub fn rekey(
    source: &mut ManagedObject,
    request: &RekeyRequest,
    new_id: UniqueIdentifier,
    now: i64,
    provider: &dyn KeyMaterialProvider,
) -> KmsResult<ManagedObject> {
    let source_id = source.unique_id.clone();
    if matches!(
        source.object_type(),
        ObjectType::PrivateKey | ObjectType::PublicKey
    ) {
        return Err(KmsError::illegal(format!(
            "{source_id} is one half of a key pair and cannot be rekeyed alone"
        )));
    }
    let body = source
        .cryptographic()
        .ok_or_else(|| KmsError::illegal(format!("Rekey is not defined for template {source_id}")))?;
    if body.key_block.material().is_none() {
        return Err(KmsError::illegal(format!(
            "{source_id} holds no key material (state {})",
            body.state
        )));
    }
    let algorithm = request
        .algorithm
        .or(body.key_block.algorithm)
        .ok_or_else(|| KmsError::illegal(format!("{source_id} has no cryptographic algorithm")))?;
    let length = request
        .length
        .or(body.key_block.length)
        .ok_or_else(|| KmsError::illegal(format!("{source_id} has no cryptographic length")))?;

    let new_activation = now
        .checked_add(i64::from(request.offset.unwrap_or(0)))
        .ok_or_else(|| KmsError::invalid_field("rekey offset is out of range"))?;
    let anchor = body.activation_date.unwrap_or(source.initial_date);
    let [activation, process_start, protect_stop, deactivation] = shifted_schedule(
        [
            body.activation_date,
            body.process_start_date,
            body.protect_stop_date,
            body.deactivation_date,
        ],
        anchor,
        new_activation,
    )?;

    let material = provider.generate_key_material(algorithm, length)?;

    let mut key_block = KeyBlock::new(
        body.key_block.format,
        Some(algorithm),
        Some(length),
        Some(material),
    );
    key_block.value.attributes = body.key_block.value.attributes.clone();

    let mut successor = CryptographicObject::new(key_block);
    successor.usage_mask = body.usage_mask;
    successor.lease_time = Some(0);
    successor.activation_date = activation;
    successor.process_start_date = process_start;
    successor.protect_stop_date = protect_stop;
    successor.deactivation_date = deactivation;
    successor.usage_limits = body.usage_limits.map(|limits| limits.replenished());
    successor.other = body.other.clone();
    successor.state = initial_state(successor.activation_date, successor.deactivation_date, now);
    successor.add_link(Link::new(LinkType::ReplacedObjectLink, source_id.clone()));

    let kind = source.kind.with_body(successor)?;
    let mut replacement = ManagedObject::new(new_id.clone(), kind, now);
    replacement.names = source.names.take();

    if let Some(body) = source.cryptographic_mut() {
        body.add_link(Link::new(LinkType::ReplacementObjectLink, new_id.clone()));
    }
    source.last_change_date = now;

    debug!(
        source = %source_id,
        replacement = %new_id,
        state = ?replacement.state(),
        "Object rekeyed"
    );
    Ok(replacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use crate::enums::{KeyFormatType, State, UsageLimitsUnit, UsageMask};
    use crate::object::{ObjectKind, Template};
    use crate::test_support::StubProvider;
    use crate::key::KeyMaterial;
    use crate::typed::{UsageLimits, name_attribute};

    const T: i64 = 10_000;

    fn active_key(provider: &StubProvider) -> ManagedObject {
        let material = provider
            .generate_key_material(CryptographicAlgorithm::Aes, 256)
            .unwrap();
        let mut body = CryptographicObject::new(KeyBlock::new(
            KeyFormatType::Raw,
            Some(CryptographicAlgorithm::Aes),
            Some(256),
            Some(material),
        ));
        body.state = State::Active;
        body.activation_date = Some(T);
        body.lease_time = Some(3_600);
        body.usage_mask = Some(UsageMask::ENCRYPT | UsageMask::DECRYPT);
        body.usage_limits = Some(UsageLimits::new(UsageLimitsUnit::Byte, 10, 100).unwrap());
        body.other
            .insert(Attribute::custom("x-owner", "payments").unwrap());
        let mut object = ManagedObject::new(
            UniqueIdentifier::from("source"),
            ObjectKind::SymmetricKey(body),
            T - 100,
        );
        object.names.insert(name_attribute("payroll").unwrap());
        object
    }

    fn request(offset: u32) -> RekeyRequest {
        RekeyRequest {
            offset: Some(offset),
            ..RekeyRequest::default()
        }
    }

    #[test]
    fn test_rekey_preserves_relative_schedule() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        source.cryptographic_mut().unwrap().protect_stop_date = Some(T + 1_000);

        let now = T + 5_000;
        let new = rekey(
            &mut source,
            &request(500),
            UniqueIdentifier::from("new"),
            now,
            &provider,
        )
        .unwrap();
        let body = new.cryptographic().unwrap();
        let activation = body.activation_date.unwrap();
        assert_eq!(activation, now + 500);
        assert_eq!(body.protect_stop_date, Some(activation + 1_000));
        assert_eq!(body.state, State::PreActive);
    }

    #[test]
    fn test_rekey_process_start_shift() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        let c1 = T + 250;
        source.cryptographic_mut().unwrap().process_start_date = Some(c1);

        let now = T + 9_000;
        let offset = 120;
        let new = rekey(
            &mut source,
            &request(offset),
            UniqueIdentifier::from("new"),
            now,
            &provider,
        )
        .unwrap();
        let a2 = now + i64::from(offset);
        assert_eq!(
            new.cryptographic().unwrap().process_start_date,
            Some(c1 + (a2 - T))
        );
    }

    #[test]
    fn test_rekey_absent_dates_stay_unbounded() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        let new = rekey(
            &mut source,
            &request(0),
            UniqueIdentifier::from("new"),
            T + 50,
            &provider,
        )
        .unwrap();
        let body = new.cryptographic().unwrap();
        assert_eq!(body.process_start_date, None);
        assert_eq!(body.deactivation_date, None);
        assert_eq!(body.state, State::Active);
    }

    #[test]
    fn test_rekey_past_deactivation_deactivates() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        source.cryptographic_mut().unwrap().deactivation_date = Some(T);
        let new = rekey(
            &mut source,
            &request(0),
            UniqueIdentifier::from("new"),
            T + 50,
            &provider,
        )
        .unwrap();
        assert_eq!(new.state(), Some(State::Deactivated));
    }

    #[test]
    fn test_rekey_resets_lease_and_replenishes_usage() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        let new = rekey(
            &mut source,
            &request(60),
            UniqueIdentifier::from("new"),
            T + 10,
            &provider,
        )
        .unwrap();
        let body = new.cryptographic().unwrap();
        assert_eq!(body.lease_time, Some(0));
        let limits = body.usage_limits.unwrap();
        assert_eq!(limits.count(), 100);
        assert_eq!(limits.unit(), UsageLimitsUnit::Byte);
        assert_eq!(body.usage_mask, Some(UsageMask::ENCRYPT | UsageMask::DECRYPT));
        assert_eq!(body.other.len(), 1);
    }

    #[test]
    fn test_rekey_links_and_names() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        let new = rekey(
            &mut source,
            &request(0),
            UniqueIdentifier::from("new"),
            T + 10,
            &provider,
        )
        .unwrap();

        assert_eq!(
            new.cryptographic().unwrap().links,
            vec![Link::new(
                LinkType::ReplacedObjectLink,
                UniqueIdentifier::from("source")
            )]
        );
        assert!(
            source
                .cryptographic()
                .unwrap()
                .links
                .contains(&Link::new(
                    LinkType::ReplacementObjectLink,
                    UniqueIdentifier::from("new")
                ))
        );
        assert_eq!(new.name_values(), vec!["payroll".to_string()]);
        assert!(source.names.is_empty());
        assert_eq!(source.last_change_date, T + 10);
        assert_eq!(new.initial_date, T + 10);
    }

    #[test]
    fn test_rekey_fresh_material_and_digest() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        let new = rekey(
            &mut source,
            &request(0),
            UniqueIdentifier::from("new"),
            T + 10,
            &provider,
        )
        .unwrap();
        let old_block = &source.cryptographic().unwrap().key_block;
        let new_block = &new.cryptographic().unwrap().key_block;
        assert_ne!(old_block.material(), new_block.material());
        assert!(new_block.verify_digest(&provider).unwrap());
        assert_eq!(new_block.length, Some(256));
    }

    #[test]
    fn test_rekey_algorithm_override() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        let new = rekey(
            &mut source,
            &RekeyRequest {
                offset: None,
                algorithm: Some(CryptographicAlgorithm::HmacSha256),
                length: Some(512),
            },
            UniqueIdentifier::from("new"),
            T + 10,
            &provider,
        )
        .unwrap();
        let block = &new.cryptographic().unwrap().key_block;
        assert_eq!(block.algorithm, Some(CryptographicAlgorithm::HmacSha256));
        assert_eq!(block.material().map(KeyMaterial::len), Some(64));
    }

    #[test]
    fn test_rekey_provider_failure_leaves_source() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        let before = source.clone();
        let err = rekey(
            &mut source,
            &RekeyRequest {
                algorithm: Some(CryptographicAlgorithm::Rsa),
                ..RekeyRequest::default()
            },
            UniqueIdentifier::from("new"),
            T + 10,
            &provider,
        )
        .unwrap_err();
        assert!(matches!(err, KmsError::UnsupportedAlgorithm(_)));
        assert_eq!(source, before);
    }

    #[test]
    fn test_rekey_destroyed_or_template() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        source.destroy(T + 1).unwrap();
        let err = rekey(
            &mut source,
            &request(0),
            UniqueIdentifier::from("new"),
            T + 10,
            &provider,
        )
        .unwrap_err();
        assert!(matches!(err, KmsError::IllegalOperation(_)));

        let mut template = ManagedObject::new(
            UniqueIdentifier::from("tpl"),
            ObjectKind::Template(Template::default()),
            0,
        );
        let err = rekey(
            &mut template,
            &request(0),
            UniqueIdentifier::from("new"),
            T,
            &provider,
        )
        .unwrap_err();
        assert!(matches!(err, KmsError::IllegalOperation(_)));
    }

    #[test]
    fn test_rekey_rejects_schedule_overflow() {
        let provider = StubProvider::default();
        let mut source = active_key(&provider);
        source.cryptographic_mut().unwrap().protect_stop_date = Some(i64::MAX - 500);
        let before = source.clone();
        let err = rekey(
            &mut source,
            &request(0),
            UniqueIdentifier::from("new"),
            T + 10,
            &provider,
        )
        .unwrap_err();
        assert!(matches!(err, KmsError::InvalidField(_)));
        assert_eq!(source, before);

        let mut source = active_key(&provider);
        source.cryptographic_mut().unwrap().activation_date = Some(i64::MIN);
        let err = rekey(
            &mut source,
            &request(0),
            UniqueIdentifier::from("new"),
            T + 10,
            &provider,
        )
        .unwrap_err();
        assert!(matches!(err, KmsError::InvalidField(_)));
        assert_eq!(source.name_values(), vec!["payroll".to_string()]);
    }

    #[test]
    fn test_rekey_rejects_key_pair_halves() {
        let provider = StubProvider::default();
        for kind in [ObjectKind::PrivateKey, ObjectKind::PublicKey] {
            let material = provider
                .generate_key_material(CryptographicAlgorithm::Aes, 256)
                .unwrap();
            let mut body = CryptographicObject::new(KeyBlock::new(
                KeyFormatType::Raw,
                Some(CryptographicAlgorithm::Aes),
                Some(256),
                Some(material),
            ));
            body.state = State::Active;
            let mut half = ManagedObject::new(UniqueIdentifier::from("half"), kind(body), T);
            let before = half.clone();
            let err = rekey(
                &mut half,
                &request(0),
                UniqueIdentifier::from("new"),
                T + 10,
                &provider,
            )
            .unwrap_err();
            assert!(matches!(err, KmsError::IllegalOperation(_)));
            assert_eq!(half, before);
        }
    }
}
