//! Lifecycle service
//!
//! Resolves the acting object of each request item, checks the caller's
//! permission, runs the lifecycle engine inside one store transaction, and
//! renders the outcome as a flat attribute map.
//!
//! Every item of a batch shares one [`RequestContext`]. Operations that
//! assign an identifier (Create, CreateKeyPair, Register, ReKey, Locate) leave
//! it in the context's ID placeholder, and later items that name no target act
//! on it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{Span, debug, field, info, info_span, instrument, warn};

use tessera_core::{
    Attribute, AttributeName, Clock, CryptographicAlgorithm, CryptographicObject, DestroyOutcome,
    KeyBlock, KeyFormatType, KeyMaterial, KeyMaterialProvider, KmsError, KmsResult, Link,
    LinkType, ManagedObject, ObjectKind, ObjectType, RekeyRequest, RevocationReason,
    RevocationReasonCode, SystemClock, Template, UniqueIdentifier, initial_state,
    normalize_name, rekey,
};
use tessera_crypto::SoftwareKeyProvider;
use tessera_logging::{CorrelationExt, RequestContextGuard, fields, spans};
use tessera_storage::{
    Commit, InMemoryObjectStore, InMemoryPermissionStore, ObjectStore, PermissionStore,
    RedbObjectStore, RedbPermissionStore, RedbStorage, RedbStorageConfig,
};

use crate::access::AccessControl;
use crate::config::{ServerConfig, StorageBackend};
use crate::context::RequestContext;
use crate::error::ServerResult;
use crate::message::{
    AttributeMap, Operation, Params, Request, RequestItem, Response, ResponseItem, flatten, keys,
    unflatten,
};

/// Key management service over an object store and a permission store
pub struct LifecycleService {
    objects: Arc<dyn ObjectStore>,
    access: AccessControl,
    provider: Arc<dyn KeyMaterialProvider>,
    clock: Arc<dyn Clock>,
    /// Lease Time given to new cryptographic objects that set none
    default_lease_time: Option<u32>,
}

impl LifecycleService {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        permissions: Arc<dyn PermissionStore>,
        provider: Arc<dyn KeyMaterialProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            objects,
            access: AccessControl::new(permissions),
            provider,
            clock,
            default_lease_time: None,
        }
    }

    /// Set the lease time applied at creation
    pub fn with_default_lease_time(mut self, seconds: u32) -> Self {
        self.default_lease_time = Some(seconds);
        self
    }

    /// Build a service with the configured backend, the software provider,
    /// and the system clock
    #[instrument(skip(config), fields(backend = ?config.storage))]
    pub fn from_config(config: &ServerConfig) -> ServerResult<Self> {
        let (objects, permissions): (Arc<dyn ObjectStore>, Arc<dyn PermissionStore>) =
            match &config.storage {
                StorageBackend::Memory => (
                    Arc::new(InMemoryObjectStore::new()),
                    Arc::new(InMemoryPermissionStore::new()),
                ),
                StorageBackend::Redb { path, cache_size } => {
                    let storage = Arc::new(RedbStorage::open(RedbStorageConfig {
                        db_path: path.clone(),
                        cache_size: *cache_size,
                    })?);
                    (
                        Arc::new(RedbObjectStore::new(Arc::clone(&storage))),
                        Arc::new(RedbPermissionStore::new(storage)),
                    )
                }
            };

        let mut service = Self::new(
            objects,
            permissions,
            Arc::new(SoftwareKeyProvider::new()),
            Arc::new(SystemClock),
        );
        service.default_lease_time = config.default_lease_time;
        info!("Lifecycle service ready");
        Ok(service)
    }

    /// Number of stored objects per object type
    pub fn object_counts(&self) -> KmsResult<BTreeMap<ObjectType, usize>> {
        self.objects.count_by_kind()
    }

    // ---- batch processing ----

    /// Process a batch; items fail independently
    pub fn process(&self, request: Request) -> Response {
        let Request { credential, items } = request;
        let mut ctx = RequestContext::new(credential);
        let _request = RequestContextGuard::new(ctx.request_id());

        let batch = info_span!(
            spans::PROCESS_BATCH,
            trace_id = field::Empty,
            span_id = field::Empty,
            items = items.len()
        );
        batch.record_correlation(ctx.correlation());
        let _entered = batch.enter();

        let items = items
            .iter()
            .enumerate()
            .map(|(index, item)| self.process_item(&mut ctx, index, item))
            .collect();
        Response { items }
    }

    fn process_item(
        &self,
        ctx: &mut RequestContext,
        index: usize,
        item: &RequestItem,
    ) -> ResponseItem {
        let operation = item.operation;
        let correlation = ctx.correlation().child(index).with_operation(operation.name());
        let span = info_span!(
            spans::BATCH_ITEM,
            trace_id = field::Empty,
            span_id = field::Empty,
            parent_span_id = field::Empty,
            item_index = field::Empty,
            operation = field::Empty
        );
        span.record_correlation(&correlation);
        let _entered = span.enter();
        let _operation = RequestContextGuard::for_operation(operation.name());

        match self.dispatch(ctx, item) {
            Ok(attributes) => ResponseItem::Success {
                operation,
                attributes,
            },
            Err(error) => {
                debug!(%operation, reason = %error.reason(), %error, "Item failed");
                ResponseItem::failure(operation, &error)
            }
        }
    }

    /// Run one item against `ctx`
    pub fn dispatch(&self, ctx: &mut RequestContext, item: &RequestItem) -> KmsResult<AttributeMap> {
        let request = &item.attributes;
        match item.operation {
            Operation::Create => self.create(ctx, request),
            Operation::CreateKeyPair => self.create_key_pair(ctx, request),
            Operation::Register => self.register(ctx, request),
            Operation::Get => self.get(ctx, request),
            Operation::GetAttributes => self.get_attributes(ctx, request),
            Operation::GetAttributeList => self.get_attribute_list(ctx, request),
            Operation::AddAttribute => self.add_attribute(ctx, request),
            Operation::Locate => self.locate(ctx, request),
            Operation::Activate => self.activate(ctx, request),
            Operation::Revoke => self.revoke(ctx, request),
            Operation::Destroy => self.destroy(ctx, request),
            Operation::Archive => self.archive(ctx, request),
            Operation::Recover => self.recover(ctx, request),
            Operation::Check => self.check(ctx, request),
            Operation::ObtainLease => self.obtain_lease(ctx, request),
            Operation::GetUsageAllocation => self.get_usage_allocation(ctx, request),
            Operation::ReKey => self.rekey(ctx, request),
        }
    }

    // ---- creation ----

    /// Generate a symmetric key or secret data
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn create(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let params = Params::new(request);
        let object_type = params
            .enumeration::<ObjectType>(keys::OBJECT_TYPE)?
            .ok_or_else(|| KmsError::invalid_field(format!("missing '{}'", keys::OBJECT_TYPE)))?;
        let now = self.clock.now();
        let id = UniqueIdentifier::generate();

        let mut object = ManagedObject::new(id.clone(), cryptographic_kind(object_type)?, now);
        for attribute in self.creation_attributes(ctx, request)? {
            object.add_attribute(attribute)?;
        }
        let (algorithm, length) = generation_parameters(&object)?;
        let material = self.provider.generate_key_material(algorithm, length)?;
        self.seal(&mut object, material, now)?;

        self.store_new(ctx, object)?;
        Span::current().record(fields::UNIQUE_ID, id.as_str());
        info!(%object_type, %algorithm, length, "Object created");
        ctx.set_placeholder(id.clone());
        Ok(identified(&id))
    }

    /// Generate a linked private and public key
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn create_key_pair(
        &self,
        ctx: &mut RequestContext,
        request: &AttributeMap,
    ) -> KmsResult<AttributeMap> {
        let now = self.clock.now();
        let private_id = UniqueIdentifier::generate();
        let public_id = UniqueIdentifier::generate();

        let mut private = ManagedObject::new(
            private_id.clone(),
            ObjectKind::PrivateKey(CryptographicObject::new(empty_block(KeyFormatType::Raw))),
            now,
        );
        let mut public = ManagedObject::new(
            public_id.clone(),
            ObjectKind::PublicKey(CryptographicObject::new(empty_block(KeyFormatType::Raw))),
            now,
        );
        // Names identify the pair through its private half only
        for attribute in self.creation_attributes(ctx, request)? {
            if attribute.kind() != AttributeName::Name {
                public.add_attribute(attribute.clone())?;
            }
            private.add_attribute(attribute)?;
        }

        let (algorithm, length) = generation_parameters(&private)?;
        let pair = self.provider.generate_key_pair(algorithm, length)?;
        self.seal(&mut private, pair.private, now)?;
        self.seal(&mut public, pair.public, now)?;
        body_mut(&mut private)?.add_link(Link::new(LinkType::PublicKeyLink, public_id.clone()));
        body_mut(&mut public)?.add_link(Link::new(LinkType::PrivateKeyLink, private_id.clone()));

        self.access.grant(&private_id, ctx.credential())?;
        self.access.grant(&public_id, ctx.credential())?;
        self.objects.put(private)?;
        if let Err(error) = self.objects.put(public) {
            self.objects.remove(&private_id)?;
            return Err(error);
        }
        Span::current().record(fields::UNIQUE_ID, private_id.as_str());
        info!(public = %public_id, %algorithm, length, "Key pair created");
        ctx.set_placeholder(private_id.clone());

        let mut response = identified(&private_id);
        response.insert(
            keys::PRIVATE_KEY_UNIQUE_IDENTIFIER.to_string(),
            private_id.to_string(),
        );
        response.insert(
            keys::PUBLIC_KEY_UNIQUE_IDENTIFIER.to_string(),
            public_id.to_string(),
        );
        Ok(response)
    }

    /// Store caller-supplied key material, secret data, or a template
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn register(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let params = Params::new(request);
        let object_type = params
            .enumeration::<ObjectType>(keys::OBJECT_TYPE)?
            .ok_or_else(|| KmsError::invalid_field(format!("missing '{}'", keys::OBJECT_TYPE)))?;
        let now = self.clock.now();
        let id = UniqueIdentifier::generate();

        let object = if object_type == ObjectType::Template {
            let mut object =
                ManagedObject::new(id.clone(), ObjectKind::Template(Template::default()), now);
            for attribute in unflatten(request)? {
                object.add_attribute(attribute)?;
            }
            object
        } else {
            let bytes = params
                .bytes(keys::KEY_MATERIAL)?
                .filter(|bytes| !bytes.is_empty())
                .ok_or_else(|| {
                    KmsError::invalid_field(format!("missing '{}'", keys::KEY_MATERIAL))
                })?;
            let mut object = ManagedObject::new(id.clone(), cryptographic_kind(object_type)?, now);
            for attribute in self.creation_attributes(ctx, request)? {
                object.add_attribute(attribute)?;
            }
            let material = self.provider.import_key_material(bytes)?;
            self.seal(&mut object, material, now)?;
            object
        };

        self.store_new(ctx, object)?;
        Span::current().record(fields::UNIQUE_ID, id.as_str());
        info!(%object_type, "Object registered");
        ctx.set_placeholder(id.clone());
        Ok(identified(&id))
    }

    /// Request attributes, preceded by the named template's preset.
    ///
    /// A single-instance attribute present in the request replaces the
    /// template's value.
    fn creation_attributes(
        &self,
        ctx: &RequestContext,
        request: &AttributeMap,
    ) -> KmsResult<Vec<Attribute>> {
        let supplied = unflatten(request)?;
        let Some(template_name) = Params::new(request).get(keys::TEMPLATE) else {
            return Ok(supplied);
        };

        let template = self.objects.get_by_name(template_name)?;
        self.access.verify(&template.unique_id, ctx.credential())?;
        template.ensure_readable()?;
        let ObjectKind::Template(preset) = &template.kind else {
            return Err(KmsError::illegal(format!(
                "'{template_name}' names a {}, not a template",
                template.object_type()
            )));
        };

        let mut merged: Vec<Attribute> = preset
            .attributes
            .iter()
            .filter(|a| {
                a.kind().is_multi_instance() || !supplied.iter().any(|s| s.name() == a.name())
            })
            .cloned()
            .collect();
        merged.extend(supplied);
        Ok(merged)
    }

    /// Attach material, settle the initial state, and apply the default lease
    fn seal(&self, object: &mut ManagedObject, material: KeyMaterial, now: i64) -> KmsResult<()> {
        let body = body_mut(object)?;
        body.key_block.value.material = Some(material);
        body.state = initial_state(body.activation_date, body.deactivation_date, now);
        if body.lease_time.is_none() {
            body.lease_time = self.default_lease_time;
        }
        Ok(())
    }

    fn store_new(&self, ctx: &RequestContext, object: ManagedObject) -> KmsResult<()> {
        // An entry without its object reads as ItemNotFound, so grant first
        self.access.grant(&object.unique_id, ctx.credential())?;
        self.objects.put(object)
    }

    // ---- reads ----

    /// Attributes plus hex key material
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn get(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let object = self.objects.get(&id)?;
        object.ensure_readable()?;

        let mut response = flatten(object.attributes()?.iter());
        if let Some(material) = object.cryptographic().and_then(|c| c.key_block.material()) {
            response.insert(keys::KEY_MATERIAL.to_string(), hex::encode(material.bytes()));
        }
        Ok(response)
    }

    /// Attributes, optionally limited to `Attribute Names`
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn get_attributes(
        &self,
        ctx: &mut RequestContext,
        request: &AttributeMap,
    ) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let object = self.objects.get(&id)?;

        let wanted = Params::new(request).list(keys::ATTRIBUTE_NAMES);
        for name in &wanted {
            if AttributeName::lookup(name).is_none() {
                return Err(KmsError::UnknownAttribute((*name).to_string()));
            }
        }
        let wanted: Vec<String> = wanted.into_iter().map(normalize_name).collect();

        let attributes: Vec<Attribute> = object
            .attributes()?
            .into_iter()
            .filter(|a| wanted.is_empty() || wanted.contains(&normalize_name(a.name())))
            .collect();
        let mut response = flatten(attributes.iter());
        response.extend(identified(&id));
        Ok(response)
    }

    /// Names of the attributes present on the object
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn get_attribute_list(
        &self,
        ctx: &mut RequestContext,
        request: &AttributeMap,
    ) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let names = self.objects.get(&id)?.attribute_names()?;
        let mut response = identified(&id);
        response.insert(keys::ATTRIBUTE_NAMES.to_string(), names.join(", "));
        Ok(response)
    }

    /// Identifiers of the objects named `Name Value` that the caller may use.
    ///
    /// The first match becomes the ID placeholder.
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn locate(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let name = Params::new(request).required(keys::NAME_VALUE)?;
        let mut found = Vec::new();
        for id in self.objects.locate(name)? {
            match self.access.verify(&id, ctx.credential()) {
                Ok(()) => found.push(id),
                Err(KmsError::PermissionDenied(_)) | Err(KmsError::ItemNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        let Some(first) = found.first() else {
            return Err(KmsError::not_found(format!("name '{name}'")));
        };
        Span::current().record(fields::UNIQUE_ID, first.as_str());
        ctx.set_placeholder(first.clone());

        let mut response = AttributeMap::new();
        for (n, id) in found.iter().enumerate() {
            let key = match n {
                0 => keys::UNIQUE_IDENTIFIER.to_string(),
                n => format!("{}#{n}", keys::UNIQUE_IDENTIFIER),
            };
            response.insert(key, id.to_string());
        }
        Ok(response)
    }

    // ---- mutations ----

    /// Add client attributes to an existing object
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn add_attribute(
        &self,
        ctx: &mut RequestContext,
        request: &AttributeMap,
    ) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let attributes = unflatten(request)?;
        if attributes.is_empty() {
            return Err(KmsError::invalid_field("no attribute supplied"));
        }
        let now = self.clock.now();
        self.transact(&id, |object| {
            for attribute in &attributes {
                object.add_attribute(attribute.clone())?;
            }
            object.last_change_date = now;
            Ok((Commit::Update, ()))
        })?;

        let mut response = flatten(attributes.iter());
        response.extend(identified(&id));
        Ok(response)
    }

    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn activate(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let now = self.clock.now();
        self.transact(&id, |object| {
            object.activate(now)?;
            Ok((Commit::Update, ()))
        })?;
        Ok(identified(&id))
    }

    /// Revoke with `Revocation Reason Code` and an optional message
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn revoke(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let params = Params::new(request);
        let code = params
            .enumeration::<RevocationReasonCode>(keys::REVOCATION_REASON_CODE)?
            .ok_or_else(|| {
                KmsError::invalid_field(format!("missing '{}'", keys::REVOCATION_REASON_CODE))
            })?;
        let message = params.get(keys::REVOCATION_MESSAGE).map(str::to_string);
        let occurred = params.date_time(keys::COMPROMISE_OCCURRENCE_DATE)?;
        let now = self.clock.now();

        let state = self.transact(&id, |object| {
            object.revoke(RevocationReason::new(code, message.clone()), occurred, now)?;
            Ok((Commit::Update, object.state()))
        })?;
        if code == RevocationReasonCode::KeyCompromise {
            warn!(state = ?state, "Object reported compromised");
        }
        Ok(identified(&id))
    }

    /// Destroy key material, or remove a template outright
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn destroy(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let now = self.clock.now();
        let outcome = self.transact(&id, |object| {
            let outcome = object.destroy(now)?;
            let commit = match outcome {
                DestroyOutcome::Retain => Commit::Update,
                DestroyOutcome::Remove => Commit::Remove,
            };
            Ok((commit, outcome))
        })?;
        info!(?outcome, "Object destroyed");
        Ok(identified(&id))
    }

    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn archive(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let now = self.clock.now();
        self.transact(&id, |object| {
            object.archive(now);
            Ok((Commit::Update, ()))
        })?;
        Ok(identified(&id))
    }

    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn recover(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let now = self.clock.now();
        self.transact(&id, |object| {
            object.recover(now);
            Ok((Commit::Update, ()))
        })?;
        Ok(identified(&id))
    }

    /// Candidate attributes that exceed the object's constraints
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn check(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let candidates = unflatten(request)?;
        let violations = self.objects.get(&id)?.check(&candidates)?;
        if !violations.is_empty() {
            debug!(violations = violations.len(), "Check found violations");
        }
        let mut response = flatten(violations.iter());
        response.extend(identified(&id));
        Ok(response)
    }

    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn obtain_lease(
        &self,
        ctx: &mut RequestContext,
        request: &AttributeMap,
    ) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let now = self.clock.now();
        let lease = self.transact(&id, |object| {
            let lease = object.obtain_lease(now)?;
            Ok((Commit::Update, lease))
        })?;
        let mut response = identified(&id);
        response.insert(keys::LEASE_TIME.to_string(), lease.to_string());
        Ok(response)
    }

    /// Consume `Usage Limits Count` units; reports the remaining count
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn get_usage_allocation(
        &self,
        ctx: &mut RequestContext,
        request: &AttributeMap,
    ) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let requested = Params::new(request)
            .long_integer(keys::USAGE_LIMITS_COUNT)?
            .ok_or_else(|| {
                KmsError::invalid_field(format!("missing '{}'", keys::USAGE_LIMITS_COUNT))
            })?;
        let now = self.clock.now();
        let remaining = self.transact(&id, |object| {
            let remaining = object.get_usage_allocation(requested, now)?;
            Ok((Commit::Update, remaining))
        })?;

        let mut response = identified(&id);
        if let Some(remaining) = remaining {
            response.insert(keys::USAGE_LIMITS_COUNT.to_string(), remaining.to_string());
        }
        Ok(response)
    }

    /// Replace an object with a freshly keyed successor
    #[instrument(skip_all, fields(unique_id = field::Empty))]
    pub fn rekey(&self, ctx: &mut RequestContext, request: &AttributeMap) -> KmsResult<AttributeMap> {
        let id = self.target(ctx, request)?;
        let params = Params::new(request);
        let rekey_request = RekeyRequest {
            offset: params.interval(keys::OFFSET)?,
            algorithm: params.enumeration::<CryptographicAlgorithm>(keys::CRYPTOGRAPHIC_ALGORITHM)?,
            length: params.integer(keys::CRYPTOGRAPHIC_LENGTH)?,
        };
        let now = self.clock.now();
        let new_id = UniqueIdentifier::generate();

        self.access.grant(&new_id, ctx.credential())?;
        self.transact(&id, |source| {
            let successor = rekey(source, &rekey_request, new_id.clone(), now, self.provider.as_ref())?;
            Ok((Commit::UpdateAndInsert(successor), ()))
        })?;
        info!(replacement = %new_id, "Object rekeyed");
        ctx.set_placeholder(new_id.clone());
        Ok(identified(&new_id))
    }

    // ---- helpers ----

    /// Resolve the acting object and check the caller may use it
    fn target(&self, ctx: &RequestContext, request: &AttributeMap) -> KmsResult<UniqueIdentifier> {
        let id = ctx.resolve(Params::new(request).get(keys::UNIQUE_IDENTIFIER))?;
        Span::current().record(fields::UNIQUE_ID, id.as_str());
        self.access.verify(&id, ctx.credential())?;
        Ok(id)
    }

    /// Run `f` inside one store transaction and hand back its output
    fn transact<T>(
        &self,
        id: &UniqueIdentifier,
        mut f: impl FnMut(&mut ManagedObject) -> KmsResult<(Commit, T)>,
    ) -> KmsResult<T> {
        let mut output = None;
        self.objects.update(id, &mut |object| {
            let (commit, value) = f(object)?;
            output = Some(value);
            Ok(commit)
        })?;
        output.ok_or_else(|| KmsError::Storage(format!("update of {id} returned no result")))
    }
}

fn identified(id: &UniqueIdentifier) -> AttributeMap {
    AttributeMap::from([(keys::UNIQUE_IDENTIFIER.to_string(), id.to_string())])
}

fn empty_block(format: KeyFormatType) -> KeyBlock {
    KeyBlock::new(format, None, None, None)
}

/// An empty body for object types that carry generated or registered material
fn cryptographic_kind(object_type: ObjectType) -> KmsResult<ObjectKind> {
    match object_type {
        ObjectType::SymmetricKey => Ok(ObjectKind::SymmetricKey(CryptographicObject::new(
            empty_block(KeyFormatType::Raw),
        ))),
        ObjectType::SecretData => Ok(ObjectKind::SecretData(CryptographicObject::new(
            empty_block(KeyFormatType::Opaque),
        ))),
        other => Err(KmsError::illegal(format!(
            "{other} objects cannot be made this way; use CreateKeyPair or Register"
        ))),
    }
}

fn body_mut(object: &mut ManagedObject) -> KmsResult<&mut CryptographicObject> {
    let id = object.unique_id.clone();
    object
        .cryptographic_mut()
        .ok_or_else(|| KmsError::illegal(format!("template {id} holds no key material")))
}

/// Algorithm and length the provider must honor
fn generation_parameters(object: &ManagedObject) -> KmsResult<(CryptographicAlgorithm, i32)> {
    let block = &object
        .cryptographic()
        .ok_or_else(|| KmsError::illegal("templates hold no key material"))?
        .key_block;
    let algorithm = block.algorithm.ok_or_else(|| {
        KmsError::invalid_field(format!("missing '{}'", keys::CRYPTOGRAPHIC_ALGORITHM))
    })?;
    let length = block.length.ok_or_else(|| {
        KmsError::invalid_field(format!("missing '{}'", keys::CRYPTOGRAPHIC_LENGTH))
    })?;
    Ok((algorithm, length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{FixedClock, State};

    const NOW: i64 = 1_700_000_000;

    fn service() -> LifecycleService {
        LifecycleService::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryPermissionStore::new()),
            Arc::new(SoftwareKeyProvider::new()),
            Arc::new(FixedClock::new(NOW)),
        )
    }

    fn map(pairs: &[(&str, &str)]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn aes(name: &str) -> AttributeMap {
        map(&[
            ("Object Type", "Symmetric Key"),
            ("Cryptographic Algorithm", "AES"),
            ("Cryptographic Length", "256"),
            ("Name Value", name),
        ])
    }

    #[test]
    fn test_create_sets_placeholder() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        let created = service.create(&mut ctx, &aes("alpha")).unwrap();
        let id = created.get(keys::UNIQUE_IDENTIFIER).unwrap();
        assert_eq!(ctx.placeholder().unwrap().as_str(), id);

        let attributes = service.get_attributes(&mut ctx, &AttributeMap::new()).unwrap();
        assert_eq!(attributes.get("State").map(String::as_str), Some("Pre-Active"));
        assert_eq!(attributes.get("Name Value").map(String::as_str), Some("alpha"));
        assert!(attributes.contains_key("Digest Value"));
    }

    #[test]
    fn test_create_requires_algorithm() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        let err = service
            .create(&mut ctx, &map(&[("Object Type", "Symmetric Key")]))
            .unwrap_err();
        assert!(matches!(err, KmsError::InvalidField(_)));
        assert!(ctx.placeholder().is_none());
    }

    #[test]
    fn test_create_rejects_key_pair_types() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        let err = service
            .create(&mut ctx, &map(&[("Object Type", "Private Key")]))
            .unwrap_err();
        assert!(matches!(err, KmsError::IllegalOperation(_)));
    }

    #[test]
    fn test_create_with_past_activation_is_active() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        let mut request = aes("early");
        request.insert("Activation Date".into(), (NOW - 10).to_string());
        service.create(&mut ctx, &request).unwrap();
        let object = service
            .objects
            .get(ctx.placeholder().unwrap())
            .unwrap();
        assert_eq!(object.state(), Some(State::Active));
    }

    #[test]
    fn test_default_lease_time_applies() {
        let service = service().with_default_lease_time(600);
        let mut ctx = RequestContext::new(None);
        service.create(&mut ctx, &aes("leased")).unwrap();
        service.activate(&mut ctx, &AttributeMap::new()).unwrap();
        let lease = service.obtain_lease(&mut ctx, &AttributeMap::new()).unwrap();
        assert_eq!(lease.get(keys::LEASE_TIME).map(String::as_str), Some("600"));
    }

    #[test]
    fn test_key_pair_links_and_names() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        let pair = service
            .create_key_pair(
                &mut ctx,
                &map(&[
                    ("Cryptographic Algorithm", "ECDH"),
                    ("Cryptographic Length", "256"),
                    ("Name Value", "pair"),
                ]),
            )
            .unwrap();
        let private_id = pair.get(keys::PRIVATE_KEY_UNIQUE_IDENTIFIER).unwrap().as_str();
        let public_id = pair.get(keys::PUBLIC_KEY_UNIQUE_IDENTIFIER).unwrap().as_str();
        assert_eq!(ctx.placeholder().unwrap().as_str(), private_id);

        let private = service.objects.get(&private_id.into()).unwrap();
        let public = service.objects.get(&public_id.into()).unwrap();
        assert_eq!(private.name_values(), vec!["pair".to_string()]);
        assert!(public.name_values().is_empty());
        assert!(
            private
                .cryptographic()
                .unwrap()
                .links
                .contains(&Link::new(LinkType::PublicKeyLink, public_id.into()))
        );
        assert!(
            public
                .cryptographic()
                .unwrap()
                .links
                .contains(&Link::new(LinkType::PrivateKeyLink, private_id.into()))
        );
    }

    #[test]
    fn test_register_and_get_material() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        service
            .register(
                &mut ctx,
                &map(&[
                    ("Object Type", "Secret Data"),
                    ("Key Material", "deadbeef"),
                    ("Name Value", "password"),
                ]),
            )
            .unwrap();
        let got = service.get(&mut ctx, &AttributeMap::new()).unwrap();
        assert_eq!(got.get(keys::KEY_MATERIAL).map(String::as_str), Some("deadbeef"));
        assert_eq!(got.get("Object Type").map(String::as_str), Some("Secret Data"));
    }

    #[test]
    fn test_register_requires_material() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        let err = service
            .register(&mut ctx, &map(&[("Object Type", "Symmetric Key")]))
            .unwrap_err();
        assert!(matches!(err, KmsError::InvalidField(_)));
    }

    #[test]
    fn test_template_preset_is_merged() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        service
            .register(
                &mut ctx,
                &map(&[
                    ("Object Type", "Template"),
                    ("Name Value", "aes-preset"),
                    ("Cryptographic Algorithm", "AES"),
                    ("Cryptographic Length", "128"),
                    ("Lease Time", "60"),
                ]),
            )
            .unwrap();

        service
            .create(
                &mut ctx,
                &map(&[
                    ("Object Type", "Symmetric Key"),
                    ("Template", "aes-preset"),
                    ("Cryptographic Length", "256"),
                ]),
            )
            .unwrap();
        let object = service.objects.get(ctx.placeholder().unwrap()).unwrap();
        let body = object.cryptographic().unwrap();
        assert_eq!(body.key_block.algorithm, Some(CryptographicAlgorithm::Aes));
        assert_eq!(body.key_block.length, Some(256));
        assert_eq!(body.lease_time, Some(60));
    }

    #[test]
    fn test_locate_sets_placeholder() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        let created = service.create(&mut ctx, &aes("findme")).unwrap();

        let mut other = RequestContext::new(None);
        let found = service
            .locate(&mut other, &map(&[("Name Value", "findme")]))
            .unwrap();
        assert_eq!(found.get(keys::UNIQUE_IDENTIFIER), created.get(keys::UNIQUE_IDENTIFIER));
        assert_eq!(
            other.placeholder().map(UniqueIdentifier::as_str),
            created.get(keys::UNIQUE_IDENTIFIER).map(String::as_str)
        );

        assert!(matches!(
            service.locate(&mut other, &map(&[("Name Value", "missing")])),
            Err(KmsError::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_get_attributes_filter_and_list() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        service.create(&mut ctx, &aes("filtered")).unwrap();

        let filtered = service
            .get_attributes(&mut ctx, &map(&[("Attribute Names", "State, Cryptographic Length")]))
            .unwrap();
        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered.get("Cryptographic Length").map(String::as_str), Some("256"));

        let list = service.get_attribute_list(&mut ctx, &AttributeMap::new()).unwrap();
        let names = list.get(keys::ATTRIBUTE_NAMES).unwrap();
        assert!(names.contains("State"));
        assert!(names.contains("Name"));

        assert!(matches!(
            service.get_attributes(&mut ctx, &map(&[("Attribute Names", "Colour")])),
            Err(KmsError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn test_add_attribute() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        service.create(&mut ctx, &aes("annotated")).unwrap();
        service
            .add_attribute(&mut ctx, &map(&[("x-owner", "ops"), ("Name Value", "alias")]))
            .unwrap();
        let object = service.objects.get(ctx.placeholder().unwrap()).unwrap();
        assert_eq!(object.name_values().len(), 2);

        assert!(matches!(
            service.add_attribute(&mut ctx, &map(&[("State", "Active")])),
            Err(KmsError::ReadOnlyAttribute(_))
        ));
        assert!(matches!(
            service.add_attribute(&mut ctx, &map(&[("Cryptographic Length", "128")])),
            Err(KmsError::IllegalOperation(_))
        ));
        assert!(matches!(
            service.add_attribute(&mut ctx, &AttributeMap::new()),
            Err(KmsError::InvalidField(_))
        ));
    }

    #[test]
    fn test_revoke_requires_reason() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        service.create(&mut ctx, &aes("revoked")).unwrap();
        assert!(matches!(
            service.revoke(&mut ctx, &AttributeMap::new()),
            Err(KmsError::InvalidField(_))
        ));
        service
            .revoke(&mut ctx, &map(&[("Revocation Reason Code", "Key Compromise")]))
            .unwrap();
        let object = service.objects.get(ctx.placeholder().unwrap()).unwrap();
        assert_eq!(object.state(), Some(State::Compromised));
    }

    #[test]
    fn test_check_reports_violations() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        let mut request = aes("limited");
        request.insert("Usage Limits Count".into(), "10".into());
        request.insert("Lease Time".into(), "30".into());
        service.create(&mut ctx, &request).unwrap();

        let result = service
            .check(
                &mut ctx,
                &map(&[("Usage Limits Count", "11"), ("Lease Time", "20")]),
            )
            .unwrap();
        assert_eq!(result.get("Usage Limits Count").map(String::as_str), Some("11"));
        assert!(!result.contains_key("Lease Time"));
    }

    #[test]
    fn test_operations_without_target() {
        let service = service();
        let mut ctx = RequestContext::new(None);
        assert_eq!(
            service.activate(&mut ctx, &AttributeMap::new()),
            Err(KmsError::UniqueIdentifierMissing)
        );
    }

    #[test]
    fn test_process_reports_failures_in_order() {
        let service = service();
        let response = service.process(Request::new(vec![
            RequestItem::new(Operation::Activate),
            RequestItem {
                operation: Operation::Create,
                attributes: aes("batch"),
            },
            RequestItem::new(Operation::Activate),
            RequestItem::new(Operation::Activate),
        ]));

        assert_eq!(response.items.len(), 4);
        assert_eq!(
            response.items[0].reason(),
            Some(tessera_core::ResultReason::MissingData)
        );
        assert!(response.items[1].is_success());
        assert!(response.items[2].is_success());
        assert_eq!(
            response.items[3].reason(),
            Some(tessera_core::ResultReason::IllegalOperation)
        );
    }

    /// Accepts a fixed number of grants, then fails every write
    struct LimitedPermissions {
        inner: InMemoryPermissionStore,
        grants_left: std::sync::atomic::AtomicUsize,
    }

    impl LimitedPermissions {
        fn new(grants: usize) -> Self {
            Self {
                inner: InMemoryPermissionStore::new(),
                grants_left: std::sync::atomic::AtomicUsize::new(grants),
            }
        }
    }

    impl PermissionStore for LimitedPermissions {
        fn put_permission(&self, entry: tessera_core::UserPermissionEntry) -> KmsResult<()> {
            use std::sync::atomic::Ordering;
            self.grants_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map_err(|_| KmsError::Storage("permission table full".into()))?;
            self.inner.put_permission(entry)
        }

        fn get_permission(&self, id: &UniqueIdentifier) -> KmsResult<tessera_core::UserPermissionEntry> {
            self.inner.get_permission(id)
        }
    }

    fn limited_service(grants: usize) -> LifecycleService {
        LifecycleService::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(LimitedPermissions::new(grants)),
            Arc::new(SoftwareKeyProvider::new()),
            Arc::new(FixedClock::new(NOW)),
        )
    }

    #[test]
    fn test_failed_grant_stores_nothing() {
        let service = limited_service(0);
        let mut ctx = RequestContext::new(None);
        assert!(matches!(
            service.create(&mut ctx, &aes("orphan")),
            Err(KmsError::Storage(_))
        ));
        assert!(service.object_counts().unwrap().is_empty());

        let service = limited_service(1);
        let pair = map(&[
            ("Cryptographic Algorithm", "ECDH"),
            ("Cryptographic Length", "256"),
        ]);
        assert!(matches!(
            service.create_key_pair(&mut ctx, &pair),
            Err(KmsError::Storage(_))
        ));
        assert!(service.object_counts().unwrap().is_empty());
        assert!(ctx.placeholder().is_none());
    }

    #[test]
    fn test_failed_rekey_grant_leaves_source() {
        let service = limited_service(1);
        let mut ctx = RequestContext::new(None);
        service.create(&mut ctx, &aes("steady")).unwrap();
        let source = ctx.placeholder().unwrap().clone();

        assert!(matches!(
            service.rekey(&mut ctx, &AttributeMap::new()),
            Err(KmsError::Storage(_))
        ));
        assert_eq!(ctx.placeholder(), Some(&source));
        assert_eq!(
            service.object_counts().unwrap().get(&ObjectType::SymmetricKey),
            Some(&1)
        );
        let attributes = service
            .get_attributes(&mut ctx, &map(&[("Attribute Names", "Name, Link")]))
            .unwrap();
        assert_eq!(attributes.get("Name Value").map(String::as_str), Some("steady"));
        assert!(!attributes.contains_key("Link Type"));
    }
}
