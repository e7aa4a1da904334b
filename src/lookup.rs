//! Involved-object lookup
//!
//! Resolves the resource an event refers to so the watcher can overlay its
//! labels, annotations and owner references. Kinds are resolved to API
//! resources once per group/version/kind; object metadata is cached in an
//! LRU bounded by the configured cache size.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use kube::api::{Api, DynamicObject};
use kube::core::gvk::GroupVersionKind;
use kube::core::ApiResource;
use kube::discovery::{pinned_kind, Scope};
use kube::Client;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::event::ObjectReference;

/// Metadata overlaid onto an event's involved-object reference.
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    pub labels: Option<HashMap<String, String>>,
    pub annotations: Option<HashMap<String, String>>,
    pub owner_references: Vec<serde_json::Value>,
    pub resource_version: String,
}

/// What a lookup concluded about the object.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    Found(ObjectMetadata),
    /// The API server answered 404: the object is gone.
    NotFound,
    /// Any other failure; the event is kept unenriched.
    Failed,
}

pub struct ObjectLookup {
    client: Client,
    kinds: Mutex<HashMap<String, Option<(ApiResource, Scope)>>>,
    objects: Mutex<LruCache<String, ObjectMetadata>>,
}

impl ObjectLookup {
    pub fn new(client: Client, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            kinds: Mutex::new(HashMap::new()),
            objects: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up the referenced object. Results are cached by UID and
    /// resource version, so repeated events about one object are cheap.
    pub async fn lookup(&self, reference: &ObjectReference) -> LookupOutcome {
        if reference.kind.is_empty() || reference.name.is_empty() {
            return LookupOutcome::Failed;
        }

        let cache_key = format!("{}/{}", reference.uid, reference.resource_version);
        if let Some(cached) = self.objects.lock().await.get(&cache_key) {
            return LookupOutcome::Found(cached.clone());
        }

        let Some((resource, scope)) = self
            .resolve_kind(&reference.api_version, &reference.kind)
            .await
        else {
            return LookupOutcome::Failed;
        };

        let api: Api<DynamicObject> =
            if matches!(scope, Scope::Namespaced) && !reference.namespace.is_empty() {
                Api::namespaced_with(self.client.clone(), &reference.namespace, &resource)
            } else {
                Api::all_with(self.client.clone(), &resource)
            };

        match api.get(&reference.name).await {
            Ok(object) => {
                let meta = object.metadata;
                let metadata = ObjectMetadata {
                    labels: meta.labels.map(|m| m.into_iter().collect()),
                    annotations: meta.annotations.map(|m| m.into_iter().collect()),
                    owner_references: meta
                        .owner_references
                        .unwrap_or_default()
                        .iter()
                        .filter_map(|r| serde_json::to_value(r).ok())
                        .collect(),
                    resource_version: meta.resource_version.unwrap_or_default(),
                };
                self.objects.lock().await.put(cache_key, metadata.clone());
                LookupOutcome::Found(metadata)
            }
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(
                    kind = %reference.kind,
                    name = %reference.name,
                    "involved object is gone"
                );
                LookupOutcome::NotFound
            }
            Err(e) => {
                warn!(
                    kind = %reference.kind,
                    name = %reference.name,
                    error = %e,
                    "involved object lookup failed"
                );
                LookupOutcome::Failed
            }
        }
    }

    /// Resolve `(apiVersion, kind)` to an API resource, caching the answer
    /// (including a negative one).
    async fn resolve_kind(&self, api_version: &str, kind: &str) -> Option<(ApiResource, Scope)> {
        let key = format!("{api_version}/{kind}");
        let mut kinds = self.kinds.lock().await;
        if let Some(resolved) = kinds.get(&key) {
            return resolved.clone();
        }

        // `apiVersion` is `group/version`, or bare `version` for core.
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        let gvk = GroupVersionKind::gvk(group, version, kind);

        let resolved = match pinned_kind(&self.client, &gvk).await {
            Ok((resource, capabilities)) => Some((resource, capabilities.scope)),
            Err(e) => {
                warn!(api_version, kind, error = %e, "kind discovery failed");
                None
            }
        };
        kinds.insert(key, resolved.clone());
        resolved
    }
}

/// Overlay looked-up metadata onto the reference carried by an event.
pub fn apply_metadata(reference: &mut ObjectReference, metadata: ObjectMetadata) {
    reference.labels = metadata.labels;
    reference.annotations = metadata.annotations;
    reference.owner_references = metadata.owner_references;
    if !metadata.resource_version.is_empty() {
        reference.resource_version = metadata.resource_version;
    }
}
