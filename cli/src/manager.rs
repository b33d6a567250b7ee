use async_trait::async_trait;
use kube::{
    api::{Api, GroupVersionKind, PostParams},
    core::DynamicObject,
    discovery::{ApiResource, Discovery, Scope},
    Client, ResourceExt,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::differ::{DriftError, DriftResult};
use crate::resource::DesiredObject;

/// Annotation that excludes an object from reconciliation and diffing.
pub const RECONCILE_ANNOTATION: &str = "kdrift/reconcile";
pub const RECONCILE_DISABLED: &str = "disabled";

/// Per-pass options handed to the resource manager.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Objects carrying any of these annotation key/value pairs are skipped.
    pub exclusions: HashMap<String, String>,
}

impl DiffOptions {
    pub fn reconcile_exclusions() -> Self {
        let mut exclusions = HashMap::new();
        exclusions.insert(
            String::from(RECONCILE_ANNOTATION),
            String::from(RECONCILE_DISABLED),
        );
        Self { exclusions }
    }

    pub fn excludes(&self, desired: &DesiredObject) -> bool {
        let Some(annotations) = desired.annotations() else {
            return false;
        };
        self.exclusions.iter().any(|(key, value)| {
            annotations.get(key).and_then(Value::as_str) == Some(value.as_str())
        })
    }
}

/// Action the manager observed for one object during the dry run. This is
/// the manager's own vocabulary; the diffing core maps it into its closed
/// action set and never passes it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    Created,
    Configured,
    Unchanged,
    Skipped,
}

/// Result of one dry-run comparison. `live` is the current cluster state of
/// the object (absent when it does not exist yet) and `merged` the
/// hypothetical state after a server-side apply. Both are scoped to this one
/// comparison and are never persisted.
#[derive(Debug, Clone)]
pub struct ManagerDiff {
    pub action: ApplyAction,
    pub live: Option<Value>,
    pub merged: Option<Value>,
}

/// Boundary to the cluster: authoritative for live state and for computing
/// server-side dry-run merges. The diffing core only ever talks to the
/// cluster through this trait.
#[async_trait]
pub trait ResourceManager {
    async fn diff(&self, desired: &DesiredObject, options: &DiffOptions)
        -> DriftResult<ManagerDiff>;
}

/// Resource manager backed by the Kubernetes API.
///
/// For each object it fetches the live form, strips the metadata the cluster
/// churns on its own, performs a dry-run replace (or create when the object
/// does not exist) under this tool's field manager, and derives the action
/// from the sanitized live/merged pair.
pub struct KubeResourceManager {
    client: Client,
    discovery: Option<Discovery>,
    field_manager: String,
}

impl KubeResourceManager {
    // Maximum number of retry attempts for API calls before giving up
    const MAX_RETRIES: u32 = 3;

    pub async fn new(client: Client, field_manager: impl Into<String>) -> Self {
        let discovery = match Discovery::new(client.clone()).run().await {
            Ok(discovery) => Some(discovery),
            Err(e) => {
                warn!(
                    "api discovery failed, falling back to pluralized resource names: {}",
                    e
                );
                None
            }
        };

        Self {
            client,
            discovery,
            field_manager: field_manager.into(),
        }
    }

    fn api_for(&self, desired: &DesiredObject) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(desired.group(), desired.version(), desired.kind());
        let (resource, namespaced) = match self
            .discovery
            .as_ref()
            .and_then(|discovery| discovery.resolve_gvk(&gvk))
        {
            Some((resource, capabilities)) => (
                resource,
                matches!(capabilities.scope, Scope::Namespaced),
            ),
            None => (guessed_resource(desired), !desired.namespace().is_empty()),
        };

        if namespaced {
            let namespace = if desired.namespace().is_empty() {
                "default"
            } else {
                desired.namespace()
            };
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        }
    }

    async fn fetch_live(
        &self,
        api: &Api<DynamicObject>,
        desired: &DesiredObject,
    ) -> DriftResult<Option<DynamicObject>> {
        for attempt in 0..=Self::MAX_RETRIES {
            match api.get_opt(desired.name()).await {
                Ok(found) => return Ok(found),
                Err(kube::Error::Api(response))
                    if (response.code == 429 || response.code == 500)
                        && attempt < Self::MAX_RETRIES =>
                {
                    // backoff, max 30 seconds
                    let backoff = 30_f32.min(attempt.pow(2) as f32 / 10.);
                    tokio::time::sleep(std::time::Duration::from_secs_f32(backoff)).await;
                }
                Err(e) => return Err(DriftError::Kube(e)),
            }
        }
        Err(retries_exhausted(desired))
    }

    async fn dry_run_replace(
        &self,
        api: &Api<DynamicObject>,
        desired: &DesiredObject,
        object: &DynamicObject,
    ) -> DriftResult<DynamicObject> {
        let params = self.dry_run_params();
        for attempt in 0..=Self::MAX_RETRIES {
            match api.replace(desired.name(), &params, object).await {
                Ok(merged) => {
                    trace!(
                        "{} dry-run merged manifest: {}",
                        desired.subject(),
                        serde_yaml::to_string(&merged).unwrap_or_default()
                    );
                    return Ok(merged);
                }
                Err(kube::Error::Api(response)) if response.code == 409 => {
                    // The object changed between our fetch and the dry run;
                    // the caller refetches and retries the whole comparison.
                    return Err(DriftError::KubeConflict(kube::Error::Api(response)));
                }
                Err(kube::Error::Api(response))
                    if (response.code == 429 || response.code == 500)
                        && attempt < Self::MAX_RETRIES =>
                {
                    let backoff = 30_f32.min(attempt.pow(2) as f32 / 10.);
                    tokio::time::sleep(std::time::Duration::from_secs_f32(backoff)).await;
                }
                Err(e) => return Err(DriftError::Kube(e)),
            }
        }
        Err(retries_exhausted(desired))
    }

    async fn dry_run_create(
        &self,
        api: &Api<DynamicObject>,
        desired: &DesiredObject,
        object: &DynamicObject,
    ) -> DriftResult<DynamicObject> {
        let params = self.dry_run_params();
        for attempt in 0..=Self::MAX_RETRIES {
            match api.create(&params, object).await {
                Ok(merged) => return Ok(merged),
                Err(kube::Error::Api(response))
                    if (response.code == 429 || response.code == 500)
                        && attempt < Self::MAX_RETRIES =>
                {
                    let backoff = 30_f32.min(attempt.pow(2) as f32 / 10.);
                    tokio::time::sleep(std::time::Duration::from_secs_f32(backoff)).await;
                }
                Err(e) => return Err(DriftError::Kube(e)),
            }
        }
        Err(retries_exhausted(desired))
    }

    fn dry_run_params(&self) -> PostParams {
        PostParams {
            dry_run: true,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

#[async_trait]
impl ResourceManager for KubeResourceManager {
    async fn diff(
        &self,
        desired: &DesiredObject,
        options: &DiffOptions,
    ) -> DriftResult<ManagerDiff> {
        if options.excludes(desired) {
            debug!("{} is excluded from reconciliation", desired.subject());
            return Ok(ManagerDiff {
                action: ApplyAction::Skipped,
                live: None,
                merged: None,
            });
        }

        let api = self.api_for(desired);
        let mut desired_object: DynamicObject = serde_json::from_value(desired.doc().clone())
            .map_err(|e| DriftError::Conversion(desired.subject(), e))?;

        for attempt in 0..=Self::MAX_RETRIES {
            debug!(
                "dry-run comparison for {} attempt #{}",
                desired.subject(),
                attempt
            );

            let live = match self.fetch_live(&api, desired).await? {
                Some(mut found) => {
                    // Carry over the coordinates the apiserver insists on for
                    // a replace, then strip the volatile metadata so the
                    // comparison stays clean.
                    desired_object.metadata.resource_version = found.resource_version();
                    desired_object.metadata.uid = found.uid();
                    sanitize(&mut found);
                    Some(found)
                }
                None => None,
            };

            let result = match &live {
                Some(_) => self.dry_run_replace(&api, desired, &desired_object).await,
                None => self.dry_run_create(&api, desired, &desired_object).await,
            };

            let mut merged = match result {
                Ok(merged) => merged,
                Err(DriftError::KubeConflict(e)) if attempt < Self::MAX_RETRIES => {
                    warn!("the resource changed during diff: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            sanitize(&mut merged);

            let live = live
                .map(|object| to_document(desired, &object))
                .transpose()?;
            let merged = to_document(desired, &merged)?;

            let action = match &live {
                None => ApplyAction::Created,
                Some(live_doc) if *live_doc == merged => ApplyAction::Unchanged,
                Some(_) => ApplyAction::Configured,
            };

            return Ok(ManagerDiff {
                action,
                live,
                merged: Some(merged),
            });
        }

        Err(retries_exhausted(desired))
    }
}

/// Remove the parts of the object that change often so diffs can be "clean"
fn sanitize(object: &mut DynamicObject) {
    object.metadata.creation_timestamp = None;
    object.metadata.generation = None;
    object.metadata.managed_fields = None;
    object.metadata.owner_references = None;
    object.metadata.resource_version = None;
    object.metadata.uid = None;

    if let Some(map) = object.data.as_object_mut() {
        map.remove("status");
    }
}

fn to_document(desired: &DesiredObject, object: &DynamicObject) -> DriftResult<Value> {
    serde_json::to_value(object).map_err(|e| DriftError::Conversion(desired.subject(), e))
}

fn retries_exhausted(desired: &DesiredObject) -> DriftError {
    DriftError::Comparison {
        subject: desired.subject(),
        reason: String::from("retries exhausted"),
    }
}

/// Last-resort resource naming when discovery is unavailable. Covers the
/// common English plurals the way the apiserver derives them.
fn guessed_resource(desired: &DesiredObject) -> ApiResource {
    let kind = desired.kind();
    let plural = if let Some(stem) = kind.strip_suffix('y') {
        format!("{}ies", stem)
    } else if kind.ends_with('s') {
        format!("{}es", kind)
    } else {
        format!("{}s", kind)
    };

    ApiResource {
        group: desired.group().to_string(),
        version: desired.version().to_string(),
        api_version: desired.api_version(),
        kind: kind.to_string(),
        plural: plural.to_lowercase(),
    }
}
