use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::differ::{DriftError, DriftResult};

/// Structured identity of a managed object.
///
/// The canonical string encoding is `group_kind_namespace_name`, with empty
/// segments for the core API group and for cluster-scoped namespaces. Valid
/// Kubernetes kinds and object names never contain underscores, so the
/// encoding round-trips losslessly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectId {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn parse(id: &str) -> DriftResult<Self> {
        let parts: Vec<&str> = id.split('_').collect();
        if parts.len() != 4 {
            return Err(DriftError::IdentityParse(id.to_string()));
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }

    pub fn subject(&self) -> String {
        if self.namespace.is_empty() {
            format!("{}/{}", self.kind, self.name)
        } else {
            format!("{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.group, self.kind, self.namespace, self.name
        )
    }
}

/// One persisted inventory entry: identity string plus the API version that
/// was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub version: String,
}

/// The full set of objects this tool currently manages for one application.
///
/// A new snapshot is built fresh on every diff pass from that pass's change
/// records; the previous snapshot is read-only input owned by whoever
/// persists reconciliation state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub entries: Vec<Entry>,
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record an object identity. Entries are unique by identity string;
    /// re-adding an identity is a no-op.
    pub fn add(&mut self, id: &ObjectId, version: &str) {
        let id = id.to_string();
        if self.entries.iter().any(|entry| entry.id == id) {
            return;
        }
        self.entries.push(Entry {
            id,
            version: version.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn version_of(&self, id: &ObjectId) -> String {
        let id = id.to_string();
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.version.clone())
            .unwrap_or_default()
    }

    fn ids(&self) -> DriftResult<Vec<ObjectId>> {
        self.entries
            .iter()
            .map(|entry| ObjectId::parse(&entry.id))
            .collect()
    }

    /// Identities present in this inventory but absent from `newer`: the
    /// objects that would be removed on the next real apply.
    ///
    /// Any unparsable entry fails the whole call; a partial prune set cannot
    /// be computed safely. The result is sorted by the canonical object
    /// ordering so output is reproducible, and is commonly empty.
    pub fn diff(&self, newer: &Inventory) -> DriftResult<Vec<PruneCandidate>> {
        let old_ids = self.ids()?;
        let new_ids = newer.ids()?;

        let mut candidates: Vec<PruneCandidate> = old_ids
            .into_iter()
            .filter(|id| !new_ids.contains(id))
            .map(|id| {
                let version = self.version_of(&id);
                PruneCandidate { id, version }
            })
            .collect();

        candidates.sort_by(|a, b| canonical_order(&a.id, &b.id));
        Ok(candidates)
    }
}

/// Minimal placeholder for an object that should be pruned. Exists for
/// display only and is never applied to the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct PruneCandidate {
    pub id: ObjectId,
    pub version: String,
}

impl PruneCandidate {
    pub fn subject(&self) -> String {
        self.id.subject()
    }
}

// Cluster-foundational kinds sort ahead of the workloads that depend on
// them; unknown kinds sort last.
const APPLY_ORDER: &[&str] = &[
    "PriorityClass",
    "Namespace",
    "NetworkPolicy",
    "ResourceQuota",
    "LimitRange",
    "PodDisruptionBudget",
    "ServiceAccount",
    "Secret",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
    "Role",
    "RoleBinding",
    "Service",
    "DaemonSet",
    "Pod",
    "ReplicaSet",
    "Deployment",
    "HorizontalPodAutoscaler",
    "StatefulSet",
    "Job",
    "CronJob",
    "IngressClass",
    "Ingress",
    "APIService",
];

fn kind_rank(kind: &str) -> usize {
    APPLY_ORDER
        .iter()
        .position(|candidate| *candidate == kind)
        .unwrap_or(APPLY_ORDER.len())
}

pub fn canonical_order(a: &ObjectId, b: &ObjectId) -> Ordering {
    kind_rank(&a.kind)
        .cmp(&kind_rank(&b.kind))
        .then_with(|| a.namespace.cmp(&b.namespace))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.group.cmp(&b.group))
}
