use serde::Deserialize;
use serde_json::{Map, Value};

use crate::differ::{DriftError, DriftResult};
use crate::inventory::ObjectId;

/// One rendered manifest entry, not yet applied.
///
/// Identity is (group, kind, namespace, name); the version is metadata that
/// may change between runs without the object becoming a different object.
/// The namespace is the empty string for cluster-scoped resources.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredObject {
    doc: Value,
    name: String,
    namespace: String,
    kind: String,
    group: String,
    version: String,
}

impl DesiredObject {
    pub fn from_value(doc: Value) -> DriftResult<Self> {
        let api_version = doc
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| DriftError::MissingField(String::from("apiVersion")))?
            .to_string();
        let kind = doc
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| DriftError::MissingField(String::from("kind")))?
            .to_string();
        let name = doc
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| DriftError::MissingField(String::from("metadata.name")))?
            .to_string();
        let namespace = doc
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let (group, version) = split_api_version(&api_version);

        Ok(Self {
            doc,
            name,
            namespace,
            kind,
            group,
            version,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// The full parsed document. Opaque payload from the core's point of
    /// view; only the resource manager and the redaction comparator look
    /// inside.
    pub fn doc(&self) -> &Value {
        &self.doc
    }

    pub fn id(&self) -> ObjectId {
        ObjectId::new(&self.group, &self.kind, &self.namespace, &self.name)
    }

    pub fn subject(&self) -> String {
        if self.namespace.is_empty() {
            format!("{}/{}", self.kind, self.name)
        } else {
            format!("{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }

    pub fn annotations(&self) -> Option<&Map<String, Value>> {
        self.doc
            .pointer("/metadata/annotations")
            .and_then(Value::as_object)
    }

    /// The `data` payload map, present on Secrets and ConfigMaps.
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.doc.get("data").and_then(Value::as_object)
    }
}

/// Parse a rendered multi-document YAML stream into desired objects,
/// preserving document order.
///
/// Every document must carry apiVersion, kind and a metadata name; blank
/// documents between separators are skipped.
pub fn parse_objects(manifests: &str) -> DriftResult<Vec<DesiredObject>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifests) {
        let yaml = serde_yaml::Value::deserialize(document).map_err(DriftError::YamlDeserialize)?;
        let value: Value = serde_yaml::from_value(yaml).map_err(DriftError::YamlDeserialize)?;
        if value.is_null() {
            continue;
        }
        objects.push(DesiredObject::from_value(value)?);
    }
    Ok(objects)
}

fn split_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}
