use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use tracing::warn;

use crate::differ::Action;
use crate::resource::DesiredObject;

/// Marker the manifest-render pipeline substitutes for values it kept
/// encrypted at rest.
pub const SOPS_MASK: &str = "**SOPS**";

/// Replacement for payload values once an object is redacted.
const REDACTED_VALUE: &str = "*****";

/// Reclassify a secret whose payload is encrypted at rest.
///
/// Encrypted values change on every render, so value comparison is
/// meaningless and must never reach a report. When any payload entry carries
/// the encryption marker and both the live and merged forms are present,
/// every payload value in both forms is replaced with a masking constant and
/// the object counts as changed only if the sorted key sets differ. Entries
/// without the marker do not affect the decision; a payload mixing encrypted
/// and plain entries is still redacted uniformly.
///
/// The downgrade is one-directional: a Configured classification can become
/// Unchanged here, never the reverse of an Unchanged input. With either form
/// absent there is nothing to fingerprint and the incoming action is kept.
pub fn reclassify_sops_secret(
    desired: &DesiredObject,
    mut live: Option<&mut Value>,
    mut merged: Option<&mut Value>,
    action: Action,
) -> Action {
    let Some(data) = desired.data() else {
        return action;
    };

    let mut action = action;
    for value in data.values() {
        let Some(encoded) = value.as_str() else {
            continue;
        };
        let decoded = match general_purpose::STANDARD.decode(encoded) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    "undecodable secret value in {}: {}",
                    desired.subject(),
                    e
                );
                continue;
            }
        };
        if !String::from_utf8_lossy(&decoded).contains(SOPS_MASK) {
            continue;
        }

        if let (Some(live), Some(merged)) = (live.as_deref_mut(), merged.as_deref_mut()) {
            action = Action::Unchanged;
            let live_keys = redact_payload(live);
            let merged_keys = redact_payload(merged);
            if live_keys != merged_keys {
                action = Action::Configured;
            }
        }
    }
    action
}

/// Replace every payload value with the masking constant and return the
/// sorted key sequence, the only thing encrypted payloads can be compared on.
fn redact_payload(object: &mut Value) -> Vec<String> {
    let Some(data) = object.get_mut("data").and_then(Value::as_object_mut) else {
        return Vec::new();
    };

    let mut keys: Vec<String> = Vec::with_capacity(data.len());
    for (key, value) in data.iter_mut() {
        *value = Value::String(String::from(REDACTED_VALUE));
        keys.push(key.clone());
    }
    keys.sort();
    keys
}
