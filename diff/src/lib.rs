use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
enum DocumentError {
    #[error("failed to read `{0}`: {1}")]
    Unreadable(String, std::io::Error),

    #[error("document is not valid YAML: {0}")]
    InvalidYaml(serde_yaml::Error),

    #[error("Missing a document to compare")]
    MissingDocument,
}

/// Compare two Kubernetes manifest documents (JSON or YAML sourced).
///
/// `left` is the document being diffed into, and `right` is the document with
/// the changes. Both sides are expected to be pre-sanitized by the caller:
/// volatile metadata the cluster churns on its own (resourceVersion, uid,
/// managedFields, status and friends) should be stripped before comparing.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Diff {
    items: Vec<DiffItem>,
    left: Option<Value>,
    right: Option<Value>,
}

impl Diff {
    pub fn new(left: Option<Value>, right: Option<Value>) -> Diff {
        Diff {
            left,
            right,
            items: Vec::new(),
        }
    }

    /// Load the two sides from YAML files on disk.
    ///
    /// Each file must hold a single document. Used by report rendering, which
    /// materializes the live and merged forms as scoped temporary files.
    pub fn from_files(left: &Path, right: &Path) -> Result<Diff> {
        debug!("loading diff documents {:?} and {:?}", left, right);
        Ok(Diff::new(
            Some(load_document(left)?),
            Some(load_document(right)?),
        ))
    }

    /// Usually the first call after [Diff::new]. Walks both documents and
    /// records every added, removed, or updated field.
    ///
    /// After running this method, see the result with [Diff::text] or
    /// [Diff::ordered_changes].
    pub fn do_compare(&mut self) -> Result<()> {
        // Take ownership to avoid the borrow checker issue with
        // self-referential borrows
        let left = std::mem::take(&mut self.left);
        let right = std::mem::take(&mut self.right);

        let result = match (left.as_ref(), right.as_ref()) {
            (None, None) => Err(anyhow!(DocumentError::MissingDocument)),
            (Some(l), None) => {
                self.push(Vec::new(), Status::Removed, Some(l.clone()), None);
                Ok(())
            }
            (None, Some(r)) => {
                self.push(Vec::new(), Status::Added, None, Some(r.clone()));
                Ok(())
            }
            (Some(l), Some(r)) => {
                let mut path = Vec::new();
                self.compare_values(l, r, &mut path);
                Ok(())
            }
        };

        self.left = left;
        self.right = right;

        result
    }

    /// After running the comparison, check if anything was changed.
    /// `true` means differences were found.
    pub fn is_diff(&self) -> bool {
        !self.items.is_empty()
    }

    /// Changed paths in traversal order, prefixed `+` (added), `-` (removed)
    /// or `^` (updated).
    pub fn ordered_changes(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| {
                let prefix = match item.status {
                    Status::Added => "+",
                    Status::Removed => "-",
                    Status::Updated => "^",
                };
                format!("{}{}", prefix, item.path_string())
            })
            .collect::<Vec<_>>()
    }

    /// After running `.do_compare()`, results can be returned as a String.
    ///
    /// Each changed path renders as a small block: the path on its own line,
    /// then the removed value with a `-` sign and/or the added value with a
    /// `+` sign. ANSI coloring is used when `color` is set.
    pub fn text(&self, color: bool) -> String {
        let (red, green, reset) = if color {
            ("\x1b[31m", "\x1b[32m", "\x1b[0m")
        } else {
            ("", "", "")
        };

        let mut output = String::new();
        for item in &self.items {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&item.path_string());
            if let Some(before) = &item.before {
                output.push_str(&format!("\n  {}- {}{}", red, fmt_value(before), reset));
            }
            if let Some(after) = &item.after {
                output.push_str(&format!("\n  {}+ {}{}", green, fmt_value(after), reset));
            }
        }
        output
    }

    fn push(&mut self, path: Vec<Key>, status: Status, before: Option<Value>, after: Option<Value>) {
        self.items.push(DiffItem {
            path,
            status,
            before,
            after,
        });
    }

    fn compare_values(&mut self, left: &Value, right: &Value, path: &mut Vec<Key>) {
        match (left, right) {
            (Value::Object(l), Value::Object(r)) => self.compare_objects(l, r, path),
            (Value::Array(l), Value::Array(r)) => self.compare_arrays(l, r, path),
            _ => {
                if left != right {
                    if kind_of(left) != kind_of(right) {
                        warn!("type mismatch at {}", path_of(path));
                    }
                    self.push(
                        path.clone(),
                        Status::Updated,
                        Some(left.clone()),
                        Some(right.clone()),
                    );
                }
            }
        }
    }

    fn compare_objects(
        &mut self,
        left: &Map<String, Value>,
        right: &Map<String, Value>,
        path: &mut Vec<Key>,
    ) {
        for (key, l_item) in left {
            path.push(Key::Field(key.clone()));
            match right.get(key) {
                None => self.push(path.clone(), Status::Removed, Some(l_item.clone()), None),
                Some(r_item) => self.compare_values(l_item, r_item, path),
            }
            path.pop();
        }
        for (key, r_item) in right {
            if left.contains_key(key) {
                continue;
            }
            path.push(Key::Field(key.clone()));
            self.push(path.clone(), Status::Added, None, Some(r_item.clone()));
            path.pop();
        }
    }

    fn compare_arrays(&mut self, left: &[Value], right: &[Value], path: &mut Vec<Key>) {
        // Positional comparison: entries past the shorter side's length are
        // whole additions or removals.
        let shared = left.len().min(right.len());
        for index in 0..shared {
            path.push(Key::Index(index));
            self.compare_values(&left[index], &right[index], path);
            path.pop();
        }
        for (index, l_item) in left.iter().enumerate().skip(shared) {
            path.push(Key::Index(index));
            self.push(path.clone(), Status::Removed, Some(l_item.clone()), None);
            path.pop();
        }
        for (index, r_item) in right.iter().enumerate().skip(shared) {
            path.push(Key::Index(index));
            self.push(path.clone(), Status::Added, None, Some(r_item.clone()));
            path.pop();
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct DiffItem {
    path: Vec<Key>,
    status: Status,
    before: Option<Value>,
    after: Option<Value>,
}

impl DiffItem {
    fn path_string(&self) -> String {
        path_of(&self.path)
    }
}

fn path_of(path: &[Key]) -> String {
    if path.is_empty() {
        return String::from(".");
    }
    let mut out = String::new();
    for key in path {
        match key {
            Key::Field(name) => {
                if name.contains('.') {
                    out.push_str(&format!(".[{}]", name));
                } else {
                    out.push('.');
                    out.push_str(name);
                }
            }
            Key::Index(index) => out.push_str(&format!("[{}]", index)),
        }
    }
    out
}

fn fmt_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Key {
    Field(String),
    Index(usize),
}

impl Default for Key {
    fn default() -> Self {
        Key::Index(0)
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
enum Status {
    Added,
    Removed,
    #[default]
    Updated,
}

fn load_document(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!(DocumentError::Unreadable(path.display().to_string(), e)))?;
    serde_yaml::from_str(&raw).map_err(|e| anyhow!(DocumentError::InvalidYaml(e)))
}
