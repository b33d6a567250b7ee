use serde_json::Value;
use std::path::Path;
use tracing::trace;

use crate::differ::{DriftError, DriftResult};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Accumulates the human-readable change report for one diff pass.
///
/// Exclusively owned by the orchestrator while the pass runs, then finalized
/// into the report string. Created and deleted lines are color-tagged;
/// unchanged objects contribute nothing.
pub struct ReportBuilder {
    buf: String,
    color: bool,
}

impl ReportBuilder {
    pub fn new(color: bool) -> Self {
        Self {
            buf: String::new(),
            color,
        }
    }

    pub fn created(&mut self, subject: &str) {
        self.tag(subject, "created", Some(GREEN));
    }

    pub fn drifted(&mut self, subject: &str) {
        self.tag(subject, "drifted", None);
    }

    pub fn deleted(&mut self, subject: &str) {
        self.tag(subject, "deleted", Some(RED));
    }

    fn tag(&mut self, subject: &str, tag: &str, color: Option<&str>) {
        match color {
            Some(color) if self.color => {
                self.buf
                    .push_str(&format!("{}► {} {}{}\n", color, subject, tag, RESET));
            }
            _ => self.buf.push_str(&format!("► {} {}\n", subject, tag)),
        }
    }

    /// Render the field-level diff between the live and merged forms of a
    /// drifted object beneath its summary line.
    ///
    /// The two documents are materialized into a temporary directory that is
    /// removed when this call returns, on every path. A failure here loses
    /// only this object's nested diff; the summary line already stands.
    pub fn nested_diff(&mut self, subject: &str, live: &Value, merged: &Value) -> DriftResult<()> {
        let dir = tempfile::tempdir().map_err(|e| DriftError::RenderWrite {
            subject: subject.to_string(),
            source: e,
        })?;
        let live_path = dir.path().join("live.yaml");
        let merged_path = dir.path().join("merged.yaml");

        write_document(subject, &live_path, live)?;
        write_document(subject, &merged_path, merged)?;

        let mut diff = kdriftdiff::Diff::from_files(&live_path, &merged_path)
            .map_err(|e| DriftError::RenderDiff(subject.to_string(), e))?;
        diff.do_compare()
            .map_err(|e| DriftError::RenderDiff(subject.to_string(), e))?;

        let text = diff.text(self.color);
        trace!("nested diff for {}:\n{}", subject, text);
        for line in text.lines() {
            self.buf.push_str("  ");
            self.buf.push_str(line);
            self.buf.push('\n');
        }
        Ok(())
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

fn write_document(subject: &str, path: &Path, document: &Value) -> DriftResult<()> {
    let yaml = serde_yaml::to_string(document).map_err(DriftError::YamlSerialize)?;
    std::fs::write(path, yaml).map_err(|e| DriftError::RenderWrite {
        subject: subject.to_string(),
        source: e,
    })
}
