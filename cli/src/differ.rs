use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::inventory::{Inventory, ObjectId};
use crate::manager::{ApplyAction, DiffOptions, ResourceManager};
use crate::report::ReportBuilder;
use crate::resource::DesiredObject;
use crate::secrets;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriftError {
    #[error("k8s error: {0:?}")]
    Kube(kube::Error),
    #[error("conflict while computing dry-run: {0}")]
    KubeConflict(kube::Error),
    #[error("failed to compare {subject}: {reason}")]
    Comparison { subject: String, reason: String },
    #[error("deadline exceeded while comparing {0}")]
    DeadlineExceeded(String),
    #[error("invalid inventory entry `{0}`")]
    IdentityParse(String),
    #[error("failed writing diff artifacts for {subject}: {source}")]
    RenderWrite {
        subject: String,
        source: std::io::Error,
    },
    #[error("failed rendering diff for {0}: {1:?}")]
    RenderDiff(String, anyhow::Error),
    #[error("failed converting resource {0}: {1:?}")]
    Conversion(String, serde_json::Error),
    #[error("failed to deserialize yaml document: {0:?}")]
    YamlDeserialize(serde_yaml::Error),
    #[error("failed to serialize yaml document: {0:?}")]
    YamlSerialize(serde_yaml::Error),
    #[error("`{0}` missing in resource")]
    MissingField(String),
}

pub type DriftResult<T> = Result<T, DriftError>;

/// What would happen to one object on the next real apply. Owned by this
/// core as a closed set; the resource manager's vocabulary is mapped in and
/// never passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Configured,
    Unchanged,
    Deleted,
}

impl From<ApplyAction> for Action {
    fn from(action: ApplyAction) -> Self {
        match action {
            ApplyAction::Created => Action::Created,
            ApplyAction::Configured => Action::Configured,
            ApplyAction::Unchanged | ApplyAction::Skipped => Action::Unchanged,
        }
    }
}

/// Outcome of comparing one object. Exactly one record per desired object
/// per pass; the action may be downgraded (Configured to Unchanged) by the
/// secret redaction override but never upgraded.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub subject: String,
    pub action: Action,
    pub id: ObjectId,
    pub version: String,
}

/// Everything one diff pass produces. The report text is always present,
/// even when `errors` is not empty; callers decide whether a non-empty error
/// list is a hard failure.
#[derive(Debug)]
pub struct DiffOutcome {
    pub records: Vec<ChangeRecord>,
    pub report: String,
    pub inventory: Inventory,
    pub created_or_drifted: bool,
    pub errors: Vec<DriftError>,
}

/// Drives one read-only comparison pass: desired objects against the live
/// cluster, then the previous inventory against the freshly built one.
///
/// Objects are compared sequentially in desired order. Nothing here mutates
/// cluster state (the manager runs dry-run only) and the inventory snapshot
/// is never written anywhere; persistence belongs to the caller.
pub struct Differ<M> {
    manager: M,
    timeout: Duration,
    prune: bool,
    color: bool,
    options: DiffOptions,
}

impl<M: ResourceManager + Send + Sync> Differ<M> {
    pub fn new(manager: M, timeout: Duration) -> Self {
        Self {
            manager,
            timeout,
            prune: false,
            color: false,
            options: DiffOptions::reconcile_exclusions(),
        }
    }

    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub async fn diff(
        &self,
        objects: &[DesiredObject],
        old_inventory: Option<&Inventory>,
    ) -> DiffOutcome {
        // One deadline bounds the whole pass. Once it elapses, this and
        // every remaining comparison fails; records produced so far stand.
        let deadline = Instant::now() + self.timeout;

        let mut report = ReportBuilder::new(self.color);
        let mut inventory = Inventory::new();
        let mut records: Vec<ChangeRecord> = Vec::new();
        let mut errors: Vec<DriftError> = Vec::new();
        let mut created_or_drifted = false;
        let mut comparison_failed = false;

        for desired in objects {
            let result = match timeout_at(deadline, self.manager.diff(desired, &self.options)).await
            {
                Err(_) => {
                    warn!("deadline elapsed before {} was compared", desired.subject());
                    errors.push(DriftError::DeadlineExceeded(desired.subject()));
                    comparison_failed = true;
                    continue;
                }
                Ok(Err(e)) => {
                    // gather errors and continue, as we want to see all the diffs
                    warn!("could not compare {}: {}", desired.subject(), e);
                    errors.push(e);
                    comparison_failed = true;
                    continue;
                }
                Ok(Ok(result)) => result,
            };

            let mut action = Action::from(result.action);
            let mut live = result.live;
            let mut merged = result.merged;

            // An encrypted secret only counts as drifted when its key set
            // changed; values are never compared or displayed in plaintext.
            if desired.kind() == "Secret" && action == Action::Configured {
                action =
                    secrets::reclassify_sops_secret(desired, live.as_mut(), merged.as_mut(), action);
            }

            match action {
                Action::Created => {
                    report.created(&desired.subject());
                    created_or_drifted = true;
                }
                Action::Configured => {
                    report.drifted(&desired.subject());
                    created_or_drifted = true;
                    if let (Some(live), Some(merged)) = (live.as_ref(), merged.as_ref()) {
                        if let Err(e) = report.nested_diff(&desired.subject(), live, merged) {
                            warn!("lost nested diff for {}: {}", desired.subject(), e);
                            errors.push(e);
                        }
                    }
                }
                Action::Unchanged | Action::Deleted => {
                    debug!("{} is unchanged", desired.subject());
                }
            }

            records.push(ChangeRecord {
                subject: desired.subject(),
                action,
                id: desired.id(),
                version: desired.version().to_string(),
            });
            inventory.add(&desired.id(), desired.version());
        }

        // Deletion candidates come from subtracting the new inventory from
        // the previous one. With partial comparison results that subtraction
        // would list objects that merely failed to compare, so it is skipped
        // outright.
        if self.prune && !comparison_failed {
            if let Some(old) = old_inventory {
                match old.diff(&inventory) {
                    Ok(candidates) => {
                        for candidate in candidates {
                            report.deleted(&candidate.subject());
                            records.push(ChangeRecord {
                                subject: candidate.subject(),
                                action: Action::Deleted,
                                id: candidate.id,
                                version: candidate.version,
                            });
                        }
                    }
                    Err(e) => {
                        warn!("skipping prune detection: {}", e);
                        errors.push(e);
                    }
                }
            }
        } else if self.prune {
            info!("skipping prune detection, comparison pass was incomplete");
        }

        DiffOutcome {
            records,
            report: report.finish(),
            inventory,
            created_or_drifted,
            errors,
        }
    }
}
