//! Integration tests for the kdriftdiff library.
//!
//! These tests verify the end-to-end functionality of comparing Kubernetes
//! manifests, including file-backed document loading.

use kdriftdiff::Diff;

/// Helper to create a diff between two YAML strings and return the Diff object
fn diff_yaml_strings(lhs_yaml: &str, rhs_yaml: &str) -> Diff {
    let lhs: serde_json::Value = serde_yaml::from_str(lhs_yaml).expect("Invalid LHS YAML");
    let rhs: serde_json::Value = serde_yaml::from_str(rhs_yaml).expect("Invalid RHS YAML");
    Diff::new(Some(lhs), Some(rhs))
}

// ==================== End-to-End Workflow Tests ====================

#[test]
fn test_full_k8s_manifest_comparison_workflow() {
    let lhs_yaml = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: my-app
  namespace: production
spec:
  replicas: 3
  template:
    spec:
      containers:
        - name: app
          image: myapp:v1.0.0
          ports:
            - containerPort: 8080
          env:
            - name: LOG_LEVEL
              value: info
"#;

    let rhs_yaml = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: my-app
  namespace: production
spec:
  replicas: 5
  template:
    spec:
      containers:
        - name: app
          image: myapp:v2.0.0
          ports:
            - containerPort: 8080
          env:
            - name: LOG_LEVEL
              value: debug
"#;

    let mut diff = diff_yaml_strings(lhs_yaml, rhs_yaml);
    diff.do_compare().unwrap();

    assert!(diff.is_diff(), "Should detect changes between manifests");

    let changes = diff.ordered_changes();
    assert!(
        changes.iter().any(|c| c.contains("replicas")),
        "Should detect replicas change"
    );
    assert!(
        changes.iter().any(|c| c.contains("image")),
        "Should detect image change"
    );
    assert!(
        changes.iter().any(|c| c.contains("env")),
        "Should detect env value change"
    );
}

#[test]
fn test_identical_manifests_have_no_changes() {
    let yaml = r#"
apiVersion: v1
kind: Service
metadata:
  name: web
  namespace: default
spec:
  ports:
    - port: 80
      targetPort: 8080
"#;

    let mut diff = diff_yaml_strings(yaml, yaml);
    diff.do_compare().unwrap();

    assert!(!diff.is_diff());
    assert!(diff.text(false).is_empty());
}

#[test]
fn test_text_report_shows_old_and_new_values() {
    let lhs_yaml = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  retries: "3"
"#;

    let rhs_yaml = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  retries: "5"
  timeout: "30"
"#;

    let mut diff = diff_yaml_strings(lhs_yaml, rhs_yaml);
    diff.do_compare().unwrap();

    let text = diff.text(false);
    assert!(text.contains(".data.retries"));
    assert!(text.contains("- 3"));
    assert!(text.contains("+ 5"));
    assert!(text.contains(".data.timeout"));
    assert!(text.contains("+ 30"));
}

// ==================== File-Backed Loading Tests ====================

#[test]
fn test_from_files_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let live_path = dir.path().join("live.yaml");
    let merged_path = dir.path().join("merged.yaml");

    std::fs::write(
        &live_path,
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: c\ndata:\n  a: \"1\"\n",
    )
    .expect("write live");
    std::fs::write(
        &merged_path,
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: c\ndata:\n  a: \"2\"\n",
    )
    .expect("write merged");

    let mut diff = Diff::from_files(&live_path, &merged_path).expect("load documents");
    diff.do_compare().unwrap();

    assert!(diff.is_diff());
    assert_eq!(diff.ordered_changes(), vec!["^.data.a".to_string()]);
}

#[test]
fn test_from_files_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let present = dir.path().join("present.yaml");
    std::fs::write(&present, "a: 1\n").expect("write");

    let absent = dir.path().join("absent.yaml");
    assert!(Diff::from_files(&present, &absent).is_err());
}
