// Tests for report rendering: tag lines and nested field-level diffs

#[cfg(test)]
mod tests {
    use crate::report::ReportBuilder;
    use serde_json::json;

    #[test]
    fn test_tag_lines_in_order() {
        let mut report = ReportBuilder::new(false);
        report.created("ConfigMap/default/settings");
        report.drifted("Deployment/default/web");
        report.deleted("Service/default/old");

        let text = report.finish();
        assert_eq!(
            text,
            "► ConfigMap/default/settings created\n\
             ► Deployment/default/web drifted\n\
             ► Service/default/old deleted\n"
        );
    }

    #[test]
    fn test_plain_output_has_no_ansi_codes() {
        let mut report = ReportBuilder::new(false);
        report.created("ConfigMap/default/settings");
        report.deleted("Service/default/old");

        assert!(!report.finish().contains('\x1b'));
    }

    #[test]
    fn test_colored_output_tags_created_and_deleted() {
        let mut report = ReportBuilder::new(true);
        report.created("ConfigMap/default/settings");
        report.drifted("Deployment/default/web");
        report.deleted("Service/default/old");

        let text = report.finish();
        assert!(text.contains("\x1b[32m► ConfigMap/default/settings created\x1b[0m"));
        assert!(text.contains("\x1b[31m► Service/default/old deleted\x1b[0m"));
        // Drifted lines carry no color of their own
        assert!(text.contains("\n► Deployment/default/web drifted\n"));
    }

    #[test]
    fn test_nested_diff_is_indented_below_summary() {
        let live = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {"replicas": 2},
        });
        let merged = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {"replicas": 3},
        });

        let mut report = ReportBuilder::new(false);
        report.drifted("Deployment/default/web");
        report
            .nested_diff("Deployment/default/web", &live, &merged)
            .expect("nested diff renders");

        let text = report.finish();
        assert!(text.contains("► Deployment/default/web drifted\n"));
        assert!(text.contains("  .spec.replicas\n"));
        assert!(text.contains("- 2"));
        assert!(text.contains("+ 3"));
    }

    #[test]
    fn test_nested_diff_of_identical_documents_adds_nothing() {
        let doc = json!({"apiVersion": "v1", "kind": "ConfigMap", "data": {"a": "1"}});

        let mut report = ReportBuilder::new(false);
        report.drifted("ConfigMap/default/settings");
        report
            .nested_diff("ConfigMap/default/settings", &doc, &doc)
            .expect("nested diff renders");

        assert_eq!(report.finish(), "► ConfigMap/default/settings drifted\n");
    }
}
