use appcheck_core::models::report::{
    truncate_description, DeploymentState, DeploymentStatusReport, MAX_DESCRIPTION_CHARS,
};

#[test]
fn short_descriptions_are_untouched() {
    assert_eq!(truncate_description(""), "");
    assert_eq!(truncate_description("release failed"), "release failed");

    let exact = "x".repeat(MAX_DESCRIPTION_CHARS);
    assert_eq!(truncate_description(&exact), exact);
}

#[test]
fn long_descriptions_keep_137_chars_plus_ellipsis() {
    let reason = "a".repeat(200);
    let out = truncate_description(&reason);

    assert_eq!(out.chars().count(), 140);
    assert!(out.ends_with("..."));
    assert_eq!(&out[..137], &reason[..137]);
}

#[test]
fn truncation_never_splits_multibyte_characters() {
    let reason = "é".repeat(150);
    let out = truncate_description(&reason);

    assert_eq!(out.chars().count(), 140);
    assert!(out.starts_with("ééé"));
}

#[test]
fn report_constructor_truncates() {
    let report =
        DeploymentStatusReport::new(DeploymentState::Failure, &"b".repeat(500), "ginger");
    assert_eq!(report.description.chars().count(), 140);
    assert_eq!(report.environment, "ginger");
}

#[test]
fn states_serialize_as_upstream_strings() {
    assert_eq!(DeploymentState::InProgress.as_str(), "in_progress");
    assert_eq!(
        serde_json::to_string(&DeploymentState::Inactive).unwrap(),
        "\"inactive\""
    );
}
