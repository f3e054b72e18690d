//! Label, annotation, and API group conventions of the App resource.
//!
//! Pure constants. These define how a desired App looks to the
//! operators that reconcile it in the cluster.

pub const API_GROUP: &str = "application.giantswarm.io";

pub const API_VERSION: &str = "v1alpha1";

pub const KIND: &str = "App";

pub const PLURAL: &str = "apps";

/// Label the app operator uses to pick which operator instance owns an App.
pub const APP_OPERATOR_VERSION_LABEL: &str = "app-operator.giantswarm.io/version";

/// Operator version for Apps that are reconciled in-cluster.
pub const APP_OPERATOR_VERSION: &str = "0.0.0";

/// Chart operator annotation controlling forced helm upgrades.
pub const FORCE_HELM_UPGRADE_ANNOTATION: &str = "chart-operator.giantswarm.io/force-helm-upgrade";

/// Label written by older releases of this service to force a fresh watch
/// notification. It is no longer written; it is only excluded from the
/// controller watch and removed after a successful pass.
pub const LEGACY_RETRY_LABEL: &str = "retry_reconciliation";

/// Label selector excluding Apps that still carry the legacy retry label.
pub fn legacy_retry_exclusion() -> String {
    format!("!{LEGACY_RETRY_LABEL}")
}
