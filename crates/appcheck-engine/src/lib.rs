//! appcheck-engine
//!
//! The synchronizer itself. Two entry points share one wait-and-report
//! engine ([`Tracker`]) and one [`Ledger`]:
//!
//! - [`DeploymentSync::handle`]: a deployment request is reconciled into an
//!   App resource and followed until its release settles.
//! - [`Controller::run`]: every App in a namespace is followed, with
//!   upstream deployments created for Apps that have none.
//!
//! [`HookInstaller`] keeps the organization webhook that delivers requests
//! in place.

pub mod controller;
pub mod error;
pub mod hooks;
pub mod ledger;
pub mod reconcile;
pub mod report;
pub mod retry;
pub mod sync;
pub mod track;
pub mod watch;

pub use crate::controller::{Controller, ControllerConfig};
pub use crate::error::{EngineError, format_err_chain};
pub use crate::hooks::{HookConfig, HookInstaller};
pub use crate::ledger::Ledger;
pub use crate::reconcile::{Baseline, ReconcileAction, Reconciler};
pub use crate::report::{ReportTarget, StatusReporter};
pub use crate::retry::RetryPolicy;
pub use crate::sync::{DeploymentSync, IgnoreReason, SyncConfig, SyncOutcome};
pub use crate::track::{TrackOutcome, Tracker, Trigger};
pub use crate::watch::{StatusWatcher, WaitOutcome, WaitStrategy, WatchConfig};
