//! appcheck-core
//!
//! Pure domain types for the deployment status synchronizer: the inbound
//! deployment event, the App resource as seen in the cluster, the status
//! reports sent back upstream, and the naming/catalog rules that turn one
//! into the other. No network or cluster dependency lives here.

pub mod error;
pub mod keys;
pub mod models;
pub mod naming;

pub use crate::error::CoreError;
