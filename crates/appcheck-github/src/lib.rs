//! appcheck-github
//!
//! The upstream side: decoding signed deployment webhooks and calling the
//! deployments and organization hooks REST API.

pub mod api;
pub mod client;
pub mod error;
pub mod models;
pub mod webhook;

pub use crate::api::{BoxFuture, DeploymentApi};
pub use crate::client::GithubClient;
pub use crate::error::{GithubError, WebhookError};
pub use crate::webhook::EventDecoder;
