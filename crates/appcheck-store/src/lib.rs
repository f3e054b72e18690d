//! appcheck-store
//!
//! Resource-store access for App resources. The engine only sees the
//! [`AppStore`] trait; [`KubeAppStore`] talks to a Kubernetes API server and
//! [`MemoryAppStore`] keeps everything in process.

pub mod cluster;
pub mod error;
pub mod memory;
pub mod selector;
pub mod store;

pub use crate::cluster::KubeAppStore;
pub use crate::error::StoreError;
pub use crate::memory::{MemoryAppStore, StoreCalls};
pub use crate::store::{AppStore, BoxFuture, LabelPatch, WatchEvent, WatchOptions, WatchStream};
