//! Persistence layer: profiles, generated plans and progress logs.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;
pub mod unconfigured;

use std::sync::Arc;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    Database, NewProfile, PlanKind, PlanRecord, ProgressEntry, ProgressRecord, UserProfile,
};
pub use unconfigured::UnconfiguredStore;

use crate::config::StoreConfig;
use crate::error::DatabaseError;

/// Open the store described by the configuration.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn Database>, DatabaseError> {
    match config {
        StoreConfig::Remote { url, token } => Ok(Arc::new(LibSqlBackend::new_remote(url, token).await?)),
        StoreConfig::Local { path } => Ok(Arc::new(LibSqlBackend::new_local(path).await?)),
        StoreConfig::Unconfigured => {
            tracing::warn!("No database configured; profile and plan storage will fail");
            Ok(Arc::new(UnconfiguredStore))
        }
    }
}
