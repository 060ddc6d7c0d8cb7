//! Store used when no database is configured.
//!
//! Every operation fails with `DatabaseError::Unconfigured` so handlers take
//! their normal persistence-failure paths instead of crashing at startup.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::store::traits::{
    Database, NewProfile, PlanKind, PlanRecord, ProgressEntry, ProgressRecord, UserProfile,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredStore;

#[async_trait]
impl Database for UnconfiguredStore {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn get_profile(&self, _user_id: &str) -> Result<Option<UserProfile>, DatabaseError> {
        Err(DatabaseError::Unconfigured)
    }

    async fn upsert_profile(
        &self,
        _user_id: &str,
        _profile: NewProfile,
    ) -> Result<UserProfile, DatabaseError> {
        Err(DatabaseError::Unconfigured)
    }

    async fn save_plan(
        &self,
        _user_id: &str,
        _kind: PlanKind,
        _content: &str,
    ) -> Result<PlanRecord, DatabaseError> {
        Err(DatabaseError::Unconfigured)
    }

    async fn latest_plan(
        &self,
        _user_id: &str,
        _kind: PlanKind,
    ) -> Result<Option<PlanRecord>, DatabaseError> {
        Err(DatabaseError::Unconfigured)
    }

    async fn log_progress(
        &self,
        _user_id: &str,
        _entry: ProgressEntry,
    ) -> Result<ProgressRecord, DatabaseError> {
        Err(DatabaseError::Unconfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_operation_reports_unconfigured() {
        let store = UnconfiguredStore;
        assert!(store.run_migrations().await.is_ok());
        assert!(matches!(
            store.get_profile("1").await,
            Err(DatabaseError::Unconfigured)
        ));
        assert!(matches!(
            store.upsert_profile("1", NewProfile::default()).await,
            Err(DatabaseError::Unconfigured)
        ));
        assert!(matches!(
            store.save_plan("1", PlanKind::Workout, "x").await,
            Err(DatabaseError::Unconfigured)
        ));
        assert!(matches!(
            store.latest_plan("1", PlanKind::Workout).await,
            Err(DatabaseError::Unconfigured)
        ));
    }
}
