//! `Database` trait and the durable record types it moves around.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// A user's collected onboarding answers plus identity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    /// Question key → raw answer text.
    #[serde(flatten)]
    pub answers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub full_name: String,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Look up one onboarding answer.
    pub fn answer(&self, key: &str) -> Option<&str> {
        self.answers.get(key).map(String::as_str)
    }

    /// Flat JSON object used as model context.
    pub fn to_context_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Fields written by a profile upsert. The store stamps `updated_at`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProfile {
    pub answers: BTreeMap<String, String>,
    pub username: Option<String>,
    pub full_name: String,
}

/// What a generated plan is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Workout,
    Nutrition,
    Motivation,
}

impl PlanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workout => "workout",
            Self::Nutrition => "nutrition",
            Self::Motivation => "motivation",
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanKind {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workout" => Ok(Self::Workout),
            "nutrition" => Ok(Self::Nutrition),
            "motivation" => Ok(Self::Motivation),
            other => Err(DatabaseError::Serialization(format!(
                "unknown plan kind: {other}"
            ))),
        }
    }
}

/// One stored generation result. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRecord {
    pub id: Uuid,
    pub user_id: String,
    pub kind: PlanKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Values collected by the progress dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEntry {
    /// `None` when the user's text did not parse as a number.
    pub weight: Option<f64>,
    pub mood: String,
    pub energy_level: String,
}

/// One stored progress log. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    pub id: Uuid,
    pub user_id: String,
    pub weight: Option<f64>,
    pub mood: String,
    pub energy_level: String,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic persistence for profiles, plans and progress logs.
///
/// Every operation is keyed by user id. There are no multi-entity
/// transactions.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    /// Fetch a profile, `None` if the user never finished onboarding.
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError>;

    /// Create or wholesale-replace a profile.
    async fn upsert_profile(
        &self,
        user_id: &str,
        profile: NewProfile,
    ) -> Result<UserProfile, DatabaseError>;

    // ── Plans ───────────────────────────────────────────────────────

    /// Append a generated plan.
    async fn save_plan(
        &self,
        user_id: &str,
        kind: PlanKind,
        content: &str,
    ) -> Result<PlanRecord, DatabaseError>;

    /// Most recent plan of a kind.
    async fn latest_plan(
        &self,
        user_id: &str,
        kind: PlanKind,
    ) -> Result<Option<PlanRecord>, DatabaseError>;

    // ── Progress ────────────────────────────────────────────────────

    /// Append a progress log.
    async fn log_progress(
        &self,
        user_id: &str,
        entry: ProgressEntry,
    ) -> Result<ProgressRecord, DatabaseError>;
}
