//! libSQL backend for the `Database` trait.
//!
//! Supports a remote (Turso / sqld) database, a local file and an in-memory
//! database for tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    Database, NewProfile, PlanKind, PlanRecord, ProgressEntry, ProgressRecord, UserProfile,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Connect to a remote libSQL server and run migrations.
    pub async fn new_remote(url: &str, token: &SecretString) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_remote(url.to_string(), token.expose_secret().to_string())
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to connect to {url}: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(url, "Remote database connected");
        Ok(backend)
    }

    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<f64>` to libsql Value.
fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a UserProfile.
///
/// Column order matches PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("profile row parse: {e}"));
    let answers_str: String = row.get(1).map_err(parse)?;
    let updated_str: String = row.get(4).map_err(parse)?;

    let answers: BTreeMap<String, String> = serde_json::from_str(&answers_str)
        .map_err(|e| DatabaseError::Serialization(format!("profile answers: {e}")))?;

    Ok(UserProfile {
        user_id: row.get(0).map_err(parse)?,
        answers,
        username: row.get(2).ok(),
        full_name: row.get::<String>(3).unwrap_or_default(),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a PlanRecord.
fn row_to_plan(row: &libsql::Row) -> Result<PlanRecord, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("plan row parse: {e}"));
    let id_str: String = row.get(0).map_err(parse)?;
    let kind_str: String = row.get(2).map_err(parse)?;
    let created_str: String = row.get(4).map_err(parse)?;

    Ok(PlanRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.get(1).map_err(parse)?,
        kind: kind_str.parse()?,
        content: row.get(3).map_err(parse)?,
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const PROFILE_COLUMNS: &str = "user_id, answers, username, full_name, updated_at";

const PLAN_COLUMNS: &str = "id, user_id, kind, content, created_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_profile(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn upsert_profile(
        &self,
        user_id: &str,
        profile: NewProfile,
    ) -> Result<UserProfile, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now();
        let answers_json = serde_json::to_string(&profile.answers)
            .map_err(|e| DatabaseError::Serialization(format!("profile answers: {e}")))?;

        conn.execute(
            "INSERT INTO profiles (user_id, answers, username, full_name, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                answers = excluded.answers,
                username = excluded.username,
                full_name = excluded.full_name,
                updated_at = excluded.updated_at",
            params![
                user_id,
                answers_json,
                opt_text(profile.username.as_deref()),
                profile.full_name.as_str(),
                now.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_profile: {e}")))?;

        debug!(user_id, answers = profile.answers.len(), "Profile upserted");
        Ok(UserProfile {
            user_id: user_id.to_string(),
            answers: profile.answers,
            username: profile.username,
            full_name: profile.full_name,
            updated_at: now,
        })
    }

    // ── Plans ───────────────────────────────────────────────────────

    async fn save_plan(
        &self,
        user_id: &str,
        kind: PlanKind,
        content: &str,
    ) -> Result<PlanRecord, DatabaseError> {
        let conn = self.conn();
        let record = PlanRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO plans (id, user_id, kind, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id.to_string(),
                user_id,
                kind.as_str(),
                content,
                record.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("save_plan: {e}")))?;

        debug!(user_id, kind = %kind, plan_id = %record.id, "Plan saved");
        Ok(record)
    }

    async fn latest_plan(
        &self,
        user_id: &str,
        kind: PlanKind,
    ) -> Result<Option<PlanRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PLAN_COLUMNS} FROM plans WHERE user_id = ?1 AND kind = ?2
                     ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![user_id, kind.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_plan: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_plan(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("latest_plan: {e}"))),
        }
    }

    // ── Progress ────────────────────────────────────────────────────

    async fn log_progress(
        &self,
        user_id: &str,
        entry: ProgressEntry,
    ) -> Result<ProgressRecord, DatabaseError> {
        let conn = self.conn();
        let record = ProgressRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            weight: entry.weight,
            mood: entry.mood,
            energy_level: entry.energy_level,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO progress_logs (id, user_id, weight, mood, energy_level, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id.to_string(),
                user_id,
                opt_real(record.weight),
                record.mood.as_str(),
                record.energy_level.as_str(),
                record.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("log_progress: {e}")))?;

        debug!(user_id, log_id = %record.id, "Progress logged");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn new_profile(age: &str) -> NewProfile {
        let mut answers = BTreeMap::new();
        answers.insert("age".to_string(), age.to_string());
        answers.insert("goal".to_string(), "Fat loss".to_string());
        NewProfile {
            answers,
            username: Some("runner".to_string()),
            full_name: "Alex Kim".to_string(),
        }
    }

    // ── Profile tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn missing_profile_is_none() {
        let db = test_db().await;
        assert!(db.get_profile("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_then_get_profile() {
        let db = test_db().await;
        db.upsert_profile("1", new_profile("30")).await.unwrap();

        let fetched = db.get_profile("1").await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "1");
        assert_eq!(fetched.answer("age"), Some("30"));
        assert_eq!(fetched.answer("goal"), Some("Fat loss"));
        assert_eq!(fetched.username.as_deref(), Some("runner"));
        assert_eq!(fetched.full_name, "Alex Kim");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_profile() {
        let db = test_db().await;
        db.upsert_profile("1", new_profile("30")).await.unwrap();

        let mut second = new_profile("31");
        second.answers.remove("goal");
        second.username = None;
        db.upsert_profile("1", second).await.unwrap();

        let fetched = db.get_profile("1").await.unwrap().unwrap();
        assert_eq!(fetched.answer("age"), Some("31"));
        assert_eq!(fetched.answer("goal"), None);
        assert!(fetched.username.is_none());

        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM profiles", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn profiles_are_isolated_per_user() {
        let db = test_db().await;
        db.upsert_profile("1", new_profile("30")).await.unwrap();
        db.upsert_profile("2", new_profile("45")).await.unwrap();

        assert_eq!(db.get_profile("1").await.unwrap().unwrap().answer("age"), Some("30"));
        assert_eq!(db.get_profile("2").await.unwrap().unwrap().answer("age"), Some("45"));
    }

    // ── Plan tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn latest_plan_returns_newest_of_kind() {
        let db = test_db().await;
        db.save_plan("1", PlanKind::Workout, "week one").await.unwrap();
        db.save_plan("1", PlanKind::Nutrition, "eat greens").await.unwrap();
        db.save_plan("1", PlanKind::Workout, "week two").await.unwrap();

        let latest = db.latest_plan("1", PlanKind::Workout).await.unwrap().unwrap();
        assert_eq!(latest.content, "week two");
        assert_eq!(latest.kind, PlanKind::Workout);

        let diet = db.latest_plan("1", PlanKind::Nutrition).await.unwrap().unwrap();
        assert_eq!(diet.content, "eat greens");

        assert!(db.latest_plan("1", PlanKind::Motivation).await.unwrap().is_none());
        assert!(db.latest_plan("2", PlanKind::Workout).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn plans_are_append_only() {
        let db = test_db().await;
        let a = db.save_plan("1", PlanKind::Motivation, "go").await.unwrap();
        let b = db.save_plan("1", PlanKind::Motivation, "go").await.unwrap();
        assert_ne!(a.id, b.id);

        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM plans WHERE kind = 'motivation'", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count, 2);
    }

    // ── Progress tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn log_progress_with_and_without_weight() {
        let db = test_db().await;
        let logged = db
            .log_progress(
                "1",
                ProgressEntry {
                    weight: Some(81.5),
                    mood: "Great".into(),
                    energy_level: "High".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(logged.weight, Some(81.5));

        db.log_progress(
            "1",
            ProgressEntry {
                weight: None,
                mood: "Tired".into(),
                energy_level: "Low".into(),
            },
        )
        .await
        .unwrap();

        let mut rows = db
            .conn()
            .query(
                "SELECT weight, mood FROM progress_logs WHERE user_id = '1' ORDER BY created_at",
                (),
            )
            .await
            .unwrap();
        let first = rows.next().await.unwrap().unwrap();
        assert_eq!(first.get::<f64>(0).unwrap(), 81.5);
        assert_eq!(first.get::<String>(1).unwrap(), "Great");
        let second = rows.next().await.unwrap().unwrap();
        assert!(second.get::<f64>(0).is_err());
        assert_eq!(second.get::<String>(1).unwrap(), "Tired");
    }

    #[tokio::test]
    async fn local_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fitcoach.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.upsert_profile("1", new_profile("41")).await.unwrap();
            db.save_plan("1", PlanKind::Workout, "Day 1: rows")
                .await
                .unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let profile = db.get_profile("1").await.unwrap().unwrap();
        assert_eq!(profile.answer("age"), Some("41"));
        let plan = db.latest_plan("1", PlanKind::Workout).await.unwrap().unwrap();
        assert_eq!(plan.content, "Day 1: rows");
    }

    #[test]
    fn parse_datetime_handles_sqlite_format() {
        let dt = parse_datetime("2026-03-01 08:30:00");
        assert_eq!(dt.to_rfc3339(), "2026-03-01T08:30:00+00:00");
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::MIN_UTC);
    }
}
