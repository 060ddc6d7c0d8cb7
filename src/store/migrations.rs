//! Schema versions for the libSQL store.
//!
//! `_migrations` records every applied step. Opening a database applies
//! whatever steps are newer than the recorded maximum, each one together
//! with its bookkeeping row in a single transaction.

use libsql::Connection;

use crate::error::DatabaseError;

struct Step {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only; never edit a step that has shipped.
const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "profiles_plans_progress",
        sql: "
            CREATE TABLE IF NOT EXISTS profiles (
                user_id    TEXT PRIMARY KEY,
                answers    TEXT NOT NULL DEFAULT '{}',
                username   TEXT,
                full_name  TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE TABLE IF NOT EXISTS plans (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL,
                kind       TEXT NOT NULL,
                content    TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_plans_user ON plans(user_id);
            CREATE TABLE IF NOT EXISTS progress_logs (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL,
                weight       REAL,
                mood         TEXT NOT NULL,
                energy_level TEXT NOT NULL,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_progress_logs_user ON progress_logs(user_id);
        ",
    },
    Step {
        version: 2,
        name: "plans_latest_lookup",
        sql: "
            CREATE INDEX IF NOT EXISTS idx_plans_user_kind_created
                ON plans(user_id, kind, created_at);
        ",
    },
];

/// Bring the schema up to the newest step.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version    INTEGER PRIMARY KEY,
            name       TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("bookkeeping table: {e}")))?;

    let applied = schema_version(conn).await?;
    let pending = STEPS.iter().filter(|step| step.version > applied);

    for step in pending {
        tracing::info!(version = step.version, name = step.name, "Upgrading schema");
        let batch = format!(
            "BEGIN;\n{}\nINSERT INTO _migrations (version, name) VALUES ({}, '{}');\nCOMMIT;",
            step.sql, step.version, step.name
        );
        if let Err(e) = conn.execute_batch(&batch).await {
            // A failed batch can leave the transaction open.
            let _ = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::Migration(format!(
                "V{} {}: {e}",
                step.version, step.name
            )));
        }
    }

    let version = schema_version(conn).await?;
    tracing::debug!(version, "Schema up to date");
    Ok(())
}

/// Highest recorded step, 0 for a fresh database.
async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))?;

    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))?
    else {
        return Ok(0);
    };
    row.get::<i64>(0)
        .map_err(|e| DatabaseError::Migration(format!("decode version: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> Connection {
        libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap()
            .connect()
            .unwrap()
    }

    async fn count(conn: &Connection, sql: &str) -> i64 {
        let mut rows = conn.query(sql, ()).await.unwrap();
        rows.next().await.unwrap().unwrap().get(0).unwrap()
    }

    #[tokio::test]
    async fn fresh_database_gets_every_table() {
        let conn = memory_conn().await;
        run_migrations(&conn).await.unwrap();

        let tables = count(
            &conn,
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('profiles', 'plans', 'progress_logs', '_migrations')",
        )
        .await;
        assert_eq!(tables, 4);
        assert_eq!(schema_version(&conn).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upgrade_runs_on_a_spawned_task() {
        let conn = memory_conn().await;
        let conn = tokio::spawn(async move {
            run_migrations(&conn).await.map(|()| conn)
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(schema_version(&conn).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rerun_is_a_no_op() {
        let conn = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        assert_eq!(count(&conn, "SELECT COUNT(*) FROM _migrations").await, 2);
    }

    #[tokio::test]
    async fn older_database_only_gets_newer_steps() {
        let conn = memory_conn().await;
        conn.execute_batch(
            "CREATE TABLE _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .await
        .unwrap();
        conn.execute_batch(STEPS[0].sql).await.unwrap();
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (1, 'profiles_plans_progress')",
            (),
        )
        .await
        .unwrap();

        run_migrations(&conn).await.unwrap();

        let index = count(
            &conn,
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'index' AND name = 'idx_plans_user_kind_created'",
        )
        .await;
        assert_eq!(index, 1);
        assert_eq!(schema_version(&conn).await.unwrap(), 2);
    }
}
