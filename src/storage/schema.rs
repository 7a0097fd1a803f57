use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another bugdesk process
    /// has the database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Create the file owner-only before SQLite touches it; reports and
        // subscriber addresses are not world-readable data.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if let Some(parent) = db_path.parent() {
                if parent.exists() {
                    use std::os::unix::fs::OpenOptionsExt;
                    let _file = std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(db_path)
                        .ok(); // If creation fails, SQLite will report the error at connect_with.
                }
            }
        }

        // busy_timeout=5000: wait up to 5 seconds for a competing writer.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000")
            .foreign_keys(true);

        // Every pooled connection to ":memory:" would get its own empty
        // database, so in-memory pools hold exactly one connection forever.
        let in_memory = path == ":memory:";
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                is_published INTEGER NOT NULL DEFAULT 0,
                section TEXT NOT NULL,
                title TEXT NOT NULL,
                abstract TEXT NOT NULL,
                contents TEXT NOT NULL,
                create_date INTEGER NOT NULL,
                create_user TEXT NOT NULL,
                modify_date INTEGER NOT NULL,
                modify_user TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strs (
                id INTEGER PRIMARY KEY,
                master_id INTEGER NOT NULL DEFAULT 0,
                is_published INTEGER NOT NULL DEFAULT 1,
                status INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                scope INTEGER NOT NULL,
                summary TEXT NOT NULL,
                subsystem TEXT NOT NULL DEFAULT '',
                str_version TEXT NOT NULL,
                fix_version TEXT NOT NULL DEFAULT '',
                fix_revision INTEGER NOT NULL DEFAULT 0,
                manager_user TEXT NOT NULL DEFAULT '',
                create_date INTEGER NOT NULL,
                create_user TEXT NOT NULL,
                modify_date INTEGER NOT NULL,
                modify_user TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS str_texts (
                id INTEGER PRIMARY KEY,
                str_id INTEGER NOT NULL REFERENCES strs(id) ON DELETE CASCADE,
                is_published INTEGER NOT NULL DEFAULT 1,
                contents TEXT NOT NULL,
                create_date INTEGER NOT NULL,
                create_user TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS str_subscribers (
                str_id INTEGER NOT NULL REFERENCES strs(id) ON DELETE CASCADE,
                email TEXT NOT NULL COLLATE NOCASE,
                create_date INTEGER NOT NULL,
                PRIMARY KEY (str_id, email)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_section ON articles(section)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_modified ON articles(modify_date DESC)",
        )
        .execute(&mut *tx)
        .await?;

        // Default STR listing sorts by status then priority.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_strs_status_priority ON strs(status DESC, priority DESC)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_strs_creator ON strs(create_user)")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_str_texts_str ON str_texts(str_id, create_date)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
