use anyhow::Result;
use sqlx::SqliteConnection;

use super::schema::Database;
use super::search::{Record, Repository};
use super::types::{Str, StrDbRow, StrText, ValidationError};
use crate::query::{EntitySchema, Filter, OrderTerm, STR_SCHEMA};

const STR_TEXT_COLUMNS: &str = "id, str_id, is_published, contents, create_date, create_user";

impl Record for Str {
    type Row = StrDbRow;

    const SELECT: &'static str = "SELECT id, master_id, is_published, status, priority, scope, \
         summary, subsystem, str_version, fix_version, fix_revision, manager_user, \
         create_date, create_user, modify_date, modify_user FROM strs";

    fn schema() -> &'static EntitySchema {
        &STR_SCHEMA
    }

    fn from_row(row: StrDbRow) -> Self {
        row.into_str()
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Str::validate(self)
    }
}

impl Repository<Str> for Database {
    async fn load(&self, id: i64) -> Result<Option<Str>> {
        self.load_record::<Str>(id).await
    }

    async fn save(&self, str: &Str, user: &str) -> Result<Str> {
        self.save_str(str, user).await
    }

    async fn find(
        &self,
        filter: &Filter,
        order: &[OrderTerm],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Str>> {
        self.find_records::<Str>(filter, order, limit, offset).await
    }

    async fn count(&self, filter: &Filter) -> Result<i64> {
        self.count_records::<Str>(filter).await
    }
}

/// Outcome of a subscription change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Subscription {
    Added,
    AlreadyPresent,
    Removed,
    NotPresent,
}

impl Database {
    // ========================================================================
    // STR Operations
    // ========================================================================

    async fn save_str(&self, str: &Str, user: &str) -> Result<Str> {
        let (saved, _) = self.save_str_with_text(str, user, None).await?;
        Ok(saved)
    }

    /// Save an STR and, if given, append a published message as the same
    /// user. Both writes commit together or not at all.
    pub async fn save_str_with_text(
        &self,
        str: &Str,
        user: &str,
        text: Option<&str>,
    ) -> Result<(Str, Option<StrText>)> {
        str.validate()?;
        if let Some(contents) = text {
            check_text(contents)?;
        }

        let mut tx = self.pool.begin().await?;
        let saved = write_str(&mut tx, str, user).await?;
        let posted = match text {
            Some(contents) => Some(insert_str_text(&mut tx, saved.id, contents, user, true).await?),
            None => None,
        };
        tx.commit().await?;

        tracing::info!(
            id = saved.id,
            status = saved.status.label(),
            user = %user,
            text_id = ?posted.as_ref().map(|t| t.id),
            "Saved STR"
        );
        Ok((saved, posted))
    }

    // ========================================================================
    // STR Dialog
    // ========================================================================

    /// Append a message to an STR's dialog.
    pub async fn add_str_text(
        &self,
        str_id: i64,
        contents: &str,
        user: &str,
        is_published: bool,
    ) -> Result<StrText> {
        check_text(contents)?;
        let mut conn = self.pool.acquire().await?;
        let text = insert_str_text(&mut conn, str_id, contents, user, is_published).await?;
        tracing::debug!(str_id, text_id = text.id, is_published, "Added STR text");
        Ok(text)
    }

    /// Dialog of an STR, oldest first.
    pub async fn str_texts(&self, str_id: i64, include_hidden: bool) -> Result<Vec<StrText>> {
        let sql = format!(
            "SELECT {} FROM str_texts WHERE str_id = ? AND (is_published = 1 OR ?) \
             ORDER BY create_date, id",
            STR_TEXT_COLUMNS
        );
        let texts = sqlx::query_as::<_, StrText>(&sql)
            .bind(str_id)
            .bind(include_hidden)
            .fetch_all(&self.pool)
            .await?;
        Ok(texts)
    }

    /// Most recent published message, used as the listing preview.
    pub async fn latest_str_text(&self, str_id: i64) -> Result<Option<StrText>> {
        let sql = format!(
            "SELECT {} FROM str_texts WHERE str_id = ? AND is_published = 1 \
             ORDER BY create_date DESC, id DESC LIMIT 1",
            STR_TEXT_COLUMNS
        );
        let text = sqlx::query_as::<_, StrText>(&sql)
            .bind(str_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(text)
    }

    /// Show or hide one dialog message. Returns `false` if it does not exist.
    pub async fn set_str_text_published(&self, text_id: i64, is_published: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE str_texts SET is_published = ? WHERE id = ?")
            .bind(is_published)
            .bind(text_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Carbon Copies
    // ========================================================================

    pub async fn add_subscriber(&self, str_id: i64, email: &str) -> Result<Subscription> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO str_subscribers (str_id, email, create_date) VALUES (?, ?, ?)",
        )
        .bind(str_id)
        .bind(email)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(str_id, "Added STR subscriber");
            Ok(Subscription::Added)
        } else {
            Ok(Subscription::AlreadyPresent)
        }
    }

    pub async fn remove_subscriber(&self, str_id: i64, email: &str) -> Result<Subscription> {
        let result = sqlx::query("DELETE FROM str_subscribers WHERE str_id = ? AND email = ?")
            .bind(str_id)
            .bind(email)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!(str_id, "Removed STR subscriber");
            Ok(Subscription::Removed)
        } else {
            Ok(Subscription::NotPresent)
        }
    }

    pub async fn subscribers(&self, str_id: i64) -> Result<Vec<String>> {
        let emails = sqlx::query_scalar::<_, String>(
            "SELECT email FROM str_subscribers WHERE str_id = ? ORDER BY email",
        )
        .bind(str_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(emails)
    }
}

fn check_text(contents: &str) -> Result<(), ValidationError> {
    if contents.trim().is_empty() {
        return Err(ValidationError {
            kind: "STR text",
            fields: vec!["contents"],
        });
    }
    Ok(())
}

/// Insert (id 0) or update an STR on an open connection or transaction.
async fn write_str(conn: &mut SqliteConnection, str: &Str, user: &str) -> Result<Str> {
    let now = chrono::Utc::now().timestamp();
    let mut saved = str.clone();
    saved.modify_date = now;
    saved.modify_user = user.to_string();

    if str.id > 0 {
        let result = sqlx::query(
            r#"
            UPDATE strs
            SET master_id = ?, is_published = ?, status = ?, priority = ?, scope = ?,
                summary = ?, subsystem = ?, str_version = ?, fix_version = ?,
                fix_revision = ?, manager_user = ?, modify_date = ?, modify_user = ?
            WHERE id = ?
        "#,
        )
        .bind(saved.master_id)
        .bind(saved.is_published)
        .bind(saved.status.code())
        .bind(saved.priority.code())
        .bind(saved.scope.code())
        .bind(&saved.summary)
        .bind(&saved.subsystem)
        .bind(&saved.str_version)
        .bind(&saved.fix_version)
        .bind(saved.fix_revision)
        .bind(&saved.manager_user)
        .bind(saved.modify_date)
        .bind(&saved.modify_user)
        .bind(saved.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("STR #{} does not exist", str.id);
        }
    } else {
        saved.create_date = now;
        saved.create_user = user.to_string();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO strs (master_id, is_published, status, priority, scope, summary,
                              subsystem, str_version, fix_version, fix_revision,
                              manager_user, create_date, create_user, modify_date,
                              modify_user)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(saved.master_id)
        .bind(saved.is_published)
        .bind(saved.status.code())
        .bind(saved.priority.code())
        .bind(saved.scope.code())
        .bind(&saved.summary)
        .bind(&saved.subsystem)
        .bind(&saved.str_version)
        .bind(&saved.fix_version)
        .bind(saved.fix_revision)
        .bind(&saved.manager_user)
        .bind(saved.create_date)
        .bind(&saved.create_user)
        .bind(saved.modify_date)
        .bind(&saved.modify_user)
        .fetch_one(&mut *conn)
        .await?;
        saved.id = id;
    }

    Ok(saved)
}

async fn insert_str_text(
    conn: &mut SqliteConnection,
    str_id: i64,
    contents: &str,
    user: &str,
    is_published: bool,
) -> Result<StrText> {
    let now = chrono::Utc::now().timestamp();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO str_texts (str_id, is_published, contents, create_date, create_user)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
    "#,
    )
    .bind(str_id)
    .bind(is_published)
    .bind(contents)
    .bind(now)
    .bind(user)
    .fetch_one(&mut *conn)
    .await?;

    Ok(StrText {
        id,
        str_id,
        is_published,
        contents: contents.to_string(),
        create_date: now,
        create_user: user.to_string(),
    })
}
