use anyhow::Result;

use super::schema::Database;
use super::search::{Record, Repository};
use super::types::{Article, ValidationError};
use crate::query::{EntitySchema, Filter, OrderTerm, ARTICLE_SCHEMA};

impl Record for Article {
    type Row = Article;

    const SELECT: &'static str = "SELECT id, is_published, section, title, abstract, contents, \
         create_date, create_user, modify_date, modify_user FROM articles";

    fn schema() -> &'static EntitySchema {
        &ARTICLE_SCHEMA
    }

    fn from_row(row: Article) -> Self {
        row
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Article::validate(self)
    }
}

impl Repository<Article> for Database {
    async fn load(&self, id: i64) -> Result<Option<Article>> {
        self.load_record::<Article>(id).await
    }

    async fn save(&self, article: &Article, user: &str) -> Result<Article> {
        self.save_article(article, user).await
    }

    async fn find(
        &self,
        filter: &Filter,
        order: &[OrderTerm],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Article>> {
        self.find_records::<Article>(filter, order, limit, offset).await
    }

    async fn count(&self, filter: &Filter) -> Result<i64> {
        self.count_records::<Article>(filter).await
    }
}

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    async fn save_article(&self, article: &Article, user: &str) -> Result<Article> {
        article.validate()?;

        let now = chrono::Utc::now().timestamp();
        let mut saved = article.clone();
        saved.modify_date = now;
        saved.modify_user = user.to_string();

        if article.id > 0 {
            let result = sqlx::query(
                r#"
                UPDATE articles
                SET is_published = ?, section = ?, title = ?, abstract = ?, contents = ?,
                    modify_date = ?, modify_user = ?
                WHERE id = ?
            "#,
            )
            .bind(saved.is_published)
            .bind(&saved.section)
            .bind(&saved.title)
            .bind(&saved.abstract_text)
            .bind(&saved.contents)
            .bind(saved.modify_date)
            .bind(&saved.modify_user)
            .bind(saved.id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                anyhow::bail!("Article #{} does not exist", article.id);
            }
        } else {
            saved.create_date = now;
            saved.create_user = user.to_string();

            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO articles (is_published, section, title, abstract, contents,
                                      create_date, create_user, modify_date, modify_user)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
            )
            .bind(saved.is_published)
            .bind(&saved.section)
            .bind(&saved.title)
            .bind(&saved.abstract_text)
            .bind(&saved.contents)
            .bind(saved.create_date)
            .bind(&saved.create_user)
            .bind(saved.modify_date)
            .bind(&saved.modify_user)
            .fetch_one(&self.pool)
            .await?;
            saved.id = id;
        }

        tracing::info!(id = saved.id, user = %user, "Saved article");
        Ok(saved)
    }

    /// Delete an article. Returns `false` if it did not exist.
    pub async fn delete_article(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(id, "Deleted article");
        }
        Ok(deleted)
    }

    /// Distinct section names in use, sorted case-insensitively.
    pub async fn article_sections(&self) -> Result<Vec<String>> {
        let sections = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT section FROM articles ORDER BY section COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_audit_fields() {
        let db = test_db().await;
        let article = Article::new("News", "Release 1.2", "Out now", "Details here.");
        let saved = db.save(&article, "mike").await.unwrap();

        assert_eq!(saved.id, 1);
        assert_eq!(saved.create_user, "mike");
        assert_eq!(saved.modify_user, "mike");
        assert!(saved.create_date > 0);
        // The input is not modified.
        assert_eq!(article.id, 0);

        let loaded = Repository::<Article>::load(&db, saved.id).await.unwrap();
        assert_eq!(loaded, Some(saved));
    }

    #[tokio::test]
    async fn test_update_keeps_creator() {
        let db = test_db().await;
        let saved = db
            .save(&Article::new("News", "T", "A", "C"), "jane")
            .await
            .unwrap();

        let mut edited = saved.clone();
        edited.title = "New title".to_string();
        edited.is_published = true;
        let updated = db.save(&edited, "mike").await.unwrap();

        let loaded = Repository::<Article>::load(&db, saved.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, updated);
        assert_eq!(loaded.create_user, "jane");
        assert_eq!(loaded.modify_user, "mike");
        assert!(loaded.is_published);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_record() {
        let db = test_db().await;
        let err = db
            .save(&Article::new("News", "", "A", "C"), "jane")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
        assert_eq!(
            Repository::<Article>::count(&db, &Filter::match_all())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_update_missing_article_fails() {
        let db = test_db().await;
        let mut article = Article::new("News", "T", "A", "C");
        article.id = 99;
        assert!(db.save(&article, "jane").await.is_err());
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let db = test_db().await;
        assert_eq!(Repository::<Article>::load(&db, 5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_article() {
        let db = test_db().await;
        let saved = db
            .save(&Article::new("News", "T", "A", "C"), "jane")
            .await
            .unwrap();
        assert!(db.delete_article(saved.id).await.unwrap());
        assert!(!db.delete_article(saved.id).await.unwrap());
        assert_eq!(Repository::<Article>::load(&db, saved.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sections_are_distinct_and_sorted() {
        let db = test_db().await;
        for section in ["News", "docs", "News", "Articles"] {
            db.save(&Article::new(section, "T", "A", "C"), "jane")
                .await
                .unwrap();
        }
        assert_eq!(
            db.article_sections().await.unwrap(),
            vec!["Articles", "docs", "News"]
        );
    }
}
