use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use super::schema::Database;
use super::types::ValidationError;
use crate::query::{parse_order, render, render_order, EntitySchema, Filter, OrderTerm, Predicate, Value};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of records returned from any single query (OOM protection)
pub const MAX_RESULTS: i64 = 1000;

// ============================================================================
// Record Abstraction
// ============================================================================

/// A persisted record kind that can be searched with a rendered [`Filter`].
pub trait Record: Sized + Send + Unpin {
    /// Row shape read from SQLite before conversion.
    type Row: for<'r> FromRow<'r, SqliteRow> + Send + Unpin;

    /// `SELECT <columns> FROM <table>` without any clauses.
    const SELECT: &'static str;

    fn schema() -> &'static EntitySchema;

    fn from_row(row: Self::Row) -> Self;

    fn id(&self) -> i64;

    fn validate(&self) -> Result<(), ValidationError>;
}

/// Load, save and search one record kind.
///
/// Implemented by [`Database`] for every [`Record`]; callers name the kind
/// with a turbofish or a typed binding.
#[allow(async_fn_in_trait)]
pub trait Repository<R: Record> {
    /// `Ok(None)` when no record has this id.
    async fn load(&self, id: i64) -> Result<Option<R>>;

    /// Insert (id 0) or update (id > 0) a record after validating it.
    /// Returns the stored record with assigned id and audit fields.
    async fn save(&self, record: &R, user: &str) -> Result<R>;

    async fn find(
        &self,
        filter: &Filter,
        order: &[OrderTerm],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<R>>;

    async fn count(&self, filter: &Filter) -> Result<i64>;

    /// Render `predicate` and run it with an order specification such as
    /// `"-modified"`.
    async fn search(
        &self,
        predicate: &Predicate,
        order: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<R>> {
        let schema = R::schema();
        let filter = render(predicate, schema)?;
        let order = parse_order(order, schema)?;
        self.find(&filter, &order, limit, offset).await
    }
}

impl Database {
    // ========================================================================
    // Generic Record Queries
    // ========================================================================

    pub(crate) async fn load_record<R: Record>(&self, id: i64) -> Result<Option<R>> {
        let sql = format!("{} WHERE id = ?", R::SELECT);
        let row = sqlx::query_as::<_, R::Row>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(R::from_row))
    }

    /// Run a rendered filter. `limit` is capped at [`MAX_RESULTS`].
    pub(crate) async fn find_records<R: Record>(
        &self,
        filter: &Filter,
        order: &[OrderTerm],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<R>> {
        let limit = limit.clamp(0, MAX_RESULTS);
        let offset = offset.max(0);
        let sql = format!(
            "{} WHERE {}{} LIMIT ? OFFSET ?",
            R::SELECT,
            filter.sql,
            render_order(order, R::schema())?
        );

        tracing::debug!(
            kind = R::schema().kind,
            params = filter.params.len(),
            limit,
            offset,
            "find_records"
        );

        let mut query = sqlx::query_as::<_, R::Row>(&sql);
        for param in &filter.params {
            query = match param {
                Value::Int(v) => query.bind(*v),
                Value::Text(s) => query.bind(s.as_str()),
            };
        }
        let rows = query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(R::from_row).collect())
    }

    pub(crate) async fn count_records<R: Record>(&self, filter: &Filter) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            R::schema().table,
            filter.sql
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for param in &filter.params {
            query = match param {
                Value::Int(v) => query.bind(*v),
                Value::Text(s) => query.bind(s.as_str()),
            };
        }
        Ok(query.fetch_one(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{self, Field, ARTICLE_SCHEMA};
    use crate::storage::types::Article;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    async fn seed(db: &Database) {
        let articles = [
            ("News", "SNMP support", "Network printers", "Uses SNMP to find printers."),
            ("News", "Weekly snapshot", "Snapshot 1.2", "The weekly snapshot is out."),
            ("Docs", "Printing 100%", "How to print", "Print everything_at_once."),
        ];
        for (section, title, abstract_text, contents) in articles {
            let mut article = Article::new(section, title, abstract_text, contents);
            article.is_published = true;
            db.save(&article, "jane").await.unwrap();
        }
    }

    fn filter(q: &str) -> Filter {
        let (_, predicate) = query::translate(q, &ARTICLE_SCHEMA);
        render(&predicate, &ARTICLE_SCHEMA).unwrap()
    }

    async fn titles(db: &Database, q: &str) -> Vec<String> {
        let found = Repository::<Article>::find(db, &filter(q), &[], 100, 0)
            .await
            .unwrap();
        found.into_iter().map(|a| a.title).collect()
    }

    #[tokio::test]
    async fn test_word_search_is_case_insensitive() {
        let db = test_db().await;
        seed(&db).await;
        assert_eq!(titles(&db, "SNMP").await, vec!["SNMP support"]);
        assert_eq!(titles(&db, "snmp").await, vec!["SNMP support"]);
    }

    #[tokio::test]
    async fn test_empty_query_matches_everything() {
        let db = test_db().await;
        seed(&db).await;
        assert_eq!(titles(&db, "").await.len(), 3);
        assert_eq!(Repository::<Article>::count(&db, &Filter::match_all()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_and_not() {
        let db = test_db().await;
        seed(&db).await;
        assert_eq!(
            titles(&db, "printers and not snapshot").await,
            vec!["SNMP support"]
        );
    }

    #[tokio::test]
    async fn test_like_wildcards_match_literally() {
        let db = test_db().await;
        seed(&db).await;
        assert_eq!(titles(&db, "100%").await, vec!["Printing 100%"]);
        assert!(titles(&db, "\"everything%once\"").await.is_empty());
        assert_eq!(titles(&db, "everything_at").await, vec!["Printing 100%"]);
    }

    #[tokio::test]
    async fn test_number_filter() {
        let db = test_db().await;
        seed(&db).await;
        assert_eq!(titles(&db, "number:2").await, vec!["Weekly snapshot"]);
        assert!(titles(&db, "number:abc").await.is_empty());
    }

    #[tokio::test]
    async fn test_creator_is_case_insensitive() {
        let db = test_db().await;
        seed(&db).await;
        assert_eq!(titles(&db, "creator:JANE").await.len(), 3);
        assert!(titles(&db, "creator:bob").await.is_empty());
    }

    #[tokio::test]
    async fn test_injection_text_is_harmless() {
        let db = test_db().await;
        seed(&db).await;
        assert!(titles(&db, "\"'; DROP TABLE articles; --\"").await.is_empty());
        assert_eq!(titles(&db, "").await.len(), 3);
    }

    #[tokio::test]
    async fn test_limit_offset_and_order() {
        let db = test_db().await;
        seed(&db).await;
        let order = parse_order("-id", &ARTICLE_SCHEMA).unwrap();
        let page = Repository::<Article>::find(&db, &Filter::match_all(), &order, 2, 1)
            .await
            .unwrap();
        let ids: Vec<i64> = page.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_limit_is_capped() {
        let db = test_db().await;
        seed(&db).await;
        let all = Repository::<Article>::find(&db, &Filter::match_all(), &[], i64::MAX, 0)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_search_renders_predicate() {
        let db = test_db().await;
        seed(&db).await;
        let predicate = Predicate::equals(Field::Section, "Docs");
        let found = Repository::<Article>::search(&db, &predicate, "-modified", 10, 0)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].section, "Docs");
    }

    #[tokio::test]
    async fn test_search_rejects_unknown_order_field() {
        let db = test_db().await;
        let result = Repository::<Article>::search(&db, &Predicate::All, "-priority", 10, 0).await;
        assert!(result.is_err());
    }
}
