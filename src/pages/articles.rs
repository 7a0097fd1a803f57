use super::{Page, PageError, PageWindow, RequestContext};
use crate::query::{self, parse_order, render, CompareOp, Field, Predicate, ARTICLE_SCHEMA};
use crate::storage::{Article, Database, Repository};

const DEFAULT_ORDER: &str = "-modified";

/// Search and list articles.
///
/// Form fields: `search` (query text), `section` (`!name` excludes a
/// section, `Mine` selects the caller's own), `published` (only published
/// articles), `order` and `index`.
pub async fn list_articles(db: &Database, ctx: &RequestContext) -> Result<Page<Article>, PageError> {
    let search = ctx.param("search").unwrap_or("");
    let (_, matches) = query::translate(search, &ARTICLE_SCHEMA);

    let mut predicate = ctx.visibility();
    if ctx.param_flag("published") == Some(true) {
        predicate = predicate.and(Predicate::equals(Field::Published, 1));
    }
    if let Some(section) = ctx.param_trimmed("section") {
        predicate = predicate.and(section_filter(section, ctx));
    }
    let predicate = predicate.and(matches);

    let filter = render(&predicate, &ARTICLE_SCHEMA)?;
    let order = parse_order(
        ctx.param_trimmed("order").unwrap_or(DEFAULT_ORDER),
        &ARTICLE_SCHEMA,
    )?;

    let total = Repository::<Article>::count(db, &filter).await?;
    let window = PageWindow::new(ctx.param_i64("index").unwrap_or(0), ctx.page_max, total);
    let items = if window.is_empty() {
        Vec::new()
    } else {
        Repository::<Article>::find(db, &filter, &order, window.len(), window.index).await?
    };

    tracing::debug!(
        user = %ctx.user,
        total,
        shown = items.len(),
        "Listed articles"
    );
    Ok(Page { items, window })
}

fn section_filter(section: &str, ctx: &RequestContext) -> Predicate {
    if let Some(excluded) = section.strip_prefix('!') {
        Predicate::compare(Field::Section, CompareOp::Ne, excluded)
    } else if section == "Mine" {
        if ctx.is_logged_in() {
            Predicate::equals(Field::Creator, ctx.user.as_str())
        } else {
            Predicate::Nothing
        }
    } else {
        Predicate::equals(Field::Section, section)
    }
}

/// Unpublished articles look missing to anyone but their author and
/// developers.
pub async fn show_article(db: &Database, ctx: &RequestContext, id: i64) -> Result<Article, PageError> {
    let not_found = PageError::NotFound { kind: "Article", id };
    let article = Repository::<Article>::load(db, id)
        .await?
        .ok_or(not_found)?;
    if !ctx.can_see(article.is_published, &article.create_user) {
        return Err(PageError::NotFound { kind: "Article", id });
    }
    Ok(article)
}

/// Create (`id == 0`) or modify an article from the form fields `section`,
/// `section_other`, `title`, `abstract`, `contents` and `is_published`.
///
/// Any logged-in user may submit a new article, but only developers may
/// publish one or modify an existing one.
pub async fn submit_article(
    db: &Database,
    ctx: &RequestContext,
    id: i64,
) -> Result<Article, PageError> {
    ctx.require_login()?;

    let mut article = if id > 0 {
        ctx.require_devel("Modifying articles")?;
        Repository::<Article>::load(db, id)
            .await?
            .ok_or(PageError::NotFound { kind: "Article", id })?
    } else {
        Article::default()
    };

    load_form(&mut article, ctx);
    article.validate()?;

    let saved = db.save(&article, &ctx.user).await?;
    Ok(saved)
}

fn load_form(article: &mut Article, ctx: &RequestContext) {
    if !ctx.is_devel() && article.id == 0 {
        article.is_published = false;
    } else if let Some(flag) = ctx.param_flag("is_published") {
        article.is_published = flag;
    }

    if let Some(section) = ctx.param("section") {
        article.section = section.trim().to_string();
    }
    if article.section.is_empty() {
        if let Some(other) = ctx.param("section_other") {
            article.section = other.trim().to_string();
        }
    }

    if let Some(title) = ctx.param("title") {
        article.title = title.trim().to_string();
    }
    if let Some(abstract_text) = ctx.param("abstract") {
        article.abstract_text = abstract_text.trim().to_string();
    }
    if let Some(contents) = ctx.param("contents") {
        article.contents = contents.replace("\r\n", "\n").trim().to_string();
    }
}

/// Admin only.
pub async fn delete_article(db: &Database, ctx: &RequestContext, id: i64) -> Result<(), PageError> {
    ctx.require_login()?;
    if !ctx.is_admin() {
        return Err(PageError::Forbidden(
            "Deleting articles is not available to you".to_string(),
        ));
    }
    if !db.delete_article(id).await? {
        return Err(PageError::NotFound { kind: "Article", id });
    }
    tracing::info!(id, user = %ctx.user, "Article deleted by admin");
    Ok(())
}
