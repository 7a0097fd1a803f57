use serde::Serialize;

use super::{Page, PageError, PageWindow, RequestContext};
use crate::query::{self, parse_order, render, CompareOp, Field, Predicate, STR_SCHEMA};
use crate::storage::{Database, Priority, Repository, Scope, Status, Str, StrText, Subscription};
use crate::util::validate_email;

const DEFAULT_ORDER: &str = "-status -priority -scope";

/// Stock replies developers can attach to an STR by key.
pub const CANNED_MESSAGES: &[(&str, &str)] = &[
    ("fixed", "Fixed in the source repository."),
    (
        "duplicate",
        "This STR duplicates an existing report and has been closed.",
    ),
    (
        "needinfo",
        "We need more information to reproduce this problem. Please post the \
         operating system, software version and the steps that trigger it.",
    ),
    (
        "stale",
        "This STR has not been updated by the submitter for two or more weeks \
         and has been closed. Please reopen it with the requested information \
         if the problem persists.",
    ),
    (
        "unreproducible",
        "We are unable to reproduce this problem. Please reopen the STR if \
         you can provide a test case.",
    ),
    (
        "later",
        "Thank you for the suggestion. We will consider it for a future release.",
    ),
];

pub fn canned_message(key: &str) -> Option<&'static str> {
    CANNED_MESSAGES
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, text)| *text)
}

/// Status selection for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum StatusFilter {
    #[default]
    Any,
    /// Active, Pending or New.
    Open,
    /// Resolved or Unresolved.
    Closed,
    Exact(Status),
}

impl StatusFilter {
    /// Accepts `0`/`any`, `-2`/`open`, `-1`/`closed`, or a status code or
    /// label.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "any" => Some(StatusFilter::Any),
            "-2" | "open" => Some(StatusFilter::Open),
            "-1" | "closed" => Some(StatusFilter::Closed),
            other => Status::parse(other).map(StatusFilter::Exact),
        }
    }

    fn predicate(self) -> Predicate {
        match self {
            StatusFilter::Any => Predicate::All,
            StatusFilter::Open => {
                Predicate::compare(Field::Status, CompareOp::Ge, Status::Active.code())
            }
            StatusFilter::Closed => {
                Predicate::compare(Field::Status, CompareOp::Le, Status::Unresolved.code())
            }
            StatusFilter::Exact(status) => Predicate::equals(Field::Status, status.code()),
        }
    }
}

/// A listing row: the STR plus, for pending-or-newer reports, the latest
/// published message.
#[derive(Debug, Clone, Serialize)]
pub struct StrListing {
    #[serde(flatten)]
    pub report: Str,
    pub latest_text: Option<StrText>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrDetail {
    #[serde(flatten)]
    pub report: Str,
    pub texts: Vec<StrText>,
    /// Only filled in for developers.
    pub subscribers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub updated: Vec<i64>,
    /// Missing or invalid after the change.
    pub skipped: Vec<i64>,
}

fn bad_value(key: &str, value: &str) -> PageError {
    PageError::BadRequest(format!("Invalid {} '{}'", key, value))
}

/// A typed form value; blank is `None`, garbage is an error.
fn form_value<T>(
    ctx: &RequestContext,
    key: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, PageError> {
    match ctx.param_trimmed(key) {
        None => Ok(None),
        Some(value) => parse(value).map(Some).ok_or_else(|| bad_value(key, value)),
    }
}

/// Like [`form_value`] but `0` also means "don't care".
fn list_filter<T>(
    ctx: &RequestContext,
    key: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, PageError> {
    match ctx.param_trimmed(key) {
        Some("0") => Ok(None),
        _ => form_value(ctx, key, parse),
    }
}

async fn load_visible(db: &Database, ctx: &RequestContext, id: i64) -> Result<Str, PageError> {
    match Repository::<Str>::load(db, id).await? {
        Some(report) if ctx.can_see(report.is_published, &report.create_user) => Ok(report),
        _ => Err(PageError::NotFound { kind: "STR", id }),
    }
}

// ============================================================================
// Listing and Viewing
// ============================================================================

/// Search and list STRs.
///
/// Form fields: `search`, `priority`, `status` (see [`StatusFilter`]),
/// `scope`, `mine`, `order` and `index`. With `mine`, users see the reports
/// they created and developers see the ones assigned to them or to nobody.
pub async fn list_strs(db: &Database, ctx: &RequestContext) -> Result<Page<StrListing>, PageError> {
    let search = ctx.param("search").unwrap_or("");
    let (_, matches) = query::translate(search, &STR_SCHEMA);

    let mut predicate = ctx.visibility();
    if let Some(priority) = list_filter(ctx, "priority", Priority::parse)? {
        predicate = predicate.and(Predicate::equals(Field::Priority, priority.code()));
    }
    if let Some(status) = form_value(ctx, "status", StatusFilter::parse)? {
        predicate = predicate.and(status.predicate());
    }
    if let Some(scope) = list_filter(ctx, "scope", Scope::parse)? {
        predicate = predicate.and(Predicate::equals(Field::Scope, scope.code()));
    }
    if ctx.param_flag("mine") == Some(true) && ctx.is_logged_in() {
        let user = ctx.user.as_str();
        let mine = if ctx.is_devel() {
            Predicate::equals(Field::Developer, user).or(Predicate::equals(Field::Developer, ""))
        } else {
            Predicate::equals(Field::Creator, user)
        };
        predicate = predicate.and(mine);
    }
    let predicate = predicate.and(matches);

    let filter = render(&predicate, &STR_SCHEMA)?;
    let order = parse_order(
        ctx.param_trimmed("order").unwrap_or(DEFAULT_ORDER),
        &STR_SCHEMA,
    )?;

    let total = Repository::<Str>::count(db, &filter).await?;
    let window = PageWindow::new(ctx.param_i64("index").unwrap_or(0), ctx.page_max, total);
    let reports = if window.is_empty() {
        Vec::new()
    } else {
        Repository::<Str>::find(db, &filter, &order, window.len(), window.index).await?
    };

    let mut items = Vec::with_capacity(reports.len());
    for report in reports {
        let latest_text = if report.status >= Status::Pending {
            db.latest_str_text(report.id).await?
        } else {
            None
        };
        items.push(StrListing {
            report,
            latest_text,
        });
    }

    tracing::debug!(
        user = %ctx.user,
        total,
        shown = items.len(),
        "Listed STRs"
    );
    Ok(Page { items, window })
}

/// An STR with its dialog. Hidden messages and the notification list are
/// shown to developers only.
pub async fn show_str(db: &Database, ctx: &RequestContext, id: i64) -> Result<StrDetail, PageError> {
    let report = load_visible(db, ctx, id).await?;
    let texts = db.str_texts(id, ctx.is_devel()).await?;
    let subscribers = if ctx.is_devel() {
        db.subscribers(id).await?
    } else {
        Vec::new()
    };
    Ok(StrDetail {
        report,
        texts,
        subscribers,
    })
}

// ============================================================================
// Submitting and Updating
// ============================================================================

/// Create (`id == 0`) or modify an STR.
///
/// New reports need a logged-in user and a first message in `contents`.
/// Modifying is for developers, who may also set `status`, `manager_user`,
/// `fix_version`, `master_id` and `is_published`.
pub async fn submit_str(db: &Database, ctx: &RequestContext, id: i64) -> Result<Str, PageError> {
    ctx.require_login()?;

    let mut report = if id > 0 {
        ctx.require_devel("Modifying STRs")?;
        Repository::<Str>::load(db, id)
            .await?
            .ok_or(PageError::NotFound { kind: "STR", id })?
    } else {
        Str::default()
    };

    let text = compose_text(ctx)?;
    if id <= 0 && text.is_none() {
        return Err(PageError::BadRequest(
            "Describe the problem or feature in the contents field".to_string(),
        ));
    }

    load_form(&mut report, ctx)?;
    report.validate()?;

    let (saved, _) = db
        .save_str_with_text(&report, &ctx.user, text.as_deref())
        .await?;
    Ok(saved)
}

fn load_form(report: &mut Str, ctx: &RequestContext) -> Result<(), PageError> {
    if let Some(summary) = ctx.param("summary") {
        report.summary = summary.trim().to_string();
    }
    if let Some(subsystem) = ctx.param("subsystem") {
        report.subsystem = subsystem.trim().to_string();
    }
    if let Some(version) = ctx.param("str_version") {
        report.str_version = version.trim().to_string();
    }
    if let Some(priority) = form_value(ctx, "priority", Priority::parse)? {
        report.priority = priority;
    }
    if let Some(scope) = form_value(ctx, "scope", Scope::parse)? {
        report.scope = scope;
    }

    if !ctx.is_devel() {
        return Ok(());
    }

    if let Some(status) = form_value(ctx, "status", Status::parse)? {
        report.status = status;
    }
    if let Some(manager) = ctx.param("manager_user") {
        report.manager_user = manager.trim().to_string();
    }
    if let Some(fix_version) = ctx.param("fix_version") {
        report.fix_version = fix_version.trim().to_string();
    }
    if let Some(value) = ctx.param_trimmed("master_id") {
        report.master_id = value.parse().map_err(|_| bad_value("master_id", value))?;
    }
    if let Some(flag) = ctx.param_flag("is_published") {
        report.is_published = flag;
    }
    Ok(())
}

/// Canned `message` (if any) followed by free-form `contents`.
fn compose_text(ctx: &RequestContext) -> Result<Option<String>, PageError> {
    let mut text = String::new();

    if let Some(key) = ctx.param_trimmed("message") {
        let canned = canned_message(key).ok_or_else(|| bad_value("message", key))?;
        text.push_str(canned);
    }

    if let Some(contents) = ctx.param("contents") {
        let contents = contents.replace("\r\n", "\n");
        let contents = contents.trim();
        if !contents.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(contents);
        }
    }

    Ok((!text.is_empty()).then_some(text))
}

/// Add a message to an STR's dialog.
///
/// Closed reports only accept messages from developers. An STR below
/// Pending moves to Pending so the team sees the new information.
pub async fn post_text(db: &Database, ctx: &RequestContext, id: i64) -> Result<StrText, PageError> {
    ctx.require_login()?;

    let mut report = load_visible(db, ctx, id).await?;
    if !ctx.is_devel() && report.status.is_closed() {
        return Err(PageError::Closed(id));
    }

    let text = compose_text(ctx)?
        .ok_or_else(|| PageError::BadRequest("Text is required".to_string()))?;

    if report.status < Status::Pending {
        report.status = Status::Pending;
    }
    let (_, posted) = db
        .save_str_with_text(&report, &ctx.user, Some(&text))
        .await?;
    let posted = posted.ok_or_else(|| anyhow::anyhow!("STR #{} text was not stored", id))?;
    tracing::info!(str_id = id, user = %ctx.user, "Posted STR text");
    Ok(posted)
}

/// Apply the non-empty form fields `status`, `priority`, `subsystem`,
/// `fix_version` and `manager_user` to each selected STR, optionally adding
/// the canned `message`. Developers only.
pub async fn batch_update(
    db: &Database,
    ctx: &RequestContext,
    ids: &[i64],
) -> Result<BatchOutcome, PageError> {
    ctx.require_devel("Batch update")?;

    let status = form_value(ctx, "status", Status::parse)?;
    let priority = form_value(ctx, "priority", Priority::parse)?;
    let subsystem = ctx.param_trimmed("subsystem");
    let fix_version = ctx.param_trimmed("fix_version");
    let manager = ctx.param_trimmed("manager_user");
    let message = match ctx.param_trimmed("message") {
        Some(key) => Some(canned_message(key).ok_or_else(|| bad_value("message", key))?),
        None => None,
    };

    let mut outcome = BatchOutcome::default();
    if status.is_none()
        && priority.is_none()
        && subsystem.is_none()
        && fix_version.is_none()
        && manager.is_none()
        && message.is_none()
    {
        tracing::debug!("Batch update with no changes");
        return Ok(outcome);
    }

    for &id in ids {
        let Some(mut report) = Repository::<Str>::load(db, id).await? else {
            outcome.skipped.push(id);
            continue;
        };

        if let Some(status) = status {
            report.status = status;
        }
        if let Some(priority) = priority {
            report.priority = priority;
        }
        if let Some(subsystem) = subsystem {
            report.subsystem = subsystem.to_string();
        }
        if let Some(fix_version) = fix_version {
            report.fix_version = fix_version.to_string();
        }
        if let Some(manager) = manager {
            report.manager_user = manager.to_string();
        }

        if let Err(e) = report.validate() {
            tracing::warn!(id, error = %e, "Skipping invalid STR in batch update");
            outcome.skipped.push(id);
            continue;
        }

        db.save_str_with_text(&report, &ctx.user, message).await?;
        outcome.updated.push(id);
    }

    tracing::info!(
        user = %ctx.user,
        updated = outcome.updated.len(),
        skipped = outcome.skipped.len(),
        "Batch update finished"
    );
    Ok(outcome)
}

/// Show or hide one dialog message. Developers only.
pub async fn set_text_published(
    db: &Database,
    ctx: &RequestContext,
    text_id: i64,
    is_published: bool,
) -> Result<(), PageError> {
    ctx.require_devel("Publishing STR text")?;
    if !db.set_str_text_published(text_id, is_published).await? {
        return Err(PageError::NotFound {
            kind: "STR text",
            id: text_id,
        });
    }
    Ok(())
}

/// Subscribe (`notification=ON`) or unsubscribe (`OFF`) the `email`
/// address for changes to an STR.
pub async fn set_notification(
    db: &Database,
    ctx: &RequestContext,
    str_id: i64,
) -> Result<Subscription, PageError> {
    let email = validate_email(ctx.param("email").unwrap_or(""))
        .map_err(|e| PageError::BadRequest(e.to_string()))?;
    let subscribe = match ctx
        .param_trimmed("notification")
        .map(str::to_ascii_uppercase)
        .as_deref()
    {
        Some("ON") => true,
        Some("OFF") => false,
        _ => {
            return Err(PageError::BadRequest(
                "Choose whether to receive notifications (ON or OFF)".to_string(),
            ))
        }
    };

    load_visible(db, ctx, str_id).await?;

    let result = if subscribe {
        db.add_subscriber(str_id, &email).await?
    } else {
        db.remove_subscriber(str_id, &email).await?
    };
    Ok(result)
}
