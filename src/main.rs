use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};

use bugdesk::config::Config;
use bugdesk::pages::{self, AuthLevel, Page, PageError, RequestContext, StrDetail, StrListing};
use bugdesk::query::{self, EntitySchema, Filter, ARTICLE_SCHEMA, STR_SCHEMA};
use bugdesk::storage::{Article, Database, DatabaseError, Str, StrText};
use bugdesk::util::{abbreviate, strip_control_chars};

const SUMMARY_WIDTH: usize = 80;
const PREVIEW_WIDTH: usize = 128;

/// Get the config directory path (~/.config/bugdesk/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("bugdesk"))
}

/// Create the config directory if needed and restrict it to the owner.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }
    Ok(())
}

// ============================================================================
// Command Line
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "bugdesk",
    version,
    about = "Trouble reports and articles with a boolean search language"
)]
struct Cli {
    /// Database file (overrides database_path in the config file)
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    /// Config file (default ~/.config/bugdesk/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Act as this user
    #[arg(long, global = true)]
    user: Option<String>,

    /// Privilege level of the user
    #[arg(long, value_enum, global = true)]
    level: Option<AuthLevel>,

    /// Rows per listing page (10 to 1000)
    #[arg(long, global = true)]
    page_max: Option<i64>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show how a search string is translated, optionally running it
    Search(SearchArgs),

    /// Browse and edit articles
    #[command(subcommand)]
    Article(ArticleCommand),

    /// Browse and edit software trouble reports
    #[command(subcommand)]
    Str(StrCommand),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Kind {
    Article,
    Str,
}

/// Search syntax: words match title and body text; `"quoted phrases"` match
/// verbatim; `and`, `or` and `not` combine terms left to right; `creator:`,
/// `number:` and `title:` filter fields, and STRs also accept `developer:`,
/// `subsystem:`, `version:` and `fixversion:`.
#[derive(Args, Debug)]
struct SearchArgs {
    query: String,

    #[arg(long, value_enum, default_value_t = Kind::Article)]
    kind: Kind,

    /// Run the query and list the matches
    #[arg(long)]
    run: bool,

    /// Sort order such as "-modified" or "-status -priority"
    #[arg(long)]
    order: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ArticleCommand {
    List {
        #[arg(long)]
        search: Option<String>,
        /// Section name, "!name" to exclude one, or "Mine"
        #[arg(long)]
        section: Option<String>,
        /// Only published articles
        #[arg(long)]
        published: bool,
        #[arg(long)]
        order: Option<String>,
        #[arg(long)]
        index: Option<i64>,
    },
    Show {
        id: i64,
    },
    /// Create an article, or modify one with --id
    Submit {
        #[arg(long, default_value_t = 0)]
        id: i64,
        #[arg(long)]
        section: Option<String>,
        #[arg(long)]
        section_other: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long = "abstract")]
        abstract_text: Option<String>,
        /// Article body, or "-" to read standard input
        #[arg(long)]
        contents: Option<String>,
        #[arg(long)]
        published: Option<bool>,
    },
    Delete {
        id: i64,
    },
    /// List the sections in use
    Sections,
}

#[derive(Subcommand, Debug)]
enum StrCommand {
    List {
        #[arg(long)]
        search: Option<String>,
        /// Priority code or label, 0 for any
        #[arg(long)]
        priority: Option<String>,
        /// any, open, closed, or a status code or label
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        scope: Option<String>,
        /// Reports I created (users) or that are assigned to me or nobody (developers)
        #[arg(long)]
        mine: bool,
        #[arg(long)]
        order: Option<String>,
        #[arg(long)]
        index: Option<i64>,
    },
    Show {
        id: i64,
    },
    /// Create an STR, or modify one with --id
    Submit {
        #[arg(long, default_value_t = 0)]
        id: i64,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        subsystem: Option<String>,
        #[arg(long = "version")]
        str_version: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "manager")]
        manager_user: Option<String>,
        #[arg(long)]
        fix_version: Option<String>,
        #[arg(long)]
        master_id: Option<i64>,
        #[arg(long)]
        published: Option<bool>,
        /// Canned message key
        #[arg(long)]
        message: Option<String>,
        /// First message, or "-" to read standard input
        #[arg(long)]
        contents: Option<String>,
    },
    /// Add a message to an STR
    Post {
        id: i64,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        contents: Option<String>,
    },
    /// Apply the same change to several STRs
    Batch {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        subsystem: Option<String>,
        #[arg(long)]
        fix_version: Option<String>,
        #[arg(long = "manager")]
        manager_user: Option<String>,
        #[arg(long)]
        message: Option<String>,
    },
    /// Show or hide a dialog message
    PublishText {
        text_id: i64,
        #[arg(long)]
        hide: bool,
    },
    /// Turn change notifications for an address on or off
    Notify {
        id: i64,
        #[arg(long)]
        email: String,
        #[arg(long)]
        off: bool,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Some(page) = e.downcast_ref::<PageError>() {
                eprintln!("Error: {}", page);
                std::process::exit(2);
            }
            if let Some(DatabaseError::InstanceLocked) = e.downcast_ref::<DatabaseError>() {
                eprintln!(
                    "Error: The database is locked by another process. Please try again."
                );
                std::process::exit(1);
            }
            Err(e)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let user = cli.user.clone().unwrap_or_else(|| config.user.clone());
    let level = cli.level.unwrap_or(config.level);
    let ctx = RequestContext::new(&user, level)
        .with_page_max(cli.page_max.unwrap_or(config.page_max));
    tracing::debug!(user = %ctx.user, level = ?ctx.level, "Request context");

    let out = Output { json: cli.json };

    if let Command::Search(args) = &cli.command {
        if !args.run {
            return show_translation(&out, args);
        }
    }

    let db = open_database(&cli, &config).await?;
    match cli.command {
        Command::Search(args) => run_search(&db, ctx, &out, args).await,
        Command::Article(cmd) => run_article(&db, ctx, &out, &config, cmd).await,
        Command::Str(cmd) => run_str(&db, ctx, &out, &config, cmd).await,
    }
}

async fn open_database(cli: &Cli, config: &Config) -> Result<Database> {
    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => {
            let config_dir = get_config_dir()?;
            ensure_config_dir(&config_dir)?;
            config.resolve_database_path(&config_dir)
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = Database::open(db_path_str).await?;
    tracing::debug!(path = %db_path.display(), "Opened database");
    Ok(db)
}

/// Attach the given form fields, skipping absent ones.
fn with_fields<'a>(
    ctx: RequestContext,
    fields: impl IntoIterator<Item = (&'a str, Option<String>)>,
) -> RequestContext {
    fields
        .into_iter()
        .fold(ctx, |ctx, (key, value)| match value {
            Some(value) => ctx.with_param(key, value),
            None => ctx,
        })
}

/// `-` reads the text from standard input.
fn read_contents(contents: Option<String>) -> Result<Option<String>> {
    match contents.as_deref() {
        Some("-") => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read contents from standard input")?;
            Ok(Some(text))
        }
        _ => Ok(contents),
    }
}

fn flag(value: bool) -> Option<String> {
    value.then(|| "1".to_string())
}

fn bool_field(value: Option<bool>) -> Option<String> {
    value.map(|v| if v { "1" } else { "0" }.to_string())
}

// ============================================================================
// Search
// ============================================================================

#[derive(Serialize)]
struct Translation {
    kind: &'static str,
    tokens: Vec<String>,
    predicate: String,
    #[serde(flatten)]
    filter: Filter,
}

fn schema_for(kind: Kind) -> &'static EntitySchema {
    match kind {
        Kind::Article => &ARTICLE_SCHEMA,
        Kind::Str => &STR_SCHEMA,
    }
}

fn show_translation(out: &Output, args: &SearchArgs) -> Result<()> {
    let schema = schema_for(args.kind);
    let (tokens, predicate) = query::translate(&args.query, schema);
    let filter = query::render(&predicate, schema)?;
    let translation = Translation {
        kind: schema.kind,
        tokens: tokens.iter().map(ToString::to_string).collect(),
        predicate: format!("{:?}", predicate),
        filter,
    };

    out.emit(&translation, |t| {
        println!("Kind:      {}", t.kind);
        println!("Tokens:    {}", t.tokens.join(" | "));
        println!("Predicate: {}", t.predicate);
        println!("SQL:       {}", t.filter.sql);
        println!("Params:    {:?}", t.filter.params);
    })
}

async fn run_search(db: &Database, ctx: RequestContext, out: &Output, args: SearchArgs) -> Result<()> {
    let ctx = with_fields(
        ctx,
        [("search", Some(args.query)), ("order", args.order)],
    );
    match args.kind {
        Kind::Article => {
            let page = pages::list_articles(db, &ctx).await?;
            out.emit(&page, print_article_page)
        }
        Kind::Str => {
            let page = pages::list_strs(db, &ctx).await?;
            out.emit(&page, print_str_page)
        }
    }
}

// ============================================================================
// Articles
// ============================================================================

async fn run_article(
    db: &Database,
    ctx: RequestContext,
    out: &Output,
    config: &Config,
    cmd: ArticleCommand,
) -> Result<()> {
    match cmd {
        ArticleCommand::List {
            search,
            section,
            published,
            order,
            index,
        } => {
            let ctx = with_fields(
                ctx,
                [
                    ("search", search),
                    ("section", section),
                    ("published", flag(published)),
                    ("order", order),
                    ("index", index.map(|i| i.to_string())),
                ],
            );
            let page = pages::list_articles(db, &ctx).await?;
            out.emit(&page, |page| {
                println!("{} articles", config.project_name);
                print_article_page(page);
            })
        }
        ArticleCommand::Show { id } => {
            let article = pages::show_article(db, &ctx, id).await?;
            out.emit(&article, print_article)
        }
        ArticleCommand::Submit {
            id,
            section,
            section_other,
            title,
            abstract_text,
            contents,
            published,
        } => {
            let ctx = with_fields(
                ctx,
                [
                    ("section", section),
                    ("section_other", section_other),
                    ("title", title),
                    ("abstract", abstract_text),
                    ("contents", read_contents(contents)?),
                    ("is_published", bool_field(published)),
                ],
            );
            let saved = pages::submit_article(db, &ctx, id).await?;
            out.emit(&saved, |a| println!("Saved article #{}", a.id))
        }
        ArticleCommand::Delete { id } => {
            pages::delete_article(db, &ctx, id).await?;
            out.emit(&serde_json::json!({ "deleted": id }), |_| {
                println!("Deleted article #{}", id)
            })
        }
        ArticleCommand::Sections => {
            let sections = db.article_sections().await?;
            out.emit(&sections, |sections| {
                for section in sections {
                    println!("{}", strip_control_chars(section));
                }
            })
        }
    }
}

// ============================================================================
// STRs
// ============================================================================

async fn run_str(
    db: &Database,
    ctx: RequestContext,
    out: &Output,
    config: &Config,
    cmd: StrCommand,
) -> Result<()> {
    match cmd {
        StrCommand::List {
            search,
            priority,
            status,
            scope,
            mine,
            order,
            index,
        } => {
            let ctx = with_fields(
                ctx,
                [
                    ("search", search),
                    ("priority", priority),
                    ("status", status),
                    ("scope", scope),
                    ("mine", flag(mine)),
                    ("order", order),
                    ("index", index.map(|i| i.to_string())),
                ],
            );
            let page = pages::list_strs(db, &ctx).await?;
            out.emit(&page, |page| {
                println!("{} trouble reports", config.project_name);
                print_str_page(page);
            })
        }
        StrCommand::Show { id } => {
            let detail = pages::show_str(db, &ctx, id).await?;
            out.emit(&detail, print_str_detail)
        }
        StrCommand::Submit {
            id,
            summary,
            subsystem,
            str_version,
            priority,
            scope,
            status,
            manager_user,
            fix_version,
            master_id,
            published,
            message,
            contents,
        } => {
            let ctx = with_fields(
                ctx,
                [
                    ("summary", summary),
                    ("subsystem", subsystem),
                    ("str_version", str_version),
                    ("priority", priority),
                    ("scope", scope),
                    ("status", status),
                    ("manager_user", manager_user),
                    ("fix_version", fix_version),
                    ("master_id", master_id.map(|i| i.to_string())),
                    ("is_published", bool_field(published)),
                    ("message", message),
                    ("contents", read_contents(contents)?),
                ],
            );
            let saved = pages::submit_str(db, &ctx, id).await?;
            out.emit(&saved, |s| println!("Saved STR #{}", s.id))
        }
        StrCommand::Post {
            id,
            message,
            contents,
        } => {
            let ctx = with_fields(
                ctx,
                [("message", message), ("contents", read_contents(contents)?)],
            );
            let text = pages::post_text(db, &ctx, id).await?;
            out.emit(&text, |t| println!("Posted text #{} to STR #{}", t.id, t.str_id))
        }
        StrCommand::Batch {
            ids,
            status,
            priority,
            subsystem,
            fix_version,
            manager_user,
            message,
        } => {
            let ctx = with_fields(
                ctx,
                [
                    ("status", status),
                    ("priority", priority),
                    ("subsystem", subsystem),
                    ("fix_version", fix_version),
                    ("manager_user", manager_user),
                    ("message", message),
                ],
            );
            let outcome = pages::batch_update(db, &ctx, &ids).await?;
            out.emit(&outcome, |o| {
                println!("Updated: {}", join_ids(&o.updated));
                if !o.skipped.is_empty() {
                    println!("Skipped: {}", join_ids(&o.skipped));
                }
            })
        }
        StrCommand::PublishText { text_id, hide } => {
            pages::set_text_published(db, &ctx, text_id, !hide).await?;
            out.emit(
                &serde_json::json!({ "text_id": text_id, "is_published": !hide }),
                |_| {
                    let state = if hide { "hidden" } else { "published" };
                    println!("Text #{} is now {}", text_id, state)
                },
            )
        }
        StrCommand::Notify { id, email, off } => {
            let ctx = with_fields(
                ctx,
                [
                    ("email", Some(email)),
                    ("notification", Some(if off { "OFF" } else { "ON" }.to_string())),
                ],
            );
            let result = pages::set_notification(db, &ctx, id).await?;
            out.emit(&result, |r| println!("{:?}", r))
        }
    }
}

fn join_ids(ids: &[i64]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(|id| format!("#{}", id))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Output
// ============================================================================

struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            let text = serde_json::to_string_pretty(value).context("Failed to encode JSON")?;
            println!("{}", text);
        } else {
            human(value);
        }
        Ok(())
    }
}

fn format_date(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_window<T>(page: &Page<T>) {
    let w = &page.window;
    if w.total == 0 {
        println!("No matches.");
        return;
    }
    print!("Showing {}-{} of {}", w.start, w.end, w.total);
    if let Some(prev) = w.prev {
        print!("  (previous: --index {})", prev);
    }
    if let Some(next) = w.next {
        print!("  (next: --index {})", next);
    }
    println!();
}

fn print_article_page(page: &Page<Article>) {
    print_window(page);
    for a in &page.items {
        let marker = if a.is_published { ' ' } else { '*' };
        println!(
            "{}#{:<5} {}  {:<12} {}",
            marker,
            a.id,
            format_date(a.modify_date),
            abbreviate(&strip_control_chars(&a.section), 12),
            abbreviate(&strip_control_chars(&a.title), SUMMARY_WIDTH)
        );
    }
}

fn print_article(a: &Article) {
    println!("Article #{}: {}", a.id, strip_control_chars(&a.title));
    println!("Section:  {}", strip_control_chars(&a.section));
    println!(
        "Created:  {} by {}",
        format_date(a.create_date),
        strip_control_chars(&a.create_user)
    );
    println!(
        "Modified: {} by {}",
        format_date(a.modify_date),
        strip_control_chars(&a.modify_user)
    );
    if !a.is_published {
        println!("(not published)");
    }
    println!();
    println!("{}", strip_control_chars(&a.abstract_text));
    println!();
    println!("{}", strip_control_chars(&a.contents));
}

fn print_str_page(page: &Page<StrListing>) {
    print_window(page);
    for listing in &page.items {
        let s = &listing.report;
        let marker = if s.is_published { ' ' } else { '*' };
        println!(
            "{}#{:<5} {:<10} {:<8} {:<4} {}",
            marker,
            s.id,
            s.status.label(),
            s.priority.label(),
            s.scope.label(),
            abbreviate(&strip_control_chars(&s.summary), SUMMARY_WIDTH)
        );
        if let Some(text) = &listing.latest_text {
            println!(
                "        {}: {}",
                strip_control_chars(&text.create_user),
                abbreviate(&strip_control_chars(&text.contents), PREVIEW_WIDTH)
            );
        }
    }
}

fn print_str_detail(detail: &StrDetail) {
    let s: &Str = &detail.report;
    println!("STR #{}: {}", s.id, strip_control_chars(&s.summary));
    println!(
        "Status: {}  Priority: {}  Scope: {}",
        s.status.label(),
        s.priority.label(),
        s.scope.label()
    );
    println!(
        "Subsystem: {}  Version: {}  Fix version: {}",
        strip_control_chars(&s.subsystem),
        strip_control_chars(&s.str_version),
        strip_control_chars(&s.fix_version)
    );
    if !s.manager_user.is_empty() {
        println!("Assigned to: {}", strip_control_chars(&s.manager_user));
    }
    if s.master_id > 0 {
        println!("Duplicate of: #{}", s.master_id);
    }
    println!(
        "Created: {} by {}",
        format_date(s.create_date),
        strip_control_chars(&s.create_user)
    );
    if !s.is_published {
        println!("(not published)");
    }

    for text in &detail.texts {
        print_text(text);
    }

    if !detail.subscribers.is_empty() {
        println!();
        println!("Notifications: {}", detail.subscribers.join(", "));
    }
}

fn print_text(text: &StrText) {
    println!();
    let hidden = if text.is_published { "" } else { " (hidden)" };
    println!(
        "--- #{} {} by {}{}",
        text.id,
        format_date(text.create_date),
        strip_control_chars(&text.create_user),
        hidden
    );
    println!("{}", strip_control_chars(&text.contents));
}
