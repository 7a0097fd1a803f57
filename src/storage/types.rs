use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the database
    #[error("The database is locked by another bugdesk process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all mean
/// someone else holds the file.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

/// A record was saved with required fields left empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} is missing required fields: {}", .fields.join(", "))]
pub struct ValidationError {
    pub kind: &'static str,
    pub fields: Vec<&'static str>,
}

impl ValidationError {
    /// `Ok(())` when nothing is missing.
    pub(crate) fn check(kind: &'static str, fields: Vec<&'static str>) -> Result<(), Self> {
        if fields.is_empty() {
            Ok(())
        } else {
            Err(Self { kind, fields })
        }
    }
}

// ============================================================================
// STR Enumerations
// ============================================================================

/// STR workflow state. Resolved and Unresolved are the closed states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Status {
    Resolved = 1,
    Unresolved = 2,
    Active = 3,
    Pending = 4,
    New = 5,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Resolved,
        Status::Unresolved,
        Status::Active,
        Status::Pending,
        Status::New,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Resolved => "Resolved",
            Status::Unresolved => "Unresolved",
            Status::Active => "Active",
            Status::Pending => "Pending",
            Status::New => "New",
        }
    }

    /// Accepts a numeric code or a label, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.parse::<i64>() {
            Ok(code) => Self::from_code(code),
            Err(_) => Self::ALL
                .into_iter()
                .find(|v| v.label().eq_ignore_ascii_case(s)),
        }
    }

    pub fn is_closed(self) -> bool {
        self <= Status::Unresolved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Priority {
    /// Request for enhancement.
    Rfe = 1,
    Low = 2,
    Moderate = 3,
    High = 4,
    Critical = 5,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Rfe,
        Priority::Low,
        Priority::Moderate,
        Priority::High,
        Priority::Critical,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::Rfe => "RFE",
            Priority::Low => "LOW",
            Priority::Moderate => "MODERATE",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.parse::<i64>() {
            Ok(code) => Self::from_code(code),
            Err(_) => Self::ALL
                .into_iter()
                .find(|v| v.label().eq_ignore_ascii_case(s)),
        }
    }
}

/// How much of the installed base a problem affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Scope {
    Machine = 1,
    OperatingSystem = 2,
    All = 3,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Machine, Scope::OperatingSystem, Scope::All];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            Scope::Machine => "MACH",
            Scope::OperatingSystem => "OS",
            Scope::All => "ALL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.parse::<i64>() {
            Ok(code) => Self::from_code(code),
            Err(_) => Self::ALL
                .into_iter()
                .find(|v| v.label().eq_ignore_ascii_case(s)),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A published (or draft) article.
///
/// Records are values: saving returns a new `Article` carrying the assigned
/// id and audit fields. An unsaved article has `id == 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub is_published: bool,
    pub section: String,
    pub title: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub contents: String,
    pub create_date: i64,
    pub create_user: String,
    pub modify_date: i64,
    pub modify_user: String,
}

impl Article {
    pub fn new(section: &str, title: &str, abstract_text: &str, contents: &str) -> Self {
        Self {
            section: section.to_string(),
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
            contents: contents.to_string(),
            ..Self::default()
        }
    }

    /// Names of required fields that are empty.
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.section.is_empty() {
            fields.push("section");
        }
        if self.title.is_empty() {
            fields.push("title");
        }
        if self.abstract_text.is_empty() {
            fields.push("abstract");
        }
        if self.contents.is_empty() {
            fields.push("contents");
        }
        fields
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check("Article", self.invalid_fields())
    }
}

/// Software trouble report: a bug report or feature request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Str {
    pub id: i64,
    /// STR this one duplicates, or 0.
    pub master_id: i64,
    pub is_published: bool,
    pub status: Status,
    pub priority: Priority,
    pub scope: Scope,
    pub summary: String,
    pub subsystem: String,
    pub str_version: String,
    pub fix_version: String,
    pub fix_revision: i64,
    /// Developer the STR is assigned to; empty when unassigned.
    pub manager_user: String,
    pub create_date: i64,
    pub create_user: String,
    pub modify_date: i64,
    pub modify_user: String,
}

impl Default for Str {
    fn default() -> Self {
        Self {
            id: 0,
            master_id: 0,
            is_published: true,
            status: Status::New,
            priority: Priority::Moderate,
            scope: Scope::Machine,
            summary: String::new(),
            subsystem: String::new(),
            str_version: String::new(),
            fix_version: String::new(),
            fix_revision: 0,
            manager_user: String::new(),
            create_date: 0,
            create_user: String::new(),
            modify_date: 0,
            modify_user: String::new(),
        }
    }
}

impl Str {
    pub fn new(summary: &str, str_version: &str) -> Self {
        Self {
            summary: summary.to_string(),
            str_version: str_version.to_string(),
            ..Self::default()
        }
    }

    pub fn invalid_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.summary.is_empty() {
            fields.push("summary");
        }
        if self.str_version.is_empty() {
            fields.push("str_version");
        }
        fields
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check("STR", self.invalid_fields())
    }
}

/// One message in an STR's dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StrText {
    pub id: i64,
    pub str_id: i64,
    pub is_published: bool,
    pub contents: String,
    pub create_date: i64,
    pub create_user: String,
}

// ============================================================================
// Row Types
// ============================================================================

/// Row type for STR queries; codes are mapped onto the enums by
/// `into_str`.
#[derive(Debug, sqlx::FromRow)]
pub struct StrDbRow {
    pub id: i64,
    pub master_id: i64,
    pub is_published: bool,
    pub status: i64,
    pub priority: i64,
    pub scope: i64,
    pub summary: String,
    pub subsystem: String,
    pub str_version: String,
    pub fix_version: String,
    pub fix_revision: i64,
    pub manager_user: String,
    pub create_date: i64,
    pub create_user: String,
    pub modify_date: i64,
    pub modify_user: String,
}

impl StrDbRow {
    pub(crate) fn into_str(self) -> Str {
        let status = Status::from_code(self.status).unwrap_or_else(|| {
            tracing::warn!(id = self.id, code = self.status, "Unknown STR status, using New");
            Status::New
        });
        let priority = Priority::from_code(self.priority).unwrap_or_else(|| {
            tracing::warn!(id = self.id, code = self.priority, "Unknown STR priority, using Moderate");
            Priority::Moderate
        });
        let scope = Scope::from_code(self.scope).unwrap_or_else(|| {
            tracing::warn!(id = self.id, code = self.scope, "Unknown STR scope, using Machine");
            Scope::Machine
        });

        Str {
            id: self.id,
            master_id: self.master_id,
            is_published: self.is_published,
            status,
            priority,
            scope,
            summary: self.summary,
            subsystem: self.subsystem,
            str_version: self.str_version,
            fix_version: self.fix_version,
            fix_revision: self.fix_revision,
            manager_user: self.manager_user,
            create_date: self.create_date,
            create_user: self.create_user,
            modify_date: self.modify_date,
            modify_user: self.modify_user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_messages() {
        assert!(is_lock_message("error returned from database: database is locked"));
        assert!(is_lock_message("(code: 14) unable to open database file"));
        assert!(!is_lock_message("no such table: articles"));
    }

    #[test]
    fn test_article_validation_lists_empty_fields() {
        let article = Article::new("News", "", "short", "");
        let err = article.validate().unwrap_err();
        assert_eq!(err.fields, vec!["title", "contents"]);
        assert_eq!(
            err.to_string(),
            "Article is missing required fields: title, contents"
        );
        assert!(Article::new("News", "T", "A", "C").validate().is_ok());
    }

    #[test]
    fn test_str_validation() {
        assert_eq!(Str::default().invalid_fields(), vec!["summary", "str_version"]);
        assert!(Str::new("Crash on start", "1.2").validate().is_ok());
    }

    #[test]
    fn test_unsaved_records_have_zero_id() {
        assert_eq!(Article::new("a", "b", "c", "d").id, 0);
        assert_eq!(Str::new("a", "b").id, 0);
    }

    #[test]
    fn test_status_codes_and_closed_states() {
        for status in Status::ALL {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert!(Status::Resolved.is_closed());
        assert!(Status::Unresolved.is_closed());
        assert!(!Status::Active.is_closed());
        assert_eq!(Status::from_code(0), None);
    }

    #[test]
    fn test_enum_parse_accepts_codes_and_labels() {
        assert_eq!(Status::parse("pending"), Some(Status::Pending));
        assert_eq!(Status::parse("4"), Some(Status::Pending));
        assert_eq!(Priority::parse("rfe"), Some(Priority::Rfe));
        assert_eq!(Priority::parse(" 5 "), Some(Priority::Critical));
        assert_eq!(Scope::parse("os"), Some(Scope::OperatingSystem));
        assert_eq!(Scope::parse("9"), None);
        assert_eq!(Scope::parse("everywhere"), None);
    }

    #[test]
    fn test_row_with_unknown_codes_falls_back() {
        let row = StrDbRow {
            id: 1,
            master_id: 0,
            is_published: true,
            status: 42,
            priority: 0,
            scope: -1,
            summary: "s".to_string(),
            subsystem: String::new(),
            str_version: "1.0".to_string(),
            fix_version: String::new(),
            fix_revision: 0,
            manager_user: String::new(),
            create_date: 0,
            create_user: "u".to_string(),
            modify_date: 0,
            modify_user: "u".to_string(),
        };
        let str = row.into_str();
        assert_eq!(str.status, Status::New);
        assert_eq!(str.priority, Priority::Moderate);
        assert_eq!(str.scope, Scope::Machine);
    }
}
