//! Logical record fields and the per-kind column maps behind them.
//!
//! Predicates name [`Field`]s, never columns. An [`EntitySchema`] decides
//! which fields a record kind has and which SQL expression stores each one,
//! so the same query text can run against articles or trouble reports.

use std::fmt;

/// A searchable or sortable attribute of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Creator,
    Title,
    Abstract,
    Body,
    Section,
    Published,
    Status,
    Priority,
    Scope,
    Developer,
    Subsystem,
    Version,
    FixVersion,
    Created,
    Modified,
}

impl Field {
    const ALL: [Field; 16] = [
        Field::Id,
        Field::Creator,
        Field::Title,
        Field::Abstract,
        Field::Body,
        Field::Section,
        Field::Published,
        Field::Status,
        Field::Priority,
        Field::Scope,
        Field::Developer,
        Field::Subsystem,
        Field::Version,
        Field::FixVersion,
        Field::Created,
        Field::Modified,
    ];

    /// Name used in order specifications and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Creator => "creator",
            Field::Title => "title",
            Field::Abstract => "abstract",
            Field::Body => "body",
            Field::Section => "section",
            Field::Published => "published",
            Field::Status => "status",
            Field::Priority => "priority",
            Field::Scope => "scope",
            Field::Developer => "developer",
            Field::Subsystem => "subsystem",
            Field::Version => "version",
            Field::FixVersion => "fixversion",
            Field::Created => "created",
            Field::Modified => "modified",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Map a search prefix (the part before `:`) to its field.
    ///
    /// Only a subset of fields can be addressed from the search box; `number`
    /// is the user-facing spelling of `id`.
    pub fn from_prefix(prefix: &str) -> Option<Field> {
        match prefix {
            "creator" => Some(Field::Creator),
            "number" => Some(Field::Id),
            "title" => Some(Field::Title),
            "developer" => Some(Field::Developer),
            "fixversion" => Some(Field::FixVersion),
            "subsystem" => Some(Field::Subsystem),
            "version" => Some(Field::Version),
            _ => None,
        }
    }

    /// Inverse of [`Field::from_prefix`].
    pub fn prefix(self) -> &'static str {
        match self {
            Field::Id => "number",
            other => other.name(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column layout of one record kind.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: &'static str,
    pub table: &'static str,
    columns: &'static [(Field, &'static str)],
    word_fields: &'static [Field],
}

impl EntitySchema {
    /// SQL expression for `field`, if this kind stores it.
    pub fn column(&self, field: Field) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, column)| *column)
    }

    pub fn supports(&self, field: Field) -> bool {
        self.column(field).is_some()
    }

    /// Fields a bare search word is matched against, in match order.
    pub fn word_fields(&self) -> &'static [Field] {
        self.word_fields
    }
}

pub static ARTICLE_SCHEMA: EntitySchema = EntitySchema {
    kind: "article",
    table: "articles",
    columns: &[
        (Field::Id, "id"),
        (Field::Creator, "create_user"),
        (Field::Title, "title"),
        (Field::Abstract, "abstract"),
        (Field::Body, "contents"),
        (Field::Section, "section"),
        (Field::Published, "is_published"),
        (Field::Created, "create_date"),
        (Field::Modified, "modify_date"),
    ],
    word_fields: &[Field::Title, Field::Abstract, Field::Body],
};

/// STRs have no body column; their body is the published dialog text,
/// empty (never NULL) when nothing is published so negated words still match.
pub static STR_SCHEMA: EntitySchema = EntitySchema {
    kind: "STR",
    table: "strs",
    columns: &[
        (Field::Id, "id"),
        (Field::Creator, "create_user"),
        (Field::Title, "summary"),
        (
            Field::Body,
            "COALESCE((SELECT group_concat(t.contents, ' ') FROM str_texts t \
             WHERE t.str_id = strs.id AND t.is_published = 1), '')",
        ),
        (Field::Published, "is_published"),
        (Field::Status, "status"),
        (Field::Priority, "priority"),
        (Field::Scope, "scope"),
        (Field::Developer, "manager_user"),
        (Field::Subsystem, "subsystem"),
        (Field::Version, "str_version"),
        (Field::FixVersion, "fix_version"),
        (Field::Created, "create_date"),
        (Field::Modified, "modify_date"),
    ],
    word_fields: &[Field::Title, Field::Subsystem, Field::Version, Field::Body],
};
