use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::paging::{clamp_page_max, DEFAULT_PAGE_MAX};
use super::PageError;
use crate::query::{Field, Predicate};

/// Privilege of the caller, lowest first.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    #[default]
    Anonymous,
    User,
    Devel,
    Admin,
}

/// Who is asking and what they submitted.
///
/// `params` holds form fields by name. An empty `user` is anonymous no
/// matter what `level` says.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: String,
    pub level: AuthLevel,
    pub params: HashMap<String, String>,
    pub page_max: i64,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            user: String::new(),
            level: AuthLevel::Anonymous,
            params: HashMap::new(),
            page_max: DEFAULT_PAGE_MAX,
        }
    }

    pub fn new(user: &str, level: AuthLevel) -> Self {
        let user = user.trim();
        let level = if user.is_empty() {
            AuthLevel::Anonymous
        } else {
            level.max(AuthLevel::User)
        };
        Self {
            user: user.to_string(),
            level,
            ..Self::anonymous()
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_page_max(mut self, page_max: i64) -> Self {
        self.page_max = clamp_page_max(page_max);
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Form value with surrounding whitespace removed; absent and blank are
    /// both `None`.
    pub fn param_trimmed(&self, key: &str) -> Option<&str> {
        self.param(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.param_trimmed(key).and_then(|v| v.parse().ok())
    }

    /// HTML-style checkbox: present and not `0`/`false`/`off`.
    pub fn param_flag(&self, key: &str) -> Option<bool> {
        self.param_trimmed(key)
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no"))
    }

    pub fn is_logged_in(&self) -> bool {
        !self.user.is_empty() && self.level >= AuthLevel::User
    }

    pub fn is_devel(&self) -> bool {
        self.is_logged_in() && self.level >= AuthLevel::Devel
    }

    pub fn is_admin(&self) -> bool {
        self.is_logged_in() && self.level >= AuthLevel::Admin
    }

    pub fn require_login(&self) -> Result<(), PageError> {
        if self.is_logged_in() {
            Ok(())
        } else {
            Err(PageError::LoginRequired)
        }
    }

    pub fn require_devel(&self, action: &str) -> Result<(), PageError> {
        self.require_login()?;
        if self.is_devel() {
            Ok(())
        } else {
            Err(PageError::Forbidden(format!(
                "{} is not available to you",
                action
            )))
        }
    }

    /// Records this caller may see: everything for developers, otherwise
    /// published records plus the caller's own.
    pub fn visibility(&self) -> Predicate {
        if self.is_devel() {
            return Predicate::All;
        }
        let published = Predicate::equals(Field::Published, 1);
        if self.is_logged_in() {
            published.or(Predicate::equals(Field::Creator, self.user.as_str()))
        } else {
            published
        }
    }

    /// Same rule as [`RequestContext::visibility`] for an already loaded record.
    pub fn can_see(&self, is_published: bool, create_user: &str) -> bool {
        is_published
            || self.is_devel()
            || (self.is_logged_in() && create_user.eq_ignore_ascii_case(&self.user))
    }
}
