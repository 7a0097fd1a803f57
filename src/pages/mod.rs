//! Request handlers for the article and trouble report pages.
//!
//! Each handler takes the database and an explicit [`RequestContext`]
//! (caller, privilege, form fields) and returns typed data for the caller
//! to present.

mod articles;
mod context;
mod paging;
mod strs;

use thiserror::Error;

pub use articles::{delete_article, list_articles, show_article, submit_article};
pub use context::{AuthLevel, RequestContext};
pub use paging::{clamp_page_max, Page, PageWindow, DEFAULT_PAGE_MAX};
pub use strs::{
    batch_update, canned_message, list_strs, post_text, set_notification, set_text_published,
    show_str, submit_str, BatchOutcome, StatusFilter, StrDetail, StrListing, CANNED_MESSAGES,
};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("{kind} #{id} was not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("You must log in first")]
    LoginRequired,

    #[error("{0}")]
    Forbidden(String),

    #[error("STR #{0} is closed and cannot be updated")]
    Closed(i64),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<crate::query::QueryError> for PageError {
    fn from(err: crate::query::QueryError) -> Self {
        PageError::BadRequest(err.to_string())
    }
}

impl From<crate::storage::ValidationError> for PageError {
    fn from(err: crate::storage::ValidationError) -> Self {
        PageError::BadRequest(err.to_string())
    }
}
