//! Trouble reports (STRs) and articles backed by SQLite, searched with a
//! small boolean query language.

pub mod config;
pub mod pages;
pub mod query;
pub mod storage;
pub mod util;
