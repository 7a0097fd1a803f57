mod articles;
mod schema;
mod search;
mod strs;
mod types;

pub use schema::Database;
pub use search::{Record, Repository, MAX_RESULTS};
pub use strs::Subscription;
pub use types::{
    Article, DatabaseError, Priority, Scope, Status, Str, StrDbRow, StrText, ValidationError,
};
