//! Search query translation.
//!
//! A search string goes through three pure stages:
//!
//! 1. [`tokenize`] splits it into words, phrases, keywords and field filters
//! 2. [`build`] folds the tokens left to right into a [`Predicate`]
//! 3. [`render`] turns the predicate into SQL with bound parameters
//!
//! ```
//! use bugdesk::query::{self, ARTICLE_SCHEMA};
//!
//! let (tokens, predicate) = query::translate("snmp and not creator:jane", &ARTICLE_SCHEMA);
//! assert_eq!(tokens.len(), 4);
//! let filter = query::render(&predicate, &ARTICLE_SCHEMA).unwrap();
//! assert_eq!(filter.params.len(), 4);
//! ```

mod predicate;
mod render;
mod schema;
mod token;

pub use predicate::{build, CompareOp, Comparison, Predicate, Value};
pub use render::{parse_order, render, render_order, Filter, OrderTerm, QueryError};
pub use schema::{EntitySchema, Field, ARTICLE_SCHEMA, STR_SCHEMA};
pub use token::{tokenize, Token};

/// Longest search string considered; the rest is dropped.
pub const MAX_QUERY_LENGTH: usize = 256;

/// Tokenize and build in one step, capping the input length first.
pub fn translate(input: &str, schema: &EntitySchema) -> (Vec<Token>, Predicate) {
    let input = clamp_query(input);
    let tokens = tokenize(input);
    let predicate = build(&tokens, schema);
    tracing::debug!(
        kind = schema.kind,
        tokens = tokens.len(),
        "Translated search query"
    );
    (tokens, predicate)
}

fn clamp_query(input: &str) -> &str {
    if input.len() <= MAX_QUERY_LENGTH {
        return input;
    }
    let mut end = MAX_QUERY_LENGTH;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    tracing::debug!(
        len = input.len(),
        max = MAX_QUERY_LENGTH,
        "Search query truncated"
    );
    &input[..end]
}
