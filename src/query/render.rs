use serde::Serialize;
use thiserror::Error;

use super::predicate::{CompareOp, Comparison, Predicate, Value};
use super::schema::{EntitySchema, Field};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The record kind has no column for this field.
    #[error("Unknown field '{field}'")]
    UnknownField { field: String },
}

/// A SQL boolean expression with `?` placeholders and its bound values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filter {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Filter {
    pub fn match_all() -> Self {
        Self {
            sql: "1 = 1".to_string(),
            params: Vec::new(),
        }
    }
}

/// Render a predicate against the columns of one record kind.
///
/// Literal values are never written into the SQL text; each becomes a
/// placeholder with its value appended to `params` in placeholder order.
pub fn render(predicate: &Predicate, schema: &EntitySchema) -> Result<Filter, QueryError> {
    let mut filter = Filter {
        sql: String::new(),
        params: Vec::new(),
    };
    render_into(predicate, schema, &mut filter)?;
    Ok(filter)
}

fn render_into(
    predicate: &Predicate,
    schema: &EntitySchema,
    out: &mut Filter,
) -> Result<(), QueryError> {
    match predicate {
        Predicate::All => out.sql.push_str("1 = 1"),
        Predicate::Nothing => out.sql.push_str("1 = 0"),
        Predicate::Compare(cmp) => render_comparison(cmp, schema, out)?,
        Predicate::And(l, r) => render_binary(l, "AND", r, schema, out)?,
        Predicate::Or(l, r) => render_binary(l, "OR", r, schema, out)?,
        Predicate::Not(inner) => {
            out.sql.push_str("NOT (");
            render_into(inner, schema, out)?;
            out.sql.push(')');
        }
    }
    Ok(())
}

fn render_binary(
    left: &Predicate,
    op: &str,
    right: &Predicate,
    schema: &EntitySchema,
    out: &mut Filter,
) -> Result<(), QueryError> {
    out.sql.push('(');
    render_into(left, schema, out)?;
    out.sql.push(' ');
    out.sql.push_str(op);
    out.sql.push(' ');
    render_into(right, schema, out)?;
    out.sql.push(')');
    Ok(())
}

fn render_comparison(
    cmp: &Comparison,
    schema: &EntitySchema,
    out: &mut Filter,
) -> Result<(), QueryError> {
    let column = column_for(cmp.field, schema)?;
    out.sql.push_str(column);

    let op = match cmp.op {
        CompareOp::Eq => " = ?",
        CompareOp::Ne => " <> ?",
        CompareOp::Le => " <= ?",
        CompareOp::Ge => " >= ?",
        CompareOp::Contains => {
            out.sql.push_str(" LIKE ? ESCAPE '\\'");
            let text = match &cmp.value {
                Value::Int(v) => v.to_string(),
                Value::Text(s) => escape_like(s),
            };
            out.params.push(Value::Text(format!("%{}%", text)));
            return Ok(());
        }
    };
    out.sql.push_str(op);

    // Search words are lower-cased, stored names may not be.
    if matches!(cmp.value, Value::Text(_)) && matches!(cmp.op, CompareOp::Eq | CompareOp::Ne) {
        out.sql.push_str(" COLLATE NOCASE");
    }
    out.params.push(cmp.value.clone());
    Ok(())
}

fn column_for(field: Field, schema: &EntitySchema) -> Result<&'static str, QueryError> {
    schema.column(field).ok_or_else(|| {
        tracing::debug!(field = %field, kind = schema.kind, "Field has no column");
        QueryError::UnknownField {
            field: field.name().to_string(),
        }
    })
}

/// Escape LIKE wildcards so user text matches literally.
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ============================================================================
// Ordering
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: Field,
    pub descending: bool,
}

/// Parse an order specification such as `"-status -priority +id"`.
///
/// `+` (or no sign) sorts ascending, `-` descending. Names must be fields
/// the record kind stores.
pub fn parse_order(spec: &str, schema: &EntitySchema) -> Result<Vec<OrderTerm>, QueryError> {
    spec.split_whitespace()
        .map(|part| {
            let (name, descending) = if let Some(name) = part.strip_prefix('-') {
                (name, true)
            } else if let Some(name) = part.strip_prefix('+') {
                (name, false)
            } else {
                (part, false)
            };
            let field = Field::from_name(name)
                .filter(|f| schema.supports(*f))
                .ok_or_else(|| QueryError::UnknownField {
                    field: name.to_string(),
                })?;
            Ok(OrderTerm { field, descending })
        })
        .collect()
}

/// Render ` ORDER BY ...`, always ending with `id` so paging is stable.
pub fn render_order(terms: &[OrderTerm], schema: &EntitySchema) -> Result<String, QueryError> {
    let mut sql = String::from(" ORDER BY ");
    for term in terms {
        sql.push_str(column_for(term.field, schema)?);
        if term.descending {
            sql.push_str(" DESC");
        }
        sql.push_str(", ");
    }
    sql.push_str("id");
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::predicate::build;
    use crate::query::schema::{ARTICLE_SCHEMA, STR_SCHEMA};
    use crate::query::token::tokenize;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn translate(q: &str) -> Filter {
        render(&build(&tokenize(q), &ARTICLE_SCHEMA), &ARTICLE_SCHEMA).unwrap()
    }

    #[test]
    fn test_match_all_and_nothing() {
        assert_eq!(translate("").sql, "1 = 1");
        assert_eq!(translate("number:abc").sql, "1 = 0");
        assert!(translate("").params.is_empty());
    }

    #[test]
    fn test_exact_comparison() {
        let filter = translate("creator:jane");
        assert_eq!(filter.sql, "create_user = ? COLLATE NOCASE");
        assert_eq!(filter.params, vec![text("jane")]);
    }

    #[test]
    fn test_integer_comparison() {
        let filter = translate("number:7");
        assert_eq!(filter.sql, "id = ?");
        assert_eq!(filter.params, vec![Value::Int(7)]);
    }

    #[test]
    fn test_word_group() {
        let filter = translate("snmp");
        assert_eq!(
            filter.sql,
            "((title LIKE ? ESCAPE '\\' OR abstract LIKE ? ESCAPE '\\') OR contents LIKE ? ESCAPE '\\')"
        );
        assert_eq!(filter.params, vec![text("%snmp%"); 3]);
    }

    #[test]
    fn test_and_not() {
        let filter = translate("title:a and not title:b");
        assert_eq!(
            filter.sql,
            "(title LIKE ? ESCAPE '\\' AND NOT (title LIKE ? ESCAPE '\\'))"
        );
        assert_eq!(filter.params, vec![text("%a%"), text("%b%")]);
    }

    #[test]
    fn test_params_follow_input_order() {
        let filter = translate("creator:x or title:y and number:3");
        assert_eq!(filter.params, vec![text("x"), text("%y%"), Value::Int(3)]);
        assert_eq!(
            filter.sql,
            "((create_user = ? COLLATE NOCASE OR title LIKE ? ESCAPE '\\') AND id = ?)"
        );
    }

    #[test]
    fn test_injection_attempt_is_bound() {
        let filter = translate("\"'; DROP TABLE articles; --\"");
        assert!(!filter.sql.contains("DROP"));
        assert_eq!(filter.params[0], text("%'; DROP TABLE articles; --%"));
    }

    #[test]
    fn test_like_wildcards_are_escaped() {
        let filter = translate("title:100%_done");
        assert_eq!(filter.params, vec![text("%100\\%\\_done%")]);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let p = Predicate::equals(Field::Developer, "mike");
        assert_eq!(
            render(&p, &ARTICLE_SCHEMA),
            Err(QueryError::UnknownField {
                field: "developer".to_string()
            })
        );
        assert!(render(&p, &STR_SCHEMA).is_ok());
    }

    #[test]
    fn test_other_operators() {
        let p = Predicate::compare(Field::Status, CompareOp::Le, 2)
            .and(Predicate::compare(Field::Priority, CompareOp::Ge, 4))
            .and(Predicate::compare(Field::Developer, CompareOp::Ne, ""));
        let filter = render(&p, &STR_SCHEMA).unwrap();
        assert_eq!(
            filter.sql,
            "((status <= ? AND priority >= ?) AND manager_user <> ? COLLATE NOCASE)"
        );
        assert_eq!(filter.params, vec![Value::Int(2), Value::Int(4), text("")]);
    }

    #[test]
    fn test_render_is_stable() {
        let q = "1.2 and not feature creator:jane \"weekly snapshot\"";
        assert_eq!(translate(q), translate(q));
    }

    #[test]
    fn test_parse_order() {
        let terms = parse_order("-status -priority scope", &STR_SCHEMA).unwrap();
        assert_eq!(
            terms,
            vec![
                OrderTerm {
                    field: Field::Status,
                    descending: true
                },
                OrderTerm {
                    field: Field::Priority,
                    descending: true
                },
                OrderTerm {
                    field: Field::Scope,
                    descending: false
                },
            ]
        );
        assert_eq!(
            render_order(&terms, &STR_SCHEMA).unwrap(),
            " ORDER BY status DESC, priority DESC, scope, id"
        );
    }

    #[test]
    fn test_parse_order_rejects_unknown_field() {
        assert_eq!(
            parse_order("-status", &ARTICLE_SCHEMA),
            Err(QueryError::UnknownField {
                field: "status".to_string()
            })
        );
        assert!(parse_order("+password", &ARTICLE_SCHEMA).is_err());
    }

    #[test]
    fn test_empty_order_sorts_by_id() {
        let terms = parse_order("   ", &ARTICLE_SCHEMA).unwrap();
        assert!(terms.is_empty());
        assert_eq!(
            render_order(&terms, &ARTICLE_SCHEMA).unwrap(),
            " ORDER BY id"
        );
    }

    proptest! {
        #[test]
        fn prop_placeholders_match_params(input in ".{0,64}") {
            let filter = translate(&input);
            prop_assert_eq!(filter.sql.matches('?').count(), filter.params.len());
        }

        #[test]
        fn prop_user_text_never_reaches_sql(word in "[a-z]{12,16}") {
            let filter = translate(&word);
            prop_assert!(!filter.sql.contains(&word));
        }
    }
}
