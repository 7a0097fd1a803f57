use serde::Serialize;

use super::schema::{EntitySchema, Field};
use super::token::Token;

/// A literal compared against a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Le,
    Ge,
    /// Substring match.
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub field: Field,
    pub op: CompareOp,
    pub value: Value,
}

/// Boolean filter over records of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    All,
    Nothing,
    Compare(Comparison),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(field: Field, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare(Comparison {
            field,
            op,
            value: value.into(),
        })
    }

    pub fn equals(field: Field, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn contains(field: Field, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Contains, value)
    }

    /// Conjunction; `All` is the identity so filters can be stacked freely.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (l, r) => Predicate::And(Box::new(l), Box::new(r)),
        }
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joiner {
    And,
    Or,
}

/// Single-pass, left-to-right builder.
///
/// Two flags carry state between tokens: the joiner for the next term and a
/// pending negation. Both reset after every term. There is no precedence:
/// `a or b and c` is `((a or b) and c)`.
struct Builder<'a> {
    schema: &'a EntitySchema,
    acc: Option<Predicate>,
    joiner: Joiner,
    negate: bool,
}

impl<'a> Builder<'a> {
    fn new(schema: &'a EntitySchema) -> Self {
        Self {
            schema,
            acc: None,
            joiner: Joiner::Or,
            negate: false,
        }
    }

    fn push(&mut self, token: &Token) {
        match token {
            Token::Or => self.joiner = Joiner::Or,
            Token::And => self.joiner = Joiner::And,
            Token::Not => self.negate = true,
            Token::Field { field, value } if self.schema.supports(*field) => {
                let term = field_term(*field, value);
                self.push_term(term);
            }
            Token::Field { field, value } => {
                let word = format!("{}:{}", field.prefix(), value);
                let term = self.word_term(&word);
                self.push_term(term);
            }
            Token::Word(word) => {
                let term = self.word_term(word);
                self.push_term(term);
            }
        }
    }

    fn push_term(&mut self, term: Predicate) {
        let term = if self.negate { term.negate() } else { term };

        self.acc = Some(match self.acc.take() {
            None => term,
            Some(acc) => match self.joiner {
                Joiner::And => Predicate::And(Box::new(acc), Box::new(term)),
                Joiner::Or => acc.or(term),
            },
        });

        self.joiner = Joiner::Or;
        self.negate = false;
    }

    /// `id = word` (digits only) or any word field containing `word`.
    fn word_term(&self, word: &str) -> Predicate {
        let mut group: Option<Predicate> = None;

        if is_all_digits(word) {
            if let Ok(id) = word.parse::<i64>() {
                group = Some(Predicate::equals(Field::Id, id));
            }
        }

        for field in self.schema.word_fields() {
            let term = Predicate::contains(*field, word);
            group = Some(match group {
                None => term,
                Some(g) => g.or(term),
            });
        }

        group.unwrap_or(Predicate::Nothing)
    }

    fn finish(self) -> Predicate {
        self.acc.unwrap_or(Predicate::All)
    }
}

fn field_term(field: Field, value: &str) -> Predicate {
    match field {
        Field::Id => match value.parse::<i64>() {
            Ok(id) => Predicate::equals(Field::Id, id),
            Err(_) => Predicate::Nothing,
        },
        Field::Creator | Field::Developer => Predicate::equals(field, value),
        _ => Predicate::contains(field, value),
    }
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Build a predicate from a token sequence.
///
/// An empty sequence (or one made only of keywords) matches everything.
pub fn build(tokens: &[Token], schema: &EntitySchema) -> Predicate {
    let mut builder = Builder::new(schema);
    for token in tokens {
        builder.push(token);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::schema::{ARTICLE_SCHEMA, STR_SCHEMA};
    use crate::query::token::tokenize;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    fn article_word(w: &str) -> Predicate {
        Predicate::contains(Field::Title, w)
            .or(Predicate::contains(Field::Abstract, w))
            .or(Predicate::contains(Field::Body, w))
    }

    #[test]
    fn test_empty_matches_all() {
        assert_eq!(build(&[], &ARTICLE_SCHEMA), Predicate::All);
    }

    #[test]
    fn test_only_keywords_matches_all() {
        assert_eq!(
            build(&[Token::And, Token::Not], &ARTICLE_SCHEMA),
            Predicate::All
        );
    }

    #[test]
    fn test_creator_filter() {
        let tokens = [Token::Field {
            field: Field::Creator,
            value: "jane".to_string(),
        }];
        assert_eq!(
            build(&tokens, &ARTICLE_SCHEMA),
            Predicate::equals(Field::Creator, "jane")
        );
    }

    #[test]
    fn test_and_not_sequence() {
        let tokens = [word("1.2"), Token::And, Token::Not, word("feature")];
        assert_eq!(
            build(&tokens, &ARTICLE_SCHEMA),
            Predicate::And(
                Box::new(article_word("1.2")),
                Box::new(article_word("feature").negate())
            )
        );
    }

    #[test]
    fn test_non_numeric_number_matches_nothing() {
        let tokens = [Token::Field {
            field: Field::Id,
            value: "abc".to_string(),
        }];
        assert_eq!(build(&tokens, &ARTICLE_SCHEMA), Predicate::Nothing);
    }

    #[test]
    fn test_number_filter() {
        let tokens = tokenize("number:17");
        assert_eq!(build(&tokens, &ARTICLE_SCHEMA), Predicate::equals(Field::Id, 17));
    }

    #[test]
    fn test_title_filter_is_substring() {
        let tokens = tokenize("title:snapshot");
        assert_eq!(
            build(&tokens, &ARTICLE_SCHEMA),
            Predicate::contains(Field::Title, "snapshot")
        );
    }

    #[test]
    fn test_digit_word_also_matches_id() {
        let expected = Predicate::equals(Field::Id, 42)
            .or(Predicate::contains(Field::Title, "42"))
            .or(Predicate::contains(Field::Abstract, "42"))
            .or(Predicate::contains(Field::Body, "42"));
        assert_eq!(build(&tokenize("42"), &ARTICLE_SCHEMA), expected);
    }

    #[test]
    fn test_huge_digit_word_skips_id() {
        let w = "99999999999999999999999";
        assert_eq!(build(&tokenize(w), &ARTICLE_SCHEMA), article_word(w));
    }

    #[test]
    fn test_plain_words_form_left_nested_or_chain() {
        let expected = article_word("snmp")
            .or(article_word("network"))
            .or(article_word("printer"));
        assert_eq!(
            build(&tokenize("snmp network printer"), &ARTICLE_SCHEMA),
            expected
        );
    }

    #[test]
    fn test_joiner_resets_after_each_term() {
        let expected = Predicate::And(Box::new(article_word("a")), Box::new(article_word("b")))
            .or(article_word("c"));
        assert_eq!(build(&tokenize("a and b c"), &ARTICLE_SCHEMA), expected);
    }

    #[test]
    fn test_no_precedence_reordering() {
        let expected = Predicate::And(
            Box::new(article_word("a").or(article_word("b"))),
            Box::new(article_word("c")),
        );
        assert_eq!(build(&tokenize("a or b and c"), &ARTICLE_SCHEMA), expected);
    }

    #[test]
    fn test_not_applies_to_one_term() {
        let expected = article_word("a").negate().or(article_word("b"));
        assert_eq!(build(&tokenize("not a b"), &ARTICLE_SCHEMA), expected);
    }

    #[test]
    fn test_field_not_in_schema_becomes_word() {
        // Articles have no developer; the token is searched as text instead.
        let expected = article_word("developer:mike");
        assert_eq!(
            build(&tokenize("developer:mike"), &ARTICLE_SCHEMA),
            expected
        );
    }

    #[test]
    fn test_str_word_fields() {
        let expected = Predicate::contains(Field::Title, "crash")
            .or(Predicate::contains(Field::Subsystem, "crash"))
            .or(Predicate::contains(Field::Version, "crash"))
            .or(Predicate::contains(Field::Body, "crash"));
        assert_eq!(build(&tokenize("crash"), &STR_SCHEMA), expected);
    }

    #[test]
    fn test_str_developer_filter() {
        assert_eq!(
            build(&tokenize("developer:Mike"), &STR_SCHEMA),
            Predicate::equals(Field::Developer, "mike")
        );
    }

    #[test]
    fn test_and_with_all_is_identity() {
        let p = Predicate::equals(Field::Id, 1);
        assert_eq!(Predicate::All.and(p.clone()), p);
        assert_eq!(p.clone().and(Predicate::All), p);
    }

    proptest! {
        #[test]
        fn prop_build_is_deterministic(input in ".{0,48}") {
            let tokens = tokenize(&input);
            prop_assert_eq!(build(&tokens, &ARTICLE_SCHEMA), build(&tokens, &ARTICLE_SCHEMA));
        }

        #[test]
        fn prop_plain_words_are_or_chain(words in proptest::collection::vec("[a-z]{4,8}", 1..6)) {
            let tokens: Vec<Token> = words.iter().map(|w| Token::Word(w.clone())).collect();
            let mut expected: Option<Predicate> = None;
            for w in &words {
                let group = article_word(w);
                expected = Some(match expected {
                    None => group,
                    Some(e) => e.or(group),
                });
            }
            prop_assert_eq!(build(&tokens, &ARTICLE_SCHEMA), expected.unwrap());
        }
    }
}
