use std::fmt;

use super::schema::Field;

/// One unit of a search string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    And,
    Or,
    Not,
    /// `prefix:value` with a recognized prefix.
    Field { field: Field, value: String },
    /// A plain word or a quoted phrase.
    Word(String),
}

impl Token {
    /// Classify an unquoted, already lower-cased word.
    fn classify(word: String) -> Token {
        match word.as_str() {
            "and" => return Token::And,
            "or" => return Token::Or,
            "not" => return Token::Not,
            _ => {}
        }

        if let Some((prefix, value)) = word.split_once(':') {
            if !value.is_empty() {
                if let Some(field) = Field::from_prefix(prefix) {
                    return Token::Field {
                        field,
                        value: value.to_string(),
                    };
                }
            }
        }

        Token::Word(word)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Not => f.write_str("not"),
            Token::Field { field, value } => write!(f, "{}:{}", field.prefix(), value),
            Token::Word(word) if needs_quotes(word) => write!(f, "\"{}\"", word),
            Token::Word(word) => f.write_str(word),
        }
    }
}

/// A word prints bare only if tokenizing the bare text gives it back.
fn needs_quotes(word: &str) -> bool {
    !matches!(tokenize(word).as_slice(), [Token::Word(w)] if w == word)
}

/// Split a search string into tokens.
///
/// Whitespace separates words; a double quote starts a phrase that runs to
/// the next quote (or the end of input) and is kept verbatim as one word.
/// Everything outside quotes is lower-cased before classification, so `AND`
/// and `and` are the same keyword. Never fails.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                flush_word(&mut word, &mut tokens);

                let mut phrase = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(c);
                }

                if !closed {
                    tracing::debug!(phrase = %phrase, "Unterminated quote in search query");
                }
                if !phrase.is_empty() {
                    tokens.push(Token::Word(phrase));
                }
            }
            ' ' | '\t' | '\r' | '\n' => flush_word(&mut word, &mut tokens),
            _ => word.push(c),
        }
    }
    flush_word(&mut word, &mut tokens);

    tokens
}

fn flush_word(word: &mut String, tokens: &mut Vec<Token>) {
    if word.is_empty() {
        return;
    }
    let lowered = std::mem::take(word).to_lowercase();
    tokens.push(Token::classify(lowered));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  \t\n ").is_empty());
    }

    #[test]
    fn test_phrase_is_one_token() {
        assert_eq!(tokenize("\"a b\" c"), vec![word("a b"), word("c")]);
    }

    #[test]
    fn test_phrase_keeps_case_and_keywords() {
        assert_eq!(
            tokenize("\"Weekly AND Snapshot\""),
            vec![word("Weekly AND Snapshot")]
        );
    }

    #[test]
    fn test_quote_flushes_pending_word() {
        assert_eq!(tokenize("foo\"bar baz\""), vec![word("foo"), word("bar baz")]);
    }

    #[test]
    fn test_unterminated_quote_runs_to_end() {
        assert_eq!(tokenize("x \"open ended"), vec![word("x"), word("open ended")]);
    }

    #[test]
    fn test_empty_phrase_is_dropped() {
        assert_eq!(tokenize("a \"\" b"), vec![word("a"), word("b")]);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(tokenize("AND"), tokenize("and"));
        assert_eq!(tokenize("Or NOT"), vec![Token::Or, Token::Not]);
    }

    #[test]
    fn test_words_are_lowercased() {
        assert_eq!(tokenize("SNMP Network"), vec![word("snmp"), word("network")]);
    }

    #[test]
    fn test_field_prefixes() {
        assert_eq!(
            tokenize("Creator:Jane number:42 title:printing"),
            vec![
                Token::Field {
                    field: Field::Creator,
                    value: "jane".to_string()
                },
                Token::Field {
                    field: Field::Id,
                    value: "42".to_string()
                },
                Token::Field {
                    field: Field::Title,
                    value: "printing".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_unknown_prefix_stays_a_word() {
        assert_eq!(tokenize("color:red"), vec![word("color:red")]);
    }

    #[test]
    fn test_prefix_without_value_stays_a_word() {
        assert_eq!(tokenize("creator:"), vec![word("creator:")]);
    }

    #[test]
    fn test_display_round_trips_through_tokenize() {
        let tokens = tokenize("1.2 and not \"weekly snapshot\" creator:jane");
        let text = tokens
            .iter()
            .map(Token::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(text, "1.2 and not \"weekly snapshot\" creator:jane");
        assert_eq!(tokenize(&text), tokens);
    }

    #[test]
    fn test_display_quotes_words_that_would_change() {
        for phrase in ["and", "creator:x", "Foo", "number:7"] {
            let token = word(phrase);
            let text = token.to_string();
            assert_eq!(text, format!("\"{}\"", phrase));
            assert_eq!(tokenize(&text), vec![token]);
        }
        assert_eq!(word("snmp").to_string(), "snmp");
        assert_eq!(word("color:red").to_string(), "color:red");
    }

    proptest! {
        #[test]
        fn prop_never_yields_empty_words(input in ".{0,64}") {
            for token in tokenize(&input) {
                if let Token::Word(w) = token {
                    prop_assert!(!w.is_empty());
                }
            }
        }

        #[test]
        fn prop_case_does_not_matter_outside_quotes(input in "[a-zA-Z: ]{0,40}") {
            prop_assert_eq!(tokenize(&input), tokenize(&input.to_uppercase()));
        }

        #[test]
        fn prop_plain_words_survive(words in proptest::collection::vec("[a-z0-9.]{1,8}", 0..8)) {
            let expected: Vec<Token> = words
                .iter()
                .filter(|w| !matches!(w.as_str(), "and" | "or" | "not"))
                .map(|w| Token::Word(w.clone()))
                .collect();
            let filtered: Vec<&String> = words
                .iter()
                .filter(|w| !matches!(w.as_str(), "and" | "or" | "not"))
                .collect();
            let joined = filtered.iter().map(|w| w.as_str()).collect::<Vec<_>>().join(" ");
            prop_assert_eq!(tokenize(&joined), expected);
        }
    }
}
