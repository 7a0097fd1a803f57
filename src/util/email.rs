use thiserror::Error;

/// Longest address accepted (RFC 5321 path limit).
const MAX_EMAIL_LENGTH: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmailError {
    #[error("Email address is empty")]
    Empty,
    #[error("Email address is too long (max 254 characters)")]
    TooLong,
    #[error("Invalid email address: {0}")]
    Malformed(String),
}

/// Validate an address for the STR notification list.
///
/// Deliberately loose: one `@`, a non-empty local part, a dotted domain
/// and no whitespace or control characters. Returns the trimmed address.
///
/// ```
/// use bugdesk::util::validate_email;
///
/// assert_eq!(validate_email(" jane@example.com ").unwrap(), "jane@example.com");
/// assert!(validate_email("jane@localhost").is_err());
/// assert!(validate_email("not an address").is_err());
/// ```
pub fn validate_email(email: &str) -> Result<String, EmailError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(EmailError::Empty);
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(EmailError::TooLong);
    }

    let malformed = || EmailError::Malformed(email.to_string());

    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(malformed());
    }

    let (local, domain) = email.split_once('@').ok_or_else(malformed)?;
    if local.is_empty() || domain.contains('@') {
        return Err(malformed());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(malformed());
    }
    if !labels
        .iter()
        .all(|l| l.chars().all(|c| c.is_alphanumeric() || c == '-'))
    {
        return Err(malformed());
    }

    Ok(email.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        for email in [
            "a@example.com",
            "first.last+str@mail.example.org",
            "dev-team@xn--bcher-kva.example",
        ] {
            assert_eq!(validate_email(email).as_deref(), Ok(email));
        }
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(validate_email(""), Err(EmailError::Empty));
        assert_eq!(validate_email("   "), Err(EmailError::Empty));
        assert!(matches!(
            validate_email("a b@example.com"),
            Err(EmailError::Malformed(_))
        ));
    }

    #[test]
    fn test_structure_errors() {
        for email in [
            "no-at-sign",
            "@example.com",
            "a@@example.com",
            "a@b@example.com",
            "a@example",
            "a@example..com",
            "a@.example.com",
            "a@exa_mple.com",
        ] {
            assert!(validate_email(email).is_err(), "accepted {email}");
        }
    }

    #[test]
    fn test_too_long() {
        let email = format!("{}@example.com", "a".repeat(250));
        assert_eq!(validate_email(&email), Err(EmailError::TooLong));
    }
}
