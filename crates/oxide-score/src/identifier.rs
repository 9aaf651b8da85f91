//! Identifier grammar and name shortening.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ErrorKind, Result, ScoreError};

/// Maximum length of any identifier that reaches the database.
pub const MAX_IDENTIFIER_LENGTH: usize = 30;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][0-9a-zA-Z_]*$").expect("Invalid identifier regex")
});

/// Returns whether `name` is a syntactically valid identifier.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LENGTH && IDENTIFIER.is_match(name)
}

/// Validates an element name declared inside `grain`.
pub fn check_identifier(grain: &str, name: &str) -> Result<()> {
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ScoreError::element(
            ErrorKind::IllegalIdentifier,
            grain,
            name,
            format!(
                "Identifier '{name}' is longer than {MAX_IDENTIFIER_LENGTH} characters."
            ),
        ));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(ScoreError::element(
            ErrorKind::IllegalIdentifier,
            grain,
            name,
            format!("Invalid identifier: '{name}'."),
        ));
    }
    Ok(())
}

/// Shortens `value` so that `value + postfix` fits into [`MAX_IDENTIFIER_LENGTH`].
///
/// Over-long names keep a prefix and get the CRC32 of the full value as eight
/// hex digits, e.g. `my_very_long_table_nam` + `73FAF9A9` + postfix.
/// Returns `None` when the postfix leaves no room for a meaningful prefix.
#[must_use]
pub fn limit_name_with_postfix(value: &str, postfix: &str) -> Option<String> {
    if value.len() + postfix.len() <= MAX_IDENTIFIER_LENGTH {
        return Some(format!("{value}{postfix}"));
    }
    let trim_length = MAX_IDENTIFIER_LENGTH.checked_sub(postfix.len() + 8)?;
    if trim_length < 4 {
        return None;
    }
    let prefix: String = value.chars().take(trim_length).collect();
    Some(format!(
        "{prefix}{:08X}{postfix}",
        crc32fast::hash(value.as_bytes())
    ))
}

/// Shortens `value` to [`MAX_IDENTIFIER_LENGTH`] characters.
#[must_use]
pub fn limit_name(value: &str) -> String {
    // An empty postfix always leaves room for the prefix.
    limit_name_with_postfix(value, "").unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("t1"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("CamelCase_9"));
        assert!(!is_valid_identifier("9lives"));
        assert!(!is_valid_identifier("with space"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier(&"a".repeat(31)));
    }

    #[test]
    fn test_check_identifier_reports_element() {
        let err = check_identifier("g", "bad-name").unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalIdentifier);
        assert_eq!(err.element.as_deref(), Some("bad-name"));
    }

    #[test]
    fn test_limit_name_short_is_untouched() {
        assert_eq!(limit_name("pk_t1"), "pk_t1");
    }

    #[test]
    fn test_limit_name_long() {
        let long = "fk_grain_very_long_table_name_other_grain_ref";
        let limited = limit_name(long);
        assert_eq!(limited.len(), MAX_IDENTIFIER_LENGTH);
        assert!(limited.starts_with("fk_grain_very_long_ta"));
        assert_eq!(limited, limit_name(long));
    }

    #[test]
    fn test_limit_name_with_postfix() {
        let limited = limit_name_with_postfix(&"x".repeat(40), "_nextValueProc").unwrap();
        assert_eq!(limited.len(), MAX_IDENTIFIER_LENGTH);
        assert!(limited.ends_with("_nextValueProc"));
        assert!(limit_name_with_postfix(&"x".repeat(40), &"p".repeat(20)).is_none());
    }
}
