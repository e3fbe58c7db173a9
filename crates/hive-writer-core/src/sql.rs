//! HiveQL literal and identifier rendering.

/// SQL NULL literal.
pub const NULL: &str = "NULL";

/// Quote an identifier with backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote `alias`.`column`.
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_identifier(alias), quote_identifier(column))
}

/// Quote a string literal.
///
/// Hive 2.0+ uses backslash escapes. Older servers mishandle backslash escapes
/// in literals (HIVE-11723), so `legacy` falls back to doubling quotes.
pub fn quote_text(value: &str, legacy: bool) -> String {
    if legacy {
        return format!("'{}'", value.replace('\'', "''"));
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("price"), "`price`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(qualified("src", "id"), "`src`.`id`");
    }

    #[test]
    fn test_quote_text() {
        assert_eq!(quote_text("plain", false), "'plain'");
        assert_eq!(quote_text(r"it's a \ test", false), r"'it\'s a \\ test'");
    }

    #[test]
    fn test_quote_text_legacy() {
        assert_eq!(quote_text(r"it's \", true), r"'it''s \'");
    }
}
