//! Conversions between Rust field names, column names, and type names.
//!
//! Column names are the underscored, lowercase form of a field name
//! (`userName` → `user_name`). Hydration matches a row column to a field by
//! comparing the StudlyCaps form of both (`user_name` → `UserName`).

/// Split a StudlyCaps or camelCase string before every ASCII uppercase letter.
///
/// Empty pieces are dropped, so a leading capital does not produce an empty
/// first token.
pub fn split_by_capital_letter(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        if c.is_ascii_uppercase() && idx > start {
            parts.push(&s[start..idx]);
            start = idx;
        }
    }
    if start < s.len() {
        parts.push(&s[start..]);
    }
    parts
}

/// `userName` → `user_name`, `UserProfile` → `user_profile`.
pub fn to_underscored(s: &str) -> String {
    split_by_capital_letter(s).join("_").to_lowercase()
}

/// `user_name` → `UserName`.
pub fn to_studly_caps(s: &str) -> String {
    to_studly_caps_with(s, "_")
}

/// StudlyCaps with a custom word separator.
pub fn to_studly_caps_with(s: &str, separator: &str) -> String {
    let lowered = s.to_lowercase();
    let spaced = if separator.is_empty() {
        lowered
    } else {
        lowered.replace(separator, " ")
    };
    spaced
        .split(' ')
        .map(capitalize_first)
        .collect::<Vec<_>>()
        .concat()
}

/// `user_name` → `userName`.
pub fn to_camel_case(s: &str) -> String {
    let studly = to_studly_caps(s);
    let mut chars = studly.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Simple name of a Rust type: module path and generic arguments removed.
pub fn simple_type_name(full: &'static str) -> &'static str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_by_capital_letter() {
        assert_eq!(split_by_capital_letter("UserProfile"), vec!["User", "Profile"]);
        assert_eq!(split_by_capital_letter("userName"), vec!["user", "Name"]);
        assert_eq!(split_by_capital_letter("Invoice"), vec!["Invoice"]);
        assert_eq!(split_by_capital_letter("HTTPLog"), vec!["H", "T", "T", "P", "Log"]);
        assert!(split_by_capital_letter("").is_empty());
    }

    #[test]
    fn test_to_underscored() {
        assert_eq!(to_underscored("userName"), "user_name");
        assert_eq!(to_underscored("InvoiceLine"), "invoice_line");
        assert_eq!(to_underscored("email"), "email");
    }

    #[test]
    fn test_to_studly_caps() {
        assert_eq!(to_studly_caps("user_name"), "UserName");
        assert_eq!(to_studly_caps("USER_NAME"), "UserName");
        assert_eq!(to_studly_caps("id"), "Id");
        assert_eq!(to_studly_caps_with("user-name", "-"), "UserName");
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("user_name"), "userName");
        assert_eq!(to_camel_case("created_at"), "createdAt");
        assert_eq!(to_camel_case(""), "");
    }

    #[test]
    fn test_field_and_column_keys_agree() {
        for field in ["userName", "email", "createdAt", "id"] {
            let column = to_underscored(field);
            assert_eq!(to_camel_case(&column), field);
        }
    }

    #[test]
    fn test_simple_type_name() {
        assert_eq!(simple_type_name("app::models::UserProfile"), "UserProfile");
        assert_eq!(simple_type_name("app::Wrapper<app::Inner>"), "Wrapper");
        assert_eq!(simple_type_name("Invoice"), "Invoice");
    }
}
