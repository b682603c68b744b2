//! Placeholder rewriting.
//!
//! Statements are written with `?` (positional) or `:name` (named)
//! placeholders regardless of the target database. Before execution they are
//! rewritten into the native form: `?` for MySQL and SQLite, `$1..$n` for
//! PostgreSQL. Quoted strings, quoted identifiers, comments, and PostgreSQL
//! dollar-quoted bodies are copied verbatim, as are `::` casts.

use crate::error::{DbalError, DbalResult};
use crate::models::{DatabaseType, Params, QueryParam};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Positional,
    Named(String),
}

/// A statement in native placeholder form, plus the order its values bind in.
#[derive(Debug, Clone)]
pub(crate) struct Rewritten {
    pub(crate) sql: String,
    slots: Vec<Slot>,
}

impl Rewritten {
    /// Number of placeholders found in the statement.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Arrange `params` in the order the native placeholders expect.
    ///
    /// Statements without any rewritten placeholder take positional
    /// parameters as-is, so native `$n` markers still work on PostgreSQL.
    pub(crate) fn bind(&self, params: &Params) -> DbalResult<Vec<QueryParam>> {
        let has_named = self.slots.iter().any(|s| matches!(s, Slot::Named(_)));

        match params {
            Params::Positional(values) => {
                if self.slots.is_empty() {
                    return Ok(values.clone());
                }
                if has_named {
                    return Err(self.error("Statement uses named placeholders but positional parameters were given"));
                }
                if values.len() != self.slots.len() {
                    return Err(self.error(format!(
                        "Statement expects {} parameters, got {}",
                        self.slots.len(),
                        values.len()
                    )));
                }
                Ok(values.clone())
            }
            Params::Named(values) => {
                if self.slots.is_empty() {
                    if values.is_empty() {
                        return Ok(Vec::new());
                    }
                    return Err(self.error("Statement has no named placeholders"));
                }
                self.slots
                    .iter()
                    .map(|slot| match slot {
                        Slot::Named(name) => values
                            .iter()
                            .find(|(key, _)| key == name)
                            .map(|(_, value)| value.clone())
                            .ok_or_else(|| {
                                self.error(format!("No value bound for parameter :{}", name))
                            }),
                        Slot::Positional => Err(self.error(
                            "Statement uses positional placeholders but named parameters were given",
                        )),
                    })
                    .collect()
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> DbalError {
        DbalError::query(message, None, self.sql.clone())
    }
}

/// Rewrite `?` and `:name` placeholders into the native form for `db`.
pub(crate) fn rewrite(sql: &str, db: DatabaseType) -> DbalResult<Rewritten> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut slots = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '\'' | '"' => {
                i = copy_quoted(&chars, i, c, db.backslash_escapes(), &mut out);
            }
            '`' => {
                i = copy_quoted(&chars, i, c, false, &mut out);
            }
            '-' if next == Some('-') => {
                let end = find_from(&chars, i, "\n").map_or(chars.len(), |p| p + 1);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if next == Some('*') => {
                let end = find_from(&chars, i + 2, "*/").map_or(chars.len(), |p| p + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            '$' if db == DatabaseType::PostgreSQL => match dollar_tag(&chars, i) {
                Some(tag) => {
                    let body_start = i + tag.chars().count();
                    let end = find_from(&chars, body_start, &tag)
                        .map_or(chars.len(), |p| p + tag.chars().count());
                    out.extend(&chars[i..end]);
                    i = end;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            },
            '?' => {
                slots.push(Slot::Positional);
                push_placeholder(&mut out, db, slots.len());
                i += 1;
            }
            ':' if next == Some(':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if next.is_some_and(is_ident_start) => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                slots.push(Slot::Named(chars[start..end].iter().collect()));
                push_placeholder(&mut out, db, slots.len());
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    let positional = slots.iter().any(|s| *s == Slot::Positional);
    let named = slots.iter().any(|s| matches!(s, Slot::Named(_)));
    if positional && named {
        return Err(DbalError::query(
            "Cannot mix positional and named placeholders",
            None,
            sql,
        ));
    }

    Ok(Rewritten { sql: out, slots })
}

fn push_placeholder(out: &mut String, db: DatabaseType, index: usize) {
    match db {
        DatabaseType::PostgreSQL => {
            out.push('$');
            out.push_str(&index.to_string());
        }
        DatabaseType::MySQL | DatabaseType::SQLite => out.push('?'),
    }
}

/// Copy a quoted run starting at `start` and return the index after it.
/// A doubled quote character is an escaped quote.
fn copy_quoted(
    chars: &[char],
    start: usize,
    quote: char,
    backslash_escapes: bool,
    out: &mut String,
) -> usize {
    out.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        if backslash_escapes && c == '\\' {
            if let Some(&escaped) = chars.get(i + 1) {
                out.push(escaped);
            }
            i += 2;
            continue;
        }
        if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Recognize a `$tag$` opener at `start`. Positional `$1` is not a tag.
fn dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut i = start + 1;
    if chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
    }
    if chars.get(i) == Some(&'$') {
        Some(chars[start..=i].iter().collect())
    } else {
        None
    }
}

fn find_from(chars: &[char], from: usize, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() || from >= chars.len() {
        return None;
    }
    chars[from..]
        .windows(needle.len())
        .position(|w| w == needle.as_slice())
        .map(|p| p + from)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
