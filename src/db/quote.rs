//! Literal quoting.
//!
//! Produces SQL literals for callers that must inline a value instead of
//! binding it. Escaping follows each server's default string syntax.

use crate::error::{DbalError, DbalResult};
use crate::models::{DatabaseType, ParamType};

/// Quote `value` as a literal of the given type for `db`.
pub fn quote(value: &str, param_type: ParamType, db: DatabaseType) -> DbalResult<String> {
    match param_type {
        ParamType::Null => Ok("NULL".to_string()),
        ParamType::Int => {
            let trimmed = value.trim();
            trimmed
                .parse::<i64>()
                .map(|v| v.to_string())
                .map_err(|_| DbalError::invalid_input(format!("'{}' is not an integer", value)))
        }
        ParamType::Bool => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "on" => Ok("TRUE".to_string()),
            "0" | "false" | "f" | "no" | "off" | "" => Ok("FALSE".to_string()),
            other => Err(DbalError::invalid_input(format!(
                "'{}' is not a boolean",
                other
            ))),
        },
        ParamType::Lob => Ok(hex_literal(value.as_bytes(), db)),
        ParamType::Str => quote_string(value, db),
    }
}

fn quote_string(value: &str, db: DatabaseType) -> DbalResult<String> {
    match db {
        DatabaseType::MySQL => {
            let mut out = String::with_capacity(value.len() + 2);
            out.push('\'');
            for c in value.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("\\'"),
                    '"' => out.push_str("\\\""),
                    '\0' => out.push_str("\\0"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\x1a' => out.push_str("\\Z"),
                    _ => out.push(c),
                }
            }
            out.push('\'');
            Ok(out)
        }
        DatabaseType::PostgreSQL if value.contains('\0') => Err(DbalError::quoting_unsupported(
            db.display_name(),
            "PostgreSQL text cannot contain NUL bytes",
        )),
        DatabaseType::PostgreSQL | DatabaseType::SQLite => {
            Ok(format!("'{}'", value.replace('\'', "''")))
        }
    }
}

fn hex_literal(bytes: &[u8], db: DatabaseType) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    match db {
        DatabaseType::PostgreSQL => format!("'\\x{}'::bytea", hex),
        DatabaseType::MySQL | DatabaseType::SQLite => format!("X'{}'", hex),
    }
}
