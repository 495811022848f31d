//! Identifier and literal quoting, plus statement execution.
//!
//! Generated SQL quotes identifiers only when PostgreSQL would require it, so
//! the trigger function sources stay readable (`NEW.id := nextval('temporal.foobar')`).

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ErrorCode, StrataError, StrataResult};
use crate::traits::Connection;

/// Maximum identifier length accepted by PostgreSQL (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_BYTES: usize = 63;

// Reserved keywords that cannot be used as bare column or table names.
const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both", "case",
    "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false", "fetch",
    "for", "foreign", "from", "grant", "group", "having", "in", "initially", "intersect", "into",
    "lateral", "leading", "limit", "localtime", "localtimestamp", "not", "null", "offset", "on",
    "only", "or", "order", "placing", "primary", "references", "returning", "select",
    "session_user", "some", "symmetric", "table", "then", "to", "trailing", "true", "union",
    "unique", "user", "using", "variadic", "when", "where", "window", "with",
];

// Keywords that may name a function or type but not a column or table.
const TYPE_FUNC_NAME: &[&str] = &[
    "authorization", "binary", "collation", "concurrently", "cross", "current_schema", "freeze",
    "full", "ilike", "inner", "is", "isnull", "join", "left", "like", "natural", "notnull",
    "outer", "overlaps", "right", "similar", "tablesample", "verbose",
];

/// Quote an identifier if PostgreSQL requires it, mirroring `quote_ident()`.
pub fn ident(name: &str) -> String {
    let mut chars = name.chars();
    let bare = match chars.next() {
        Some(first) if first == '_' || first.is_ascii_lowercase() => chars
            .all(|c| c == '_' || c == '$' || c.is_ascii_lowercase() || c.is_ascii_digit()),
        _ => false,
    };

    if bare && !RESERVED.contains(&name) && !TYPE_FUNC_NAME.contains(&name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Schema-qualified, quoted-as-needed name.
pub fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", ident(schema), ident(name))
}

/// Quote a string literal.
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Comma-separated identifier list.
pub fn ident_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reject names PostgreSQL would silently truncate or refuse.
pub fn validate_identifier(name: &str) -> StrataResult<()> {
    if name.is_empty() {
        return Err(StrataError::validation_with_suggestion(
            ErrorCode::ValInvalidIdentifier,
            "identifier must not be empty",
            "Provide a non-empty name",
        ));
    }
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(StrataError::validation_with_suggestion(
            ErrorCode::ValInvalidIdentifier,
            format!("identifier '{}' exceeds {} bytes", name, MAX_IDENTIFIER_BYTES),
            "Use a shorter name",
        ));
    }
    if name.contains('\0') {
        return Err(StrataError::validation_with_suggestion(
            ErrorCode::ValInvalidIdentifier,
            "identifier must not contain NUL bytes",
            "Remove the NUL byte from the name",
        ));
    }
    Ok(())
}

/// Cut a generated name down to what PostgreSQL would keep.
pub fn truncate_identifier(name: &str) -> String {
    if name.len() <= MAX_IDENTIFIER_BYTES {
        return name.to_string();
    }
    let mut end = MAX_IDENTIFIER_BYTES;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// `<base><suffix>` within PostgreSQL's identifier limit, `suffix` kept intact.
///
/// A base too long to fit is shortened and followed by eight hex digits of its
/// SHA-256, so distinct bases keep distinct names.
pub fn derived_identifier(base: &str, suffix: &str) -> String {
    let full = format!("{}{}", base, suffix);
    if full.len() <= MAX_IDENTIFIER_BYTES {
        return full;
    }

    let digest = hex::encode(Sha256::digest(base.as_bytes()));
    let hash = &digest[..8];
    let mut end = MAX_IDENTIFIER_BYTES
        .saturating_sub(suffix.len() + hash.len() + 1)
        .min(base.len());
    while !base.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}_{}{}", &base[..end], hash, suffix)
}

/// Execute one statement (or a batch) against the connection, logging it first.
pub async fn execute(conn: &dyn Connection, statement: &str) -> StrataResult<()> {
    debug!(sql = %statement, "Executing statement");
    conn.execute(statement).await
}
