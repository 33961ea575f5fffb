//! Identifier validation, case folding and quoting for DM SQL.
//!
//! SQL identifiers (tablespace, table and column names) cannot be passed as
//! parameters in prepared statements, so every one of them goes through
//! [`normalize_ident`] before it is spliced into statement text.
//!
//! Two conventions are supported, chosen once per adapter:
//!
//! - case-sensitive: the name is wrapped in double quotes byte-for-byte, with
//!   embedded quotes doubled.
//! - case-insensitive: the name is upper-cased and emitted bare, matching the
//!   engine's folding of unquoted identifiers. Only plain words are accepted,
//!   since nothing protects a bare identifier.

use crate::error::{BridgeError, Result};

/// Maximum identifier length accepted by DM.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BridgeError::Compile(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(BridgeError::Compile(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(BridgeError::Compile(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Letters of any script, digits, `_`, `$` and `#`, not starting with a digit.
fn is_plain_word(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '#'))
}

/// Render a single identifier as it must appear in SQL text.
///
/// # Examples
///
/// ```
/// use dmdb_bridge::core::identifier::normalize_ident;
///
/// assert_eq!(normalize_ident("userName", true).unwrap(), "\"userName\"");
/// assert_eq!(normalize_ident("userName", false).unwrap(), "USERNAME");
/// ```
pub fn normalize_ident(name: &str, case_sensitive: bool) -> Result<String> {
    validate_identifier(name)?;
    if case_sensitive {
        return Ok(format!("\"{}\"", name.replace('"', "\"\"")));
    }
    if !is_plain_word(name) {
        return Err(BridgeError::Compile(format!(
            "Identifier {:?} must be a plain word when identifiers are case-insensitive",
            name
        )));
    }
    Ok(name.to_uppercase())
}

/// Qualify a table name with its tablespace.
///
/// An empty tablespace yields the bare table name.
pub fn table_name(tablespace: &str, table: &str, case_sensitive: bool) -> Result<String> {
    let table = normalize_ident(table, case_sensitive)?;
    if tablespace.is_empty() {
        return Ok(table);
    }
    Ok(format!(
        "{}.{}",
        normalize_ident(tablespace, case_sensitive)?,
        table
    ))
}

/// Render a column reference.
///
/// `qualifier.column` is split only when `qualifier` is one of `qualifiers`
/// (the statement's table, a joined table or a join alias); each part is
/// then normalized separately. Any other name, dots included, is a single
/// identifier and renders exactly as it does in INSERT and SET lists. A
/// leading empty qualifier (`".col"`) yields the bare column.
pub fn column_ref(reference: &str, qualifiers: &[&str], case_sensitive: bool) -> Result<String> {
    if let Some((qualifier, column)) = reference.split_once('.') {
        let known = qualifier.is_empty()
            || qualifiers
                .iter()
                .any(|q| same_ident(q, qualifier, case_sensitive));
        if known {
            return qualified_column(qualifier, column, case_sensitive);
        }
    }
    normalize_ident(reference, case_sensitive)
}

fn same_ident(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.to_uppercase() == b.to_uppercase()
    }
}

/// Render `qualifier.column`; an empty qualifier yields the bare column.
pub fn qualified_column(qualifier: &str, column: &str, case_sensitive: bool) -> Result<String> {
    let column = normalize_ident(column, case_sensitive)?;
    if qualifier.is_empty() {
        return Ok(column);
    }
    Ok(format!(
        "{}.{}",
        normalize_ident(qualifier, case_sensitive)?,
        column
    ))
}
