//! CQL identifier validation and quoting.
//!
//! Keyspace, table and column names cannot be bound as statement parameters,
//! so they are spliced into the query text. Every name is validated and then
//! double-quoted, which also preserves its case exactly as schema discovery
//! reported it.

use crate::error::{AviaryError, Result};

/// CQL limits keyspace and table names to 48 characters; column names are
/// unbounded but anything beyond this is certainly not a real schema name.
const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Validate an identifier before it is spliced into CQL.
///
/// # Errors
///
/// Returns `AviaryError::Config` for empty names, names containing a null
/// byte, or names longer than the supported maximum.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AviaryError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(AviaryError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(AviaryError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a CQL identifier, doubling embedded double quotes.
pub fn quote_cql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a keyspace-qualified table name.
pub fn qualify_cql(keyspace: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_cql(keyspace)?, quote_cql(table)?))
}
