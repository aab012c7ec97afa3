//! Identifier quoting.
//!
//! Every identifier this crate formats into a query string originates from
//! database introspection (table/column/constraint names), never directly
//! from user input. Interpolation is therefore acceptable, but an identifier
//! containing a double quote is rejected rather than escaped: introspected
//! names are never expected to need escaping, so one that does signals a
//! confused catalog read, not a legitimate name.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("identifier {0:?} contains a quote character and cannot be safely interpolated")]
pub struct InvalidIdentifier(pub String);

/// Double-quotes `name` for use as a table/column identifier, rejecting any
/// name containing a `"` character.
pub fn quote_ident(name: &str) -> Result<String, InvalidIdentifier> {
    if name.contains('"') {
        return Err(InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

/// Quotes a `schema.table` (or bare `table`) pair.
pub fn quote_qualified(schema: &str, table: &str) -> Result<String, InvalidIdentifier> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_a_plain_identifier() {
        assert_eq!(quote_ident("accounts").unwrap(), "\"accounts\"");
    }

    #[test]
    fn rejects_a_quote_character() {
        let err = quote_ident("accounts\" cascade; --").unwrap_err();
        assert_eq!(err, InvalidIdentifier("accounts\" cascade; --".to_string()));
    }

    #[test]
    fn quotes_schema_and_table_together() {
        assert_eq!(
            quote_qualified("public", "orgs").unwrap(),
            "\"public\".\"orgs\""
        );
    }
}
