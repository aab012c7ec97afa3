//! Converts one arbitrarily-typed result column into the text
//! representation every `KeyValueStore` holds its values as.
//!
//! The collector and transporter query primary/foreign key columns whose
//! real type is not known until introspection (`integer`, `bigint`, `uuid`,
//! `text`, ...). Rather than forcing every caller to match on the column
//! type itself, they read through this one helper.

use thiserror::Error;
use tokio_postgres::types::Type;
use tokio_postgres::Row;

#[derive(Debug, Error)]
pub enum PgValueError {
    #[error("column index {0} is out of range for this row")]
    MissingColumn(usize),
    #[error("column {index} has unsupported type {type_name} for key-value conversion")]
    UnsupportedType { index: usize, type_name: String },
}

/// Reads column `index` of `row` as its canonical text representation.
///
/// Supports the PK/FK column types this engine actually traverses:
/// integers (`int2`/`int4`/`int8`), text-like types, and `uuid`. Anything
/// else is reported rather than guessed at.
pub fn column_as_text(row: &Row, index: usize) -> Result<String, PgValueError> {
    let column = row
        .columns()
        .get(index)
        .ok_or(PgValueError::MissingColumn(index))?;
    match *column.type_() {
        Type::INT2 => Ok(row.get::<_, i16>(index).to_string()),
        Type::INT4 => Ok(row.get::<_, i32>(index).to_string()),
        Type::INT8 => Ok(row.get::<_, i64>(index).to_string()),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => Ok(row.get::<_, String>(index)),
        Type::UUID => Ok(row.get::<_, uuid::Uuid>(index).to_string()),
        ref other => Err(PgValueError::UnsupportedType {
            index,
            type_name: other.name().to_string(),
        }),
    }
}
