pub mod archive;
pub mod schedule;
pub mod settings;

use rusqlite::types::Type;
use rusqlite::Row;
use std::str::FromStr;

/// Read a text column through `FromStr`, failing the row on bad values.
fn parse_column<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e| {
        let index = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
    })
}

/// Rows that fail to decode are logged and left out.
fn keep_decoded<T>(table: &str, rows: impl Iterator<Item = rusqlite::Result<T>>) -> Vec<T> {
    rows.filter_map(|row| match row {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(table, error = %e, "Skipping unreadable row");
            None
        }
    })
    .collect()
}
