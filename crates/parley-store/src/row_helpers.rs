use rusqlite::types::FromSql;
use rusqlite::Row;

use crate::error::StoreError;

/// Reads columns of one row of `table`, reporting failures as [`StoreError::CorruptRow`]
/// with the offending column named.
pub struct RowReader<'r, 's> {
    row: &'r Row<'s>,
    table: &'static str,
}

impl<'r, 's> RowReader<'r, 's> {
    pub fn new(row: &'r Row<'s>, table: &'static str) -> Self {
        Self { row, table }
    }

    /// Column `idx`. NULL is only accepted when `T` is an `Option`.
    pub fn get<T: FromSql>(&self, idx: usize, column: &'static str) -> Result<T, StoreError> {
        self.row.get(idx).map_err(|e| self.corrupt(column, e.to_string()))
    }

    /// A text column holding an enum's `Display` form.
    pub fn parse<T: std::str::FromStr>(&self, idx: usize, column: &'static str) -> Result<T, StoreError> {
        let raw: String = self.get(idx, column)?;
        raw.parse()
            .map_err(|_| self.corrupt(column, format!("unknown variant: {raw}")))
    }

    fn corrupt(&self, column: &'static str, detail: String) -> StoreError {
        StoreError::CorruptRow {
            table: self.table,
            column,
            detail,
        }
    }
}
