use serde_json::Value;
use std::error::Error as StdError;
use std::fmt::{self, Debug};

pub mod google_sheets;
pub mod memory;

/// Addresses one table (sheet) inside one store (spreadsheet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRef<'a> {
    /// Opaque store identifier, e.g. a spreadsheet id.
    pub store_id: &'a str,
    /// Name of the sheet holding the table.
    pub name: &'a str,
}

impl<'a> TableRef<'a> {
    pub fn new(store_id: &'a str, name: &'a str) -> Self {
        TableRef { store_id, name }
    }
}

impl fmt::Display for TableRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_id, self.name)
    }
}

/// Positional access to the rows of a table.
///
/// Row and column positions are 0-based and count the header row, so row 0
/// is always the header.
#[allow(async_fn_in_trait)]
pub trait SpreadsheetProvider: Debug + Send + Sync {
    /// Provider-specific error type.
    type Error: StdError + Send + Sync + 'static;

    /// Open the table and fetch its full contents, row-major.
    ///
    /// Empty cells come back however the store represents them: a
    /// spreadsheet reads them as `""`, so a `null` written by an insert for
    /// an omitted column reads back as `""` there, while the in-memory store
    /// returns the `null` it was given. Conditions compare strictly, so a
    /// `null` condition only matches on stores that keep nulls.
    async fn read_table(&self, table: TableRef<'_>) -> Result<Vec<Vec<Value>>, Self::Error>;

    /// Append one row after the last row of the table.
    async fn append_row(&self, table: TableRef<'_>, row: Vec<Value>) -> Result<(), Self::Error>;

    /// Set a single cell.
    async fn write_cell(
        &self,
        table: TableRef<'_>,
        row: usize,
        column: usize,
        value: Value,
    ) -> Result<(), Self::Error>;

    /// Delete one row, shifting the rows below it up by one.
    async fn delete_row(&self, table: TableRef<'_>, row: usize) -> Result<(), Self::Error>;
}
