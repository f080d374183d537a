use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::providers::{SpreadsheetProvider, TableRef};

type TableKey = (String, String);

#[derive(Debug, Default)]
struct State {
    tables: HashMap<TableKey, Vec<Vec<Value>>>,
    write_budget: Option<usize>,
}

/// Tables held in process memory, keyed by store id and table name.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    state: Mutex<State>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with raw rows, header first.
    pub fn with_table(
        mut self,
        store_id: impl Into<String>,
        name: impl Into<String>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.state
            .get_mut()
            .tables
            .insert((store_id.into(), name.into()), rows);
        self
    }

    /// Allow `writes` more successful writes; every write after that fails
    /// with [`MemoryError::WriteBudgetExhausted`].
    pub fn fail_after_writes(mut self, writes: usize) -> Self {
        self.state.get_mut().write_budget = Some(writes);
        self
    }

    /// Current rows of a table, if it exists.
    pub async fn snapshot(&self, table: TableRef<'_>) -> Option<Vec<Vec<Value>>> {
        let state = self.state.lock().await;
        state.tables.get(&key(table)).cloned()
    }
}

fn key(table: TableRef<'_>) -> TableKey {
    (table.store_id.to_owned(), table.name.to_owned())
}

impl State {
    fn table_mut(&mut self, table: TableRef<'_>) -> Result<&mut Vec<Vec<Value>>, MemoryError> {
        match self.write_budget {
            Some(0) => return Err(MemoryError::WriteBudgetExhausted),
            Some(ref mut left) => *left -= 1,
            None => {}
        }
        self.tables
            .get_mut(&key(table))
            .ok_or_else(|| MemoryError::TableNotFound(table.to_string()))
    }
}

impl SpreadsheetProvider for MemoryProvider {
    type Error = MemoryError;

    async fn read_table(&self, table: TableRef<'_>) -> Result<Vec<Vec<Value>>, Self::Error> {
        let state = self.state.lock().await;
        let rows = state
            .tables
            .get(&key(table))
            .cloned()
            .ok_or_else(|| MemoryError::TableNotFound(table.to_string()))?;
        debug!(%table, rows = rows.len(), "read table");
        Ok(rows)
    }

    async fn append_row(&self, table: TableRef<'_>, row: Vec<Value>) -> Result<(), Self::Error> {
        let mut state = self.state.lock().await;
        state.table_mut(table)?.push(row);
        debug!(%table, "appended row");
        Ok(())
    }

    async fn write_cell(
        &self,
        table: TableRef<'_>,
        row: usize,
        column: usize,
        value: Value,
    ) -> Result<(), Self::Error> {
        let mut state = self.state.lock().await;
        let cells = state
            .table_mut(table)?
            .get_mut(row)
            .ok_or(MemoryError::RowOutOfRange(row))?;
        if cells.len() <= column {
            cells.resize(column + 1, Value::Null);
        }
        cells[column] = value;
        debug!(%table, row, column, "wrote cell");
        Ok(())
    }

    async fn delete_row(&self, table: TableRef<'_>, row: usize) -> Result<(), Self::Error> {
        let mut state = self.state.lock().await;
        let rows = state.table_mut(table)?;
        if row >= rows.len() {
            return Err(MemoryError::RowOutOfRange(row));
        }
        rows.remove(row);
        debug!(%table, row, "deleted row");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("row {0} does not exist")]
    RowOutOfRange(usize),

    #[error("write budget exhausted")]
    WriteBudgetExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PEOPLE: TableRef<'static> = TableRef {
        store_id: "store",
        name: "People",
    };

    fn provider() -> MemoryProvider {
        MemoryProvider::new().with_table(
            "store",
            "People",
            vec![vec![json!("Name"), json!("Age")], vec![json!("John"), json!(25)]],
        )
    }

    #[tokio::test]
    async fn missing_table_is_an_error() {
        let provider = provider();
        let err = provider
            .read_table(TableRef::new("store", "Nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn nulls_read_back_as_written() {
        let provider = provider();
        provider.append_row(PEOPLE, vec![json!("Amy"), Value::Null]).await.unwrap();
        let rows = provider.read_table(PEOPLE).await.unwrap();
        assert_eq!(rows[2], vec![json!("Amy"), Value::Null]);
    }

    #[tokio::test]
    async fn write_cell_extends_short_rows() {
        let provider = provider();
        provider.write_cell(PEOPLE, 1, 3, json!("x")).await.unwrap();
        let rows = provider.snapshot(PEOPLE).await.unwrap();
        assert_eq!(rows[1], vec![json!("John"), json!(25), json!(null), json!("x")]);
    }

    #[tokio::test]
    async fn delete_row_shifts_rows_up() {
        let provider = provider();
        provider.append_row(PEOPLE, vec![json!("Jane"), json!(30)]).await.unwrap();
        provider.delete_row(PEOPLE, 1).await.unwrap();
        let rows = provider.snapshot(PEOPLE).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![json!("Jane"), json!(30)]);
        assert!(matches!(
            provider.delete_row(PEOPLE, 5).await,
            Err(MemoryError::RowOutOfRange(5))
        ));
    }

    #[tokio::test]
    async fn write_budget_fails_later_writes() {
        let provider = provider().fail_after_writes(1);
        provider.append_row(PEOPLE, vec![json!("Jane")]).await.unwrap();
        let err = provider.append_row(PEOPLE, vec![json!("Amy")]).await.unwrap_err();
        assert!(matches!(err, MemoryError::WriteBudgetExhausted));
        assert_eq!(provider.snapshot(PEOPLE).await.unwrap().len(), 3);
    }
}
