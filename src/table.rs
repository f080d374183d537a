use serde::Serialize;
use serde_json::Value;
use std::error::Error as StdError;
use std::ops::Range;
use thiserror::Error;
use tracing::{info, warn};

use crate::providers::{SpreadsheetProvider, TableRef};
use crate::{Condition, Record};

/// Column consulted by [`KeyGuard::Enforced`].
pub const KEY_COLUMN: &str = "key";

/// Row selection and pagination for [`TableAccess::read`].
///
/// Pagination keeps the legacy semantics: an offset that is unset or below 1
/// becomes 1, so the row at index 0 of the candidates is never returned. With
/// conditions that row is the re-prepended header; without conditions it is
/// the table's own header row. A query whose conditions match exactly one row
/// therefore returns nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Option<Vec<Condition>>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one condition, switching the query to filtered mode.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.get_or_insert_with(Vec::new).push(condition);
        self
    }

    pub fn conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Extra row guard applied by [`TableAccess::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyGuard {
    /// A row is only updated when the table has a `key` column, the changes
    /// carry a `key` field, and the two are equal. Without either, update
    /// touches nothing and still reports success.
    #[default]
    Enforced,
    /// Filter conditions alone select the rows.
    Disabled,
}

impl KeyGuard {
    fn admits(self, header: &Header, row: &[Value], changes: &Record) -> bool {
        match self {
            KeyGuard::Disabled => true,
            KeyGuard::Enforced => match (header.position(KEY_COLUMN), changes.get(KEY_COLUMN)) {
                (Some(column), Some(expected)) => row.get(column) == Some(expected),
                _ => false,
            },
        }
    }
}

/// Result of a mutation.
///
/// Mutations are not rolled back: on failure `applied` counts the
/// sub-operations (appended rows, written cells, deleted rows) that reached
/// the store before the error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub ok: bool,
    pub error: String,
    pub applied: usize,
}

impl MutationOutcome {
    pub fn success(applied: usize) -> Self {
        MutationOutcome {
            ok: true,
            error: String::new(),
            applied,
        }
    }

    pub fn failure(applied: usize, error: impl Into<String>) -> Self {
        MutationOutcome {
            ok: false,
            error: error.into(),
            applied,
        }
    }
}

#[derive(Debug, Error)]
pub enum TableError<E: StdError + 'static> {
    #[error("store operation failed: {0}")]
    Store(#[source] E),

    #[error("table '{0}' has no header row")]
    MissingHeader(String),
}

/// Column names from row 0.
#[derive(Debug)]
struct Header {
    names: Vec<String>,
}

impl Header {
    fn from_rows(rows: &[Vec<Value>]) -> Option<Self> {
        let names = rows.first()?.iter().map(column_name).collect();
        Some(Header { names })
    }

    /// First column with this name.
    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn matches(&self, row: &[Value], conditions: &[Condition]) -> bool {
        conditions.iter().all(|condition| {
            self.position(&condition.key)
                .and_then(|column| row.get(column))
                .is_some_and(|cell| *cell == condition.value)
        })
    }

    fn record(&self, row: &[Value]) -> Record {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    fn row(&self, record: &Record) -> Vec<Value> {
        self.names
            .iter()
            .map(|name| record.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

fn column_name(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Index range of the candidates to return, or `None` when the offset lies
/// past the data.
fn page(total: usize, offset: Option<i64>, limit: Option<i64>) -> Option<Range<usize>> {
    let total = i64::try_from(total).unwrap_or(i64::MAX);
    let offset = match offset {
        Some(offset) if offset >= 1 => offset,
        _ => 1,
    };
    if offset.saturating_add(1) >= total {
        return None;
    }
    let end = match limit {
        Some(limit) if limit != 0 && offset.saturating_add(limit) < total => offset + limit,
        _ => total,
    };
    if end <= offset {
        return None;
    }
    Some(offset as usize..end as usize)
}

/// Read and mutate the data rows of tables held by a [`SpreadsheetProvider`].
///
/// Every call re-reads the whole table before acting. Update and delete
/// address rows by the positions seen in that read; nothing guards against
/// another writer changing the table in between.
#[derive(Debug)]
pub struct TableAccess<P> {
    provider: P,
    key_guard: KeyGuard,
}

impl<P: SpreadsheetProvider> TableAccess<P> {
    pub fn new(provider: P) -> Self {
        TableAccess {
            provider,
            key_guard: KeyGuard::default(),
        }
    }

    pub fn with_key_guard(mut self, key_guard: KeyGuard) -> Self {
        self.key_guard = key_guard;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Records matching `query`. Store failures are returned as errors; an
    /// empty result is never one.
    pub async fn read(
        &self,
        store_id: &str,
        table_name: &str,
        query: &Query,
    ) -> Result<Vec<Record>, TableError<P::Error>> {
        let table = TableRef::new(store_id, table_name);
        let (header, rows) = self.load(table).await?;

        let candidates: Vec<&Vec<Value>> = match &query.conditions {
            Some(conditions) => std::iter::once(&rows[0])
                .chain(rows[1..].iter().filter(|row| header.matches(row, conditions)))
                .collect(),
            None => rows.iter().collect(),
        };

        let Some(range) = page(candidates.len(), query.offset, query.limit) else {
            return Ok(Vec::new());
        };

        Ok(candidates[range]
            .iter()
            .map(|row| header.record(row))
            .collect())
    }

    /// Append one row per record, in order. Columns missing from a record are
    /// written as null; fields naming no column are dropped.
    pub async fn insert(
        &self,
        store_id: &str,
        table_name: &str,
        records: &[Record],
    ) -> MutationOutcome {
        let table = TableRef::new(store_id, table_name);
        let mut applied = 0;
        let result = self.try_insert(table, records, &mut applied).await;
        finish("insert", table, applied, result)
    }

    /// Write every field of `changes` that names a column into each row
    /// matching all `conditions` and admitted by the [`KeyGuard`].
    pub async fn update(
        &self,
        store_id: &str,
        table_name: &str,
        changes: &Record,
        conditions: &[Condition],
    ) -> MutationOutcome {
        let table = TableRef::new(store_id, table_name);
        let mut applied = 0;
        let result = self
            .try_update(table, changes, conditions, &mut applied)
            .await;
        finish("update", table, applied, result)
    }

    /// Delete every row matching all `conditions`.
    pub async fn delete(
        &self,
        store_id: &str,
        table_name: &str,
        conditions: &[Condition],
    ) -> MutationOutcome {
        let table = TableRef::new(store_id, table_name);
        let mut applied = 0;
        let result = self.try_delete(table, conditions, &mut applied).await;
        finish("delete", table, applied, result)
    }

    async fn load(
        &self,
        table: TableRef<'_>,
    ) -> Result<(Header, Vec<Vec<Value>>), TableError<P::Error>> {
        let rows = self
            .provider
            .read_table(table)
            .await
            .map_err(TableError::Store)?;
        let header =
            Header::from_rows(&rows).ok_or_else(|| TableError::MissingHeader(table.name.to_owned()))?;
        Ok((header, rows))
    }

    /// Positions of the data rows satisfying `keep`.
    fn select(rows: &[Vec<Value>], mut keep: impl FnMut(&[Value]) -> bool) -> Vec<usize> {
        (1..rows.len()).filter(|&pos| keep(&rows[pos])).collect()
    }

    async fn try_insert(
        &self,
        table: TableRef<'_>,
        records: &[Record],
        applied: &mut usize,
    ) -> Result<(), TableError<P::Error>> {
        let (header, _) = self.load(table).await?;
        for record in records {
            self.provider
                .append_row(table, header.row(record))
                .await
                .map_err(TableError::Store)?;
            *applied += 1;
        }
        Ok(())
    }

    async fn try_update(
        &self,
        table: TableRef<'_>,
        changes: &Record,
        conditions: &[Condition],
        applied: &mut usize,
    ) -> Result<(), TableError<P::Error>> {
        let (header, rows) = self.load(table).await?;
        let targets = Self::select(&rows, |row| {
            header.matches(row, conditions) && self.key_guard.admits(&header, row, changes)
        });

        for row in targets {
            for (field, value) in changes {
                let Some(column) = header.position(field) else {
                    continue;
                };
                self.provider
                    .write_cell(table, row, column, value.clone())
                    .await
                    .map_err(TableError::Store)?;
                *applied += 1;
            }
        }
        Ok(())
    }

    async fn try_delete(
        &self,
        table: TableRef<'_>,
        conditions: &[Condition],
        applied: &mut usize,
    ) -> Result<(), TableError<P::Error>> {
        let (header, rows) = self.load(table).await?;
        let targets = Self::select(&rows, |row| header.matches(row, conditions));

        // Bottom-up so the remaining positions stay valid.
        for row in targets.into_iter().rev() {
            self.provider
                .delete_row(table, row)
                .await
                .map_err(TableError::Store)?;
            *applied += 1;
        }
        Ok(())
    }
}

fn finish<E: StdError + 'static>(
    operation: &str,
    table: TableRef<'_>,
    applied: usize,
    result: Result<(), TableError<E>>,
) -> MutationOutcome {
    match result {
        Ok(()) => {
            info!(%table, applied, "{operation} completed");
            MutationOutcome::success(applied)
        }
        Err(e) => {
            warn!(%table, applied, error = %e, "{operation} failed");
            MutationOutcome::failure(applied, e.to_string())
        }
    }
}
