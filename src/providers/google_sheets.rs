use google_sheets4::api::{
    BatchUpdateSpreadsheetRequest, DeleteDimensionRequest, DimensionRange, Request, ValueRange,
};
use google_sheets4::yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};
use google_sheets4::{
    hyper_rustls,
    hyper_rustls::HttpsConnector,
    hyper_util::{self, client::legacy::connect::HttpConnector},
    Sheets,
};
use serde_json::{Error as JsonError, Value};
use std::{env, fmt, fs, io, path::Path, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::providers::{SpreadsheetProvider, TableRef};

/// Environment variable holding the path of the service account key file.
pub const SERVICE_ACCOUNT_ENV: &str = "SERVICE_ACCOUNT_JSON";

/// Spreadsheet-backed tables on Google Sheets.
///
/// The spreadsheet id is the [`TableRef::store_id`], so one provider serves
/// every spreadsheet the service account can reach.
pub struct GoogleSheetProvider {
    sheets: Arc<Mutex<Sheets<HttpsConnector<HttpConnector>>>>,
}

impl fmt::Debug for GoogleSheetProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleSheetProvider")
            .field("sheets", &"<omitted>")
            .finish()
    }
}

impl GoogleSheetProvider {
    pub async fn try_new_from_env() -> Result<Self, GoogleSheetError> {
        let service_account_path = env::var(SERVICE_ACCOUNT_ENV)?;
        Self::try_new(service_account_path).await
    }

    pub async fn try_new(service_account_path: impl AsRef<Path>) -> Result<Self, GoogleSheetError> {
        let service_account = read_service_account_json(service_account_path.as_ref())?;

        let auth = ServiceAccountAuthenticator::builder(service_account)
            .build()
            .await
            .map_err(|e| GoogleSheetError::Auth(e.to_string()))?;

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| GoogleSheetError::TlsConfig(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .build();

        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(https);

        let sheets = Sheets::new(client, auth);

        Ok(GoogleSheetProvider {
            sheets: Arc::new(Mutex::new(sheets)),
        })
    }

    async fn sheet_id(&self, table: TableRef<'_>) -> Result<i32, GoogleSheetError> {
        let sheets = self.sheets.lock().await;

        let (_, spreadsheet) = sheets.spreadsheets().get(table.store_id).doit().await?;

        spreadsheet
            .sheets
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find_map(|s| {
                let props = s.properties.as_ref()?;
                (props.title.as_deref() == Some(table.name)).then_some(props.sheet_id)
            })
            .flatten()
            .ok_or_else(|| GoogleSheetError::SheetNotFound(table.name.to_owned()))
    }
}

fn read_service_account_json(file_path: &Path) -> Result<ServiceAccountKey, GoogleSheetError> {
    let contents = fs::read_to_string(file_path)?;
    let acc = serde_json::from_str(&contents)?;
    Ok(acc)
}

/// Sheet name as it must appear in a range, quoted when needed.
fn quoted_sheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// A single cell with its sheet, e.g. `'Bob''s'!AB3`.
fn cell_range(table: TableRef<'_>, row: usize, column: usize) -> String {
    format!("{}!{}", quoted_sheet(table.name), a1_notation::cell(column, row))
}

/// The API trims trailing empty cells; pad back out to the widest row with
/// `""`, which is also what an empty cell in the middle of a row reads as.
fn pad_rows(mut rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, Value::String(String::new()));
    }
    rows
}

impl SpreadsheetProvider for GoogleSheetProvider {
    type Error = GoogleSheetError;

    async fn read_table(&self, table: TableRef<'_>) -> Result<Vec<Vec<Value>>, Self::Error> {
        let range = quoted_sheet(table.name);
        let sheets = self.sheets.lock().await;

        let (_, result) = sheets
            .spreadsheets()
            .values_get(table.store_id, &range)
            .value_render_option("UNFORMATTED_VALUE")
            .doit()
            .await?;

        let rows = pad_rows(result.values.unwrap_or_default());
        debug!(%table, rows = rows.len(), "read table");
        Ok(rows)
    }

    async fn append_row(&self, table: TableRef<'_>, row: Vec<Value>) -> Result<(), Self::Error> {
        let range = quoted_sheet(table.name);

        let request = ValueRange {
            major_dimension: Some("ROWS".to_owned()),
            range: Some(range.clone()),
            values: Some(vec![row]),
        };

        let sheets = self.sheets.lock().await;

        sheets
            .spreadsheets()
            .values_append(request, table.store_id, &range)
            .value_input_option("RAW")
            .insert_data_option("INSERT_ROWS")
            .doit()
            .await?;

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
        let range = cell_range(table, row, column);

        let request = ValueRange {
            major_dimension: Some("ROWS".to_owned()),
            range: Some(range.clone()),
            values: Some(vec![vec![value]]),
        };

        let sheets = self.sheets.lock().await;

        sheets
            .spreadsheets()
            .values_update(request, table.store_id, &range)
            .value_input_option("RAW")
            .doit()
            .await?;

        debug!(%table, row, column, "wrote cell");
        Ok(())
    }

    async fn delete_row(&self, table: TableRef<'_>, row: usize) -> Result<(), Self::Error> {
        let sheet_id = self.sheet_id(table).await?;
        let start_index = i32::try_from(row).map_err(|_| GoogleSheetError::RowOutOfRange(row))?;

        let request = BatchUpdateSpreadsheetRequest {
            requests: Some(vec![Request {
                delete_dimension: Some(DeleteDimensionRequest {
                    range: Some(DimensionRange {
                        sheet_id: Some(sheet_id),
                        dimension: Some("ROWS".to_owned()),
                        start_index: Some(start_index),
                        end_index: Some(start_index + 1),
                    }),
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let sheets = self.sheets.lock().await;

        sheets
            .spreadsheets()
            .batch_update(request, table.store_id)
            .doit()
            .await?;

        debug!(%table, row, "deleted row");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum GoogleSheetError {
    #[error("environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("failed to read service account JSON: {0}")]
    ServiceAccountIo(#[from] io::Error),

    #[error("invalid service account JSON: {0}")]
    ServiceAccountJson(#[from] JsonError),

    #[error("OAuth authentication failed: {0}")]
    Auth(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Google Sheets API error: {0}")]
    Api(#[from] google_sheets4::Error),

    #[error("no sheet named '{0}' in the document")]
    SheetNotFound(String),

    #[error("row {0} is beyond the sheet's addressable range")]
    RowOutOfRange(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cell_range_uses_the_quoted_sheet_name() {
        assert_eq!(cell_range(TableRef::new("s", "Users"), 0, 0), "'Users'!A1");
        assert_eq!(cell_range(TableRef::new("s", "Bob's"), 2, 27), "'Bob''s'!AB3");
    }

    #[test]
    fn sheet_names_are_quoted() {
        assert_eq!(quoted_sheet("Users"), "'Users'");
        assert_eq!(quoted_sheet("Bob's"), "'Bob''s'");
    }

    #[test]
    fn short_rows_are_padded() {
        let rows = pad_rows(vec![
            vec![json!("Name"), json!("Age")],
            vec![json!("John")],
        ]);
        assert_eq!(rows[1], vec![json!("John"), json!("")]);
    }
}
