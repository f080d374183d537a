//! Row-oriented table access over a spreadsheet.
//!
//! A table is a named sheet whose first row is a header of column names.
//! [`TableAccess`] reads and mutates the rows under that header through any
//! [`SpreadsheetProvider`]; [`Model`] adds the store id from configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod config;
pub mod model;
pub mod providers;
pub mod table;

pub use config::{ConfigError, ConfigSource, EnvConfig, StaticConfig};
pub use model::{Model, ModelError};
pub use providers::{SpreadsheetProvider, TableRef};
pub use table::{KeyGuard, MutationOutcome, Query, TableAccess, TableError};

/// A row keyed by header column names, in header order.
pub type Record = Map<String, Value>;

/// Column equality test. Conditions in a set are combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Column name.
    pub key: String,
    pub value: Value,
}

impl Condition {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition {
            key: key.into(),
            value: value.into(),
        }
    }
}
