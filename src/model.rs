use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::error::Error as StdError;
use thiserror::Error;

use crate::config::{ConfigError, ConfigSource};
use crate::providers::SpreadsheetProvider;
use crate::table::{KeyGuard, MutationOutcome, Query, TableAccess, TableError};
use crate::{Condition, Record};

/// Table access bound to the store named by a [`ConfigSource`].
#[derive(Debug)]
pub struct Model<P, C> {
    access: TableAccess<P>,
    config: C,
}

impl<P: SpreadsheetProvider, C: ConfigSource> Model<P, C> {
    pub fn new(provider: P, config: C) -> Self {
        Model {
            access: TableAccess::new(provider),
            config,
        }
    }

    pub fn with_key_guard(mut self, key_guard: KeyGuard) -> Self {
        self.access = self.access.with_key_guard(key_guard);
        self
    }

    pub fn access(&self) -> &TableAccess<P> {
        &self.access
    }

    pub async fn get(
        &self,
        table_name: &str,
        query: &Query,
    ) -> Result<Vec<Record>, ModelError<P::Error>> {
        let store_id = self.config.store_id()?;
        Ok(self.access.read(&store_id, table_name, query).await?)
    }

    pub async fn insert_data(
        &self,
        table_name: &str,
        records: &[Record],
    ) -> Result<MutationOutcome, ModelError<P::Error>> {
        let store_id = self.config.store_id()?;
        Ok(self.access.insert(&store_id, table_name, records).await)
    }

    pub async fn update_data(
        &self,
        table_name: &str,
        changes: &Record,
        conditions: &[Condition],
    ) -> Result<MutationOutcome, ModelError<P::Error>> {
        let store_id = self.config.store_id()?;
        Ok(self
            .access
            .update(&store_id, table_name, changes, conditions)
            .await)
    }

    pub async fn delete_data(
        &self,
        table_name: &str,
        conditions: &[Condition],
    ) -> Result<MutationOutcome, ModelError<P::Error>> {
        let store_id = self.config.store_id()?;
        Ok(self.access.delete(&store_id, table_name, conditions).await)
    }

    /// [`Model::get`], deserialising each record into `T`.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        table_name: &str,
        query: &Query,
    ) -> Result<Vec<T>, ModelError<P::Error>> {
        self.get(table_name, query)
            .await?
            .into_iter()
            .map(|record| serde_json::from_value(Value::Object(record)).map_err(ModelError::Record))
            .collect()
    }

    /// [`Model::insert_data`] for any value serialising to a JSON object.
    pub async fn insert_as<T: Serialize>(
        &self,
        table_name: &str,
        items: &[T],
    ) -> Result<MutationOutcome, ModelError<P::Error>> {
        let records = items
            .iter()
            .map(to_record)
            .collect::<Result<Vec<_>, ModelError<P::Error>>>()?;
        self.insert_data(table_name, &records).await
    }
}

fn to_record<T: Serialize, E: StdError + 'static>(item: &T) -> Result<Record, ModelError<E>> {
    match serde_json::to_value(item).map_err(ModelError::Record)? {
        Value::Object(record) => Ok(record),
        other => Err(ModelError::NotARecord(other)),
    }
}

#[derive(Debug, Error)]
pub enum ModelError<E: StdError + 'static> {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Table(#[from] TableError<E>),

    #[error("record does not match the target type: {0}")]
    Record(#[source] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotARecord(Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvConfig, StaticConfig};
    use crate::providers::memory::MemoryProvider;
    use crate::providers::TableRef;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Person {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Age")]
        age: Option<u32>,
    }

    fn provider() -> MemoryProvider {
        MemoryProvider::new()
            .with_table(
                "sheet-a",
                "People",
                vec![
                    vec![json!("Name"), json!("Age")],
                    vec![json!("John"), json!(25)],
                    vec![json!("Jane"), json!(30)],
                ],
            )
            .with_table(
                "sheet-b",
                "People",
                vec![vec![json!("Name"), json!("Age")]],
            )
    }

    #[tokio::test]
    async fn forwards_to_configured_store() {
        let model = Model::new(provider(), StaticConfig("sheet-a".to_owned()));

        let people: Vec<Person> = model.get_as("People", &Query::new()).await.unwrap();
        assert_eq!(
            people,
            vec![
                Person { name: "John".into(), age: Some(25) },
                Person { name: "Jane".into(), age: Some(30) },
            ]
        );

        let outcome = model
            .delete_data("People", &[Condition::new("Name", "John")])
            .await
            .unwrap();
        assert_eq!(outcome, MutationOutcome::success(1));

        let untouched = model
            .access()
            .provider()
            .snapshot(TableRef::new("sheet-b", "People"))
            .await
            .unwrap();
        assert_eq!(untouched.len(), 1);
    }

    #[tokio::test]
    async fn store_id_is_resolved_per_call() {
        let var = "SHEETBASE_MODEL_TEST_STORE_ID";
        std::env::set_var(var, "sheet-a");
        let model = Model::new(provider(), EnvConfig::new(var));

        let amy = Person { name: "Amy".into(), age: None };
        assert!(model.insert_as("People", &[amy]).await.unwrap().ok);

        std::env::set_var(var, "sheet-b");
        let bob = Person { name: "Bob".into(), age: Some(40) };
        assert!(model.insert_as("People", &[bob]).await.unwrap().ok);
        std::env::remove_var(var);

        let provider = model.access().provider();
        let a = provider.snapshot(TableRef::new("sheet-a", "People")).await.unwrap();
        let b = provider.snapshot(TableRef::new("sheet-b", "People")).await.unwrap();
        assert_eq!(a.last().unwrap(), &vec![json!("Amy"), Value::Null]);
        assert_eq!(b.last().unwrap(), &vec![json!("Bob"), json!(40)]);

        let err = model.get("People", &Query::new()).await.unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[tokio::test]
    async fn update_goes_through_key_guard() {
        let model = Model::new(provider(), StaticConfig("sheet-a".to_owned()));
        let changes = match json!({"Age": 26}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let conditions = [Condition::new("Name", "John")];

        let outcome = model.update_data("People", &changes, &conditions).await.unwrap();
        assert_eq!(outcome, MutationOutcome::success(0));

        let model = model.with_key_guard(KeyGuard::Disabled);
        let outcome = model.update_data("People", &changes, &conditions).await.unwrap();
        assert_eq!(outcome, MutationOutcome::success(1));
    }

    #[tokio::test]
    async fn read_failures_are_errors() {
        let model = Model::new(provider(), StaticConfig("sheet-z".to_owned()));
        let err = model.get("People", &Query::new()).await.unwrap_err();
        assert!(matches!(err, ModelError::Table(TableError::Store(_))));

        let outcome = model.insert_data("People", &[Record::new()]).await.unwrap();
        assert!(!outcome.ok);
    }

    #[test]
    fn scalars_are_not_records() {
        let err = to_record::<_, std::io::Error>(&5).unwrap_err();
        assert!(matches!(err, ModelError::NotARecord(_)));
    }
}
