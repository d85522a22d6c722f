//! User repository
//!
//! Data access layer for the users table. Table management calls are
//! fail-fast: errors are logged and returned. Record calls are fail-soft:
//! errors are logged and folded into an [`Outcome`].

use aws_sdk_dynamodb::operation::put_item::PutItemOutput;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{build_connection, Settings, DEFAULT_NAME_INDEX};
use crate::db::api::{DynamoDbApi, IndexSchema, Item, QueryRequest, TableSchema, UpdateRequest};
use crate::db::expression::{KeyCondition, SetExpression};
use crate::db::models::{user_key, TableRef, UserRecord, FULL_NAME, NAME, USER_ID};
use crate::db::repositories::Outcome;
use crate::error::{DbError, Result};

/// Delay between DescribeTable polls while waiting for a new table.
pub const TABLE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// DescribeTable polls before giving up on a new table.
pub const TABLE_POLL_ATTEMPTS: u32 = 60;

/// Repository for the users table
pub struct UserRepository {
    api: Arc<dyn DynamoDbApi>,
    table_name: String,
    name_index: String,
    table: Option<TableRef>,
}

impl UserRepository {
    /// Bind a repository to `table_name`. No request is sent.
    pub fn new(api: Arc<dyn DynamoDbApi>, table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        Self {
            api,
            table: Some(TableRef::named(table_name.clone())),
            table_name,
            name_index: DEFAULT_NAME_INDEX.to_string(),
        }
    }

    /// Build a connection from settings and bind the configured table.
    pub async fn connect(settings: &Settings) -> Self {
        let connection = build_connection(settings).await;
        tracing::debug!(
            target_service = %settings.target_display(),
            table = %settings.users_table,
            "Binding users table"
        );
        Self::new(Arc::new(connection), settings.users_table.clone())
            .with_name_index(settings.name_index.clone())
    }

    pub fn with_name_index(mut self, name_index: impl Into<String>) -> Self {
        self.name_index = name_index.into();
        self
    }

    /// The currently bound table, if any.
    pub fn table(&self) -> Option<&TableRef> {
        self.table.as_ref()
    }

    /// Determine whether the users table exists.
    ///
    /// On success the table reference is rebound to the described table.
    pub async fn exists(&mut self) -> Result<bool> {
        match self.api.describe_table(&self.table_name).await {
            Ok(description) => {
                self.table = Some(TableRef::from_description(&self.table_name, &description));
                Ok(true)
            }
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => {
                tracing::error!(
                    table = %self.table_name,
                    code = %err.code(),
                    message = %err.message(),
                    "Couldn't check for existence of table"
                );
                Err(err)
            }
        }
    }

    /// List every table visible to the current credentials.
    pub async fn list_tables(&self) -> Result<Vec<TableRef>> {
        let mut tables = Vec::new();
        let mut start = None;

        loop {
            let page = match self.api.list_tables(start.take()).await {
                Ok(page) => page,
                Err(err) => {
                    tracing::error!(
                        code = %err.code(),
                        message = %err.message(),
                        "Couldn't list tables"
                    );
                    return Err(err);
                }
            };

            for name in page.table_names {
                tracing::info!(table = %name, "Found table");
                tables.push(TableRef::named(name));
            }

            match page.last_evaluated_table_name {
                Some(last) => start = Some(last),
                None => break,
            }
        }

        Ok(tables)
    }

    /// Create a users table and wait until it is active.
    ///
    /// The table uses `user_id` as partition key, `full_name` as sort key,
    /// on-demand billing, and carries the name index.
    pub async fn create_table(&mut self, table_name: &str) -> Result<TableRef> {
        match self.create_and_wait(table_name).await {
            Ok(table) => {
                tracing::info!(table = %table.name, "Table is active");
                self.table = Some(table.clone());
                Ok(table)
            }
            Err(err) => {
                tracing::error!(
                    table = %table_name,
                    code = %err.code(),
                    message = %err.message(),
                    "Couldn't create table"
                );
                Err(err)
            }
        }
    }

    async fn create_and_wait(&self, table_name: &str) -> Result<TableRef> {
        let schema = TableSchema {
            table_name: table_name.to_string(),
            partition_key: USER_ID.to_string(),
            sort_key: Some(FULL_NAME.to_string()),
            indexes: vec![IndexSchema {
                index_name: self.name_index.clone(),
                partition_key: NAME.to_string(),
            }],
        };

        let created = self.api.create_table(&schema).await?;
        if TableRef::is_ready(&created) {
            return Ok(TableRef::from_description(table_name, &created));
        }

        self.wait_until_active(table_name).await
    }

    async fn wait_until_active(&self, table_name: &str) -> Result<TableRef> {
        for attempt in 1..=TABLE_POLL_ATTEMPTS {
            tokio::time::sleep(TABLE_POLL_INTERVAL).await;

            let description = self.api.describe_table(table_name).await?;
            if TableRef::is_ready(&description) {
                return Ok(TableRef::from_description(table_name, &description));
            }
            tracing::debug!(table = %table_name, attempt, "Waiting for table to become active");
        }

        Err(DbError::TableActivationTimeout {
            table: table_name.to_string(),
        })
    }

    /// Delete the bound table and clear the reference.
    pub async fn delete_table(&mut self) -> Result<()> {
        let result = match &self.table {
            Some(table) => self.api.delete_table(&table.name).await.map(|_| ()),
            None => Err(DbError::NoTable),
        };

        match result {
            Ok(()) => {
                self.table = None;
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    code = %err.code(),
                    message = %err.message(),
                    "Couldn't delete table"
                );
                Err(err)
            }
        }
    }

    fn bound_table(&self) -> Result<&str> {
        self.table
            .as_ref()
            .map(|table| table.name.as_str())
            .ok_or(DbError::NoTable)
    }

    /// Insert or fully replace the record with this key pair.
    pub async fn add_user(&self, user_id: &str, full_name: &str) -> Outcome<PutItemOutput> {
        let result = match self.bound_table() {
            Ok(table) => {
                let record = UserRecord::new(user_id, full_name);
                self.api.put_item(table, record.to_dynamodb()).await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(output) => {
                tracing::debug!(user_id = %user_id, full_name = %full_name, "Added user");
                Outcome::Success(output)
            }
            Err(err) => soft_failure(err, "Couldn't add user"),
        }
    }

    /// Every record under `user_id`, one per `full_name`.
    pub async fn query_by_user_id(&self, user_id: &str) -> Outcome<Vec<UserRecord>> {
        let condition = KeyCondition::eq(USER_ID, AttributeValue::S(user_id.to_string()));
        match self.query_all(None, condition).await {
            Ok(records) => Outcome::Success(records),
            Err(err) => soft_failure(err, "Couldn't query users by id"),
        }
    }

    /// Records whose `name` attribute equals `name`, via the name index.
    ///
    /// The index is eventually consistent, so a recent update may not show.
    pub async fn query_by_user_name(&self, name: &str) -> Outcome<Vec<UserRecord>> {
        let condition = KeyCondition::eq(NAME, AttributeValue::S(name.to_string()));
        match self.query_all(Some(self.name_index.as_str()), condition).await {
            Ok(records) => Outcome::Success(records),
            Err(err) => soft_failure(err, "Couldn't query users by name"),
        }
    }

    async fn query_all(
        &self,
        index_name: Option<&str>,
        condition: KeyCondition,
    ) -> Result<Vec<UserRecord>> {
        let table_name = self.bound_table()?;
        let mut records = Vec::new();
        let mut start: Option<Item> = None;

        loop {
            let output = self
                .api
                .query(QueryRequest {
                    table_name: table_name.to_string(),
                    index_name: index_name.map(str::to_string),
                    condition: condition.clone(),
                    exclusive_start_key: start.take(),
                })
                .await?;

            for item in output.items.unwrap_or_default() {
                records.push(UserRecord::from_dynamodb(&item)?);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start = Some(key),
                _ => break,
            }
        }

        Ok(records)
    }

    /// Set `fields` on an existing record.
    ///
    /// Returns the new values of the fields that were set. Key attributes
    /// cannot be updated and at least one field is required.
    pub async fn update_user(
        &self,
        user_id: &str,
        full_name: &str,
        fields: BTreeMap<String, AttributeValue>,
    ) -> Outcome<HashMap<String, AttributeValue>> {
        match self.try_update(user_id, full_name, fields).await {
            Ok(updated) => {
                tracing::debug!(
                    user_id = %user_id,
                    fields = ?updated.keys().collect::<Vec<_>>(),
                    "Updated user"
                );
                Outcome::Success(updated)
            }
            Err(err) if err.is_conditional_check_failed() => {
                tracing::error!(
                    user_id = %user_id,
                    full_name = %full_name,
                    code = %err.code(),
                    "Couldn't update user: no such record"
                );
                Outcome::NotFound
            }
            Err(err) => soft_failure(err, "Couldn't update user"),
        }
    }

    async fn try_update(
        &self,
        user_id: &str,
        full_name: &str,
        fields: BTreeMap<String, AttributeValue>,
    ) -> Result<HashMap<String, AttributeValue>> {
        if let Some(key) = [USER_ID, FULL_NAME].iter().find(|key| fields.contains_key(**key)) {
            return Err(DbError::InvalidRequest(format!(
                "{} is part of the key and cannot be updated",
                key
            )));
        }
        let set = SetExpression::new(fields)?;

        let output = self
            .api
            .update_item(UpdateRequest {
                table_name: self.bound_table()?.to_string(),
                key: user_key(user_id, full_name),
                set,
                require_attribute: Some(USER_ID.to_string()),
            })
            .await?;

        Ok(output.attributes.unwrap_or_default())
    }

    /// Delete by composite key. Deleting an absent record succeeds.
    pub async fn delete_user_by_id(&self, user_id: &str, full_name: &str) -> Outcome<()> {
        let result = match self.bound_table() {
            Ok(table) => self.api.delete_item(table, user_key(user_id, full_name)).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(_) => {
                tracing::debug!(user_id = %user_id, full_name = %full_name, "Deleted user");
                Outcome::Success(())
            }
            Err(err) => soft_failure(err, "Couldn't delete user"),
        }
    }
}

fn soft_failure<T>(err: DbError, what: &'static str) -> Outcome<T> {
    tracing::error!(code = %err.code(), message = %err.message(), "{}", what);
    Outcome::Failed(err)
}
