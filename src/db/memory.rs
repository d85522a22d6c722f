//! In-memory DynamoDB
//!
//! A process-local stand-in for the service, used as the test double
//! throughout the test suite. It reproduces the behaviour the
//! repository depends on: error codes, upsert semantics, conditional updates,
//! tables that report CREATING before ACTIVE, and paginated responses.
//! Secondary indexes are updated synchronously.

use async_trait::async_trait;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemOutput;
use aws_sdk_dynamodb::operation::put_item::PutItemOutput;
use aws_sdk_dynamodb::operation::query::QueryOutput;
use aws_sdk_dynamodb::operation::update_item::UpdateItemOutput;
use aws_sdk_dynamodb::types::{
    AttributeValue, GlobalSecondaryIndexDescription, IndexStatus, TableDescription, TableStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::api::{DynamoDbApi, Item, QueryRequest, TableNamePage, TableSchema, UpdateRequest};
use crate::error::{
    DbError, Result, CONDITIONAL_CHECK_FAILED, RESOURCE_IN_USE, RESOURCE_NOT_FOUND, VALIDATION,
};

type PrimaryKey = (String, String);

#[derive(Debug)]
struct MemoryTable {
    schema: TableSchema,
    items: BTreeMap<PrimaryKey, Item>,
    /// Remaining DescribeTable calls that still report CREATING.
    pending_polls: u32,
}

impl MemoryTable {
    fn is_active(&self) -> bool {
        self.pending_polls == 0
    }

    fn describe(&self, status: TableStatus) -> TableDescription {
        let index_status = match status {
            TableStatus::Creating => IndexStatus::Creating,
            TableStatus::Deleting => IndexStatus::Deleting,
            _ => IndexStatus::Active,
        };

        let mut builder = TableDescription::builder()
            .table_name(&self.schema.table_name)
            .table_status(status)
            .item_count(self.items.len() as i64);

        for index in &self.schema.indexes {
            builder = builder.global_secondary_indexes(
                GlobalSecondaryIndexDescription::builder()
                    .index_name(&index.index_name)
                    .index_status(index_status.clone())
                    .build(),
            );
        }

        builder.build()
    }

    fn primary_key(&self, item: &Item) -> Result<PrimaryKey> {
        let partition = string_attribute(item, &self.schema.partition_key)?;
        let sort = match &self.schema.sort_key {
            Some(sort_key) => string_attribute(item, sort_key)?,
            None => String::new(),
        };
        Ok((partition, sort))
    }

    fn key_attributes(&self) -> Vec<&str> {
        let mut attributes = vec![self.schema.partition_key.as_str()];
        if let Some(sort_key) = &self.schema.sort_key {
            attributes.push(sort_key);
        }
        attributes
    }
}

/// Thread-safe in-memory implementation of [`DynamoDbApi`].
#[derive(Debug, Clone)]
pub struct InMemoryDynamoDb {
    tables: Arc<RwLock<BTreeMap<String, MemoryTable>>>,
    injected_failure: Arc<RwLock<Option<DbError>>>,
    activation_polls: u32,
    page_size: Option<usize>,
}

impl Default for InMemoryDynamoDb {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDynamoDb {
    /// Creates an empty service where new tables are active immediately.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(BTreeMap::new())),
            injected_failure: Arc::new(RwLock::new(None)),
            activation_polls: 0,
            page_size: None,
        }
    }

    /// New tables report CREATING for this many DescribeTable calls.
    pub fn with_activation_polls(mut self, polls: u32) -> Self {
        self.activation_polls = polls;
        self
    }

    /// Limit ListTables and Query responses to `page_size` entries.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Make every call fail with `err` until cleared with `None`.
    pub async fn inject_failure(&self, err: Option<DbError>) {
        *self.injected_failure.write().await = err;
    }

    async fn check_failure(&self) -> Result<()> {
        match self.injected_failure.read().await.as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn page<T: Clone>(&self, entries: &[T]) -> (Vec<T>, bool) {
        match self.page_size {
            Some(size) if entries.len() > size => (entries[..size].to_vec(), true),
            _ => (entries.to_vec(), false),
        }
    }
}

fn not_found() -> DbError {
    DbError::service(RESOURCE_NOT_FOUND, "Requested resource not found")
}

fn validation(message: impl Into<String>) -> DbError {
    DbError::service(VALIDATION, message)
}

fn string_attribute(item: &Item, attribute: &str) -> Result<String> {
    match item.get(attribute) {
        Some(AttributeValue::S(value)) => Ok(value.clone()),
        Some(_) => Err(validation(format!(
            "One or more parameter values were invalid: Type mismatch for key {}",
            attribute
        ))),
        None => Err(validation(format!(
            "One or more parameter values were invalid: Missing the key {} in the item",
            attribute
        ))),
    }
}

/// Active table lookup; item operations on a CREATING table fail as missing.
fn active_table<'a>(
    tables: &'a BTreeMap<String, MemoryTable>,
    table_name: &str,
) -> Result<&'a MemoryTable> {
    tables
        .get(table_name)
        .filter(|table| table.is_active())
        .ok_or_else(not_found)
}

fn active_table_mut<'a>(
    tables: &'a mut BTreeMap<String, MemoryTable>,
    table_name: &str,
) -> Result<&'a mut MemoryTable> {
    tables
        .get_mut(table_name)
        .filter(|table| table.is_active())
        .ok_or_else(not_found)
}

#[async_trait]
impl DynamoDbApi for InMemoryDynamoDb {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription> {
        self.check_failure().await?;
        let mut tables = self.tables.write().await;
        let table = tables.get_mut(table_name).ok_or_else(not_found)?;

        if table.pending_polls > 0 {
            table.pending_polls -= 1;
            return Ok(table.describe(TableStatus::Creating));
        }
        Ok(table.describe(TableStatus::Active))
    }

    async fn list_tables(&self, exclusive_start: Option<String>) -> Result<TableNamePage> {
        self.check_failure().await?;
        let tables = self.tables.read().await;

        let names: Vec<String> = tables
            .keys()
            .filter(|name| exclusive_start.as_ref().map_or(true, |start| *name > start))
            .cloned()
            .collect();

        let (table_names, truncated) = self.page(&names);
        let last_evaluated_table_name = if truncated {
            table_names.last().cloned()
        } else {
            None
        };

        Ok(TableNamePage {
            table_names,
            last_evaluated_table_name,
        })
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<TableDescription> {
        self.check_failure().await?;
        let mut tables = self.tables.write().await;

        if tables.contains_key(&schema.table_name) {
            return Err(DbError::service(
                RESOURCE_IN_USE,
                format!("Table already exists: {}", schema.table_name),
            ));
        }

        let table = MemoryTable {
            schema: schema.clone(),
            items: BTreeMap::new(),
            pending_polls: self.activation_polls,
        };
        let status = if table.is_active() {
            TableStatus::Active
        } else {
            TableStatus::Creating
        };
        let description = table.describe(status);
        tables.insert(schema.table_name.clone(), table);

        Ok(description)
    }

    async fn delete_table(&self, table_name: &str) -> Result<TableDescription> {
        self.check_failure().await?;
        let mut tables = self.tables.write().await;
        let table = tables.remove(table_name).ok_or_else(not_found)?;
        Ok(table.describe(TableStatus::Deleting))
    }

    async fn put_item(&self, table_name: &str, item: Item) -> Result<PutItemOutput> {
        self.check_failure().await?;
        let mut tables = self.tables.write().await;
        let table = active_table_mut(&mut tables, table_name)?;

        let key = table.primary_key(&item)?;
        table.items.insert(key, item);

        Ok(PutItemOutput::builder().build())
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput> {
        self.check_failure().await?;
        let tables = self.tables.read().await;
        let table = active_table(&tables, &request.table_name)?;

        let key_attribute = match &request.index_name {
            Some(index_name) => {
                let index = table
                    .schema
                    .indexes
                    .iter()
                    .find(|index| &index.index_name == index_name)
                    .ok_or_else(|| {
                        validation(format!(
                            "The table does not have the specified index: {}",
                            index_name
                        ))
                    })?;
                index.partition_key.as_str()
            }
            None => table.schema.partition_key.as_str(),
        };

        if request.condition.attribute != key_attribute {
            return Err(validation("Query condition missed key schema element"));
        }

        let matches: Vec<&Item> = table
            .items
            .values()
            .filter(|item| item.get(key_attribute) == Some(&request.condition.value))
            .collect();

        let start = match &request.exclusive_start_key {
            Some(start_key) => {
                let start = table.primary_key(start_key)?;
                matches
                    .iter()
                    .position(|item| table.primary_key(item).ok().as_ref() == Some(&start))
                    .map_or(matches.len(), |i| i + 1)
            }
            None => 0,
        };

        let (items, truncated) = self.page(&matches[start..]);
        let items: Vec<Item> = items.into_iter().cloned().collect();

        let last_evaluated_key = if truncated {
            items.last().map(|item| {
                let mut attributes = table.key_attributes();
                attributes.push(key_attribute);
                attributes
                    .into_iter()
                    .filter_map(|name| {
                        item.get(name).map(|value| (name.to_string(), value.clone()))
                    })
                    .collect::<Item>()
            })
        } else {
            None
        };

        Ok(QueryOutput::builder()
            .count(items.len() as i32)
            .scanned_count(items.len() as i32)
            .set_items(Some(items))
            .set_last_evaluated_key(last_evaluated_key)
            .build())
    }

    async fn update_item(&self, request: UpdateRequest) -> Result<UpdateItemOutput> {
        self.check_failure().await?;
        let mut tables = self.tables.write().await;
        let table = active_table_mut(&mut tables, &request.table_name)?;

        let key = table.primary_key(&request.key)?;
        for attribute in table.key_attributes() {
            if request.set.fields().contains_key(attribute) {
                return Err(validation(format!(
                    "One or more parameter values were invalid: Cannot update attribute {}. This attribute is part of the key",
                    attribute
                )));
            }
        }

        if let Some(required) = &request.require_attribute {
            let present = table
                .items
                .get(&key)
                .map_or(false, |item| item.contains_key(required));
            if !present {
                return Err(DbError::service(
                    CONDITIONAL_CHECK_FAILED,
                    "The conditional request failed",
                ));
            }
        }

        let item = table.items.entry(key).or_insert_with(|| request.key.clone());
        let mut updated = Item::new();
        for (name, value) in request.set.fields() {
            item.insert(name.clone(), value.clone());
            updated.insert(name.clone(), value.clone());
        }

        Ok(UpdateItemOutput::builder()
            .set_attributes(Some(updated))
            .build())
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> Result<DeleteItemOutput> {
        self.check_failure().await?;
        let mut tables = self.tables.write().await;
        let table = active_table_mut(&mut tables, table_name)?;

        let key = table.primary_key(&key)?;
        table.items.remove(&key);

        Ok(DeleteItemOutput::builder().build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::api::IndexSchema;
    use crate::db::expression::{KeyCondition, SetExpression};

    fn schema() -> TableSchema {
        TableSchema {
            table_name: "users".to_string(),
            partition_key: "user_id".to_string(),
            sort_key: Some("full_name".to_string()),
            indexes: vec![IndexSchema {
                index_name: "name-index".to_string(),
                partition_key: "name".to_string(),
            }],
        }
    }

    fn s(value: &str) -> AttributeValue {
        AttributeValue::S(value.to_string())
    }

    fn key(user_id: &str, full_name: &str) -> Item {
        Item::from([
            ("user_id".to_string(), s(user_id)),
            ("full_name".to_string(), s(full_name)),
        ])
    }

    #[tokio::test]
    async fn test_table_reports_creating_before_active() {
        let db = InMemoryDynamoDb::new().with_activation_polls(2);
        let created = db.create_table(&schema()).await.unwrap();
        assert_eq!(created.table_status(), Some(&TableStatus::Creating));

        let err = db.put_item("users", key("u-1", "Ada")).await.unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(
            db.describe_table("users").await.unwrap().table_status(),
            Some(&TableStatus::Creating)
        );
        assert_eq!(
            db.describe_table("users").await.unwrap().table_status(),
            Some(&TableStatus::Creating)
        );
        assert_eq!(
            db.describe_table("users").await.unwrap().table_status(),
            Some(&TableStatus::Active)
        );
    }

    #[tokio::test]
    async fn test_create_existing_table_is_in_use() {
        let db = InMemoryDynamoDb::new();
        db.create_table(&schema()).await.unwrap();
        let err = db.create_table(&schema()).await.unwrap_err();
        assert_eq!(err.code(), RESOURCE_IN_USE);
    }

    #[tokio::test]
    async fn test_put_requires_key_attributes() {
        let db = InMemoryDynamoDb::new();
        db.create_table(&schema()).await.unwrap();

        let item = Item::from([("user_id".to_string(), s("u-1"))]);
        let err = db.put_item("users", item).await.unwrap_err();
        assert_eq!(err.code(), VALIDATION);
    }

    #[tokio::test]
    async fn test_query_unknown_index_is_validation_error() {
        let db = InMemoryDynamoDb::new();
        db.create_table(&schema()).await.unwrap();

        let err = db
            .query(QueryRequest {
                table_name: "users".to_string(),
                index_name: Some("email-index".to_string()),
                condition: KeyCondition::eq("email", s("a@example.com")),
                exclusive_start_key: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), VALIDATION);
    }

    #[tokio::test]
    async fn test_query_pages_with_last_evaluated_key() {
        let db = InMemoryDynamoDb::new().with_page_size(2);
        db.create_table(&schema()).await.unwrap();
        for name in ["A", "B", "C"] {
            db.put_item("users", key("u-1", name)).await.unwrap();
        }

        let request = QueryRequest {
            table_name: "users".to_string(),
            index_name: None,
            condition: KeyCondition::eq("user_id", s("u-1")),
            exclusive_start_key: None,
        };
        let first = db.query(request.clone()).await.unwrap();
        assert_eq!(first.count, 2);
        let last_key = first.last_evaluated_key.clone().unwrap();
        assert_eq!(last_key.get("full_name"), Some(&s("B")));

        let second = db
            .query(QueryRequest {
                exclusive_start_key: Some(last_key),
                ..request
            })
            .await
            .unwrap();
        assert_eq!(second.count, 1);
        assert!(second.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_update_cannot_touch_key_attributes() {
        let db = InMemoryDynamoDb::new();
        db.create_table(&schema()).await.unwrap();
        db.put_item("users", key("u-1", "Ada")).await.unwrap();

        let set = SetExpression::new(BTreeMap::from([("full_name".to_string(), s("Grace"))]))
            .unwrap();
        let err = db
            .update_item(UpdateRequest {
                table_name: "users".to_string(),
                key: key("u-1", "Ada"),
                set,
                require_attribute: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), VALIDATION);
    }

    #[tokio::test]
    async fn test_injected_failure_applies_to_every_call() {
        let db = InMemoryDynamoDb::new();
        db.inject_failure(Some(DbError::service("ThrottlingException", "Rate exceeded")))
            .await;
        assert!(db.list_tables(None).await.is_err());

        db.inject_failure(None).await;
        assert!(db.list_tables(None).await.is_ok());
    }
}
