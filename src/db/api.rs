//! Remote service seam
//!
//! [`DynamoDbApi`] covers the DynamoDB calls the repository makes. The SDK
//! backed implementation lives in [`crate::db::dynamodb`], an in-process one
//! in [`crate::db::memory`].

use async_trait::async_trait;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemOutput;
use aws_sdk_dynamodb::operation::put_item::PutItemOutput;
use aws_sdk_dynamodb::operation::query::QueryOutput;
use aws_sdk_dynamodb::operation::update_item::UpdateItemOutput;
use aws_sdk_dynamodb::types::{AttributeValue, TableDescription};
use std::collections::HashMap;

use crate::db::expression::{KeyCondition, SetExpression};
use crate::error::Result;

/// A DynamoDB item: attribute name to value.
pub type Item = HashMap<String, AttributeValue>;

/// Key schema of a table. All key attributes are strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table_name: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
    pub indexes: Vec<IndexSchema>,
}

/// Global secondary index with a string partition key and ALL projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub index_name: String,
    pub partition_key: String,
}

/// One page of table names.
#[derive(Debug, Clone, Default)]
pub struct TableNamePage {
    pub table_names: Vec<String>,
    pub last_evaluated_table_name: Option<String>,
}

/// Query against the base table or one of its indexes.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    pub condition: KeyCondition,
    pub exclusive_start_key: Option<Item>,
}

/// SET update on a single item, returning the updated attributes.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub table_name: String,
    pub key: Item,
    pub set: SetExpression,
    /// When set, the update only applies if this attribute already exists.
    pub require_attribute: Option<String>,
}

#[async_trait]
pub trait DynamoDbApi: Send + Sync {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription>;

    async fn list_tables(&self, exclusive_start: Option<String>) -> Result<TableNamePage>;

    async fn create_table(&self, schema: &TableSchema) -> Result<TableDescription>;

    async fn delete_table(&self, table_name: &str) -> Result<TableDescription>;

    async fn put_item(&self, table_name: &str, item: Item) -> Result<PutItemOutput>;

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput>;

    async fn update_item(&self, request: UpdateRequest) -> Result<UpdateItemOutput>;

    async fn delete_item(&self, table_name: &str, key: Item) -> Result<DeleteItemOutput>;
}
