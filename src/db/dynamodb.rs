//! DynamoDB client wrapper
//!
//! Implements [`DynamoDbApi`] on top of the AWS SDK client. Each method is a
//! single request; SDK errors are translated into [`DbError`].

use async_trait::async_trait;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemOutput;
use aws_sdk_dynamodb::operation::put_item::PutItemOutput;
use aws_sdk_dynamodb::operation::query::QueryOutput;
use aws_sdk_dynamodb::operation::update_item::UpdateItemOutput;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex, KeySchemaElement,
    KeyType, Projection, ProjectionType, ReturnValue, ScalarAttributeType, TableDescription,
};
use aws_sdk_dynamodb::Client as DynamoDbSdkClient;
use std::collections::HashMap;

use crate::db::api::{DynamoDbApi, Item, QueryRequest, TableNamePage, TableSchema, UpdateRequest};
use crate::db::expression::attribute_exists;
use crate::error::{DbError, Result};

/// DynamoDB client wrapper for database operations.
#[derive(Clone, Debug)]
pub struct DynamoDbClient {
    client: DynamoDbSdkClient,
}

impl DynamoDbClient {
    pub fn new(client: DynamoDbSdkClient) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying AWS SDK client
    pub fn client(&self) -> &DynamoDbSdkClient {
        &self.client
    }
}

fn key_element(attribute: &str, key_type: KeyType) -> Result<KeySchemaElement> {
    Ok(KeySchemaElement::builder()
        .attribute_name(attribute)
        .key_type(key_type)
        .build()?)
}

fn string_attribute(attribute: &str) -> Result<AttributeDefinition> {
    Ok(AttributeDefinition::builder()
        .attribute_name(attribute)
        .attribute_type(ScalarAttributeType::S)
        .build()?)
}

/// Key schema, attribute definitions and indexes for a CreateTable call.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub key_schema: Vec<KeySchemaElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub indexes: Vec<GlobalSecondaryIndex>,
}

/// Translate a [`TableSchema`] into CreateTable parameters.
///
/// Each key attribute is defined once, even when an index reuses a table key.
pub fn table_definition(schema: &TableSchema) -> Result<TableDefinition> {
    let mut key_schema = vec![key_element(&schema.partition_key, KeyType::Hash)?];
    let mut attribute_definitions = vec![string_attribute(&schema.partition_key)?];

    if let Some(sort_key) = &schema.sort_key {
        key_schema.push(key_element(sort_key, KeyType::Range)?);
        attribute_definitions.push(string_attribute(sort_key)?);
    }

    let mut indexes = Vec::with_capacity(schema.indexes.len());
    for index in &schema.indexes {
        if !attribute_definitions
            .iter()
            .any(|a| a.attribute_name() == index.partition_key)
        {
            attribute_definitions.push(string_attribute(&index.partition_key)?);
        }

        indexes.push(
            GlobalSecondaryIndex::builder()
                .index_name(&index.index_name)
                .key_schema(key_element(&index.partition_key, KeyType::Hash)?)
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()?,
        );
    }

    Ok(TableDefinition {
        key_schema,
        attribute_definitions,
        indexes,
    })
}

/// Expressions for an UpdateItem call.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpressions {
    pub update: String,
    pub condition: Option<String>,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

/// Render the SET expression and, if required, the existence condition,
/// sharing one placeholder map between them.
pub fn update_expressions(request: &UpdateRequest) -> UpdateExpressions {
    let update = request.set.render();
    let mut names = update.names;

    let condition = request.require_attribute.as_deref().map(|attribute| {
        let condition = attribute_exists(attribute);
        names.extend(condition.names);
        condition.expression
    });

    UpdateExpressions {
        update: update.expression,
        condition,
        names,
        values: update.values,
    }
}

fn missing_description(operation: &str, table_name: &str) -> DbError {
    DbError::service(
        "Unknown",
        format!("{} returned no description for table {}", operation, table_name),
    )
}

#[async_trait]
impl DynamoDbApi for DynamoDbClient {
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription> {
        let output = self
            .client
            .describe_table()
            .table_name(table_name)
            .send()
            .await?;

        output
            .table
            .ok_or_else(|| missing_description("DescribeTable", table_name))
    }

    async fn list_tables(&self, exclusive_start: Option<String>) -> Result<TableNamePage> {
        let output = self
            .client
            .list_tables()
            .set_exclusive_start_table_name(exclusive_start)
            .send()
            .await?;

        Ok(TableNamePage {
            table_names: output.table_names.unwrap_or_default(),
            last_evaluated_table_name: output.last_evaluated_table_name,
        })
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<TableDescription> {
        let definition = table_definition(schema)?;

        let request = self
            .client
            .create_table()
            .table_name(&schema.table_name)
            .billing_mode(BillingMode::PayPerRequest)
            .set_global_secondary_indexes(
                (!definition.indexes.is_empty()).then_some(definition.indexes),
            );

        let output = request
            .set_key_schema(Some(definition.key_schema))
            .set_attribute_definitions(Some(definition.attribute_definitions))
            .send()
            .await?;

        output
            .table_description
            .ok_or_else(|| missing_description("CreateTable", &schema.table_name))
    }

    async fn delete_table(&self, table_name: &str) -> Result<TableDescription> {
        let output = self
            .client
            .delete_table()
            .table_name(table_name)
            .send()
            .await?;

        output
            .table_description
            .ok_or_else(|| missing_description("DeleteTable", table_name))
    }

    async fn put_item(&self, table_name: &str, item: Item) -> Result<PutItemOutput> {
        Ok(self
            .client
            .put_item()
            .table_name(table_name)
            .set_item(Some(item))
            .send()
            .await?)
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput> {
        let condition = request.condition.render();

        Ok(self
            .client
            .query()
            .table_name(request.table_name)
            .set_index_name(request.index_name)
            .key_condition_expression(condition.expression)
            .set_expression_attribute_names(Some(condition.names))
            .set_expression_attribute_values(Some(condition.values))
            .set_exclusive_start_key(request.exclusive_start_key)
            .send()
            .await?)
    }

    async fn update_item(&self, request: UpdateRequest) -> Result<UpdateItemOutput> {
        let expressions = update_expressions(&request);

        Ok(self
            .client
            .update_item()
            .table_name(request.table_name)
            .set_key(Some(request.key))
            .update_expression(expressions.update)
            .set_condition_expression(expressions.condition)
            .set_expression_attribute_names(Some(expressions.names))
            .set_expression_attribute_values(Some(expressions.values))
            .return_values(ReturnValue::UpdatedNew)
            .send()
            .await?)
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> Result<DeleteItemOutput> {
        Ok(self
            .client
            .delete_item()
            .table_name(table_name)
            .set_key(Some(key))
            .send()
            .await?)
    }
}
