//! DynamoDB data models
//!
//! Defines the user record stored in the users table, the table handle the
//! repository keeps, and conversions between attribute values and JSON.

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{AttributeValue, TableDescription, TableStatus};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use crate::db::api::Item;
use crate::error::{DbError, Result};

/// Partition key of the users table.
pub const USER_ID: &str = "user_id";

/// Sort key of the users table.
pub const FULL_NAME: &str = "full_name";

/// Attribute the name index is keyed on. Nothing writes it implicitly;
/// callers set it through an update.
pub const NAME: &str = "name";

/// A record in the users table.
///
/// Stored with `user_id` as partition key and `full_name` as sort key. Any
/// other attribute lands in `attributes`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    pub full_name: String,
    pub attributes: HashMap<String, AttributeValue>,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            full_name: full_name.into(),
            attributes: HashMap::new(),
        }
    }

    /// Parse from DynamoDB item
    pub fn from_dynamodb(item: &Item) -> Result<Self> {
        let user_id = get_string(item, USER_ID)
            .ok_or_else(|| DbError::MalformedItem(format!("missing {}", USER_ID)))?;
        let full_name = get_string(item, FULL_NAME)
            .ok_or_else(|| DbError::MalformedItem(format!("missing {}", FULL_NAME)))?;

        let attributes = item
            .iter()
            .filter(|(name, _)| name.as_str() != USER_ID && name.as_str() != FULL_NAME)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Self {
            user_id,
            full_name,
            attributes,
        })
    }

    /// Convert to DynamoDB item
    pub fn to_dynamodb(&self) -> Item {
        let mut item = self.attributes.clone();
        item.insert(USER_ID.to_string(), AttributeValue::S(self.user_id.clone()));
        item.insert(FULL_NAME.to_string(), AttributeValue::S(self.full_name.clone()));
        item
    }

    /// Attribute as a string, if present and of string type.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|v| v.as_s().ok()).map(String::as_str)
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(USER_ID.to_string(), Value::String(self.user_id.clone()));
        object.insert(FULL_NAME.to_string(), Value::String(self.full_name.clone()));
        for (name, value) in &self.attributes {
            object.insert(name.clone(), attribute_to_json(value));
        }
        Value::Object(object)
    }
}

/// Build the composite key item for a user.
pub fn user_key(user_id: &str, full_name: &str) -> Item {
    HashMap::from([
        (USER_ID.to_string(), AttributeValue::S(user_id.to_string())),
        (FULL_NAME.to_string(), AttributeValue::S(full_name.to_string())),
    ])
}

/// Lifecycle state of a table as last reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableState {
    Creating,
    Active,
    Updating,
    Deleting,
    Other,
}

impl From<&TableStatus> for TableState {
    fn from(status: &TableStatus) -> Self {
        match status {
            TableStatus::Active => TableState::Active,
            TableStatus::Creating => TableState::Creating,
            TableStatus::Updating => TableState::Updating,
            TableStatus::Deleting => TableState::Deleting,
            _ => TableState::Other,
        }
    }
}

/// In-memory handle to a named table.
///
/// Binding a `TableRef` performs no I/O; `state` is only known once the
/// service has described the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TableState>,
}

impl TableRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: None,
        }
    }

    /// Build from a service description, falling back to `name` when the
    /// description omits it.
    pub fn from_description(name: &str, description: &TableDescription) -> Self {
        Self {
            name: description.table_name().unwrap_or(name).to_string(),
            state: description.table_status().map(TableState::from),
        }
    }

    /// True when the table and every index it reports are active.
    pub fn is_ready(description: &TableDescription) -> bool {
        let table_active = description.table_status() == Some(&TableStatus::Active);
        let indexes_active = description
            .global_secondary_indexes()
            .iter()
            .all(|index| {
                index.index_status() == Some(&aws_sdk_dynamodb::types::IndexStatus::Active)
            });
        table_active && indexes_active
    }
}

/// Convert an attribute value into JSON for display.
///
/// Numbers that do not fit a JSON number are rendered as strings.
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => n
            .parse::<i64>()
            .map(Value::from)
            .ok()
            .or_else(|| n.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number))
            .unwrap_or_else(|| Value::String(n.clone())),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(list) => Value::Array(list.iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attribute_to_json(v)))
                .collect(),
        ),
        AttributeValue::Ss(set) => Value::Array(set.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(
            set.iter()
                .map(|n| attribute_to_json(&AttributeValue::N(n.clone())))
                .collect(),
        ),
        AttributeValue::B(blob) => Value::String(format!("<{} bytes>", blob.as_ref().len())),
        AttributeValue::Bs(blobs) => Value::Array(
            blobs
                .iter()
                .map(|blob: &Blob| Value::String(format!("<{} bytes>", blob.as_ref().len())))
                .collect(),
        ),
        _ => Value::Null,
    }
}

/// Convert JSON into an attribute value.
pub fn json_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect(),
        ),
    }
}

/// Convert a map of updated attributes into a JSON object.
pub fn attributes_to_json(attributes: &HashMap<String, AttributeValue>) -> Value {
    Value::Object(
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), attribute_to_json(v)))
            .collect(),
    )
}

fn get_string(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::{GlobalSecondaryIndexDescription, IndexStatus};
    use serde_json::json;

    #[test]
    fn test_user_record_round_trip_keeps_extra_attributes() {
        let mut record = UserRecord::new("u-1", "Ada Lovelace");
        record
            .attributes
            .insert("status".to_string(), AttributeValue::S("active".to_string()));

        let item = record.to_dynamodb();
        assert_eq!(item.get(USER_ID).unwrap().as_s().unwrap(), "u-1");
        assert_eq!(item.len(), 3);

        let parsed = UserRecord::from_dynamodb(&item).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.get_str("status"), Some("active"));
    }

    #[test]
    fn test_from_dynamodb_requires_keys() {
        let item = HashMap::from([(USER_ID.to_string(), AttributeValue::S("u-1".to_string()))]);
        let err = UserRecord::from_dynamodb(&item).unwrap_err();
        assert!(matches!(err, DbError::MalformedItem(_)));
    }

    #[test]
    fn test_json_conversion() {
        let attribute = json_to_attribute(&json!({"age": 36, "tags": ["a"], "admin": true}));
        let back = attribute_to_json(&attribute);
        assert_eq!(back, json!({"age": 36, "tags": ["a"], "admin": true}));

        assert_eq!(
            attribute_to_json(&AttributeValue::N("1.5".to_string())),
            json!(1.5)
        );
    }

    #[test]
    fn test_record_to_json() {
        let mut record = UserRecord::new("u-1", "Ada");
        record
            .attributes
            .insert("age".to_string(), AttributeValue::N("36".to_string()));
        assert_eq!(
            record.to_json(),
            json!({"user_id": "u-1", "full_name": "Ada", "age": 36})
        );
    }

    #[test]
    fn test_table_ready_requires_active_indexes() {
        let creating_index = TableDescription::builder()
            .table_name("users")
            .table_status(TableStatus::Active)
            .global_secondary_indexes(
                GlobalSecondaryIndexDescription::builder()
                    .index_name("name-index")
                    .index_status(IndexStatus::Creating)
                    .build(),
            )
            .build();
        assert!(!TableRef::is_ready(&creating_index));

        let table = TableRef::from_description("users", &creating_index);
        assert_eq!(table.state, Some(TableState::Active));
    }
}
