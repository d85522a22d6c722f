//! Expression builders
//!
//! Attribute names always go through `#` placeholders so reserved words such
//! as `name` or `status` can be used as field names.

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::{BTreeMap, HashMap};

use crate::error::{DbError, Result};

/// An expression string with its placeholder maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedExpression {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

/// `SET` assignments for an UpdateItem call.
///
/// Fields are kept sorted so the rendered expression is stable.
#[derive(Debug, Clone, PartialEq)]
pub struct SetExpression {
    fields: BTreeMap<String, AttributeValue>,
}

impl SetExpression {
    /// Rejects an empty field set, which would render as a bare `SET`.
    pub fn new(fields: BTreeMap<String, AttributeValue>) -> Result<Self> {
        if fields.is_empty() {
            return Err(DbError::InvalidRequest(
                "update requires at least one field".to_string(),
            ));
        }
        if let Some(name) = fields.keys().find(|name| name.trim().is_empty()) {
            return Err(DbError::InvalidRequest(format!(
                "invalid attribute name {:?}",
                name
            )));
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &BTreeMap<String, AttributeValue> {
        &self.fields
    }

    pub fn render(&self) -> RenderedExpression {
        let mut rendered = RenderedExpression::default();
        let mut assignments = Vec::with_capacity(self.fields.len());

        for (i, (name, value)) in self.fields.iter().enumerate() {
            let name_placeholder = format!("#f{}", i);
            let value_placeholder = format!(":f{}", i);
            assignments.push(format!("{} = {}", name_placeholder, value_placeholder));
            rendered.names.insert(name_placeholder, name.clone());
            rendered.values.insert(value_placeholder, value.clone());
        }

        rendered.expression = format!("SET {}", assignments.join(", "));
        rendered
    }
}

/// Equality condition on a single key attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub attribute: String,
    pub value: AttributeValue,
}

impl KeyCondition {
    pub fn eq(attribute: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            attribute: attribute.into(),
            value,
        }
    }

    pub fn render(&self) -> RenderedExpression {
        RenderedExpression {
            expression: "#k = :k".to_string(),
            names: HashMap::from([("#k".to_string(), self.attribute.clone())]),
            values: HashMap::from([(":k".to_string(), self.value.clone())]),
        }
    }
}

/// Condition that holds only when the item already has `attribute`.
pub fn attribute_exists(attribute: &str) -> RenderedExpression {
    RenderedExpression {
        expression: "attribute_exists(#c)".to_string(),
        names: HashMap::from([("#c".to_string(), attribute.to_string())]),
        values: HashMap::new(),
    }
}
