//! Head schema definitions
//!
//! These are the current ("head") shapes of every schema and enum. Older
//! shapes are never written by hand; they are reconstructed from these by
//! replaying version changes backward (see [`crate::snapshot`]).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// A single field: its type expression plus free-form metadata
/// (default, alias, description, constraints, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Type expression (e.g. "str", "list[str]", "Address")
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl FieldDefinition {
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Function computing a read-only property from a serialized object
pub type PropertyFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// A named, computed, read-only accessor on a schema
///
/// Two properties are equal only if they share the same name and the same
/// function instance.
#[derive(Clone)]
pub struct ComputedProperty {
    name: String,
    compute: PropertyFn,
}

impl ComputedProperty {
    pub fn new<F>(name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            compute: Arc::new(compute),
        }
    }

    /// A property that reads the value at a JSON pointer (`/vat_ids/0`),
    /// yielding `null` when the pointer does not resolve
    pub fn from_pointer(name: impl Into<String>, pointer: impl Into<String>) -> Self {
        let pointer = pointer.into();
        Self::new(name, move |object: &Value| {
            object.pointer(&pointer).cloned().unwrap_or(Value::Null)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compute(&self, object: &Value) -> Value {
        (self.compute)(object)
    }
}

impl fmt::Debug for ComputedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedProperty")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ComputedProperty {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.compute, &other.compute)
    }
}

impl Serialize for ComputedProperty {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("computed")
    }
}

/// Fields and computed properties of one schema
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDefinition {
    pub fields: BTreeMap<String, FieldDefinition>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, ComputedProperty>,
}

impl SchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, definition: FieldDefinition) -> Self {
        self.fields.insert(name.into(), definition);
        self
    }

    pub fn property(mut self, property: ComputedProperty) -> Self {
        self.properties.insert(property.name().to_string(), property);
        self
    }
}

/// Members of one enum, keyed by member name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumDefinition {
    pub members: BTreeMap<String, Value>,
}

impl EnumDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member(mut self, name: impl Into<String>, value: Value) -> Self {
        self.members.insert(name.into(), value);
        self
    }
}

/// Every schema and enum as defined at head
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeadSchemas {
    pub schemas: BTreeMap<String, SchemaDefinition>,
    pub enums: BTreeMap<String, EnumDefinition>,
}

impl HeadSchemas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, id: impl Into<String>, definition: SchemaDefinition) -> Self {
        self.schemas.insert(id.into(), definition);
        self
    }

    pub fn enumeration(mut self, id: impl Into<String>, definition: EnumDefinition) -> Self {
        self.enums.insert(id.into(), definition);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pointer_property() {
        let property = ComputedProperty::from_pointer("vat_id", "/vat_ids/0");
        assert_eq!(property.compute(&json!({"vat_ids": ["A", "B"]})), json!("A"));
        assert_eq!(property.compute(&json!({"vat_ids": []})), Value::Null);
    }

    #[test]
    fn test_property_equality_is_by_instance() {
        let a = ComputedProperty::from_pointer("x", "/x");
        let b = ComputedProperty::from_pointer("x", "/x");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_schema_serializes_fields_in_order() {
        let schema = SchemaDefinition::new()
            .field("b", FieldDefinition::new("int"))
            .field("a", FieldDefinition::new("str").with_attribute("default", json!("x")));
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            value,
            json!({"fields": {"a": {"type": "str", "attributes": {"default": "x"}}, "b": {"type": "int"}}})
        );
    }
}
