//! Reversible change instructions
//!
//! Every instruction describes how something looked in the version
//! immediately *older* than the one its change is bound to. Applying them
//! while walking the chain from head toward the oldest version reconstructs
//! each historical shape.
//!
//! | Instruction          | Going one version back                         |
//! |----------------------|------------------------------------------------|
//! | `FieldRemoved`       | the field did not exist: remove it             |
//! | `FieldAdded`         | the field existed with this definition: add it |
//! | `FieldChanged`       | the listed attributes had other values         |
//! | `PropertyAdded`      | the computed property existed: add it          |
//! | `PropertyRemoved`    | the computed property did not exist            |
//! | `EnumMembersAdded`   | these members existed                          |
//! | `EnumMembersRemoved` | these members did not exist                    |
//! | `EndpointRemoved`    | the endpoint did not exist                     |
//! | `EndpointRestored`   | a deleted endpoint existed                     |
//! | `EndpointChanged`    | the endpoint had other attributes              |

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::endpoint::MethodSet;
use crate::error::{Result, VersionError};
use crate::schema::{ComputedProperty, FieldDefinition};

/// A single attribute override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeDiff {
    /// The attribute had this value
    Set(Value),
    /// The attribute was absent
    Unset,
}

/// Attribute overrides for a field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldChanges {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeDiff>,
}

impl FieldChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ty(mut self, ty: impl Into<String>) -> Self {
        self.ty = Some(ty.into());
        self
    }

    pub fn set(mut self, attribute: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(attribute.into(), AttributeDiff::Set(value));
        self
    }

    pub fn unset(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.insert(attribute.into(), AttributeDiff::Unset);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ty.is_none() && self.attributes.is_empty()
    }
}

/// Attribute overrides for an endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<MethodSet>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeDiff>,
}

impl EndpointChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn methods(mut self, methods: impl Into<MethodSet>) -> Self {
        self.methods = Some(methods.into());
        self
    }

    pub fn set(mut self, attribute: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(attribute.into(), AttributeDiff::Set(value));
        self
    }

    pub fn unset(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.insert(attribute.into(), AttributeDiff::Unset);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.methods.is_none() && self.attributes.is_empty()
    }
}

/// A typed, reversible change descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    FieldRemoved {
        schema: String,
        field: String,
    },
    FieldAdded {
        schema: String,
        field: String,
        definition: FieldDefinition,
    },
    FieldChanged {
        schema: String,
        field: String,
        changes: FieldChanges,
    },
    PropertyAdded {
        schema: String,
        property: ComputedProperty,
    },
    PropertyRemoved {
        schema: String,
        property: String,
    },
    EnumMembersAdded {
        enum_id: String,
        members: BTreeMap<String, Value>,
    },
    EnumMembersRemoved {
        enum_id: String,
        members: BTreeSet<String>,
    },
    EndpointRemoved {
        path: String,
        methods: MethodSet,
    },
    EndpointRestored {
        path: String,
        methods: MethodSet,
        /// Handler name picking one of several deleted endpoints on the same route
        handler: Option<String>,
    },
    EndpointChanged {
        path: String,
        methods: MethodSet,
        handler: Option<String>,
        changes: EndpointChanges,
    },
}

impl Instruction {
    pub fn field_removed(schema: impl Into<String>, field: impl Into<String>) -> Self {
        Instruction::FieldRemoved {
            schema: schema.into(),
            field: field.into(),
        }
    }

    pub fn field_added(
        schema: impl Into<String>,
        field: impl Into<String>,
        definition: FieldDefinition,
    ) -> Self {
        Instruction::FieldAdded {
            schema: schema.into(),
            field: field.into(),
            definition,
        }
    }

    pub fn field_changed(
        schema: impl Into<String>,
        field: impl Into<String>,
        changes: FieldChanges,
    ) -> Self {
        Instruction::FieldChanged {
            schema: schema.into(),
            field: field.into(),
            changes,
        }
    }

    pub fn property_added(schema: impl Into<String>, property: ComputedProperty) -> Self {
        Instruction::PropertyAdded {
            schema: schema.into(),
            property,
        }
    }

    pub fn property_removed(schema: impl Into<String>, property: impl Into<String>) -> Self {
        Instruction::PropertyRemoved {
            schema: schema.into(),
            property: property.into(),
        }
    }

    pub fn enum_members_added<I, K>(enum_id: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Instruction::EnumMembersAdded {
            enum_id: enum_id.into(),
            members: members.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn enum_members_removed<I, K>(enum_id: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Instruction::EnumMembersRemoved {
            enum_id: enum_id.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn endpoint_removed(path: impl Into<String>, methods: impl Into<MethodSet>) -> Self {
        Instruction::EndpointRemoved {
            path: path.into(),
            methods: methods.into(),
        }
    }

    pub fn endpoint_restored(path: impl Into<String>, methods: impl Into<MethodSet>) -> Self {
        Instruction::EndpointRestored {
            path: path.into(),
            methods: methods.into(),
            handler: None,
        }
    }

    pub fn endpoint_changed(
        path: impl Into<String>,
        methods: impl Into<MethodSet>,
        changes: EndpointChanges,
    ) -> Self {
        Instruction::EndpointChanged {
            path: path.into(),
            methods: methods.into(),
            handler: None,
            changes,
        }
    }

    /// Narrow an endpoint restore or change to the endpoint served by `handler`
    ///
    /// Has no effect on other instructions.
    pub fn for_handler(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Instruction::EndpointRestored { handler, .. }
            | Instruction::EndpointChanged { handler, .. } => *handler = Some(name.into()),
            _ => {}
        }
        self
    }

    /// Schema or enum id this instruction touches, if any
    pub fn schema_id(&self) -> Option<&str> {
        match self {
            Instruction::FieldRemoved { schema, .. }
            | Instruction::FieldAdded { schema, .. }
            | Instruction::FieldChanged { schema, .. }
            | Instruction::PropertyAdded { schema, .. }
            | Instruction::PropertyRemoved { schema, .. } => Some(schema),
            Instruction::EnumMembersAdded { enum_id, .. }
            | Instruction::EnumMembersRemoved { enum_id, .. } => Some(enum_id),
            Instruction::EndpointRemoved { .. }
            | Instruction::EndpointRestored { .. }
            | Instruction::EndpointChanged { .. } => None,
        }
    }

    /// Reject instructions that could never change anything
    pub(crate) fn validate(&self, change: &str) -> Result<()> {
        let noop = |detail: &str| {
            Err(VersionError::NoopInstruction {
                change: change.to_string(),
                instruction: self.to_string(),
                detail: detail.to_string(),
            })
        };

        match self {
            Instruction::FieldChanged { changes, .. } if changes.is_empty() => {
                noop("no attributes are listed")
            }
            Instruction::EnumMembersAdded { members, .. } if members.is_empty() => {
                noop("no members are listed")
            }
            Instruction::EnumMembersRemoved { members, .. } if members.is_empty() => {
                noop("no members are listed")
            }
            Instruction::EndpointRemoved { methods, .. }
            | Instruction::EndpointRestored { methods, .. }
                if methods.is_empty() =>
            {
                noop("no methods are listed")
            }
            Instruction::EndpointChanged { methods, changes, .. } => {
                if methods.is_empty() {
                    noop("no methods are listed")
                } else if changes.is_empty() {
                    noop("no attributes are listed")
                } else if changes.methods.as_ref().is_some_and(MethodSet::is_empty) {
                    noop("the new method set is empty")
                } else {
                    Ok(())
                }
            }
            Instruction::FieldRemoved { .. }
            | Instruction::FieldAdded { .. }
            | Instruction::FieldChanged { .. }
            | Instruction::PropertyAdded { .. }
            | Instruction::PropertyRemoved { .. }
            | Instruction::EnumMembersAdded { .. }
            | Instruction::EnumMembersRemoved { .. }
            | Instruction::EndpointRemoved { .. }
            | Instruction::EndpointRestored { .. } => Ok(()),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::FieldRemoved { schema, field } => {
                write!(f, "FieldRemoved({schema}.{field})")
            }
            Instruction::FieldAdded {
                schema,
                field,
                definition,
            } => write!(f, "FieldAdded({schema}.{field}: {})", definition.ty),
            Instruction::FieldChanged {
                schema,
                field,
                changes,
            } => {
                let mut listed: Vec<&str> = changes.attributes.keys().map(String::as_str).collect();
                if changes.ty.is_some() {
                    listed.insert(0, "type");
                }
                write!(f, "FieldChanged({schema}.{field}: {})", listed.join(", "))
            }
            Instruction::PropertyAdded { schema, property } => {
                write!(f, "PropertyAdded({schema}.{})", property.name())
            }
            Instruction::PropertyRemoved { schema, property } => {
                write!(f, "PropertyRemoved({schema}.{property})")
            }
            Instruction::EnumMembersAdded { enum_id, members } => {
                let names: Vec<&str> = members.keys().map(String::as_str).collect();
                write!(f, "EnumMembersAdded({enum_id}: {})", names.join(", "))
            }
            Instruction::EnumMembersRemoved { enum_id, members } => {
                let names: Vec<&str> = members.iter().map(String::as_str).collect();
                write!(f, "EnumMembersRemoved({enum_id}: {})", names.join(", "))
            }
            Instruction::EndpointRemoved { path, methods } => {
                write!(f, "EndpointRemoved({methods} {path})")
            }
            Instruction::EndpointRestored {
                path,
                methods,
                handler,
            } => match handler {
                Some(handler) => write!(f, "EndpointRestored({methods} {path} -> {handler})"),
                None => write!(f, "EndpointRestored({methods} {path})"),
            },
            Instruction::EndpointChanged {
                path,
                methods,
                handler,
                ..
            } => match handler {
                Some(handler) => write!(f, "EndpointChanged({methods} {path} -> {handler})"),
                None => write!(f, "EndpointChanged({methods} {path})"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        let instruction = Instruction::field_added("User", "vat_id", FieldDefinition::new("str"));
        assert_eq!(instruction.to_string(), "FieldAdded(User.vat_id: str)");

        let instruction = Instruction::field_changed(
            "User",
            "age",
            FieldChanges::new().ty("str").set("default", json!("0")),
        );
        assert_eq!(instruction.to_string(), "FieldChanged(User.age: type, default)");

        let instruction = Instruction::endpoint_restored("/users", ["GET"]).for_handler("list_users");
        assert_eq!(instruction.to_string(), "EndpointRestored(GET /users -> list_users)");
    }

    #[test]
    fn test_empty_field_change_is_noop() {
        let instruction = Instruction::field_changed("User", "age", FieldChanges::new());
        let err = instruction.validate("widen age").unwrap_err();
        assert!(err.is_noop());
        assert!(err.to_string().contains("widen age"));
    }

    #[test]
    fn test_empty_enum_change_is_noop() {
        let instruction = Instruction::enum_members_removed("Role", Vec::<String>::new());
        assert!(instruction.validate("roles").unwrap_err().is_noop());
    }

    #[test]
    fn test_endpoint_change_requires_attributes() {
        let instruction = Instruction::endpoint_changed("/users", ["GET"], EndpointChanges::new());
        assert!(instruction.validate("users").unwrap_err().is_noop());

        let instruction = Instruction::endpoint_changed(
            "/users",
            ["GET"],
            EndpointChanges::new().set("deprecated", json!(true)),
        );
        assert!(instruction.validate("users").is_ok());
    }

    #[test]
    fn test_schema_id() {
        assert_eq!(Instruction::field_removed("User", "x").schema_id(), Some("User"));
        assert_eq!(Instruction::endpoint_removed("/users", ["GET"]).schema_id(), None);
    }
}
