//! Schema snapshot reconstruction
//!
//! Starting from head, the chain is walked newest to oldest. Each marker's
//! current working copy is recorded as that version's snapshot, then the
//! marker's schema and enum instructions are applied (in declaration order)
//! to obtain the next older version. The result depends only on the head
//! definitions and the chain, so reconstructing twice yields identical
//! snapshots.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::change::VersionChange;
use crate::checksum::Checksum;
use crate::error::{Result, VersionError};
use crate::instruction::{AttributeDiff, Instruction};
use crate::schema::{EnumDefinition, HeadSchemas, SchemaDefinition};
use crate::version::{ApiVersion, VersionChain};

/// Every schema and enum as it looked at one version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSnapshot {
    pub version: ApiVersion,
    pub schemas: BTreeMap<String, SchemaDefinition>,
    pub enums: BTreeMap<String, EnumDefinition>,
}

impl SchemaSnapshot {
    pub fn schema(&self, id: &str) -> Option<&SchemaDefinition> {
        self.schemas.get(id)
    }

    pub fn enumeration(&self, id: &str) -> Option<&EnumDefinition> {
        self.enums.get(id)
    }

    /// SHA256 over the snapshot's canonical JSON
    pub fn checksum(&self) -> Result<Checksum> {
        Ok(Checksum::from_serializable(self)?)
    }

    /// Evaluate every computed property of `schema` against a serialized object
    pub fn evaluate_properties(&self, schema: &str, object: &Value) -> BTreeMap<String, Value> {
        self.schemas
            .get(schema)
            .map(|definition| {
                definition
                    .properties
                    .iter()
                    .map(|(name, property)| (name.clone(), property.compute(object)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Mutable working copy used during the walk
struct Workspace {
    schemas: BTreeMap<String, SchemaDefinition>,
    enums: BTreeMap<String, EnumDefinition>,
}

impl Workspace {
    fn snapshot(&self, version: ApiVersion) -> SchemaSnapshot {
        SchemaSnapshot {
            version,
            schemas: self.schemas.clone(),
            enums: self.enums.clone(),
        }
    }

    fn schema_mut(&mut self, change: &VersionChange, instruction: &Instruction, id: &str) -> Result<&mut SchemaDefinition> {
        self.schemas.get_mut(id).ok_or_else(|| VersionError::UnknownSchema {
            change: change.description().to_string(),
            instruction: instruction.to_string(),
            schema: id.to_string(),
        })
    }

    fn enum_mut(&mut self, change: &VersionChange, instruction: &Instruction, id: &str) -> Result<&mut EnumDefinition> {
        self.enums.get_mut(id).ok_or_else(|| VersionError::UnknownEnum {
            change: change.description().to_string(),
            instruction: instruction.to_string(),
            enum_id: id.to_string(),
        })
    }

    fn apply(&mut self, change: &VersionChange, instruction: &Instruction) -> Result<()> {
        let describe = || (change.description().to_string(), instruction.to_string());

        match instruction {
            Instruction::FieldRemoved { schema, field } => {
                let definition = self.schema_mut(change, instruction, schema)?;
                if definition.fields.remove(field).is_none() {
                    let (change, instruction) = describe();
                    return Err(VersionError::UnknownField {
                        change,
                        instruction,
                        schema: schema.clone(),
                        field: field.clone(),
                    });
                }
            }
            Instruction::FieldAdded {
                schema,
                field,
                definition: added,
            } => {
                let definition = self.schema_mut(change, instruction, schema)?;
                if definition.fields.contains_key(field) {
                    let (change, instruction) = describe();
                    return Err(VersionError::DuplicateField {
                        change,
                        instruction,
                        schema: schema.clone(),
                        field: field.clone(),
                    });
                }
                definition.fields.insert(field.clone(), added.clone());
            }
            Instruction::FieldChanged {
                schema,
                field,
                changes,
            } => {
                let definition = self.schema_mut(change, instruction, schema)?;
                let Some(current) = definition.fields.get_mut(field) else {
                    let (change, instruction) = describe();
                    return Err(VersionError::UnknownField {
                        change,
                        instruction,
                        schema: schema.clone(),
                        field: field.clone(),
                    });
                };

                if let Some(ty) = &changes.ty {
                    if &current.ty == ty {
                        let (change, instruction) = describe();
                        return Err(VersionError::TypeAlreadyMatches {
                            change,
                            instruction,
                            schema: schema.clone(),
                            field: field.clone(),
                            ty: ty.clone(),
                        });
                    }
                    current.ty = ty.clone();
                }

                for (attribute, diff) in &changes.attributes {
                    let unchanged = match diff {
                        AttributeDiff::Set(value) => current.attributes.get(attribute) == Some(value),
                        AttributeDiff::Unset => !current.attributes.contains_key(attribute),
                    };
                    if unchanged {
                        let (change, instruction) = describe();
                        return Err(VersionError::AttributeAlreadyMatches {
                            change,
                            instruction,
                            schema: schema.clone(),
                            field: field.clone(),
                            attribute: attribute.clone(),
                        });
                    }
                    match diff {
                        AttributeDiff::Set(value) => {
                            current.attributes.insert(attribute.clone(), value.clone());
                        }
                        AttributeDiff::Unset => {
                            current.attributes.remove(attribute);
                        }
                    }
                }
            }
            Instruction::PropertyAdded { schema, property } => {
                let definition = self.schema_mut(change, instruction, schema)?;
                if definition.properties.contains_key(property.name()) {
                    let (change, instruction) = describe();
                    return Err(VersionError::DuplicateProperty {
                        change,
                        instruction,
                        schema: schema.clone(),
                        property: property.name().to_string(),
                    });
                }
                definition
                    .properties
                    .insert(property.name().to_string(), property.clone());
            }
            Instruction::PropertyRemoved { schema, property } => {
                let definition = self.schema_mut(change, instruction, schema)?;
                if definition.properties.remove(property).is_none() {
                    let (change, instruction) = describe();
                    return Err(VersionError::UnknownProperty {
                        change,
                        instruction,
                        schema: schema.clone(),
                        property: property.clone(),
                    });
                }
            }
            Instruction::EnumMembersAdded { enum_id, members } => {
                let definition = self.enum_mut(change, instruction, enum_id)?;
                let clashing: Vec<String> = members
                    .keys()
                    .filter(|name| definition.members.contains_key(*name))
                    .cloned()
                    .collect();
                if !clashing.is_empty() {
                    let (change, instruction) = describe();
                    return Err(VersionError::DuplicateEnumMember {
                        change,
                        instruction,
                        enum_id: enum_id.clone(),
                        members: clashing,
                    });
                }
                definition
                    .members
                    .extend(members.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Instruction::EnumMembersRemoved { enum_id, members } => {
                let definition = self.enum_mut(change, instruction, enum_id)?;
                let missing: Vec<String> = members
                    .iter()
                    .filter(|name| !definition.members.contains_key(*name))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    let (change, instruction) = describe();
                    return Err(VersionError::UnknownEnumMember {
                        change,
                        instruction,
                        enum_id: enum_id.clone(),
                        members: missing,
                    });
                }
                for name in members {
                    definition.members.remove(name);
                }
            }
            Instruction::EndpointRemoved { .. }
            | Instruction::EndpointRestored { .. }
            | Instruction::EndpointChanged { .. } => {}
        }
        Ok(())
    }
}

/// Schema snapshots for every version of a chain, newest first
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedSchemas {
    snapshots: Vec<SchemaSnapshot>,
}

impl VersionedSchemas {
    /// Reconstruct every version's schemas from head
    pub fn reconstruct(head: &HeadSchemas, chain: &VersionChain) -> Result<Self> {
        let mut workspace = Workspace {
            schemas: head.schemas.clone(),
            enums: head.enums.clone(),
        };
        let mut snapshots = Vec::with_capacity(chain.len());

        for marker in chain.newest_first() {
            snapshots.push(workspace.snapshot(marker.value().clone()));
            for change in marker.changes() {
                debug!(version = %marker.value(), change = change.description(), "applying schema changes");
                for instruction in change.instructions() {
                    workspace.apply(change, instruction)?;
                }
            }
        }

        info!(
            versions = snapshots.len(),
            schemas = head.schemas.len(),
            enums = head.enums.len(),
            "schemas reconstructed"
        );
        Ok(Self { snapshots })
    }

    pub fn get(&self, version: &ApiVersion) -> Option<&SchemaSnapshot> {
        self.snapshots.iter().find(|s| &s.version == version)
    }

    /// Snapshot of the newest version not newer than `version`
    pub fn at(&self, version: &ApiVersion) -> Option<&SchemaSnapshot> {
        self.snapshots.iter().find(|s| &s.version <= version)
    }

    pub fn head(&self) -> &SchemaSnapshot {
        &self.snapshots[0]
    }

    pub fn oldest(&self) -> &SchemaSnapshot {
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SchemaSnapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::FieldChanges;
    use crate::schema::{ComputedProperty, FieldDefinition};
    use crate::version::VersionMarker;
    use serde_json::json;

    fn head() -> HeadSchemas {
        HeadSchemas::new()
            .schema(
                "User",
                SchemaDefinition::new()
                    .field("name", FieldDefinition::new("str"))
                    .field("age", FieldDefinition::new("int").with_attribute("ge", json!(0))),
            )
            .enumeration(
                "Role",
                EnumDefinition::new().member("admin", json!("admin")).member("member", json!("member")),
            )
    }

    fn chain(instructions: Vec<Instruction>) -> VersionChain {
        let change = VersionChange::builder("test change")
            .instructions(instructions)
            .build()
            .unwrap();
        VersionChain::new(vec![
            VersionMarker::parse("2001-01-01", vec![change]).unwrap(),
            VersionMarker::parse("2000-01-01", vec![]).unwrap(),
        ])
        .unwrap()
    }

    fn oldest(instructions: Vec<Instruction>) -> Result<SchemaSnapshot> {
        VersionedSchemas::reconstruct(&head(), &chain(instructions)).map(|s| s.oldest().clone())
    }

    #[test]
    fn test_head_snapshot_is_head() {
        let schemas = VersionedSchemas::reconstruct(&head(), &chain(vec![Instruction::field_removed("User", "age")])).unwrap();
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas.head().schemas, head().schemas);
        assert!(schemas.oldest().schema("User").unwrap().fields.get("age").is_none());
    }

    #[test]
    fn test_field_removed_unknown() {
        let err = oldest(vec![Instruction::field_removed("User", "email")]).unwrap_err();
        assert!(matches!(err, VersionError::UnknownField { .. }));
        assert!(err.to_string().contains("test change"));
    }

    #[test]
    fn test_field_added_duplicate() {
        let err = oldest(vec![Instruction::field_added("User", "name", FieldDefinition::new("str"))]).unwrap_err();
        assert!(matches!(err, VersionError::DuplicateField { .. }));
    }

    #[test]
    fn test_unknown_schema() {
        let err = oldest(vec![Instruction::field_removed("Team", "name")]).unwrap_err();
        assert!(matches!(err, VersionError::UnknownSchema { .. }));
    }

    #[test]
    fn test_field_changed_overlays_only_listed_attributes() {
        let snapshot = oldest(vec![Instruction::field_changed(
            "User",
            "age",
            FieldChanges::new().ty("str").set("description", json!("age as text")),
        )])
        .unwrap();
        let age = &snapshot.schema("User").unwrap().fields["age"];
        assert_eq!(age.ty, "str");
        assert_eq!(age.attributes["ge"], json!(0));
        assert_eq!(age.attributes["description"], json!("age as text"));
    }

    #[test]
    fn test_field_changed_unset() {
        let snapshot = oldest(vec![Instruction::field_changed("User", "age", FieldChanges::new().unset("ge"))]).unwrap();
        assert!(snapshot.schema("User").unwrap().fields["age"].attributes.is_empty());

        let err = oldest(vec![Instruction::field_changed("User", "name", FieldChanges::new().unset("ge"))]).unwrap_err();
        assert!(err.is_noop());
    }

    #[test]
    fn test_type_already_matches() {
        let err = oldest(vec![Instruction::field_changed("User", "age", FieldChanges::new().ty("int"))]).unwrap_err();
        assert!(matches!(err, VersionError::TypeAlreadyMatches { .. }));
        assert!(err.is_noop());
    }

    #[test]
    fn test_attribute_already_matches() {
        let err = oldest(vec![Instruction::field_changed("User", "age", FieldChanges::new().set("ge", json!(0)))]).unwrap_err();
        assert!(matches!(err, VersionError::AttributeAlreadyMatches { .. }));
    }

    #[test]
    fn test_properties() {
        let snapshot = oldest(vec![Instruction::property_added(
            "User",
            ComputedProperty::from_pointer("display", "/name"),
        )])
        .unwrap();
        let values = snapshot.evaluate_properties("User", &json!({"name": "Ada"}));
        assert_eq!(values["display"], json!("Ada"));

        let err = oldest(vec![Instruction::property_removed("User", "display")]).unwrap_err();
        assert!(matches!(err, VersionError::UnknownProperty { .. }));
    }

    #[test]
    fn test_duplicate_property() {
        let property = ComputedProperty::from_pointer("display", "/name");
        let err = oldest(vec![
            Instruction::property_added("User", property.clone()),
            Instruction::property_added("User", property),
        ])
        .unwrap_err();
        assert!(matches!(err, VersionError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_enum_members() {
        let snapshot = oldest(vec![
            Instruction::enum_members_removed("Role", ["admin"]),
            Instruction::enum_members_added("Role", [("guest", json!("guest"))]),
        ])
        .unwrap();
        let members: Vec<&str> = snapshot.enumeration("Role").unwrap().members.keys().map(String::as_str).collect();
        assert_eq!(members, vec!["guest", "member"]);
    }

    #[test]
    fn test_enum_member_errors() {
        let err = oldest(vec![Instruction::enum_members_removed("Role", ["owner"])]).unwrap_err();
        match err {
            VersionError::UnknownEnumMember { members, .. } => assert_eq!(members, vec!["owner"]),
            other => panic!("Expected UnknownEnumMember, got {:?}", other),
        }

        let err = oldest(vec![Instruction::enum_members_added("Role", [("admin", json!("admin"))])]).unwrap_err();
        assert!(matches!(err, VersionError::DuplicateEnumMember { .. }));

        let err = oldest(vec![Instruction::enum_members_added("Status", [("x", json!("x"))])]).unwrap_err();
        assert!(matches!(err, VersionError::UnknownEnum { .. }));
    }

    #[test]
    fn test_instructions_apply_in_order() {
        let snapshot = oldest(vec![
            Instruction::field_removed("User", "name"),
            Instruction::field_added("User", "name", FieldDefinition::new("bytes")),
        ])
        .unwrap();
        assert_eq!(snapshot.schema("User").unwrap().fields["name"].ty, "bytes");
    }

    #[test]
    fn test_reconstruction_is_repeatable() {
        let chain = chain(vec![
            Instruction::field_removed("User", "age"),
            Instruction::enum_members_removed("Role", ["admin"]),
        ]);
        let first = VersionedSchemas::reconstruct(&head(), &chain).unwrap();
        let second = VersionedSchemas::reconstruct(&head(), &chain).unwrap();
        assert_eq!(first, second);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.checksum().unwrap(), b.checksum().unwrap());
        }
        assert_ne!(first.head().checksum().unwrap(), first.oldest().checksum().unwrap());
    }
}
