//! Snapshot comparison
//!
//! Lists what changed between two reconstructed snapshots and flags which of
//! those changes would break a client written against the older one.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schema::SchemaDefinition;
use crate::snapshot::SchemaSnapshot;
use crate::version::ApiVersion;

/// Type of snapshot change, seen from the older version toward the newer one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    SchemaAdded,
    SchemaRemoved,
    FieldAdded,
    FieldRemoved,
    TypeChanged,
    AttributeChanged,
    PropertyAdded,
    PropertyRemoved,
    EnumAdded,
    EnumRemoved,
    EnumMemberAdded,
    EnumMemberRemoved,
}

impl ChangeType {
    /// Check if this change type is typically breaking
    pub fn is_typically_breaking(&self) -> bool {
        matches!(
            self,
            ChangeType::SchemaRemoved
                | ChangeType::FieldRemoved
                | ChangeType::TypeChanged
                | ChangeType::PropertyRemoved
                | ChangeType::EnumRemoved
                | ChangeType::EnumMemberRemoved
        )
    }
}

/// A detected change between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotChange {
    pub change_type: ChangeType,
    /// Schema or enum id the change belongs to
    pub owner: String,
    /// Path to the changed element (e.g., "User.vat_id")
    pub path: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub is_breaking: bool,
}

impl SnapshotChange {
    fn new(change_type: ChangeType, owner: &str, member: Option<&str>) -> Self {
        let path = match member {
            Some(member) => format!("{owner}.{member}"),
            None => owner.to_string(),
        };
        Self {
            change_type,
            owner: owner.to_string(),
            path,
            old_value: None,
            new_value: None,
            is_breaking: change_type.is_typically_breaking(),
        }
    }

    fn values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }
}

/// All changes between two versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub from: ApiVersion,
    pub to: ApiVersion,
    pub changes: Vec<SnapshotChange>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn is_breaking(&self) -> bool {
        self.changes.iter().any(|c| c.is_breaking)
    }

    /// Schema and enum ids with at least one change
    pub fn owners(&self) -> BTreeSet<&str> {
        self.changes.iter().map(|c| c.owner.as_str()).collect()
    }
}

fn keys_diff<'a, V>(
    old: &'a BTreeMap<String, V>,
    new: &'a BTreeMap<String, V>,
) -> (Vec<&'a String>, Vec<&'a String>, Vec<&'a String>) {
    let removed = old.keys().filter(|k| !new.contains_key(*k)).collect();
    let added = new.keys().filter(|k| !old.contains_key(*k)).collect();
    let common = old.keys().filter(|k| new.contains_key(*k)).collect();
    (added, removed, common)
}

fn diff_schema(id: &str, old: &SchemaDefinition, new: &SchemaDefinition, changes: &mut Vec<SnapshotChange>) {
    let (added, removed, common) = keys_diff(&old.fields, &new.fields);
    for field in removed {
        changes.push(
            SnapshotChange::new(ChangeType::FieldRemoved, id, Some(field.as_str()))
                .values(Some(old.fields[field].ty.clone()), None),
        );
    }
    for field in added {
        changes.push(
            SnapshotChange::new(ChangeType::FieldAdded, id, Some(field.as_str()))
                .values(None, Some(new.fields[field].ty.clone())),
        );
    }
    for field in common {
        let (before, after) = (&old.fields[field], &new.fields[field]);
        if before.ty != after.ty {
            changes.push(
                SnapshotChange::new(ChangeType::TypeChanged, id, Some(field.as_str()))
                    .values(Some(before.ty.clone()), Some(after.ty.clone())),
            );
        }
        if before.attributes != after.attributes {
            changes.push(SnapshotChange::new(ChangeType::AttributeChanged, id, Some(field.as_str())).values(
                serde_json::to_string(&before.attributes).ok(),
                serde_json::to_string(&after.attributes).ok(),
            ));
        }
    }

    let (added, removed, _) = keys_diff(&old.properties, &new.properties);
    for property in removed {
        changes.push(SnapshotChange::new(ChangeType::PropertyRemoved, id, Some(property.as_str())));
    }
    for property in added {
        changes.push(SnapshotChange::new(ChangeType::PropertyAdded, id, Some(property.as_str())));
    }
}

/// Compare an older snapshot with a newer one
pub fn diff_snapshots(older: &SchemaSnapshot, newer: &SchemaSnapshot) -> SnapshotDiff {
    let mut changes = Vec::new();

    let (added, removed, common) = keys_diff(&older.schemas, &newer.schemas);
    for id in removed {
        changes.push(SnapshotChange::new(ChangeType::SchemaRemoved, id, None));
    }
    for id in added {
        changes.push(SnapshotChange::new(ChangeType::SchemaAdded, id, None));
    }
    for id in common {
        diff_schema(id, &older.schemas[id], &newer.schemas[id], &mut changes);
    }

    let (added, removed, common) = keys_diff(&older.enums, &newer.enums);
    for id in removed {
        changes.push(SnapshotChange::new(ChangeType::EnumRemoved, id, None));
    }
    for id in added {
        changes.push(SnapshotChange::new(ChangeType::EnumAdded, id, None));
    }
    for id in common {
        let (members_added, members_removed, _) = keys_diff(&older.enums[id].members, &newer.enums[id].members);
        for member in members_removed {
            changes.push(SnapshotChange::new(ChangeType::EnumMemberRemoved, id, Some(member.as_str())));
        }
        for member in members_added {
            changes.push(SnapshotChange::new(ChangeType::EnumMemberAdded, id, Some(member.as_str())));
        }
    }

    SnapshotDiff {
        from: older.version.clone(),
        to: newer.version.clone(),
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumDefinition, FieldDefinition};
    use serde_json::json;

    fn snapshot(version: &str, schema: SchemaDefinition, roles: &[&str]) -> SchemaSnapshot {
        let mut role = EnumDefinition::new();
        for name in roles {
            role = role.member(*name, json!(name));
        }
        SchemaSnapshot {
            version: ApiVersion::parse(version).unwrap(),
            schemas: BTreeMap::from([("User".to_string(), schema)]),
            enums: BTreeMap::from([("Role".to_string(), role)]),
        }
    }

    #[test]
    fn test_identical_snapshots() {
        let schema = SchemaDefinition::new().field("name", FieldDefinition::new("str"));
        let older = snapshot("2000-01-01", schema.clone(), &["admin"]);
        let newer = snapshot("2001-01-01", schema, &["admin"]);
        assert!(diff_snapshots(&older, &newer).is_empty());
    }

    #[test]
    fn test_detects_field_and_enum_changes() {
        let older = snapshot(
            "2000-01-01",
            SchemaDefinition::new()
                .field("vat_id", FieldDefinition::new("str"))
                .field("age", FieldDefinition::new("int")),
            &["admin", "guest"],
        );
        let newer = snapshot(
            "2001-01-01",
            SchemaDefinition::new()
                .field("vat_ids", FieldDefinition::new("list[str]"))
                .field("age", FieldDefinition::new("str")),
            &["admin"],
        );

        let diff = diff_snapshots(&older, &newer);
        let kinds: Vec<(ChangeType, &str)> = diff.changes.iter().map(|c| (c.change_type, c.path.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeType::FieldRemoved, "User.vat_id"),
                (ChangeType::FieldAdded, "User.vat_ids"),
                (ChangeType::TypeChanged, "User.age"),
                (ChangeType::EnumMemberRemoved, "Role.guest"),
            ]
        );
        assert!(diff.is_breaking());
        assert_eq!(diff.owners().into_iter().collect::<Vec<_>>(), vec!["Role", "User"]);
    }

    #[test]
    fn test_additions_are_not_breaking() {
        let older = snapshot("2000-01-01", SchemaDefinition::new(), &["admin"]);
        let newer = snapshot(
            "2001-01-01",
            SchemaDefinition::new().field("email", FieldDefinition::new("str")),
            &["admin", "guest"],
        );
        let diff = diff_snapshots(&older, &newer);
        assert_eq!(diff.changes.len(), 2);
        assert!(!diff.is_breaking());
    }
}
