//! Declarative version manifests
//!
//! A manifest describes head schemas, enums and endpoints together with the
//! version list and its changes, in JSON or TOML. Everything except payload
//! transforms can be expressed this way; computed properties are declared as
//! a JSON pointer into the serialized object.
//!
//! ```json
//! {
//!   "schemas": { "Company": { "fields": { "vat_ids": { "type": "list[str]" } } } },
//!   "versions": [
//!     { "version": "2001-01-01", "changes": [{
//!         "description": "Companies can have several VAT ids",
//!         "instructions": [
//!           { "kind": "field_removed", "schema": "Company", "field": "vat_ids" },
//!           { "kind": "field_added", "schema": "Company", "field": "vat_id", "type": "str" }
//!         ]
//!     }]},
//!     { "version": "2000-01-01" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::change::VersionChange;
use crate::endpoint::{EndpointDefinition, HeadEndpoints, MethodSet, VersionedEndpoints};
use crate::error::{Result, VersionError};
use crate::instruction::{EndpointChanges, FieldChanges, Instruction};
use crate::schema::{ComputedProperty, EnumDefinition, FieldDefinition, HeadSchemas, SchemaDefinition};
use crate::snapshot::VersionedSchemas;
use crate::version::{VersionChain, VersionMarker};

/// Keys a version change object may carry
const CHANGE_ATTRIBUTES: [&str; 3] = ["description", "instructions", "hidden"];

/// The on-disk manifest document
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaDoc>,
    #[serde(default)]
    pub enums: BTreeMap<String, EnumDefinition>,
    #[serde(default)]
    pub endpoints: Vec<EndpointDefinition>,
    /// Newest first
    pub versions: Vec<VersionDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDoc {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
    /// Property name to JSON pointer
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionDoc {
    pub version: String,
    /// Raw change objects; validated when the manifest is built
    #[serde(default)]
    pub changes: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
enum InstructionDoc {
    FieldRemoved {
        schema: String,
        field: String,
    },
    FieldAdded {
        schema: String,
        field: String,
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        attributes: BTreeMap<String, Value>,
    },
    FieldChanged {
        schema: String,
        field: String,
        #[serde(default, rename = "type")]
        ty: Option<String>,
        #[serde(default)]
        set: BTreeMap<String, Value>,
        #[serde(default)]
        unset: Vec<String>,
    },
    PropertyAdded {
        schema: String,
        property: String,
        pointer: String,
    },
    PropertyRemoved {
        schema: String,
        property: String,
    },
    EnumMembersAdded {
        #[serde(rename = "enum")]
        enum_id: String,
        members: BTreeMap<String, Value>,
    },
    EnumMembersRemoved {
        #[serde(rename = "enum")]
        enum_id: String,
        members: Vec<String>,
    },
    EndpointRemoved {
        path: String,
        methods: MethodSet,
    },
    EndpointRestored {
        path: String,
        methods: MethodSet,
        #[serde(default)]
        handler: Option<String>,
    },
    EndpointChanged {
        path: String,
        methods: MethodSet,
        #[serde(default)]
        handler: Option<String>,
        #[serde(default)]
        new_path: Option<String>,
        #[serde(default)]
        new_methods: Option<MethodSet>,
        #[serde(default)]
        set: BTreeMap<String, Value>,
        #[serde(default)]
        unset: Vec<String>,
    },
}

impl From<InstructionDoc> for Instruction {
    fn from(doc: InstructionDoc) -> Self {
        match doc {
            InstructionDoc::FieldRemoved { schema, field } => Instruction::field_removed(schema, field),
            InstructionDoc::FieldAdded {
                schema,
                field,
                ty,
                attributes,
            } => Instruction::field_added(schema, field, FieldDefinition { ty, attributes }),
            InstructionDoc::FieldChanged {
                schema,
                field,
                ty,
                set,
                unset,
            } => {
                let mut changes = FieldChanges::new();
                changes.ty = ty;
                for (attribute, value) in set {
                    changes = changes.set(attribute, value);
                }
                for attribute in unset {
                    changes = changes.unset(attribute);
                }
                Instruction::field_changed(schema, field, changes)
            }
            InstructionDoc::PropertyAdded {
                schema,
                property,
                pointer,
            } => Instruction::property_added(schema, ComputedProperty::from_pointer(property, pointer)),
            InstructionDoc::PropertyRemoved { schema, property } => Instruction::property_removed(schema, property),
            InstructionDoc::EnumMembersAdded { enum_id, members } => Instruction::enum_members_added(enum_id, members),
            InstructionDoc::EnumMembersRemoved { enum_id, members } => {
                Instruction::enum_members_removed(enum_id, members)
            }
            InstructionDoc::EndpointRemoved { path, methods } => Instruction::endpoint_removed(path, methods),
            InstructionDoc::EndpointRestored {
                path,
                methods,
                handler,
            } => Instruction::EndpointRestored {
                path,
                methods,
                handler,
            },
            InstructionDoc::EndpointChanged {
                path,
                methods,
                handler,
                new_path,
                new_methods,
                set,
                unset,
            } => {
                let mut changes = EndpointChanges::new();
                changes.path = new_path;
                changes.methods = new_methods;
                for (attribute, value) in set {
                    changes = changes.set(attribute, value);
                }
                for attribute in unset {
                    changes = changes.unset(attribute);
                }
                Instruction::EndpointChanged {
                    path,
                    methods,
                    handler,
                    changes,
                }
            }
        }
    }
}

/// Validate one raw change object and build the unit
fn parse_change(raw: Value) -> Result<Arc<VersionChange>> {
    let Value::Object(object) = raw else {
        return Err(VersionError::InvalidManifest(
            "version changes must be objects".to_string(),
        ));
    };

    let description = object
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or(VersionError::MissingDescription)?
        .to_string();

    if let Some(attribute) = object.keys().find(|k| !CHANGE_ATTRIBUTES.contains(&k.as_str())) {
        return Err(VersionError::UnknownAttribute {
            change: description,
            attribute: attribute.clone(),
        });
    }

    let instructions: Vec<InstructionDoc> = match object.get("instructions") {
        Some(raw) => serde_json::from_value(raw.clone())?,
        None => Vec::new(),
    };
    if instructions.is_empty() {
        return Err(VersionError::MissingInstructions { change: description });
    }

    let hidden = match object.get("hidden") {
        None => false,
        Some(Value::Bool(hidden)) => *hidden,
        Some(other) => {
            return Err(VersionError::InvalidManifest(format!(
                "version change \"{description}\": \"hidden\" must be a boolean, got {other}"
            )))
        }
    };

    let mut builder = VersionChange::builder(description)
        .instructions(instructions.into_iter().map(Instruction::from));
    if hidden {
        builder = builder.hidden();
    }
    builder.build()
}

/// Head definitions and the validated chain described by a manifest
#[derive(Debug)]
pub struct LoadedManifest {
    pub schemas: HeadSchemas,
    pub endpoints: HeadEndpoints,
    pub chain: VersionChain,
}

impl LoadedManifest {
    pub fn reconstruct(&self) -> Result<VersionedSchemas> {
        VersionedSchemas::reconstruct(&self.schemas, &self.chain)
    }

    pub fn track_endpoints(&self) -> Result<VersionedEndpoints> {
        VersionedEndpoints::track(&self.endpoints, &self.chain)
    }
}

impl Manifest {
    /// Load a manifest, choosing TOML or JSON by file extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate every change and assemble head definitions and chain
    pub fn build(self) -> Result<LoadedManifest> {
        let mut schemas = HeadSchemas::new();
        for (id, doc) in self.schemas {
            let mut definition = SchemaDefinition {
                fields: doc.fields,
                ..SchemaDefinition::default()
            };
            for (name, pointer) in doc.properties {
                definition = definition.property(ComputedProperty::from_pointer(name, pointer));
            }
            schemas = schemas.schema(id, definition);
        }
        schemas.enums = self.enums;

        let mut markers = Vec::with_capacity(self.versions.len());
        for version in self.versions {
            let changes = version
                .changes
                .into_iter()
                .map(parse_change)
                .collect::<Result<Vec<_>>>()?;
            markers.push(VersionMarker::parse(&version.version, changes)?);
        }

        Ok(LoadedManifest {
            schemas,
            endpoints: HeadEndpoints {
                endpoints: self.endpoints,
            },
            chain: VersionChain::new(markers)?,
        })
    }
}

/// Load and build a manifest in one step
pub fn load(path: impl AsRef<Path>) -> Result<LoadedManifest> {
    Manifest::from_path(path)?.build()
}
