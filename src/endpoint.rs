//! Endpoint lifecycle tracking
//!
//! Head defines every endpoint that ever existed. Endpoints that only exist
//! in older versions are declared at head with `only_in_older_versions` and
//! start out deleted; some version change must restore them. Walking the
//! chain from head toward the oldest version, endpoint instructions move
//! endpoints between the alive and deleted sets:
//!
//! ```text
//!   Alive --EndpointRemoved--> Deleted --EndpointRestored--> Alive --> ...
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::change::VersionChange;
use crate::error::{Result, VersionError};
use crate::instruction::{AttributeDiff, EndpointChanges, Instruction};
use crate::version::{ApiVersion, VersionChain};

/// A normalized (upper-case, sorted) set of HTTP methods
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct MethodSet(BTreeSet<String>);

impl MethodSet {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            methods
                .into_iter()
                .map(|m| m.as_ref().trim().to_ascii_uppercase())
                .filter(|m| !m.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, method: &str) -> bool {
        self.0.contains(&method.to_ascii_uppercase())
    }

    /// Whether the two sets share at least one method
    pub fn overlaps(&self, other: &MethodSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    pub fn is_subset(&self, other: &MethodSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn extend(&mut self, other: &MethodSet) {
        self.0.extend(other.0.iter().cloned());
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.iter().collect();
        write!(f, "{}", methods.join(","))
    }
}

impl<const N: usize> From<[&str; N]> for MethodSet {
    fn from(methods: [&str; N]) -> Self {
        MethodSet::new(methods)
    }
}

impl From<Vec<String>> for MethodSet {
    fn from(methods: Vec<String>) -> Self {
        MethodSet::new(methods)
    }
}

impl From<MethodSet> for Vec<String> {
    fn from(methods: MethodSet) -> Self {
        methods.0.into_iter().collect()
    }
}

/// An endpoint as declared at head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDefinition {
    pub path: String,
    pub methods: MethodSet,
    /// Name of the handler serving this endpoint; disambiguates endpoints
    /// sharing a route
    pub handler: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub only_in_older_versions: bool,
}

impl EndpointDefinition {
    pub fn new(path: impl Into<String>, methods: impl Into<MethodSet>, handler: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods: methods.into(),
            handler: handler.into(),
            attributes: BTreeMap::new(),
            only_in_older_versions: false,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Mark the endpoint as existing only in versions older than head
    pub fn only_in_older_versions(mut self) -> Self {
        self.only_in_older_versions = true;
        self
    }

    pub fn serves(&self, path: &str, method: &str) -> bool {
        self.path == path && self.methods.contains(method)
    }

    fn describe(&self) -> String {
        format!("{} {} ({})", self.methods, self.path, self.handler)
    }
}

/// Every endpoint as declared at head
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadEndpoints {
    pub endpoints: Vec<EndpointDefinition>,
}

impl HeadEndpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, definition: EndpointDefinition) -> Self {
        self.endpoints.push(definition);
        self
    }
}

/// Alive and deleted endpoints at one version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSnapshot {
    pub version: ApiVersion,
    pub alive: Vec<EndpointDefinition>,
    /// Deleted endpoints not yet restored at this point of the walk
    pub deleted: Vec<EndpointDefinition>,
}

impl EndpointSnapshot {
    /// The alive endpoint serving `method path`
    pub fn find(&self, path: &str, method: &str) -> Option<&EndpointDefinition> {
        self.alive.iter().find(|e| e.serves(path, method))
    }

    pub fn is_alive(&self, path: &str, method: &str) -> bool {
        self.find(path, method).is_some()
    }
}

#[derive(Debug, Clone)]
struct TrackedEndpoint {
    definition: EndpointDefinition,
    alive: bool,
}

/// Working copy of the endpoint set during the walk
struct EndpointTracker {
    endpoints: Vec<TrackedEndpoint>,
    restored: BTreeSet<usize>,
}

impl EndpointTracker {
    fn new(head: &HeadEndpoints) -> Self {
        let endpoints = head
            .endpoints
            .iter()
            .map(|definition| TrackedEndpoint {
                definition: definition.clone(),
                alive: !definition.only_in_older_versions,
            })
            .collect();
        Self {
            endpoints,
            restored: BTreeSet::new(),
        }
    }

    fn snapshot(&self, version: ApiVersion) -> EndpointSnapshot {
        let (alive, deleted): (Vec<_>, Vec<_>) = self.endpoints.iter().partition(|e| e.alive);
        EndpointSnapshot {
            version,
            alive: alive.into_iter().map(|e| e.definition.clone()).collect(),
            deleted: deleted.into_iter().map(|e| e.definition.clone()).collect(),
        }
    }

    fn matching(&self, path: &str, methods: &MethodSet, handler: Option<&str>, alive: bool) -> Vec<usize> {
        self.endpoints
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.alive == alive
                    && e.definition.path == path
                    && e.definition.methods.is_subset(methods)
                    && handler.map_or(true, |h| e.definition.handler == h)
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn covered_methods(&self, indexes: &[usize]) -> MethodSet {
        let mut covered = MethodSet::default();
        for &index in indexes {
            covered.extend(&self.endpoints[index].definition.methods);
        }
        covered
    }

    fn apply(&mut self, change: &VersionChange, instruction: &Instruction) -> Result<()> {
        let not_found = |detail: String| VersionError::EndpointNotFound {
            change: change.description().to_string(),
            instruction: instruction.to_string(),
            detail,
        };

        match instruction {
            Instruction::EndpointRemoved { path, methods } => {
                let matched = self.matching(path, methods, None, true);
                if matched.is_empty() {
                    return Err(not_found(format!("nothing alive at {methods} {path}")));
                }
                let covered = self.covered_methods(&matched);
                if &covered != methods {
                    return Err(not_found(format!(
                        "only {covered} are alive at {path}, not all of {methods}"
                    )));
                }
                for index in matched {
                    self.endpoints[index].alive = false;
                }
            }
            Instruction::EndpointRestored {
                path,
                methods,
                handler,
            } => {
                let matched = self.matching(path, methods, handler.as_deref(), false);
                if matched.is_empty() {
                    if !self.matching(path, methods, handler.as_deref(), true).is_empty() {
                        return Err(VersionError::EndpointAlreadyAlive {
                            change: change.description().to_string(),
                            instruction: instruction.to_string(),
                        });
                    }
                    return Err(not_found(format!("nothing deleted at {methods} {path}")));
                }

                // Candidates sharing any method compete for the same route
                let overlapping: Vec<usize> = matched
                    .iter()
                    .copied()
                    .filter(|&index| {
                        let methods = &self.endpoints[index].definition.methods;
                        matched.iter().any(|&other| {
                            other != index && methods.overlaps(&self.endpoints[other].definition.methods)
                        })
                    })
                    .collect();
                if !overlapping.is_empty() {
                    return Err(VersionError::AmbiguousRestore {
                        change: change.description().to_string(),
                        instruction: instruction.to_string(),
                        candidates: overlapping
                            .iter()
                            .map(|&index| self.endpoints[index].definition.describe())
                            .collect(),
                    });
                }

                let covered = self.covered_methods(&matched);
                if &covered != methods {
                    return Err(not_found(format!(
                        "only {covered} are deleted at {path}, not all of {methods}"
                    )));
                }
                for index in matched {
                    self.endpoints[index].alive = true;
                    self.restored.insert(index);
                }
            }
            Instruction::EndpointChanged {
                path,
                methods,
                handler,
                changes,
            } => {
                let matched = self.matching(path, methods, handler.as_deref(), true);
                if matched.is_empty() {
                    return Err(not_found(format!("nothing alive at {methods} {path}")));
                }
                for index in matched {
                    overlay(&mut self.endpoints[index].definition, changes)
                        .map_err(|detail| VersionError::NoopInstruction {
                            change: change.description().to_string(),
                            instruction: instruction.to_string(),
                            detail,
                        })?;
                }
            }
            Instruction::FieldRemoved { .. }
            | Instruction::FieldAdded { .. }
            | Instruction::FieldChanged { .. }
            | Instruction::PropertyAdded { .. }
            | Instruction::PropertyRemoved { .. }
            | Instruction::EnumMembersAdded { .. }
            | Instruction::EnumMembersRemoved { .. } => {}
        }
        Ok(())
    }

    /// Every endpoint declared for older versions only must have come back
    fn check_restored(&self) -> Result<()> {
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.definition.only_in_older_versions && !self.restored.contains(&index) {
                return Err(VersionError::UnrestoredEndpoint {
                    path: endpoint.definition.path.clone(),
                    methods: endpoint.definition.methods.to_string(),
                    handler: endpoint.definition.handler.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Apply endpoint overrides, reporting the first one that changes nothing
fn overlay(definition: &mut EndpointDefinition, changes: &EndpointChanges) -> std::result::Result<(), String> {
    if let Some(path) = &changes.path {
        if &definition.path == path {
            return Err(format!("path is already {path}"));
        }
        definition.path = path.clone();
    }
    if let Some(methods) = &changes.methods {
        if &definition.methods == methods {
            return Err(format!("methods are already {methods}"));
        }
        definition.methods = methods.clone();
    }
    for (attribute, diff) in &changes.attributes {
        match diff {
            AttributeDiff::Set(value) => {
                if definition.attributes.get(attribute) == Some(value) {
                    return Err(format!("attribute \"{attribute}\" already has this value"));
                }
                definition.attributes.insert(attribute.clone(), value.clone());
            }
            AttributeDiff::Unset => {
                if definition.attributes.remove(attribute).is_none() {
                    return Err(format!("attribute \"{attribute}\" is already unset"));
                }
            }
        }
    }
    Ok(())
}

/// Endpoint snapshots for every version of a chain, newest first
#[derive(Debug, Clone)]
pub struct VersionedEndpoints {
    snapshots: Vec<EndpointSnapshot>,
}

impl VersionedEndpoints {
    /// Replay every endpoint instruction from head toward the oldest version
    pub fn track(head: &HeadEndpoints, chain: &VersionChain) -> Result<Self> {
        let mut tracker = EndpointTracker::new(head);
        let mut snapshots = Vec::with_capacity(chain.len());

        for marker in chain.newest_first() {
            snapshots.push(tracker.snapshot(marker.value().clone()));
            for change in marker.changes() {
                debug!(version = %marker.value(), change = change.description(), "applying endpoint changes");
                for instruction in change.instructions() {
                    tracker.apply(change, instruction)?;
                }
            }
        }
        tracker.check_restored()?;

        info!(
            versions = snapshots.len(),
            endpoints = head.endpoints.len(),
            "endpoint lifecycle tracked"
        );
        Ok(Self { snapshots })
    }

    pub fn get(&self, version: &ApiVersion) -> Option<&EndpointSnapshot> {
        self.snapshots.iter().find(|s| &s.version == version)
    }

    /// Snapshot of the newest version not newer than `version`
    pub fn at(&self, version: &ApiVersion) -> Option<&EndpointSnapshot> {
        self.snapshots.iter().find(|s| &s.version <= version)
    }

    pub fn head(&self) -> &EndpointSnapshot {
        &self.snapshots[0]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EndpointSnapshot> {
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
    use crate::version::VersionMarker;
    use serde_json::json;

    fn chain(changes: Vec<Instruction>) -> VersionChain {
        let change = VersionChange::builder("endpoint changes")
            .instructions(changes)
            .build()
            .unwrap();
        VersionChain::new(vec![
            VersionMarker::parse("2001-01-01", vec![change]).unwrap(),
            VersionMarker::parse("2000-01-01", vec![]).unwrap(),
        ])
        .unwrap()
    }

    fn v(raw: &str) -> ApiVersion {
        ApiVersion::parse(raw).unwrap()
    }

    #[test]
    fn test_method_set_normalizes() {
        let methods = MethodSet::new(["post", " get "]);
        assert_eq!(methods.to_string(), "GET,POST");
        assert!(methods.contains("get"));
        assert!(MethodSet::from(["GET"]).is_subset(&methods));
    }

    #[test]
    fn test_removed_endpoint_is_gone_in_older_version() {
        let head = HeadEndpoints::new()
            .endpoint(EndpointDefinition::new("/users", ["GET"], "list_users"))
            .endpoint(EndpointDefinition::new("/users/export", ["POST"], "export_users"));
        let chain = chain(vec![Instruction::endpoint_removed("/users/export", ["POST"])]);

        let endpoints = VersionedEndpoints::track(&head, &chain).unwrap();
        assert!(endpoints.head().is_alive("/users/export", "POST"));

        let old = endpoints.get(&v("2000-01-01")).unwrap();
        assert!(!old.is_alive("/users/export", "POST"));
        assert!(old.is_alive("/users", "GET"));
        assert_eq!(old.deleted.len(), 1);
    }

    #[test]
    fn test_remove_requires_exact_methods() {
        let head = HeadEndpoints::new().endpoint(EndpointDefinition::new("/users", ["GET"], "list_users"));
        let chain = chain(vec![Instruction::endpoint_removed("/users", ["GET", "POST"])]);

        let err = VersionedEndpoints::track(&head, &chain).unwrap_err();
        assert!(matches!(err, VersionError::EndpointNotFound { .. }));
    }

    #[test]
    fn test_remove_unknown_endpoint() {
        let head = HeadEndpoints::new().endpoint(EndpointDefinition::new("/users", ["GET"], "list_users"));
        let chain = chain(vec![Instruction::endpoint_removed("/teams", ["GET"])]);

        let err = VersionedEndpoints::track(&head, &chain).unwrap_err();
        assert!(matches!(err, VersionError::EndpointNotFound { .. }));
    }

    #[test]
    fn test_restore_older_only_endpoint() {
        let head = HeadEndpoints::new()
            .endpoint(EndpointDefinition::new("/legacy", ["GET"], "legacy").only_in_older_versions());
        let chain = chain(vec![Instruction::endpoint_restored("/legacy", ["GET"])]);

        let endpoints = VersionedEndpoints::track(&head, &chain).unwrap();
        assert!(!endpoints.head().is_alive("/legacy", "GET"));
        assert!(endpoints.get(&v("2000-01-01")).unwrap().is_alive("/legacy", "GET"));
    }

    #[test]
    fn test_unrestored_endpoint() {
        let head = HeadEndpoints::new()
            .endpoint(EndpointDefinition::new("/users", ["GET"], "list_users"))
            .endpoint(EndpointDefinition::new("/legacy", ["GET"], "legacy").only_in_older_versions());
        let chain = chain(vec![Instruction::endpoint_removed("/users", ["GET"])]);

        let err = VersionedEndpoints::track(&head, &chain).unwrap_err();
        match err {
            VersionError::UnrestoredEndpoint { path, handler, .. } => {
                assert_eq!(path, "/legacy");
                assert_eq!(handler, "legacy");
            }
            other => panic!("Expected UnrestoredEndpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_restore_alive_endpoint() {
        let head = HeadEndpoints::new().endpoint(EndpointDefinition::new("/users", ["GET"], "list_users"));
        let chain = chain(vec![Instruction::endpoint_restored("/users", ["GET"])]);

        let err = VersionedEndpoints::track(&head, &chain).unwrap_err();
        assert!(matches!(err, VersionError::EndpointAlreadyAlive { .. }));
    }

    #[test]
    fn test_ambiguous_restore_names_candidates() {
        let head = HeadEndpoints::new()
            .endpoint(EndpointDefinition::new("/items", ["GET"], "items_v1").only_in_older_versions())
            .endpoint(EndpointDefinition::new("/items", ["GET"], "items_v2").only_in_older_versions());
        let chain = chain(vec![Instruction::endpoint_restored("/items", ["GET"])]);

        let err = VersionedEndpoints::track(&head, &chain).unwrap_err();
        match err {
            VersionError::AmbiguousRestore { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates[0].contains("items_v1"));
                assert!(candidates[1].contains("items_v2"));
            }
            other => panic!("Expected AmbiguousRestore, got {:?}", other),
        }
    }

    #[test]
    fn test_restore_with_handler_disambiguates() {
        let head = HeadEndpoints::new()
            .endpoint(EndpointDefinition::new("/items", ["GET"], "items_v1").only_in_older_versions())
            .endpoint(EndpointDefinition::new("/items", ["GET"], "items_v2"));
        let v2 = VersionChange::builder("items_v2 replaced items_v1")
            .instruction(Instruction::endpoint_removed("/items", ["GET"]))
            .instruction(Instruction::endpoint_restored("/items", ["GET"]).for_handler("items_v1"))
            .build()
            .unwrap();
        let chain = VersionChain::new(vec![
            VersionMarker::parse("2001-01-01", vec![v2]).unwrap(),
            VersionMarker::parse("2000-01-01", vec![]).unwrap(),
        ])
        .unwrap();

        let endpoints = VersionedEndpoints::track(&head, &chain).unwrap();
        assert_eq!(endpoints.head().find("/items", "GET").unwrap().handler, "items_v2");
        let old = endpoints.get(&v("2000-01-01")).unwrap();
        assert_eq!(old.find("/items", "GET").unwrap().handler, "items_v1");
    }

    #[test]
    fn test_endpoint_changed() {
        let head = HeadEndpoints::new().endpoint(
            EndpointDefinition::new("/users", ["GET"], "list_users").with_attribute("status_code", json!(200)),
        );
        let chain = chain(vec![Instruction::endpoint_changed(
            "/users",
            ["GET"],
            EndpointChanges::new().path("/people").set("status_code", json!(201)),
        )]);

        let endpoints = VersionedEndpoints::track(&head, &chain).unwrap();
        let old = endpoints.get(&v("2000-01-01")).unwrap();
        let endpoint = old.find("/people", "GET").unwrap();
        assert_eq!(endpoint.attributes["status_code"], json!(201));
        assert!(endpoints.head().is_alive("/users", "GET"));
        assert_eq!(head.endpoints[0].path, "/users");
    }

    #[test]
    fn test_endpoint_changed_noop() {
        let head = HeadEndpoints::new().endpoint(
            EndpointDefinition::new("/users", ["GET"], "list_users").with_attribute("deprecated", json!(false)),
        );
        let chain = chain(vec![Instruction::endpoint_changed(
            "/users",
            ["GET"],
            EndpointChanges::new().set("deprecated", json!(false)),
        )]);

        let err = VersionedEndpoints::track(&head, &chain).unwrap_err();
        assert!(err.is_noop());
    }

    #[test]
    fn test_endpoint_changed_without_alive_match() {
        let head = HeadEndpoints::new()
            .endpoint(EndpointDefinition::new("/users", ["GET"], "list_users"))
            .endpoint(EndpointDefinition::new("/legacy", ["GET"], "legacy").only_in_older_versions());
        let chain = chain(vec![
            Instruction::endpoint_restored("/legacy", ["GET"]),
            Instruction::endpoint_changed("/teams", ["GET"], EndpointChanges::new().set("deprecated", json!(true))),
        ]);

        let err = VersionedEndpoints::track(&head, &chain).unwrap_err();
        assert!(matches!(err, VersionError::EndpointNotFound { .. }));
    }

    #[test]
    fn test_restore_requires_exact_methods() {
        let head = HeadEndpoints::new()
            .endpoint(EndpointDefinition::new("/legacy", ["GET"], "legacy").only_in_older_versions());
        let chain = chain(vec![Instruction::endpoint_restored("/legacy", ["GET", "POST"])]);

        match VersionedEndpoints::track(&head, &chain) {
            Err(VersionError::EndpointNotFound { detail, .. }) => {
                assert!(detail.contains("only GET are deleted"));
            }
            other => panic!("Expected EndpointNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_endpoint_changed_same_path_or_methods_is_noop() {
        let head = HeadEndpoints::new().endpoint(EndpointDefinition::new("/users", ["GET"], "list_users"));

        let chain_path = chain(vec![Instruction::endpoint_changed(
            "/users",
            ["GET"],
            EndpointChanges::new().path("/users"),
        )]);
        match VersionedEndpoints::track(&head, &chain_path) {
            Err(VersionError::NoopInstruction { detail, .. }) => assert_eq!(detail, "path is already /users"),
            other => panic!("Expected NoopInstruction, got {:?}", other),
        }

        let chain_methods = chain(vec![Instruction::endpoint_changed(
            "/users",
            ["GET"],
            EndpointChanges::new().methods(["get"]),
        )]);
        match VersionedEndpoints::track(&head, &chain_methods) {
            Err(VersionError::NoopInstruction { detail, .. }) => assert_eq!(detail, "methods are already GET"),
            other => panic!("Expected NoopInstruction, got {:?}", other),
        }
    }

    #[test]
    fn test_restore_with_overlapping_candidates_is_ambiguous() {
        let head = HeadEndpoints::new()
            .endpoint(EndpointDefinition::new("/items", ["GET"], "read_items").only_in_older_versions())
            .endpoint(EndpointDefinition::new("/items", ["GET", "POST"], "items").only_in_older_versions());
        let chain = chain(vec![Instruction::endpoint_restored("/items", ["GET", "POST"])]);

        match VersionedEndpoints::track(&head, &chain) {
            Err(VersionError::AmbiguousRestore { candidates, .. }) => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.iter().any(|c| c.contains("read_items")));
            }
            other => panic!("Expected AmbiguousRestore, got {:?}", other),
        }
    }

    #[test]
    fn test_restore_disjoint_candidates_together() {
        let head = HeadEndpoints::new()
            .endpoint(EndpointDefinition::new("/items", ["GET"], "read_items").only_in_older_versions())
            .endpoint(EndpointDefinition::new("/items", ["POST"], "write_items").only_in_older_versions());
        let chain = chain(vec![Instruction::endpoint_restored("/items", ["GET", "POST"])]);

        let endpoints = VersionedEndpoints::track(&head, &chain).unwrap();
        let old = endpoints.get(&v("2000-01-01")).unwrap();
        assert_eq!(old.find("/items", "GET").unwrap().handler, "read_items");
        assert_eq!(old.find("/items", "POST").unwrap().handler, "write_items");
        assert!(MethodSet::from(["GET"]).overlaps(&MethodSet::from(["GET", "POST"])));
        assert!(!MethodSet::from(["GET"]).overlaps(&MethodSet::from(["POST"])));
    }
}
