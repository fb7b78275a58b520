//! Manifest fixture tests

use std::path::Path;

use familiar_versioning::{manifest, ApiVersion, Changelog, VersionError};
use serde_json::json;

fn fixtures_path() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").leak()
}

fn version(raw: &str) -> ApiVersion {
    ApiVersion::parse(raw).unwrap()
}

#[test]
fn test_fixture_reconstructs_every_version() {
    let loaded = manifest::load(fixtures_path().join("manifest.json")).unwrap();
    assert_eq!(loaded.chain.len(), 3);
    assert_eq!(loaded.chain.head().value(), &version("2002-01-01"));

    let schemas = loaded.reconstruct().unwrap();

    let head = schemas.head();
    assert!(head.enumeration("Role").unwrap().members.contains_key("member"));
    let properties = head.evaluate_properties("Company", &json!({"vat_ids": ["A", "B"]}));
    assert_eq!(properties.get("primary_vat_id"), Some(&json!("A")));

    let v2001 = schemas.get(&version("2001-01-01")).unwrap();
    assert_eq!(
        v2001.enumeration("Role").unwrap().members.keys().collect::<Vec<_>>(),
        vec!["admin"]
    );
    assert!(!v2001.schema("User").unwrap().fields["role"].attributes.contains_key("default"));
    assert!(v2001.schema("Company").unwrap().fields.contains_key("vat_ids"));

    let v2000 = schemas.oldest();
    let company = v2000.schema("Company").unwrap();
    assert_eq!(company.fields.keys().collect::<Vec<_>>(), vec!["name", "vat_id"]);
    assert!(company.properties.is_empty());
}

#[test]
fn test_fixture_tracks_endpoints() {
    let loaded = manifest::load(fixtures_path().join("manifest.json")).unwrap();
    let endpoints = loaded.track_endpoints().unwrap();

    assert!(!endpoints.head().is_alive("/users/legacy", "GET"));
    assert_eq!(endpoints.head().deleted.len(), 1);

    let v2001 = endpoints.get(&version("2001-01-01")).unwrap();
    assert_eq!(v2001.find("/users/legacy", "GET").unwrap().handler, "list_legacy_users");
    assert!(v2001.find("/companies", "GET").unwrap().attributes.is_empty());

    let v2000 = endpoints.get(&version("2000-01-01")).unwrap();
    assert_eq!(
        v2000.find("/companies", "GET").unwrap().attributes.get("deprecated"),
        Some(&json!(true))
    );
    assert!(v2000.is_alive("/companies", "POST"));
}

#[test]
fn test_fixture_changelog_hides_hidden_changes() {
    let loaded = manifest::load(fixtures_path().join("manifest.json")).unwrap();
    let changelog = Changelog::from_chain(&loaded.chain);

    let descriptions: Vec<&str> = changelog
        .versions
        .iter()
        .flat_map(|v| v.changes.iter().map(|c| c.description.as_str()))
        .collect();
    assert_eq!(
        descriptions,
        vec![
            "Introduce the member role",
            "Drop the legacy user listing",
            "Companies can have several VAT ids",
        ]
    );
}

#[test]
fn test_unknown_change_attribute_rejected() {
    match manifest::load(fixtures_path().join("unknown_attribute.json")) {
        Err(VersionError::UnknownAttribute { attribute, .. }) => assert_eq!(attribute, "renamed_at"),
        other => panic!("Expected UnknownAttribute, got {:?}", other),
    }
}
