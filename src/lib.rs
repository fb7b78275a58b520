//! Familiar API Versioning
//!
//! Expose every historical version of an API from a single head definition
//! of schemas and endpoints.
//!
//! ## Features
//!
//! - **Version Chain**: Ordered, validated list of date or semver versions
//! - **Reversible Instructions**: Typed descriptions of how each older version differed
//! - **Schema Reconstruction**: Every version's schemas and enums, rebuilt from head
//! - **Endpoint Lifecycle**: Alive endpoints per version, with restore checks
//! - **Runtime Migration**: Requests migrated up to head, responses back down
//! - **Manifests**: Declarative JSON/TOML description of head and versions
//!
//! ## Architecture
//!
//! ```text
//!             head schemas ──► VersionedSchemas::reconstruct ──► SchemaSnapshot per version
//!                               ▲
//! VersionChain (newest first) ──┤
//!   └─ VersionMarker            ▼
//!        └─ VersionChange   head endpoints ──► VersionedEndpoints::track ──► EndpointSnapshot per version
//!             ├─ Instruction
//!             ├─ RequestTransform  ──► VersionChain::migrate_request  (caller version → head)
//!             └─ ResponseTransform ──► VersionChain::migrate_response (head → caller version)
//! ```

pub mod change;
pub mod changelog;
pub mod checksum;
pub mod config;
pub mod diff;
pub mod endpoint;
pub mod error;
pub mod instruction;
pub mod manifest;
pub mod migration;
pub mod schema;
pub mod snapshot;
pub mod version;

pub use change::{RequestTransform, ResponseTransform, TransformTarget, VersionChange, VersionChangeBuilder};
pub use changelog::Changelog;
pub use checksum::Checksum;
pub use config::{ApiConfig, DefaultVersion, VersioningConfig};
pub use diff::{diff_snapshots, ChangeType, SnapshotChange, SnapshotDiff};
pub use endpoint::{EndpointDefinition, EndpointSnapshot, HeadEndpoints, MethodSet, VersionedEndpoints};
pub use error::{Result, VersionError};
pub use instruction::{AttributeDiff, EndpointChanges, FieldChanges, Instruction};
pub use manifest::{LoadedManifest, Manifest};
pub use migration::{RequestInfo, ResponseInfo, Route, VersionedContext};
pub use schema::{ComputedProperty, EnumDefinition, FieldDefinition, HeadSchemas, SchemaDefinition};
pub use snapshot::{SchemaSnapshot, VersionedSchemas};
pub use version::{ApiVersion, VersionChain, VersionMarker};
