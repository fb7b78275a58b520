//! Error types for the versioning engine
//!
//! Every variant here is a definition error: it points at an authoring mistake
//! in the version chain or the head definitions and is raised eagerly while the
//! chain is built, reconstructed or tracked. Failures raised by transform
//! handlers at request time are not represented here; they travel as the
//! handler's own `anyhow::Error`.

use thiserror::Error;

/// Result type for versioning operations
pub type Result<T> = std::result::Result<T, VersionError>;

/// Versioning definition errors
#[derive(Error, Debug)]
pub enum VersionError {
    // --- Version chain ---
    #[error("Version chain must not be empty")]
    EmptyChain,

    #[error("Versions must be sorted newest first: {previous} is followed by {next}")]
    Ordering { previous: String, next: String },

    #[error("Version {version} is declared more than once")]
    DuplicateVersion { version: String },

    #[error("The oldest version {version} must not carry version changes: there is nothing older to migrate to")]
    InvalidFirstVersion { version: String },

    #[error("Version chain mixes version kinds: {first} and {other}")]
    MixedVersionKinds { first: String, other: String },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Unknown version: {version}")]
    UnknownVersion { version: String },

    // --- Version change construction ---
    #[error("Version change is missing a description")]
    MissingDescription,

    #[error("Version change \"{change}\" has no instructions")]
    MissingInstructions { change: String },

    #[error("Version change \"{change}\" has unknown attribute \"{attribute}\"")]
    UnknownAttribute { change: String, attribute: String },

    #[error("Version change \"{change}\": {instruction} has no effect ({detail})")]
    NoopInstruction {
        change: String,
        instruction: String,
        detail: String,
    },

    #[error("Version change \"{change}\" registers more than one {direction} transform for {target}")]
    DuplicateTransform {
        change: String,
        direction: &'static str,
        target: String,
    },

    #[error("Version change \"{change}\" is already bound to version {bound_to}; it cannot also be bound to {requested}")]
    ChangeAlreadyBound {
        change: String,
        bound_to: String,
        requested: String,
    },

    // --- Schema reconstruction ---
    #[error("Version change \"{change}\": {instruction} refers to unknown schema \"{schema}\"")]
    UnknownSchema {
        change: String,
        instruction: String,
        schema: String,
    },

    #[error("Version change \"{change}\": {instruction} refers to field \"{field}\" which does not exist in schema \"{schema}\"")]
    UnknownField {
        change: String,
        instruction: String,
        schema: String,
        field: String,
    },

    #[error("Version change \"{change}\": {instruction} adds field \"{field}\" which already exists in schema \"{schema}\"")]
    DuplicateField {
        change: String,
        instruction: String,
        schema: String,
        field: String,
    },

    #[error("Version change \"{change}\": {instruction} sets the type of \"{schema}.{field}\" to \"{ty}\", which it already has")]
    TypeAlreadyMatches {
        change: String,
        instruction: String,
        schema: String,
        field: String,
        ty: String,
    },

    #[error("Version change \"{change}\": {instruction} sets attribute \"{attribute}\" of \"{schema}.{field}\" to the value it already has")]
    AttributeAlreadyMatches {
        change: String,
        instruction: String,
        schema: String,
        field: String,
        attribute: String,
    },

    #[error("Version change \"{change}\": {instruction} refers to property \"{property}\" which does not exist in schema \"{schema}\"")]
    UnknownProperty {
        change: String,
        instruction: String,
        schema: String,
        property: String,
    },

    #[error("Version change \"{change}\": {instruction} adds property \"{property}\" which already exists in schema \"{schema}\"")]
    DuplicateProperty {
        change: String,
        instruction: String,
        schema: String,
        property: String,
    },

    #[error("Version change \"{change}\": {instruction} refers to unknown enum \"{enum_id}\"")]
    UnknownEnum {
        change: String,
        instruction: String,
        enum_id: String,
    },

    #[error("Version change \"{change}\": {instruction} removes members {members:?} which do not exist in enum \"{enum_id}\"")]
    UnknownEnumMember {
        change: String,
        instruction: String,
        enum_id: String,
        members: Vec<String>,
    },

    #[error("Version change \"{change}\": {instruction} adds members {members:?} which already exist in enum \"{enum_id}\"")]
    DuplicateEnumMember {
        change: String,
        instruction: String,
        enum_id: String,
        members: Vec<String>,
    },

    // --- Endpoint lifecycle ---
    #[error("Version change \"{change}\": {instruction} matches no endpoint ({detail})")]
    EndpointNotFound {
        change: String,
        instruction: String,
        detail: String,
    },

    #[error("Version change \"{change}\": {instruction} restores an endpoint that is already alive")]
    EndpointAlreadyAlive { change: String, instruction: String },

    #[error("Version change \"{change}\": {instruction} matches several deleted endpoints {candidates:?}; name the handler to restore")]
    AmbiguousRestore {
        change: String,
        instruction: String,
        candidates: Vec<String>,
    },

    #[error("Endpoint {methods} {path} (handler \"{handler}\") exists only in older versions but no version change restores it")]
    UnrestoredEndpoint {
        path: String,
        methods: String,
        handler: String,
    },

    // --- Manifest surface ---
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl VersionError {
    /// Whether this error reports an instruction that would change nothing
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            VersionError::NoopInstruction { .. }
                | VersionError::TypeAlreadyMatches { .. }
                | VersionError::AttributeAlreadyMatches { .. }
        )
    }
}
