//! Version change units
//!
//! A [`VersionChange`] bundles the instructions and payload transforms that
//! separate one version from the version immediately older than it. Units are
//! built once by the API author, validated on construction and then shared
//! immutably; binding a unit to its version marker happens exactly once, when
//! the chain is assembled.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::endpoint::MethodSet;
use crate::error::{Result, VersionError};
use crate::instruction::Instruction;
use crate::migration::{RequestInfo, ResponseInfo};
use crate::version::ApiVersion;

/// Handler migrating an inbound request one step toward head
pub type RequestHandler = Arc<dyn Fn(&mut RequestInfo) -> anyhow::Result<()> + Send + Sync>;

/// Handler migrating an outbound response one step away from head
pub type ResponseHandler = Arc<dyn Fn(&mut ResponseInfo) -> anyhow::Result<()> + Send + Sync>;

/// What a payload transform applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformTarget {
    /// Any body of this schema, on any route
    Schema(String),
    /// Any body on this route, whatever its schema
    Path { path: String, methods: MethodSet },
}

impl TransformTarget {
    pub fn schema(id: impl Into<String>) -> Self {
        TransformTarget::Schema(id.into())
    }

    pub fn path(path: impl Into<String>, methods: impl Into<MethodSet>) -> Self {
        TransformTarget::Path {
            path: path.into(),
            methods: methods.into(),
        }
    }

    pub fn matches(&self, schema: Option<&str>, path: &str, method: &str) -> bool {
        match self {
            TransformTarget::Schema(id) => schema == Some(id.as_str()),
            TransformTarget::Path {
                path: target,
                methods,
            } => target == path && methods.contains(method),
        }
    }
}

impl fmt::Display for TransformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformTarget::Schema(id) => write!(f, "schema {id}"),
            TransformTarget::Path { path, methods } => write!(f, "{methods} {path}"),
        }
    }
}

/// A named request body transform, applied moving toward head
#[derive(Clone)]
pub struct RequestTransform {
    name: String,
    target: TransformTarget,
    handler: RequestHandler,
}

impl RequestTransform {
    pub fn new<F>(name: impl Into<String>, target: TransformTarget, handler: F) -> Self
    where
        F: Fn(&mut RequestInfo) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            target,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &TransformTarget {
        &self.target
    }

    pub fn apply(&self, request: &mut RequestInfo) -> anyhow::Result<()> {
        (self.handler)(request)
    }
}

impl fmt::Debug for RequestTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTransform")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// A named response body transform, applied moving away from head
#[derive(Clone)]
pub struct ResponseTransform {
    name: String,
    target: TransformTarget,
    migrate_http_errors: bool,
    handler: ResponseHandler,
}

impl ResponseTransform {
    pub fn new<F>(name: impl Into<String>, target: TransformTarget, handler: F) -> Self
    where
        F: Fn(&mut ResponseInfo) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            target,
            migrate_http_errors: false,
            handler: Arc::new(handler),
        }
    }

    /// Also run on responses with a status code of 300 or above
    pub fn migrate_http_errors(mut self) -> Self {
        self.migrate_http_errors = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &TransformTarget {
        &self.target
    }

    pub fn runs_on_errors(&self) -> bool {
        self.migrate_http_errors
    }

    pub fn apply(&self, response: &mut ResponseInfo) -> anyhow::Result<()> {
        (self.handler)(response)
    }
}

impl fmt::Debug for ResponseTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseTransform")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("migrate_http_errors", &self.migrate_http_errors)
            .finish_non_exhaustive()
    }
}

/// A described bundle of instructions and transforms bound to one version
#[derive(Debug)]
pub struct VersionChange {
    description: String,
    instructions: Vec<Instruction>,
    request_transforms: Vec<RequestTransform>,
    response_transforms: Vec<ResponseTransform>,
    hidden_from_changelog: bool,
    bound_to: OnceLock<ApiVersion>,
}

impl VersionChange {
    pub fn builder(description: impl Into<String>) -> VersionChangeBuilder {
        VersionChangeBuilder {
            description: description.into(),
            instructions: Vec::new(),
            request_transforms: Vec::new(),
            response_transforms: Vec::new(),
            hidden_from_changelog: false,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn request_transforms(&self) -> &[RequestTransform] {
        &self.request_transforms
    }

    pub fn response_transforms(&self) -> &[ResponseTransform] {
        &self.response_transforms
    }

    pub fn is_hidden_from_changelog(&self) -> bool {
        self.hidden_from_changelog
    }

    /// The version this change was bound to, once the chain is built
    pub fn bound_to(&self) -> Option<&ApiVersion> {
        self.bound_to.get()
    }

    /// Schema ids named by instructions or schema-targeted transforms
    pub fn touched_schemas(&self) -> BTreeSet<&str> {
        let transform_targets = self
            .request_transforms
            .iter()
            .map(RequestTransform::target)
            .chain(self.response_transforms.iter().map(ResponseTransform::target))
            .filter_map(|target| match target {
                TransformTarget::Schema(id) => Some(id.as_str()),
                TransformTarget::Path { .. } => None,
            });

        self.instructions
            .iter()
            .filter_map(Instruction::schema_id)
            .chain(transform_targets)
            .collect()
    }

    pub(crate) fn bind(&self, version: &ApiVersion) -> Result<()> {
        self.bound_to
            .set(version.clone())
            .map_err(|_| VersionError::ChangeAlreadyBound {
                change: self.description.clone(),
                bound_to: self
                    .bound_to
                    .get()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                requested: version.to_string(),
            })
    }
}

/// Builder collecting a change's instructions and transforms
pub struct VersionChangeBuilder {
    description: String,
    instructions: Vec<Instruction>,
    request_transforms: Vec<RequestTransform>,
    response_transforms: Vec<ResponseTransform>,
    hidden_from_changelog: bool,
}

impl VersionChangeBuilder {
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn instructions(mut self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        self.instructions.extend(instructions);
        self
    }

    pub fn request_transform(mut self, transform: RequestTransform) -> Self {
        self.request_transforms.push(transform);
        self
    }

    pub fn response_transform(mut self, transform: ResponseTransform) -> Self {
        self.response_transforms.push(transform);
        self
    }

    /// Leave this change out of generated changelogs
    pub fn hidden(mut self) -> Self {
        self.hidden_from_changelog = true;
        self
    }

    /// Validate the unit and freeze it
    pub fn build(self) -> Result<Arc<VersionChange>> {
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(VersionError::MissingDescription);
        }

        if self.instructions.is_empty()
            && self.request_transforms.is_empty()
            && self.response_transforms.is_empty()
        {
            return Err(VersionError::MissingInstructions { change: description });
        }

        for instruction in &self.instructions {
            instruction.validate(&description)?;
        }

        let mut seen = BTreeSet::new();
        for transform in &self.request_transforms {
            if !seen.insert(transform.target()) {
                return Err(VersionError::DuplicateTransform {
                    change: description,
                    direction: "request",
                    target: transform.target().to_string(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for transform in &self.response_transforms {
            if !seen.insert(transform.target()) {
                return Err(VersionError::DuplicateTransform {
                    change: description,
                    direction: "response",
                    target: transform.target().to_string(),
                });
            }
        }

        Ok(Arc::new(VersionChange {
            description,
            instructions: self.instructions,
            request_transforms: self.request_transforms,
            response_transforms: self.response_transforms,
            hidden_from_changelog: self.hidden_from_changelog,
            bound_to: OnceLock::new(),
        }))
    }
}
