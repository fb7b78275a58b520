//! Runtime migration pipeline
//!
//! Requests arrive shaped for the caller's version and are migrated forward,
//! one version change at a time, until they match head. Responses leave head
//! shaped and are migrated backward until they match the caller's version.
//! Changes bound to the caller's own version or older never run.
//!
//! Transform failures are returned exactly as the handler raised them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::{ApiConfig, DefaultVersion};
use crate::error::{Result, VersionError};
use crate::version::{ApiVersion, VersionChain};

/// An inbound request body with the parts of the request transforms may touch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub body: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

impl RequestInfo {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }
}

/// An outbound response body with its status and headers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub body: Value,
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ResponseInfo {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            status_code: 200,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 300
    }
}

/// The route a payload travels on and the schema of its body, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    pub schema: Option<&'a str>,
    pub path: &'a str,
    pub method: &'a str,
}

impl<'a> Route<'a> {
    pub fn new(path: &'a str, method: &'a str) -> Self {
        Self {
            schema: None,
            path,
            method,
        }
    }

    pub fn with_schema(mut self, schema: &'a str) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// The caller's resolved version for one request/response cycle
///
/// Created once at the request boundary and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionedContext {
    version: Option<ApiVersion>,
}

impl VersionedContext {
    pub fn new(version: ApiVersion) -> Self {
        Self {
            version: Some(version),
        }
    }

    /// No version requested: traffic passes through untouched
    pub fn unversioned() -> Self {
        Self::default()
    }

    pub fn version(&self) -> Option<&ApiVersion> {
        self.version.as_ref()
    }

    /// Resolve a raw version header against the chain
    pub fn resolve(chain: &VersionChain, header: Option<&str>, config: &ApiConfig) -> Result<Self> {
        let Some(raw) = header.map(str::trim).filter(|raw| !raw.is_empty()) else {
            let version = match config.default_version {
                DefaultVersion::Head => Some(chain.head().value().clone()),
                DefaultVersion::Oldest => Some(chain.oldest().value().clone()),
                DefaultVersion::None => None,
            };
            return Ok(Self { version });
        };

        let version = ApiVersion::parse(raw)?;
        let head = chain.head().value();
        if !version.same_kind(head) {
            return Err(VersionError::MixedVersionKinds {
                first: head.to_string(),
                other: version.to_string(),
            });
        }
        if chain.contains(&version) {
            return Ok(Self::new(version));
        }
        if config.reject_unknown_versions {
            return Err(VersionError::UnknownVersion {
                version: version.to_string(),
            });
        }
        chain
            .at_or_before(&version)
            .map(|marker| Self::new(marker.value().clone()))
            .ok_or(VersionError::UnknownVersion {
                version: version.to_string(),
            })
    }

    /// Resolve from request headers, reading the configured version header
    ///
    /// Header names are matched case-insensitively.
    pub fn from_headers(
        chain: &VersionChain,
        headers: &BTreeMap<String, String>,
        config: &ApiConfig,
    ) -> Result<Self> {
        let header = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&config.version_header))
            .map(|(_, value)| value.as_str());
        Self::resolve(chain, header, config)
    }
}

impl VersionChain {
    /// Migrate a request from the caller's version up to head
    pub fn migrate_request(
        &self,
        context: &VersionedContext,
        route: Route<'_>,
        mut request: RequestInfo,
    ) -> anyhow::Result<RequestInfo> {
        let Some(version) = context.version() else {
            return Ok(request);
        };

        for marker in self.between(version, self.head().value()).rev() {
            for change in marker.changes() {
                for transform in change.request_transforms() {
                    if transform.target().matches(route.schema, route.path, route.method) {
                        debug!(
                            version = %marker.value(),
                            change = change.description(),
                            transform = transform.name(),
                            "migrating request"
                        );
                        transform.apply(&mut request)?;
                    }
                }
            }
        }
        Ok(request)
    }

    /// Migrate a response from head down to the caller's version
    ///
    /// Responses with a status of 300 or above are only touched by transforms
    /// that opted into migrating errors.
    pub fn migrate_response(
        &self,
        context: &VersionedContext,
        route: Route<'_>,
        mut response: ResponseInfo,
    ) -> anyhow::Result<ResponseInfo> {
        let Some(version) = context.version() else {
            return Ok(response);
        };

        for marker in self.between(version, self.head().value()) {
            for change in marker.changes() {
                for transform in change.response_transforms() {
                    if response.is_error() && !transform.runs_on_errors() {
                        continue;
                    }
                    if transform.target().matches(route.schema, route.path, route.method) {
                        debug!(
                            version = %marker.value(),
                            change = change.description(),
                            transform = transform.name(),
                            "migrating response"
                        );
                        transform.apply(&mut response)?;
                    }
                }
            }
        }
        Ok(response)
    }
}
