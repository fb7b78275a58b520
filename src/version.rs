//! API version identifiers and the version chain

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::change::VersionChange;
use crate::error::{Result, VersionError};

/// An API version identifier
///
/// Either a calendar date (`2001-01-01`) or a semantic version tag
/// (`1.2.0`, `v1.2.0`). A single chain uses one kind throughout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ApiVersion {
    Date(NaiveDate),
    Tag(Version),
}

impl ApiVersion {
    /// Parse a date (`YYYY-MM-DD`) or a semver tag (leading `v` allowed)
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(ApiVersion::Date(date));
        }
        let tag = raw.strip_prefix('v').unwrap_or(raw);
        Version::parse(tag)
            .map(ApiVersion::Tag)
            .map_err(|_| VersionError::InvalidVersion(raw.to_string()))
    }

    /// Build a date version, failing on impossible dates
    pub fn date(year: i32, month: u32, day: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(ApiVersion::Date)
            .ok_or_else(|| VersionError::InvalidVersion(format!("{year}-{month}-{day}")))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiVersion::Date(_) => "date",
            ApiVersion::Tag(_) => "tag",
        }
    }

    pub(crate) fn same_kind(&self, other: &ApiVersion) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiVersion::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            ApiVersion::Tag(version) => write!(f, "v{}", version),
        }
    }
}

impl FromStr for ApiVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        ApiVersion::parse(s)
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self> {
        ApiVersion::parse(&value)
    }
}

impl From<ApiVersion> for String {
    fn from(version: ApiVersion) -> Self {
        version.to_string()
    }
}

/// One position in the version chain and the changes that separate it from
/// the version immediately older than it
#[derive(Debug, Clone)]
pub struct VersionMarker {
    value: ApiVersion,
    changes: Vec<Arc<VersionChange>>,
}

impl VersionMarker {
    pub fn new(value: ApiVersion, changes: Vec<Arc<VersionChange>>) -> Self {
        Self { value, changes }
    }

    /// A marker without changes, as the oldest version must be
    pub fn initial(value: ApiVersion) -> Self {
        Self::new(value, Vec::new())
    }

    /// Parse the version value and attach changes
    pub fn parse(value: &str, changes: Vec<Arc<VersionChange>>) -> Result<Self> {
        Ok(Self::new(ApiVersion::parse(value)?, changes))
    }

    pub fn value(&self) -> &ApiVersion {
        &self.value
    }

    pub fn changes(&self) -> &[Arc<VersionChange>] {
        &self.changes
    }
}

/// The ordered, immutable sequence of every known API version
///
/// Markers are stored newest first; the first marker is head.
#[derive(Debug, Clone)]
pub struct VersionChain {
    markers: Vec<VersionMarker>,
}

impl VersionChain {
    /// Validate the markers and bind every version change to its marker
    pub fn new(markers: Vec<VersionMarker>) -> Result<Self> {
        let head = markers.first().ok_or(VersionError::EmptyChain)?;

        if let Some(other) = markers.iter().find(|m| !m.value.same_kind(&head.value)) {
            return Err(VersionError::MixedVersionKinds {
                first: head.value.to_string(),
                other: other.value.to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for marker in &markers {
            if !seen.insert(&marker.value) {
                return Err(VersionError::DuplicateVersion {
                    version: marker.value.to_string(),
                });
            }
        }

        for pair in markers.windows(2) {
            if pair[0].value < pair[1].value {
                return Err(VersionError::Ordering {
                    previous: pair[0].value.to_string(),
                    next: pair[1].value.to_string(),
                });
            }
        }

        if let Some(oldest) = markers.last() {
            if !oldest.changes.is_empty() {
                return Err(VersionError::InvalidFirstVersion {
                    version: oldest.value.to_string(),
                });
            }
        }

        // Nothing is bound unless every change can be
        let mut claimed: BTreeMap<*const VersionChange, &ApiVersion> = BTreeMap::new();
        for marker in &markers {
            for change in &marker.changes {
                let previous = change
                    .bound_to()
                    .or_else(|| claimed.get(&Arc::as_ptr(change)).copied());
                if let Some(bound_to) = previous {
                    return Err(VersionError::ChangeAlreadyBound {
                        change: change.description().to_string(),
                        bound_to: bound_to.to_string(),
                        requested: marker.value.to_string(),
                    });
                }
                claimed.insert(Arc::as_ptr(change), &marker.value);
            }
        }

        for marker in &markers {
            for change in &marker.changes {
                change.bind(&marker.value)?;
            }
        }

        tracing::debug!(
            versions = markers.len(),
            head = %head.value,
            "version chain built"
        );

        Ok(Self { markers })
    }

    /// The newest version
    pub fn head(&self) -> &VersionMarker {
        &self.markers[0]
    }

    /// The oldest version
    pub fn oldest(&self) -> &VersionMarker {
        &self.markers[self.markers.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn newest_first(&self) -> std::slice::Iter<'_, VersionMarker> {
        self.markers.iter()
    }

    pub fn oldest_first(&self) -> std::iter::Rev<std::slice::Iter<'_, VersionMarker>> {
        self.markers.iter().rev()
    }

    /// All version values, newest first
    pub fn versions(&self) -> Vec<&ApiVersion> {
        self.markers.iter().map(|m| &m.value).collect()
    }

    pub fn get(&self, version: &ApiVersion) -> Option<&VersionMarker> {
        self.markers.iter().find(|m| &m.value == version)
    }

    pub fn contains(&self, version: &ApiVersion) -> bool {
        self.get(version).is_some()
    }

    /// Parse a raw version and look it up in the chain
    pub fn resolve(&self, raw: &str) -> Result<&VersionMarker> {
        let version = ApiVersion::parse(raw)?;
        self.get(&version).ok_or(VersionError::UnknownVersion {
            version: version.to_string(),
        })
    }

    /// The newest marker not newer than `version`
    pub fn at_or_before(&self, version: &ApiVersion) -> Option<&VersionMarker> {
        self.markers.iter().find(|m| &m.value <= version)
    }

    /// Markers strictly newer than `older` and not newer than `newer`,
    /// newest first
    ///
    /// These are exactly the markers whose changes separate the two versions.
    pub fn between<'a>(
        &'a self,
        older: &'a ApiVersion,
        newer: &'a ApiVersion,
    ) -> impl DoubleEndedIterator<Item = &'a VersionMarker> + 'a {
        self.markers
            .iter()
            .filter(move |m| &m.value > older && &m.value <= newer)
    }

    /// Every bound change with its version, newest first
    pub fn changes(&self) -> impl Iterator<Item = (&ApiVersion, &Arc<VersionChange>)> {
        self.markers
            .iter()
            .flat_map(|m| m.changes.iter().map(move |c| (&m.value, c)))
    }

    /// Schema ids touched by any instruction or transform in the chain
    pub fn versioned_schemas(&self) -> BTreeSet<&str> {
        self.changes()
            .flat_map(|(_, change)| change.touched_schemas())
            .collect()
    }
}
