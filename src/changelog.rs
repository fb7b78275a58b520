//! Changelog generation from the version chain

use serde::Serialize;

use crate::version::{ApiVersion, VersionChain};

/// One visible change unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangelogEntry {
    pub description: String,
    pub instructions: Vec<String>,
}

/// Changes introduced by one version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangelogVersion {
    pub version: ApiVersion,
    pub changes: Vec<ChangelogEntry>,
}

/// Every version with at least one visible change, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Changelog {
    pub versions: Vec<ChangelogVersion>,
}

impl Changelog {
    pub fn from_chain(chain: &VersionChain) -> Self {
        let versions = chain
            .newest_first()
            .filter_map(|marker| {
                let changes: Vec<ChangelogEntry> = marker
                    .changes()
                    .iter()
                    .filter(|change| !change.is_hidden_from_changelog())
                    .map(|change| ChangelogEntry {
                        description: change.description().to_string(),
                        instructions: change.instructions().iter().map(ToString::to_string).collect(),
                    })
                    .collect();
                (!changes.is_empty()).then(|| ChangelogVersion {
                    version: marker.value().clone(),
                    changes,
                })
            })
            .collect();
        Self { versions }
    }

    /// Render as Markdown, one section per version
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Changelog\n");
        for version in &self.versions {
            out.push_str(&format!("\n## {}\n\n", version.version));
            for change in &version.changes {
                out.push_str(&format!("- {}\n", change.description));
                for instruction in &change.instructions {
                    out.push_str(&format!("  - `{}`\n", instruction));
                }
            }
        }
        out
    }
}
