//! Partition packages into ordered, reasoned upgrade groups.
//!
//! The model-assisted path asks for a JSON grouping and validates it
//! strictly; any failure (no model, malformed response, bad coverage)
//! falls back to a deterministic major/non-major split. Grouping
//! affects ordering and commit granularity, never correctness.

use crate::llm::parse::parse_structured;
use crate::llm::prompts::GROUPING_SYSTEM;
use crate::llm::ModelClient;
use devpost_adapters::util::debug_log;
use devpost_core::group::{validate_coverage, PackageGroup};
use devpost_core::package::PackageRef;
use serde::Deserialize;
use std::collections::HashMap;

const MIN_PRIORITY: i32 = 1;
const MAX_PRIORITY: i32 = 10;

#[derive(Debug, Deserialize)]
struct GroupEnvelope {
    groups: Vec<GroupSpec>,
}

#[derive(Debug, Deserialize)]
struct GroupSpec {
    packages: Vec<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    priority: i32,
}

pub struct Grouper<'a> {
    client: Option<&'a ModelClient>,
}

impl<'a> Grouper<'a> {
    pub fn new(client: Option<&'a ModelClient>) -> Self {
        Self { client }
    }

    /// Produce groups sorted by descending priority (ties keep order).
    pub async fn group(&self, packages: &[PackageRef]) -> Vec<PackageGroup> {
        if packages.is_empty() {
            return Vec::new();
        }

        if let Some(client) = self.client {
            match self.model_groups(client, packages).await {
                Ok(groups) => return sorted(groups),
                Err(err) => {
                    debug_log(format!("model grouping unavailable: {}", err));
                }
            }
        }

        sorted(fallback_groups(packages))
    }

    async fn model_groups(
        &self,
        client: &ModelClient,
        packages: &[PackageRef],
    ) -> anyhow::Result<Vec<PackageGroup>> {
        let mut listing = String::new();
        for pkg in packages {
            listing.push_str(&format!(
                "- {} ({} -> {}, {} bump)\n",
                pkg.name,
                pkg.current_version,
                pkg.latest_version,
                pkg.bump()
            ));
        }
        let user = format!("Outdated packages:\n{}\nGroup them for upgrading.", listing);

        let content = client.complete(GROUPING_SYSTEM, &user).await?;
        let envelope: GroupEnvelope = parse_structured(&content)?;
        resolve_groups(envelope, packages)
    }
}

/// Turn validated name lists back into groups of full refs.
fn resolve_groups(
    envelope: GroupEnvelope,
    packages: &[PackageRef],
) -> anyhow::Result<Vec<PackageGroup>> {
    let by_name: HashMap<&str, &PackageRef> =
        packages.iter().map(|p| (p.name.as_str(), p)).collect();

    let mut groups = Vec::new();
    for spec in envelope.groups {
        let mut members = Vec::new();
        for name in &spec.packages {
            let Some(pkg) = by_name.get(name.as_str()) else {
                anyhow::bail!("model grouped unknown package '{}'", name);
            };
            members.push((*pkg).clone());
        }
        if members.is_empty() {
            continue;
        }
        groups.push(PackageGroup::new(
            members,
            spec.reasoning,
            spec.priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
        ));
    }

    validate_coverage(packages, &groups).map_err(|reason| anyhow::anyhow!(reason))?;
    Ok(groups)
}

/// Deterministic fallback: a major-bump group (priority 2) and a
/// non-major group (priority 1), omitting empty partitions.
pub fn fallback_groups(packages: &[PackageRef]) -> Vec<PackageGroup> {
    let (major, rest): (Vec<PackageRef>, Vec<PackageRef>) =
        packages.iter().cloned().partition(PackageRef::is_major_bump);

    let mut groups = Vec::new();
    if !major.is_empty() {
        groups.push(PackageGroup::new(
            major,
            "major version bumps, most likely to break",
            2,
        ));
    }
    if !rest.is_empty() {
        groups.push(PackageGroup::new(rest, "minor and patch updates", 1));
    }
    groups
}

fn sorted(mut groups: Vec<PackageGroup>) -> Vec<PackageGroup> {
    groups.sort_by(|a, b| b.priority.cmp(&a.priority));
    groups
}
