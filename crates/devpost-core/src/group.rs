//! Upgrade plans: ordered, reasoned groups of packages.

use crate::package::PackageRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A batch of packages upgraded together and committed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageGroup {
    pub members: Vec<PackageRef>,
    pub reasoning: String,
    /// Higher priority is processed first; ties keep plan order.
    pub priority: i32,
}

impl PackageGroup {
    pub fn new(members: Vec<PackageRef>, reasoning: impl Into<String>, priority: i32) -> Self {
        Self {
            members,
            reasoning: reasoning.into(),
            priority,
        }
    }

    /// Short human label, e.g. `react, react-dom`.
    pub fn label(&self) -> String {
        self.members
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Commit message for this group, one line for a singleton and a
    /// bulleted body otherwise.
    pub fn commit_message(&self) -> String {
        if self.members.len() == 1 {
            let pkg = &self.members[0];
            return format!(
                "chore(deps): upgrade {} from {} to {}",
                pkg.name, pkg.current_version, pkg.latest_version
            );
        }
        let mut message = format!("chore(deps): upgrade {} packages\n", self.members.len());
        for pkg in &self.members {
            message.push_str(&format!(
                "\n  - {}: {} \u{2192} {}",
                pkg.name, pkg.current_version, pkg.latest_version
            ));
        }
        message
    }
}

/// The work plan: all outdated packages plus their grouping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpgradePlan {
    pub packages: Vec<PackageRef>,
    pub groups: Vec<PackageGroup>,
}

impl UpgradePlan {
    /// Check that every package appears in exactly one group.
    pub fn validate_coverage(&self) -> Result<(), String> {
        validate_coverage(&self.packages, &self.groups)
    }

    /// Sort groups by descending priority, preserving plan order on ties.
    pub fn sort_groups(&mut self) {
        self.groups.sort_by(|a, b| b.priority.cmp(&a.priority));
    }
}

/// Every package in exactly one group: no omissions, no duplicates,
/// no unknown names.
pub fn validate_coverage(
    packages: &[PackageRef],
    groups: &[PackageGroup],
) -> Result<(), String> {
    let known: HashSet<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();

    for group in groups {
        for member in &group.members {
            if !known.contains(member.name.as_str()) {
                return Err(format!("unknown package in group: {}", member.name));
            }
            if !seen.insert(member.name.as_str()) {
                return Err(format!("package appears in more than one group: {}", member.name));
            }
        }
    }

    for pkg in packages {
        if !seen.contains(pkg.name.as_str()) {
            return Err(format!("package missing from all groups: {}", pkg.name));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, from: &str, to: &str) -> PackageRef {
        PackageRef::new(name, from, to)
    }

    #[test]
    fn test_commit_message_singleton() {
        let group = PackageGroup::new(vec![pkg("chalk", "4.0.0", "5.3.0")], "solo", 1);
        assert_eq!(
            group.commit_message(),
            "chore(deps): upgrade chalk from 4.0.0 to 5.3.0"
        );
    }

    #[test]
    fn test_commit_message_multi() {
        let group = PackageGroup::new(
            vec![pkg("react", "17.0.2", "18.3.1"), pkg("react-dom", "17.0.2", "18.3.1")],
            "react pair",
            2,
        );
        let message = group.commit_message();
        assert!(message.starts_with("chore(deps): upgrade 2 packages\n"));
        assert!(message.contains("  - react: 17.0.2 \u{2192} 18.3.1"));
        assert!(message.contains("  - react-dom: 17.0.2 \u{2192} 18.3.1"));
    }

    #[test]
    fn test_validate_coverage_accepts_partition() {
        let packages = vec![pkg("a", "1.0.0", "2.0.0"), pkg("b", "1.0.0", "1.1.0")];
        let groups = vec![
            PackageGroup::new(vec![packages[0].clone()], "major", 2),
            PackageGroup::new(vec![packages[1].clone()], "minor", 1),
        ];
        assert!(validate_coverage(&packages, &groups).is_ok());
    }

    #[test]
    fn test_validate_coverage_rejects_duplicate() {
        let packages = vec![pkg("a", "1.0.0", "2.0.0")];
        let groups = vec![
            PackageGroup::new(vec![packages[0].clone()], "one", 2),
            PackageGroup::new(vec![packages[0].clone()], "again", 1),
        ];
        assert!(validate_coverage(&packages, &groups)
            .unwrap_err()
            .contains("more than one group"));
    }

    #[test]
    fn test_validate_coverage_rejects_missing_and_unknown() {
        let packages = vec![pkg("a", "1.0.0", "2.0.0"), pkg("b", "1.0.0", "1.1.0")];
        let partial = vec![PackageGroup::new(vec![packages[0].clone()], "one", 1)];
        assert!(validate_coverage(&packages, &partial)
            .unwrap_err()
            .contains("missing"));

        let stranger = vec![PackageGroup::new(
            vec![
                packages[0].clone(),
                packages[1].clone(),
                pkg("c", "1.0.0", "2.0.0"),
            ],
            "extra",
            1,
        )];
        assert!(validate_coverage(&packages, &stranger)
            .unwrap_err()
            .contains("unknown"));
    }

    #[test]
    fn test_sort_groups_descending_priority_stable() {
        let mut plan = UpgradePlan {
            packages: vec![],
            groups: vec![
                PackageGroup::new(vec![], "low", 1),
                PackageGroup::new(vec![], "high", 5),
                PackageGroup::new(vec![], "also-high", 5),
            ],
        };
        plan.sort_groups();
        let order: Vec<&str> = plan.groups.iter().map(|g| g.reasoning.as_str()).collect();
        assert_eq!(order, vec!["high", "also-high", "low"]);
    }
}
