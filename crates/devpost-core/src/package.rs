//! Package references and version arithmetic.

use serde::{Deserialize, Serialize};

/// An outdated dependency discovered by the analyzer.
///
/// Versions are cleaned semantic-version strings (any leading range
/// operator stripped). Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub current_version: String,
    pub latest_version: String,
    /// Homepage or repository URL, when the registry knows one.
    pub homepage: Option<String>,
}

impl PackageRef {
    pub fn new(name: impl Into<String>, current: &str, latest: &str) -> Self {
        Self {
            name: name.into(),
            current_version: clean_version(current),
            latest_version: clean_version(latest),
            homepage: None,
        }
    }

    pub fn with_homepage(mut self, homepage: Option<String>) -> Self {
        self.homepage = homepage;
        self
    }

    /// The kind of version jump this upgrade represents. Cosmetic only;
    /// grouping fallback and changelog slicing use the major numbers directly.
    pub fn bump(&self) -> BumpKind {
        classify_bump(&self.current_version, &self.latest_version)
    }

    pub fn is_major_bump(&self) -> bool {
        self.bump() == BumpKind::Major
    }

    /// The unscoped tail of the package name (`@scope/pkg` -> `pkg`).
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Major version components, when both sides parse.
    pub fn major_span(&self) -> Option<(u64, u64)> {
        let (from, _, _) = parse_version(&self.current_version)?;
        let (to, _, _) = parse_version(&self.latest_version)?;
        Some((from, to))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpKind {
    Major,
    Minor,
    Patch,
    Unknown,
}

impl BumpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BumpKind::Major => "major",
            BumpKind::Minor => "minor",
            BumpKind::Patch => "patch",
            BumpKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for BumpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strip leading range operators and whitespace from a version string.
///
/// `^1.2.3` -> `1.2.3`, `>= 2.0.0` -> `2.0.0`, `v3.1.0` -> `3.1.0`.
pub fn clean_version(raw: &str) -> String {
    let mut rest = raw.trim();
    loop {
        let before = rest;
        for op in [">=", "<=", "^", "~", ">", "<", "="] {
            if let Some(stripped) = rest.strip_prefix(op) {
                rest = stripped.trim_start();
            }
        }
        if rest == before {
            break;
        }
    }
    // A leading `v` tag prefix is common in registry/tag data.
    if let Some(stripped) = rest.strip_prefix('v') {
        if stripped.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            rest = stripped;
        }
    }
    rest.to_string()
}

/// Coerce a version string into a `(major, minor, patch)` triple.
///
/// Prerelease/build suffixes are dropped; missing minor/patch coerce to
/// zero so `"5"` and `"5.0"` still classify.
pub fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let cleaned = clean_version(version);
    let mut parts = cleaned.split('.');
    let major: u64 = numeric_prefix(parts.next()?)?;
    let minor = parts.next().and_then(numeric_prefix).unwrap_or(0);
    let patch = parts.next().and_then(numeric_prefix).unwrap_or(0);
    Some((major, minor, patch))
}

fn numeric_prefix(part: &str) -> Option<u64> {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Classify the jump between two versions.
pub fn classify_bump(current: &str, latest: &str) -> BumpKind {
    match (parse_version(current), parse_version(latest)) {
        (Some((c_major, c_minor, c_patch)), Some((l_major, l_minor, l_patch))) => {
            if l_major != c_major {
                BumpKind::Major
            } else if l_minor != c_minor {
                BumpKind::Minor
            } else if l_patch != c_patch {
                BumpKind::Patch
            } else {
                BumpKind::Unknown
            }
        }
        _ => BumpKind::Unknown,
    }
}
