//! Heuristic tables for mining failing build/test output.
//!
//! The patterns are data: the localizer and fixer consume whatever the
//! tables match, and tweaks land here rather than in component code.
//! These are heuristics, not contracts.

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// A named pattern applied to combined build/test output.
pub struct OutputHeuristic {
    pub name: &'static str,
    pub pattern: &'static str,
}

/// Lines worth forwarding to the model, most specific first.
pub const ERROR_LINE_HEURISTICS: &[OutputHeuristic] = &[
    OutputHeuristic {
        name: "ts-diagnostic",
        pattern: r"error TS\d+:",
    },
    OutputHeuristic {
        name: "unresolved-module",
        pattern: r"(?i)cannot (?:find|resolve) module",
    },
    OutputHeuristic {
        name: "module-not-found",
        pattern: r"(?i)module not found",
    },
    OutputHeuristic {
        name: "generic-error",
        pattern: r"(?i)\berror\b",
    },
    OutputHeuristic {
        name: "test-failure",
        pattern: r"(?:✕|✗|\bFAIL\b|\bfailing\b)",
    },
    OutputHeuristic {
        name: "assertion",
        pattern: r"(?i)expected .* (?:received|but got|to )",
    },
    OutputHeuristic {
        name: "type-mismatch",
        pattern: r"is not assignable to",
    },
    OutputHeuristic {
        name: "not-a-function",
        pattern: r"(?i)is not a function",
    },
    OutputHeuristic {
        name: "deprecation",
        pattern: r"(?i)\bdeprecated\b",
    },
];

/// Source paths referenced by the output: compiler diagnostics, module
/// URLs, test-runner stack frames, unresolved-module messages.
pub const FILE_PATH_HEURISTICS: &[OutputHeuristic] = &[
    OutputHeuristic {
        name: "stack-frame",
        pattern: r"\(([^()\s]+\.(?:jsx?|tsx?|mjs|cjs)):\d+(?::\d+)?\)",
    },
    OutputHeuristic {
        name: "unresolved-from",
        pattern: r#"(?i)cannot find module\s+'[^']+'\s+from\s+'([^']+)'"#,
    },
    OutputHeuristic {
        name: "module-url",
        pattern: r"file://([^()\s:'\x22]+\.(?:jsx?|tsx?|mjs|cjs))",
    },
    OutputHeuristic {
        name: "diagnostic-location",
        pattern: r"(?m)^\s*([^()\s:'\x22]+\.(?:jsx?|tsx?|mjs|cjs))[:(]\d+",
    },
    OutputHeuristic {
        name: "bare-path",
        pattern: r"([^()\s:'\x22]+\.(?:jsx?|tsx?|mjs|cjs))",
    },
];

fn compiled(table: &'static [OutputHeuristic], slot: &'static OnceLock<Vec<Regex>>) -> &'static [Regex] {
    slot.get_or_init(|| {
        table
            .iter()
            .map(|h| Regex::new(h.pattern).expect("heuristic pattern must compile"))
            .collect()
    })
}

fn error_line_regexes() -> &'static [Regex] {
    static SLOT: OnceLock<Vec<Regex>> = OnceLock::new();
    compiled(ERROR_LINE_HEURISTICS, &SLOT)
}

fn file_path_regexes() -> &'static [Regex] {
    static SLOT: OnceLock<Vec<Regex>> = OnceLock::new();
    compiled(FILE_PATH_HEURISTICS, &SLOT)
}

/// Pick the most informative lines out of combined output, preserving
/// their original order, capped at `max_lines`.
pub fn extract_error_lines(output: &str, max_lines: usize) -> Vec<String> {
    let regexes = error_line_regexes();
    let mut lines = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        if regexes.iter().any(|re| re.is_match(trimmed)) {
            lines.push(trimmed.to_string());
            if lines.len() >= max_lines {
                break;
            }
        }
    }
    lines
}

/// Extract candidate source paths from combined output.
///
/// Absolute paths under `root` are trimmed to relative form; paths that
/// stay absolute, escape the tree, or point into dependency storage are
/// rejected.
pub fn extract_file_paths(output: &str, root: &Path) -> Vec<PathBuf> {
    let regexes = file_path_regexes();
    let mut seen = std::collections::HashSet::new();
    let mut paths = Vec::new();

    for re in regexes {
        for caps in re.captures_iter(output) {
            let Some(raw) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if let Some(path) = normalize_output_path(raw, root) {
                if seen.insert(path.clone()) {
                    paths.push(path);
                }
            }
        }
    }
    paths
}

fn normalize_output_path(raw: &str, root: &Path) -> Option<PathBuf> {
    let raw = raw.trim_matches(|c: char| c == '"' || c == '\'' || c == ',');
    if raw.is_empty() || raw.contains("node_modules") {
        return None;
    }

    let mut path = PathBuf::from(raw);
    if path.is_absolute() {
        path = path.strip_prefix(root).ok()?.to_path_buf();
    }
    if path.is_absolute() || path.as_os_str().is_empty() {
        return None;
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }
    // `./src/a.ts` and `src/a.ts` are the same file.
    let cleaned: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if cleaned.as_os_str().is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
