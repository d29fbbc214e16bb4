//! Map failing output plus a package name to candidate source files.
//!
//! Four strategies, cheapest first: paths mentioned in the output,
//! files importing the upgraded package, probes by short name and
//! well-known siblings when the pool is small, and finally everything
//! under `src/` or `lib/`. Candidates are ranked by a fixed additive
//! score; the degraded last resort is bounded so fixer prompts stay
//! manageable.

use devpost_adapters::index::RepoIndex;
use devpost_adapters::util::debug_log;
use devpost_core::diagnostics::extract_file_paths;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Pool size below which the short-name and sibling probes kick in.
const SMALL_POOL: usize = 3;

/// Bound on the degraded all-sources fallback.
const FALLBACK_CAP: usize = 25;

/// Ecosystem bundles whose members usually break together.
const SIBLING_PACKAGES: &[(&str, &[&str])] = &[
    ("react", &["react-dom", "@types/react"]),
    ("react-dom", &["react", "@types/react-dom"]),
    ("vue", &["vue-router", "vuex"]),
    ("@angular/core", &["@angular/common", "@angular/platform-browser"]),
    ("jest", &["babel-jest", "@types/jest"]),
    ("eslint", &["@eslint/js", "eslint-config-prettier"]),
    ("webpack", &["webpack-cli", "webpack-dev-server"]),
];

pub struct Localizer;

impl Localizer {
    /// Ranked candidate files for fixing an upgrade of `package`.
    pub fn candidate_files(
        output: &str,
        package: &str,
        index: &mut RepoIndex,
        root: &Path,
    ) -> Vec<PathBuf> {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut pool: Vec<PathBuf> = Vec::new();

        fn extend(paths: Vec<PathBuf>, pool: &mut Vec<PathBuf>, seen: &mut HashSet<PathBuf>) {
            for path in paths {
                if seen.insert(path.clone()) {
                    pool.push(path);
                }
            }
        }

        // 1. Paths the failing output itself names.
        extend(extract_file_paths(output, root), &mut pool, &mut seen);

        // 2. Files importing the upgraded package.
        extend(index.find_files_importing(package), &mut pool, &mut seen);

        // 3. Small pool: probe the short name and known siblings.
        if pool.len() < SMALL_POOL {
            let short = package.rsplit('/').next().unwrap_or(package);
            if short != package {
                extend(index.find_files_importing(short), &mut pool, &mut seen);
            }
            for (name, siblings) in SIBLING_PACKAGES {
                if *name == package {
                    for sibling in *siblings {
                        extend(index.find_files_importing(sibling), &mut pool, &mut seen);
                    }
                }
            }
        }

        // 4. Still nothing: degrade to conventional source roots.
        let degraded = pool.is_empty();
        if degraded {
            debug_log(format!(
                "localizer degraded to src/ and lib/ for {}",
                package
            ));
            extend(
                index.source_files_under_conventional_roots(),
                &mut pool,
                &mut seen,
            );
        }

        let mut scored: Vec<(i32, usize, PathBuf)> = pool
            .into_iter()
            .enumerate()
            .map(|(idx, path)| (priority_score(&path), idx, path))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let cap = if degraded { FALLBACK_CAP } else { usize::MAX };
        scored
            .into_iter()
            .take(cap)
            .map(|(_, _, path)| path)
            .collect()
    }
}

/// Fixed prioritization score from the path shape.
pub fn priority_score(path: &Path) -> i32 {
    let text = path.to_string_lossy().to_lowercase();
    let mut score = 0;

    if text.starts_with("src/") || text.starts_with("src\\") {
        score += 10;
    }
    if text.contains("index") {
        score += 5;
    }
    if text.contains("component") || text.contains("page") {
        score += 3;
    }
    if text.ends_with(".tsx") || text.ends_with(".jsx") {
        score += 2;
    }
    if text.contains("test") || text.contains("spec") {
        score -= 5;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_priority_score_weights() {
        assert_eq!(priority_score(Path::new("src/index.tsx")), 17);
        assert_eq!(priority_score(Path::new("src/components/App.jsx")), 15);
        assert_eq!(priority_score(Path::new("src/app.test.ts")), 5);
        assert_eq!(priority_score(Path::new("docs/readme.js")), 0);
    }

    #[test]
    fn test_output_paths_and_importers_combined() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "src/app.tsx",
            "import React from 'react';\n",
        );
        write(
            dir.path(),
            "src/other.ts",
            "import chalk from 'chalk';\n",
        );
        let mut index = RepoIndex::new(dir.path());

        let output = "error TS2786 in src/other.ts:3:1";
        let candidates = Localizer::candidate_files(output, "react", &mut index, dir.path());

        // Both the named path and the importer are present; the tsx
        // importer outranks the plain ts file named by the output.
        assert!(candidates.contains(&PathBuf::from("src/app.tsx")));
        assert!(candidates.contains(&PathBuf::from("src/other.ts")));
        assert_eq!(candidates[0], PathBuf::from("src/app.tsx"));
    }

    #[test]
    fn test_sibling_probe_on_small_pool() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "src/main.tsx",
            "import { createRoot } from 'react-dom/client';\n",
        );
        let mut index = RepoIndex::new(dir.path());

        // Upgrading react; nothing imports react directly, but a
        // sibling (react-dom) importer exists.
        let candidates = Localizer::candidate_files("", "react", &mut index, dir.path());
        assert_eq!(candidates, vec![PathBuf::from("src/main.tsx")]);
    }

    #[test]
    fn test_degraded_fallback_is_bounded_and_ranked() {
        let dir = tempdir().unwrap();
        for i in 0..40 {
            write(
                dir.path(),
                &format!("src/mod{:02}.js", i),
                "export const x = 1;\n",
            );
        }
        write(dir.path(), "src/index.js", "export const y = 2;\n");
        let mut index = RepoIndex::new(dir.path());

        let candidates =
            Localizer::candidate_files("nothing useful", "left-pad", &mut index, dir.path());
        assert_eq!(candidates.len(), 25);
        assert_eq!(candidates[0], PathBuf::from("src/index.js"));
    }

    #[test]
    fn test_empty_everything_yields_empty() {
        let dir = tempdir().unwrap();
        let mut index = RepoIndex::new(dir.path());
        let candidates = Localizer::candidate_files("", "react", &mut index, dir.path());
        assert!(candidates.is_empty());
    }
}
