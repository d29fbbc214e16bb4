//! Repository index: which files exist, what they import, what they
//! define.
//!
//! The walk honors the project-level ignore file when present (via the
//! `ignore` walker) and a built-in skip list otherwise. Extraction is
//! intentionally regex-based and tolerant: a file that fails to read
//! is logged and skipped, never fatal.

use crate::util::debug_log;
use ignore::WalkBuilder;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::UNIX_EPOCH;

const SOURCE_EXTENSIONS: [&str; 6] = ["js", "jsx", "ts", "tsx", "mjs", "cjs"];

/// Skipped even when the project has no ignore file.
const DEFAULT_IGNORE_DIRS: [&str; 7] = [
    "node_modules",
    "dist",
    "build",
    "coverage",
    "out",
    ".next",
    ".git",
];

/// Filesystem facts about one indexed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFacts {
    pub size: u64,
    pub modified_ms: i64,
}

/// One import declaration: the source module and the local names bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFact {
    pub from: String,
    pub names: Vec<String>,
}

/// A named top-level function, arrow-bound identifier, or class method
/// (qualified `ClassName.method`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionFact {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub params: Vec<String>,
    pub has_type: bool,
}

/// Lazily built, read-only-after-build view of the project's sources.
#[derive(Debug)]
pub struct RepoIndex {
    root: PathBuf,
    built: bool,
    files: BTreeMap<PathBuf, FileFacts>,
    imports: BTreeMap<PathBuf, Vec<ImportFact>>,
    functions: BTreeMap<PathBuf, Vec<FunctionFact>>,
}

impl RepoIndex {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            built: false,
            files: BTreeMap::new(),
            imports: BTreeMap::new(),
            functions: BTreeMap::new(),
        }
    }

    /// Build the index on first use; later calls are no-ops.
    pub fn ensure_built(&mut self) {
        if self.built {
            return;
        }
        self.built = true;

        let walker = WalkBuilder::new(&self.root)
            .follow_links(false)
            .filter_entry(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| !DEFAULT_IGNORE_DIRS.contains(&name))
                    .unwrap_or(true)
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    debug_log(format!("index walk error: {}", err));
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if !is_source_file(path) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            if let Err(err) = self.index_file(path, relative.to_path_buf()) {
                debug_log(format!("index skipped {}: {}", relative.display(), err));
            }
        }

        debug_log(format!("indexed {} source files", self.files.len()));
    }

    fn index_file(&mut self, absolute: &Path, relative: PathBuf) -> Result<(), String> {
        let metadata = fs::metadata(absolute).map_err(|e| e.to_string())?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let content = fs::read_to_string(absolute).map_err(|e| e.to_string())?;

        self.files.insert(
            relative.clone(),
            FileFacts {
                size: metadata.len(),
                modified_ms,
            },
        );
        self.imports
            .insert(relative.clone(), extract_imports(&content));
        self.functions.insert(relative, extract_functions(&content));
        Ok(())
    }

    pub fn file_count(&mut self) -> usize {
        self.ensure_built();
        self.files.len()
    }

    pub fn imports_of(&mut self, path: &Path) -> &[ImportFact] {
        self.ensure_built();
        self.imports.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn functions_of(&mut self, path: &Path) -> &[FunctionFact] {
        self.ensure_built();
        self.functions.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every file whose imports mention `pkg` itself or a subpath
    /// `pkg/...`.
    pub fn find_files_importing(&mut self, pkg: &str) -> Vec<PathBuf> {
        self.ensure_built();
        let prefix = format!("{}/", pkg);
        self.imports
            .iter()
            .filter(|(_, facts)| {
                facts
                    .iter()
                    .any(|fact| fact.from == pkg || fact.from.starts_with(&prefix))
            })
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// All indexed sources under `src/` or `lib/`, the localizer's
    /// last-resort candidate pool.
    pub fn source_files_under_conventional_roots(&mut self) -> Vec<PathBuf> {
        self.ensure_built();
        self.files
            .keys()
            .filter(|path| path.starts_with("src") || path.starts_with("lib"))
            .cloned()
            .collect()
    }
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn import_from_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*import\s+(?:type\s+)?(.+?)\s+from\s+['"]([^'"]+)['"]"#).unwrap()
    })
}

fn import_side_effect_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^\s*import\s+['"]([^'"]+)['"]"#).unwrap())
}

fn export_from_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*export\s+(?:\*(?:\s+as\s+\w+)?|\{[^}]*\})\s*from\s+['"]([^'"]+)['"]"#)
            .unwrap()
    })
}

fn require_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap())
}

/// Extract `(source-module, [local-names])` facts from a source body.
pub fn extract_imports(content: &str) -> Vec<ImportFact> {
    let mut facts = Vec::new();

    for caps in import_from_regex().captures_iter(content) {
        let clause = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let from = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        facts.push(ImportFact {
            from: from.to_string(),
            names: parse_import_clause(clause),
        });
    }
    for caps in import_side_effect_regex().captures_iter(content) {
        let from = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        facts.push(ImportFact {
            from: from.to_string(),
            names: Vec::new(),
        });
    }
    for caps in export_from_regex().captures_iter(content) {
        let from = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        facts.push(ImportFact {
            from: from.to_string(),
            names: Vec::new(),
        });
    }
    for caps in require_regex().captures_iter(content) {
        let from = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        facts.push(ImportFact {
            from: from.to_string(),
            names: Vec::new(),
        });
    }

    facts
}

/// `React, { useState, useEffect as effect }` -> local names.
fn parse_import_clause(clause: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = clause.trim();

    // Namespace import: `* as ns`.
    if let Some(ns) = rest.strip_prefix("* as ") {
        names.push(ns.trim().trim_end_matches(',').to_string());
        return names;
    }

    // Default import before a brace group.
    if let Some(brace) = rest.find('{') {
        let default_part = rest[..brace].trim().trim_end_matches(',').trim();
        if !default_part.is_empty() {
            names.push(default_part.to_string());
        }
        rest = &rest[brace..];
    }

    if let (Some(open), Some(close)) = (rest.find('{'), rest.rfind('}')) {
        for item in rest[open + 1..close].split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            // `original as local` binds the local name.
            let local = item
                .rsplit(" as ")
                .next()
                .unwrap_or(item)
                .trim();
            if !local.is_empty() {
                names.push(local.to_string());
            }
        }
    } else if !rest.is_empty() && !names.iter().any(|n| n == rest) {
        let bare = rest.trim_end_matches(',').trim();
        if !bare.is_empty() && !bare.contains('{') {
            names.push(bare.to_string());
        }
    }

    names
}

fn function_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\(([^)]*)\)",
        )
        .unwrap()
    })
}

fn arrow_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?\(([^)]*)\)(?:\s*:\s*[^=]+)?\s*=>",
        )
        .unwrap()
    })
}

fn class_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
            .unwrap()
    })
}

fn method_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s+(?:(?:public|private|protected|static|async|override)\s+)*([A-Za-z_$][A-Za-z0-9_$]*)\s*\(([^)]*)\)\s*(?::\s*[^{]+)?\{",
        )
        .unwrap()
    })
}

const METHOD_KEYWORD_BLOCKLIST: [&str; 8] =
    ["if", "for", "while", "switch", "catch", "return", "new", "function"];

/// Extract named functions, arrow-bound identifiers, and class methods.
pub fn extract_functions(content: &str) -> Vec<FunctionFact> {
    let lines: Vec<&str> = content.lines().collect();
    let mut facts = Vec::new();
    let mut current_class: Option<(String, i64)> = None;
    let mut depth: i64 = 0;

    for (idx, line) in lines.iter().enumerate() {
        let line_number = idx + 1;

        if let Some(caps) = class_decl_regex().captures(line) {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
            current_class = Some((name, depth));
        } else if let Some(caps) = function_decl_regex().captures(line) {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
            let params_raw = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            facts.push(build_fact(name, params_raw, line_number, &lines));
        } else if let Some(caps) = arrow_decl_regex().captures(line) {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
            let params_raw = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            facts.push(build_fact(name, params_raw, line_number, &lines));
        } else if let Some((class_name, _)) = current_class.clone() {
            if let Some(caps) = method_decl_regex().captures(line) {
                let method = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                if !METHOD_KEYWORD_BLOCKLIST.contains(&method) {
                    let params_raw = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                    facts.push(build_fact(
                        format!("{}.{}", class_name, method),
                        params_raw,
                        line_number,
                        &lines,
                    ));
                }
            }
        }

        depth += brace_delta(line);
        if let Some((_, entry_depth)) = &current_class {
            if depth <= *entry_depth && line.contains('}') {
                current_class = None;
            }
        }
    }

    facts
}

fn build_fact(name: String, params_raw: &str, start_line: usize, lines: &[&str]) -> FunctionFact {
    let params: Vec<String> = params_raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    let has_type = params.iter().any(|p| p.contains(':'));
    FunctionFact {
        name,
        end_line: find_block_end(lines, start_line - 1),
        start_line,
        params,
        has_type,
    }
}

/// Scan forward from the declaration line until braces balance out.
fn find_block_end(lines: &[&str], start_idx: usize) -> usize {
    const SCAN_CAP: usize = 500;
    let mut depth: i64 = 0;
    let mut opened = false;

    for (offset, line) in lines.iter().skip(start_idx).take(SCAN_CAP).enumerate() {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return start_idx + offset + 1;
        }
    }
    // Single-expression arrows and unbalanced scans end on their own line.
    start_idx + 1
}

fn brace_delta(line: &str) -> i64 {
    let mut delta = 0;
    for ch in line.chars() {
        match ch {
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_extract_imports_all_forms() {
        let source = r#"import React, { useState, useEffect as effect } from 'react';
import * as path from 'path';
import 'chalk/register';
import { render } from "react-dom/client";
export { helper } from './util';
const fs = require('fs');
"#;
        let facts = extract_imports(source);
        let react = facts.iter().find(|f| f.from == "react").unwrap();
        assert_eq!(react.names, vec!["React", "useState", "effect"]);

        let path_fact = facts.iter().find(|f| f.from == "path").unwrap();
        assert_eq!(path_fact.names, vec!["path"]);

        assert!(facts.iter().any(|f| f.from == "chalk/register"));
        assert!(facts.iter().any(|f| f.from == "react-dom/client"));
        assert!(facts.iter().any(|f| f.from == "./util"));
        assert!(facts.iter().any(|f| f.from == "fs"));
    }

    #[test]
    fn test_extract_functions_declarations_and_arrows() {
        let source = r#"export function renderApp(root, options) {
  return root;
}

const formatName = (user: User): string => {
  return user.name;
};

export default async function main() {}
"#;
        let facts = extract_functions(source);
        let names: Vec<&str> = facts.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["renderApp", "formatName", "main"]);

        let render = &facts[0];
        assert_eq!(render.start_line, 1);
        assert_eq!(render.end_line, 3);
        assert_eq!(render.params, vec!["root", "options"]);
        assert!(!render.has_type);

        assert!(facts[1].has_type);
    }

    #[test]
    fn test_extract_functions_class_methods_qualified() {
        let source = r#"export class UserStore {
  constructor(db) {
    this.db = db;
  }

  async fetchUser(id: string) {
    return this.db.get(id);
  }
}

function standalone() {}
"#;
        let facts = extract_functions(source);
        let names: Vec<&str> = facts.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"UserStore.constructor"));
        assert!(names.contains(&"UserStore.fetchUser"));
        assert!(names.contains(&"standalone"));
        // Methods after the class body close are not qualified.
        assert!(!names.contains(&"UserStore.standalone"));
    }

    #[test]
    fn test_index_walk_and_import_query() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/react")).unwrap();

        std::fs::write(
            src.join("app.tsx"),
            "import React from 'react';\nimport { render } from 'react-dom/client';\n",
        )
        .unwrap();
        std::fs::write(src.join("cli.js"), "const chalk = require('chalk');\n").unwrap();
        std::fs::write(src.join("notes.md"), "# not source\n").unwrap();
        std::fs::write(
            dir.path().join("node_modules/react/index.js"),
            "module.exports = {};\n",
        )
        .unwrap();

        let mut index = RepoIndex::new(dir.path());
        assert_eq!(index.file_count(), 2);

        let react_users = index.find_files_importing("react");
        assert_eq!(react_users, vec![PathBuf::from("src/app.tsx")]);

        // Subpath imports count for the parent package too.
        let dom_users = index.find_files_importing("react-dom");
        assert_eq!(dom_users, vec![PathBuf::from("src/app.tsx")]);

        let chalk_users = index.find_files_importing("chalk");
        assert_eq!(chalk_users, vec![PathBuf::from("src/cli.js")]);

        assert!(index.find_files_importing("left-pad").is_empty());
    }

    #[test]
    fn test_ignore_file_honored() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".ignore"), "generated/\n").unwrap();
        std::fs::create_dir_all(dir.path().join("generated")).unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("generated/bundle.js"), "var x;\n").unwrap();
        std::fs::write(dir.path().join("src/keep.js"), "var y;\n").unwrap();

        let mut index = RepoIndex::new(dir.path());
        assert_eq!(index.file_count(), 1);
        assert_eq!(
            index.source_files_under_conventional_roots(),
            vec![PathBuf::from("src/keep.js")]
        );
    }

    #[test]
    fn test_unreadable_file_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("ok.js"), "var a;\n").unwrap();
        // Invalid UTF-8 makes read_to_string fail for this file only.
        std::fs::write(src.join("bad.js"), [0xff, 0xfe, 0x00]).unwrap();

        let mut index = RepoIndex::new(dir.path());
        assert_eq!(index.file_count(), 1);
    }
}
