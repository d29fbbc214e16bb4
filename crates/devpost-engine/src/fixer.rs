//! Compose fix requests for the model and parse the edits it returns.
//!
//! The prompt carries the upgrade direction, the filtered failing
//! output (capped at 50 lines), every retrieved migration guide, and
//! the full contents of each candidate file annotated with line
//! numbers. Model and parse failures yield an empty edit list; the
//! orchestrator treats "no edits" as fatal for the group.

use crate::docsearch::MigrationGuide;
use crate::llm::parse::{parse_structured, truncate_content};
use crate::llm::prompts::{fix_system, upgrade_direction};
use crate::llm::ModelClient;
use devpost_adapters::util::debug_log;
use devpost_core::package::PackageRef;
use devpost_core::{Edit, TestOutcome};
use devpost_core::diagnostics::extract_error_lines;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

/// Cap on forwarded failing-output lines.
const MAX_ERROR_LINES: usize = 50;

/// Per-guide and per-file character budgets inside the prompt.
const MAX_GUIDE_CHARS: usize = 12_000;
const MAX_FILE_CHARS: usize = 20_000;

#[derive(Debug, Deserialize)]
struct EditEnvelope {
    edits: Vec<Edit>,
}

/// A candidate file and its current contents.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub content: String,
}

pub struct Fixer<'a> {
    client: &'a ModelClient,
}

impl<'a> Fixer<'a> {
    pub fn new(client: &'a ModelClient) -> Self {
        Self { client }
    }

    /// Ask the model for edits. Model errors are logged and return an
    /// empty list; malformed JSON likewise.
    pub async fn generate_edits(
        &self,
        pkg: &PackageRef,
        outcome: &TestOutcome,
        guides: &[MigrationGuide],
        files: &[CandidateFile],
    ) -> Vec<Edit> {
        if files.is_empty() {
            debug_log("fixer called with no candidate files");
            return Vec::new();
        }

        let user = build_fix_prompt(pkg, outcome, guides, files);
        debug_log(format!("fix prompt: {} chars", user.len()));

        let content = match self.client.complete(&fix_system(), &user).await {
            Ok(content) => content,
            Err(err) => {
                eprintln!("  ! Model fix request failed: {}", err);
                return Vec::new();
            }
        };

        let envelope: EditEnvelope = match parse_structured(&content) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug_log(format!("fix response unparseable: {}", err));
                return Vec::new();
            }
        };

        sanitize_edits(envelope.edits)
    }
}

/// Drop edits the engine could never apply safely: absolute or
/// escaping paths, and empty search text.
fn sanitize_edits(edits: Vec<Edit>) -> Vec<Edit> {
    edits
        .into_iter()
        .filter(|edit| {
            if edit.search.is_empty() {
                debug_log(format!(
                    "dropping edit with empty search for {}",
                    edit.file.display()
                ));
                return false;
            }
            if edit.file.is_absolute()
                || edit
                    .file
                    .components()
                    .any(|c| matches!(c, Component::ParentDir))
            {
                debug_log(format!(
                    "dropping edit with unsafe path {}",
                    edit.file.display()
                ));
                return false;
            }
            true
        })
        .collect()
}

fn build_fix_prompt(
    pkg: &PackageRef,
    outcome: &TestOutcome,
    guides: &[MigrationGuide],
    files: &[CandidateFile],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&upgrade_direction(
        &pkg.name,
        &pkg.current_version,
        &pkg.latest_version,
    ));
    prompt.push_str("\n\nFAILING OUTPUT (filtered):\n");
    let lines = relevant_output_lines(outcome);
    if lines.is_empty() {
        prompt.push_str("(no diagnostic lines recognized; full output omitted)\n");
    } else {
        for line in lines {
            prompt.push_str(&line);
            prompt.push('\n');
        }
    }

    if !guides.is_empty() {
        prompt.push_str("\nMIGRATION NOTES:\n");
        for guide in guides {
            prompt.push_str(&format!("\n--- {} ({}) ---\n", guide.source, guide.url));
            prompt.push_str(&truncate_content(&guide.content, MAX_GUIDE_CHARS));
            prompt.push('\n');
        }
    }

    prompt.push_str("\nCANDIDATE FILES:\n");
    for file in files {
        prompt.push_str(&format!("\n=== {} ===\n", file.path.display()));
        prompt.push_str(&number_lines(&truncate_content(
            &file.content,
            MAX_FILE_CHARS,
        )));
    }

    prompt.push_str("\nReturn the JSON edits object now.");
    prompt
}

/// The most informative lines of the failing stage, capped.
fn relevant_output_lines(outcome: &TestOutcome) -> Vec<String> {
    extract_error_lines(&outcome.combined_output(), MAX_ERROR_LINES)
}

/// Annotate content with 1-based line numbers for the prompt. The
/// numbers orient the model; edit rules forbid copying them back.
fn number_lines(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + content.len() / 8);
    for (idx, line) in content.lines().enumerate() {
        out.push_str(&format!("{:>5}| {}\n", idx + 1, line));
    }
    out
}

/// Read candidate files relative to `root`, skipping unreadable ones.
pub fn load_candidate_files(root: &Path, paths: &[PathBuf]) -> Vec<CandidateFile> {
    paths
        .iter()
        .filter_map(|path| {
            match std::fs::read_to_string(root.join(path)) {
                Ok(content) => Some(CandidateFile {
                    path: path.clone(),
                    content,
                }),
                Err(err) => {
                    debug_log(format!("cannot read candidate {}: {}", path.display(), err));
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg() -> PackageRef {
        PackageRef::new("react-dom", "17.0.2", "18.3.1")
    }

    fn failing_outcome() -> TestOutcome {
        TestOutcome::failed(
            String::new(),
            "error TS2339: Property 'render' does not exist\n  at src/main.tsx:4:1\nnoise line\n".into(),
            1,
        )
    }

    #[test]
    fn test_prompt_contains_all_sections() {
        let guides = vec![MigrationGuide {
            source: "changelog",
            url: "https://example.com/CHANGELOG.md".into(),
            content: "## 18.0.0\nReactDOM.render was replaced by createRoot.".into(),
            relevance: 8,
        }];
        let files = vec![CandidateFile {
            path: PathBuf::from("src/main.tsx"),
            content: "import ReactDOM from 'react-dom';\nReactDOM.render(app, root);\n".into(),
        }];

        let prompt = build_fix_prompt(&pkg(), &failing_outcome(), &guides, &files);
        assert!(prompt.contains("Upgraded package: react-dom from 17.0.2 to 18.3.1"));
        assert!(prompt.contains("error TS2339"));
        assert!(!prompt.contains("noise line"));
        assert!(prompt.contains("createRoot"));
        assert!(prompt.contains("=== src/main.tsx ==="));
        assert!(prompt.contains("    1| import ReactDOM from 'react-dom';"));
    }

    #[test]
    fn test_prompt_without_guides_still_builds() {
        let files = vec![CandidateFile {
            path: PathBuf::from("src/a.js"),
            content: "x\n".into(),
        }];
        let prompt = build_fix_prompt(&pkg(), &failing_outcome(), &[], &files);
        assert!(!prompt.contains("MIGRATION NOTES"));
        assert!(prompt.contains("CANDIDATE FILES"));
    }

    #[test]
    fn test_sanitize_edits_drops_unsafe() {
        let edits = vec![
            Edit::new("src/ok.js", "", "a", "b"),
            Edit::new("/abs/path.js", "", "a", "b"),
            Edit::new("../escape.js", "", "a", "b"),
            Edit::new("src/empty.js", "", "", "b"),
        ];
        let kept = sanitize_edits(edits);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].file, PathBuf::from("src/ok.js"));
    }

    #[test]
    fn test_number_lines() {
        assert_eq!(number_lines("a\nb"), "    1| a\n    2| b\n");
    }

    #[test]
    fn test_edit_envelope_parses_model_shape() {
        let content = r#"```json
{"edits": [{"file": "src/main.tsx", "description": "use createRoot", "search": "ReactDOM.render(app, root);", "replace": "createRoot(root).render(app);"}]}
```"#;
        let envelope: EditEnvelope = parse_structured(content).unwrap();
        assert_eq!(envelope.edits.len(), 1);
        assert_eq!(envelope.edits[0].file, PathBuf::from("src/main.tsx"));
    }
}
