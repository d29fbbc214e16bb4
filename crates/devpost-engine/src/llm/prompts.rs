//! System prompts for grouping and fix generation.

/// Shared rules for search/replace edit output.
const EDIT_RULES: &str = r#"EDIT RULES:
- Return search/replace edits only.
- `search` must match the target file exactly once (include enough surrounding lines).
- `replace` is the exact replacement text.
- Copy `search` verbatim from the provided file contents, with exact indentation.
- No placeholders, ellipses, or line-number prefixes.
- Keep edits minimal and scoped to repairing the failing build or tests."#;

pub const GROUPING_SYSTEM: &str = r#"You plan dependency upgrades for a JavaScript/TypeScript project.

You will receive a list of outdated packages with current and latest versions.
Partition them into upgrade groups that should be applied and committed together.

OUTPUT (JSON object only):
{
  "groups": [{
    "packages": ["name", ...],
    "reasoning": "one sentence on why these belong together",
    "priority": 1
  }]
}

RULES:
- Every listed package appears in exactly one group.
- Packages that must move in lockstep (e.g. react + react-dom, a tool and its plugins) share a group.
- `priority` is an integer 1-10; higher priority groups are upgraded first.
- Give risky major upgrades higher priority so they fail fast.
- No extra text outside the JSON object."#;

/// Fix generation: failing output + migration docs + candidate files in,
/// search/replace edits out.
pub fn fix_system() -> String {
    format!(
        r#"A dependency upgrade broke this project's build or tests.
Use the failing output, the migration notes, and the file contents to repair the project.

OUTPUT (JSON object only):
{{
  "edits": [{{
    "file": "relative/path.js",
    "description": "one sentence on what this edit does",
    "search": "exact text currently in the file",
    "replace": "replacement text"
  }}]
}}

{edit_rules}

If nothing can be fixed from the provided context, return {{"edits": []}}."#,
        edit_rules = EDIT_RULES
    )
}

/// The per-package user prompt header for fix generation.
pub fn upgrade_direction(name: &str, from: &str, to: &str) -> String {
    format!("Upgraded package: {} from {} to {}", name, from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_system_embeds_rules() {
        let prompt = fix_system();
        assert!(prompt.contains("EDIT RULES"));
        assert!(prompt.contains("exactly once"));
        assert!(prompt.contains(r#""edits": []"#));
    }

    #[test]
    fn test_upgrade_direction_format() {
        assert_eq!(
            upgrade_direction("chalk", "4.0.0", "5.3.0"),
            "Upgraded package: chalk from 4.0.0 to 5.3.0"
        );
    }
}
