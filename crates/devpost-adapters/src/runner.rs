//! Build and test command execution.
//!
//! Commands are user-configured shell strings split with paired-quote
//! handling (no escape sequences, no variable expansion). A non-zero
//! exit is a reported outcome, not a fault; only the inability to
//! split or spawn becomes a synthetic failure outcome.

use crate::util::{capture_command, debug_log};
use devpost_core::TestOutcome;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Split a command string into program + argv.
///
/// Honors paired single and double quotes; quotes may appear
/// mid-token (`--name="a b"`). An unterminated quote is an error.
pub fn split_command(command: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in command.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err(format!("Unterminated quote in command: {}", command));
    }
    if in_token {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return Err("Empty command".to_string());
    }
    Ok(tokens)
}

/// Results of a build-then-test pass.
#[derive(Debug, Clone)]
pub struct BuildAndTest {
    pub build: TestOutcome,
    pub tests: TestOutcome,
}

impl BuildAndTest {
    pub fn green(&self) -> bool {
        self.build.success && self.tests.success
    }

    /// Combined output of whichever stage failed, for localization.
    pub fn failing_output(&self) -> String {
        if !self.build.success {
            self.build.combined_output()
        } else {
            self.tests.combined_output()
        }
    }
}

/// Runs project commands in the project root.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    root: PathBuf,
}

impl CommandRunner {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Run one command to completion, capturing everything.
    pub fn run(&self, command: &str) -> TestOutcome {
        let argv = match split_command(command) {
            Ok(argv) => argv,
            Err(err) => return TestOutcome::spawn_failure(err),
        };

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).current_dir(&self.root);

        match capture_command(&mut cmd) {
            Ok(capture) => {
                debug_log(format!(
                    "ran `{}` -> exit {}",
                    command,
                    capture.exit_code()
                ));
                if capture.success() {
                    TestOutcome::passed(capture.stdout, capture.stderr)
                } else {
                    let exit_code = capture.exit_code();
                    TestOutcome::failed(capture.stdout, capture.stderr, exit_code)
                }
            }
            Err(err) => TestOutcome::spawn_failure(err),
        }
    }

    /// Run build, then tests only if the build passed. A failed build
    /// reports the test stage as skipped.
    pub fn run_all(&self, build_command: &str, test_command: &str) -> BuildAndTest {
        let build = self.run(build_command);
        let tests = if build.success {
            self.run(test_command)
        } else {
            TestOutcome::skipped("build failed")
        };
        BuildAndTest { build, tests }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_command() {
        assert_eq!(
            split_command("npm run build").unwrap(),
            vec!["npm", "run", "build"]
        );
    }

    #[test]
    fn test_split_double_quotes() {
        assert_eq!(
            split_command(r#"jest --testPathPattern "src/(a|b)""#).unwrap(),
            vec!["jest", "--testPathPattern", "src/(a|b)"]
        );
    }

    #[test]
    fn test_split_single_quotes_and_embedded() {
        assert_eq!(
            split_command("echo 'hello world'").unwrap(),
            vec!["echo", "hello world"]
        );
        assert_eq!(
            split_command(r#"node --eval='1 + 1'"#).unwrap(),
            vec!["node", "--eval=1 + 1"]
        );
    }

    #[test]
    fn test_split_no_escape_sequences() {
        // Backslash is a plain character, not an escape.
        assert_eq!(split_command(r"echo a\b").unwrap(), vec!["echo", r"a\b"]);
    }

    #[test]
    fn test_split_rejects_unterminated_quote() {
        assert!(split_command("echo 'oops").is_err());
        assert!(split_command("").is_err());
        assert!(split_command("   ").is_err());
    }

    #[test]
    fn test_split_preserves_empty_quoted_token() {
        assert_eq!(split_command("cmd ''").unwrap(), vec!["cmd", ""]);
    }

    #[test]
    fn test_run_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());

        let ok = runner.run("true");
        assert!(ok.success);
        assert_eq!(ok.exit_code, 0);

        let bad = runner.run("false");
        assert!(!bad.success);
        assert_ne!(bad.exit_code, 0);
    }

    #[test]
    fn test_run_spawn_failure_is_an_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let outcome = runner.run("definitely-not-a-real-binary-xyz");
        assert!(!outcome.success);
        assert!(outcome.stderr.contains("Failed to start command"));
    }

    #[test]
    fn test_run_all_skips_tests_after_failed_build() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let pair = runner.run_all("false", "true");
        assert!(!pair.green());
        assert!(!pair.build.success);
        assert!(pair.tests.stderr.contains("skipped: build failed"));
    }

    #[test]
    fn test_run_all_green() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(dir.path());
        let pair = runner.run_all("true", "true");
        assert!(pair.green());
    }
}
