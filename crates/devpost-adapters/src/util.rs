//! Small process and terminal helpers shared across adapters.

use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

/// Truncate to `max` characters, appending `...` when shortened.
pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Whether `DEBUG=true` (or `DEBUG=1`) verbose logging is on.
pub fn debug_enabled() -> bool {
    std::env::var("DEBUG")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Print a diagnostic line to stderr when debug logging is on.
pub fn debug_log(message: impl AsRef<str>) {
    if debug_enabled() {
        eprintln!("  [debug] {}", message.as_ref());
    }
}

#[derive(Debug)]
pub struct CommandCapture {
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandCapture {
    pub fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }

    pub fn exit_code(&self) -> i32 {
        self.status.and_then(|s| s.code()).unwrap_or(-1)
    }
}

/// Spawn a command and capture stdout/stderr to completion.
///
/// Both pipes are drained on reader threads so a chatty child cannot
/// deadlock against a full pipe buffer. The child runs to completion;
/// build/test/install processes carry no timeout by design.
pub fn capture_command(command: &mut Command) -> Result<CommandCapture, String> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to start command: {}", e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "Failed to capture stdout".to_string())?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| "Failed to capture stderr".to_string())?;

    let stdout_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let mut reader = BufReader::new(stdout);
        let _ = reader.read_to_end(&mut buf);
        buf
    });
    let stderr_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let mut reader = BufReader::new(stderr);
        let _ = reader.read_to_end(&mut buf);
        buf
    });

    let status = child
        .wait()
        .map_err(|e| format!("Failed to wait for command: {}", e))?;

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandCapture {
        status: Some(status),
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
    })
}

/// Resolve a repo-relative path, rejecting absolute paths, parent
/// traversal, and anything that escapes the root.
pub fn resolve_repo_path(root: &Path, candidate: &Path) -> Result<PathBuf, String> {
    if candidate.as_os_str().is_empty() {
        return Err("Path is empty".to_string());
    }
    if candidate.is_absolute() {
        return Err(format!(
            "Absolute paths are not allowed: {}",
            candidate.display()
        ));
    }
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(format!(
            "Parent traversal is not allowed: {}",
            candidate.display()
        ));
    }
    let cleaned: PathBuf = candidate
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    Ok(root.join(cleaned))
}
