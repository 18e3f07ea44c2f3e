//! External commands run when a session starts and ends.

use std::process::Stdio;

use tokio::process::Command;

/// Run `command` through `sh -c` and wait for it.
///
/// An empty command does nothing. Failures are logged and otherwise ignored.
pub async fn run_hook(command: &str) {
    let command = command.trim();
    if command.is_empty() {
        return;
    }

    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => tracing::debug!(hook = command, "hook finished"),
        Ok(status) => tracing::warn!(hook = command, %status, "hook exited with failure"),
        Err(e) => tracing::warn!(hook = command, "Failed to run hook: {}", e),
    }
}
