//! Command-line generation backend (`claude --print` and friends).

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{GenerationBackend, GenerationRequest};
use crate::errors::GenerationError;

/// Spawns `command args...`, writes the prompt to stdin and returns stdout.
///
/// The prompt is written while the child runs, and the whole exchange is
/// bounded by the timeout. A non-zero exit or a timeout is transient; failing
/// to spawn the command at all is a rejection.
#[derive(Debug, Clone)]
pub struct CliBackend {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl CliBackend {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec!["--print".to_string()],
            timeout: Duration::from_secs(300),
            working_dir: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    async fn run(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);

        if let Some(ref working_dir) = self.working_dir {
            cmd.current_dir(working_dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            GenerationError::Rejected(format!("Failed to spawn '{}': {}", self.command, e))
        })?;

        let stdin = child.stdin.take();
        let exchange = async move {
            let write = async {
                let Some(mut stdin) = stdin else {
                    return Ok::<(), std::io::Error>(());
                };
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await
            };
            tokio::join!(write, child.wait_with_output())
        };

        let (written, output) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                GenerationError::Transient(format!(
                    "'{}' timed out after {}s",
                    self.command,
                    self.timeout.as_secs()
                ))
            })?;
        let output = output
            .map_err(|e| GenerationError::Transient(format!("Failed to wait for process: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerationError::Transient(format!(
                "'{}' exited with code {}: {}",
                self.command,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        match written {
            Ok(()) => {}
            // The child is free to exit without reading all of stdin.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!(command = %self.command, "Child closed stdin before the prompt was written");
            }
            Err(e) => {
                return Err(GenerationError::Transient(format!(
                    "Failed to write prompt: {}",
                    e
                )));
            }
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl GenerationBackend for CliBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            command = %self.command,
            prompt_chars = request.prompt.len(),
            context_id = ?request.context_id,
            "Invoking CLI backend"
        );
        self.run(&request.prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_echoes_stdin_through_cat() {
        let backend = CliBackend::new("cat").with_args(vec![]);
        let out = backend
            .generate(GenerationRequest::new("[{\"quote\": \"x\"}]"))
            .await
            .unwrap();
        assert_eq!(out, "[{\"quote\": \"x\"}]");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_transient() {
        let backend = CliBackend::new("sh").with_args(vec!["-c".into(), "exit 3".into()]);
        let err = backend
            .generate(GenerationRequest::new("prompt"))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
        assert!(err.to_string().contains("code 3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_transient() {
        let backend = CliBackend::new("sh")
            .with_args(vec!["-c".into(), "sleep 5".into()])
            .with_timeout(Duration::from_millis(100));
        let err = backend
            .generate(GenerationRequest::new("prompt"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_early_exit_reports_code_and_stderr_for_large_prompt() {
        let backend = CliBackend::new("sh")
            .with_args(vec!["-c".into(), "echo auth-failed >&2; exit 3".into()]);
        let err = backend
            .generate(GenerationRequest::new("x".repeat(200_000)))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
        let message = err.to_string();
        assert!(message.contains("code 3"), "got {message}");
        assert!(message.contains("auth-failed"), "got {message}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_covers_unread_stdin() {
        let backend = CliBackend::new("sh")
            .with_args(vec!["-c".into(), "sleep 5".into()])
            .with_timeout(Duration::from_millis(200));
        let err = backend
            .generate(GenerationRequest::new("x".repeat(1_000_000)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "got {err:?}");
    }

    #[tokio::test]
    async fn test_missing_command_is_rejected() {
        let backend = CliBackend::new("definitely-not-a-real-command-quire");
        let err = backend
            .generate(GenerationRequest::new("prompt"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Rejected(_)));
    }
}
