use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RunnerConfig;

/// Runs the external CLI agent executable: command + fixed args + the wake
/// prompt as the final argument, in the agent's directory. Output is
/// streamed live to the operator console while being captured for the
/// caller.
pub struct ProcessRunner {
    config: RunnerConfig,
}

/// Drain one pipe line by line: echo to the console and keep a copy.
pub(crate) async fn stream_lines<R: AsyncRead + Unpin>(
    pipe: R,
    buffer: Arc<Mutex<String>>,
    to_stderr: bool,
) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if to_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
        let mut buf = buffer.lock().await;
        buf.push_str(&line);
        buf.push('\n');
    }
}

/// Combine stdout and stderr into a single diagnostic string.
fn combine_output(stdout: &str, stderr: &str) -> String {
    let mut raw = String::new();
    if !stdout.is_empty() {
        raw.push_str(stdout);
    }
    if !stderr.is_empty() {
        if !raw.is_empty() {
            raw.push_str("\n--- stderr ---\n");
        }
        raw.push_str(stderr);
    }
    if raw.is_empty() {
        raw.push_str("(no output)");
    }
    raw
}

fn truncate_in_place(s: &mut String, max_chars: usize) {
    if s.len() > max_chars {
        s.truncate(max_chars);
        s.push_str("\n... (truncated)");
    }
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Execute the CLI agent with the given prompt. Resolves with captured
    /// stdout on exit 0; fails with the exit-code description and combined
    /// output otherwise. `timeout_secs = 0` waits indefinitely.
    pub async fn run(&self, working_dir: &Path, prompt: &str) -> anyhow::Result<String> {
        let mut cmd = tokio::process::Command::new(&self.config.command);
        for arg in &self.config.args {
            cmd.arg(arg);
        }
        cmd.arg(prompt);
        cmd.current_dir(working_dir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        info!(
            command = %self.config.command,
            working_dir = %working_dir.display(),
            "Invoking CLI agent"
        );

        let mut child = cmd.spawn().map_err(|e| {
            anyhow::anyhow!("Failed to spawn '{}': {}", self.config.command, e)
        })?;

        let stdout_pipe = child.stdout.take().ok_or_else(|| anyhow::anyhow!("stdout not piped"))?;
        let stderr_pipe = child.stderr.take().ok_or_else(|| anyhow::anyhow!("stderr not piped"))?;

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        let stdout_task = tokio::spawn(stream_lines(stdout_pipe, stdout_buf.clone(), false));
        let stderr_task = tokio::spawn(stream_lines(stderr_pipe, stderr_buf.clone(), true));

        let status = if self.config.timeout_secs > 0 {
            let budget = Duration::from_secs(self.config.timeout_secs);
            match tokio::time::timeout(budget, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(
                        command = %self.config.command,
                        timeout_secs = self.config.timeout_secs,
                        "CLI agent exceeded its wall-clock budget, killing it"
                    );
                    let _ = child.kill().await;
                    anyhow::bail!(
                        "CLI agent '{}' timed out after {} seconds",
                        self.config.command,
                        self.config.timeout_secs
                    );
                }
            }
        } else {
            child.wait().await?
        };

        // The pipes close when the child exits; collect what was captured.
        let _ = stdout_task.await;
        let _ = stderr_task.await;
        let stdout = stdout_buf.lock().await.clone();
        let stderr = stderr_buf.lock().await.clone();

        if !status.success() {
            let code = status
                .code()
                .map_or("unknown".to_string(), |c| c.to_string());
            let mut combined = combine_output(&stdout, &stderr);
            truncate_in_place(&mut combined, self.config.max_output_chars);
            anyhow::bail!(
                "CLI agent '{}' exited with code {}: {}",
                self.config.command,
                code,
                combined
            );
        }

        let mut result = stdout;
        truncate_in_place(&mut result, self.config.max_output_chars);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(command: &str, args: &[&str], timeout_secs: u64) -> ProcessRunner {
        ProcessRunner::new(RunnerConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout_secs,
            max_output_chars: 10_000,
        })
    }

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let tmp = tempfile::tempdir().unwrap();
        let output = runner("echo", &[], 0)
            .run(tmp.path(), "wake up and do your job")
            .await
            .unwrap();
        assert_eq!(output.trim(), "wake up and do your job");
    }

    #[tokio::test]
    async fn nonzero_exit_fails_with_code_and_output() {
        let tmp = tempfile::tempdir().unwrap();
        let err = runner("sh", &["-c"], 0)
            .run(tmp.path(), "echo boom >&2; exit 3")
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("exited with code 3"), "unexpected error: {err}");
        assert!(err.contains("boom"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = runner("definitely-not-a-real-binary", &[], 0)
            .run(tmp.path(), "hi")
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("Failed to spawn"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn wall_clock_budget_kills_slow_children() {
        let tmp = tempfile::tempdir().unwrap();
        let err = runner("sleep", &[], 1)
            .run(tmp.path(), "30")
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("timed out after 1"), "unexpected error: {err}");
    }

    #[test]
    fn combine_output_labels_stderr() {
        assert_eq!(combine_output("out", ""), "out");
        assert_eq!(combine_output("", "err"), "err");
        assert_eq!(combine_output("out", "err"), "out\n--- stderr ---\nerr");
        assert_eq!(combine_output("", ""), "(no output)");
    }

    #[test]
    fn truncation_appends_marker() {
        let mut s = "abcdefgh".to_string();
        truncate_in_place(&mut s, 4);
        assert_eq!(s, "abcd\n... (truncated)");
    }
}
