//! Builder for executing external tool commands with timeout and
//! cancellation support.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Number of trailing stderr lines kept when stderr is streamed.
const STDERR_TAIL_LINES: usize = 200;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8). Empty when stderr was streamed.
    pub stdout: String,
    /// Captured standard error (lossy UTF-8). When streamed, only the last
    /// lines are kept.
    pub stderr: String,
}

/// Ways a tool invocation can fail.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{tool}: failed to spawn: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool}: exited with status {status}: {}", stderr.trim())]
    NonZeroExit {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{tool}: timed out after {timeout:?}")]
    Timeout {
        tool: String,
        timeout: Duration,
        stderr: String,
    },

    #[error("{tool}: cancelled")]
    Cancelled { tool: String, stderr: String },

    #[error("{tool}: I/O error talking to process: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Whatever stderr was captured before the failure.
    pub fn stderr(&self) -> &str {
        match self {
            Self::NonZeroExit { stderr, .. }
            | Self::Timeout { stderr, .. }
            | Self::Cancelled { stderr, .. } => stderr,
            Self::Spawn { .. } | Self::Io { .. } => "",
        }
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use mm_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> Result<(), mm_av::CommandError> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .arg("-v").arg("error")
///     .arg("-print_format").arg("json")
///     .arg("-show_format")
///     .arg("/path/to/video.mp4")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Shell-like rendering of the command line, for logging.
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('\'') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        // Dropping the future (timeout, client disconnect) must not leave an
        // orphaned process behind.
        cmd.kill_on_drop(true);
        cmd
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`CommandError::Spawn`] if the process could not be started.
    /// - [`CommandError::Timeout`] if the process outlived the timeout; the
    ///   child is killed.
    /// - [`CommandError::NonZeroExit`] if the process exits with a non-zero
    ///   status (carries stderr).
    pub async fn execute(&self) -> Result<ToolOutput, CommandError> {
        let tool = self.program_name();

        let mut cmd = self.command();
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|source| CommandError::Spawn {
            tool: tool.clone(),
            source,
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(CommandError::NonZeroExit {
                        tool,
                        status: output.status,
                        stderr: tool_output.stderr,
                    });
                }

                Ok(tool_output)
            }
            Ok(Err(source)) => Err(CommandError::Io { tool, source }),
            // The timed-out future owned the child; dropping it kills the
            // process via kill_on_drop.
            Err(_elapsed) => Err(CommandError::Timeout {
                tool,
                timeout: self.timeout,
                stderr: String::new(),
            }),
        }
    }

    /// Execute the command, feeding every stderr line to `on_line` as it is
    /// produced. Stdout is discarded.
    ///
    /// The child is killed when the timeout expires or `cancel` fires.
    pub async fn execute_with_stderr_callback(
        &self,
        mut on_line: impl FnMut(&str),
        cancel: Option<CancellationToken>,
    ) -> Result<ToolOutput, CommandError> {
        let tool = self.program_name();

        let mut cmd = self.command();
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            tool: tool.clone(),
            source,
        })?;

        let Some(stderr) = child.stderr.take() else {
            return Err(CommandError::Io {
                tool,
                source: std::io::Error::other("stderr was not captured"),
            });
        };
        let mut segments = BufReader::new(stderr).split(b'\n');
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let cancelled = async {
            match &cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(cancelled);

        // Drain stderr until EOF, then wait for the exit status.
        let mut stderr_open = true;
        let status = loop {
            tokio::select! {
                segment = segments.next_segment(), if stderr_open => match segment {
                    Ok(Some(raw)) => {
                        let line = decode_line(&raw);
                        on_line(&line);
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    Ok(None) => stderr_open = false,
                    Err(source) => {
                        let _ = child.kill().await;
                        return Err(CommandError::Io { tool, source });
                    }
                },
                status = child.wait(), if !stderr_open => match status {
                    Ok(status) => break status,
                    Err(source) => return Err(CommandError::Io { tool, source }),
                },
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    return Err(CommandError::Timeout {
                        tool,
                        timeout: self.timeout,
                        stderr: join_tail(&tail),
                    });
                }
                _ = &mut cancelled => {
                    let _ = child.kill().await;
                    return Err(CommandError::Cancelled {
                        tool,
                        stderr: join_tail(&tail),
                    });
                }
            }
        };

        let stderr = join_tail(&tail);
        if !status.success() {
            return Err(CommandError::NonZeroExit {
                tool,
                status,
                stderr,
            });
        }

        Ok(ToolOutput {
            status,
            stdout: String::new(),
            stderr,
        })
    }
}

/// ffmpeg echoes container metadata verbatim, so stderr is not guaranteed
/// to be UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn join_tail(tail: &VecDeque<String>) -> String {
    tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
}
