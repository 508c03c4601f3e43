//! External text-generation collaborators.
//!
//! The response body is produced by two programs found on PATH: a quotation
//! source (stdout only) and a bubble renderer (quotation on stdin, decorated
//! text on stdout). Each request spawns fresh subprocesses; nothing is cached
//! or shared between requests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

/// Capability seam over the two collaborators, so the server and handler can
/// be exercised with deterministic in-process doubles.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Obtain one fresh quotation.
    async fn quotation(&self) -> Result<String, OracleError>;

    /// Wrap the quotation in the decorative speech-bubble framing.
    async fn render(&self, quote: &str) -> Result<String, OracleError>;
}

/// Produce the complete response body for one request: one quotation, passed
/// through the renderer, returned verbatim. No retries; a failure of either
/// collaborator fails the whole generation.
pub async fn generate(oracle: &dyn Oracle) -> Result<String, OracleError> {
    let quote = oracle.quotation().await?;
    oracle.render(&quote).await
}

/// Production [`Oracle`] that shells out to the configured programs.
pub struct ExecOracle {
    quote: CommandSpec,
    bubble: CommandSpec,
}

/// A program name plus its fixed arguments.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ExecOracle {
    pub fn new(quote: CommandSpec, bubble: CommandSpec) -> Self {
        ExecOracle { quote, bubble }
    }

    /// Verify both programs are resolvable before the listener binds.
    ///
    /// An absent collaborator can never produce a response, so it is a
    /// startup-fatal condition rather than a per-request one.
    pub fn preflight(&self) -> Result<(), OracleError> {
        resolve_program(&self.quote.program)?;
        resolve_program(&self.bubble.program)?;
        Ok(())
    }
}

#[async_trait]
impl Oracle for ExecOracle {
    async fn quotation(&self) -> Result<String, OracleError> {
        run_capture(&self.quote, None).await
    }

    async fn render(&self, quote: &str) -> Result<String, OracleError> {
        run_capture(&self.bubble, Some(quote)).await
    }
}

/// Run one collaborator to completion, feeding `input` to its stdin when
/// given, and return its stdout as UTF-8 text.
async fn run_capture(spec: &CommandSpec, input: Option<&str>) -> Result<String, OracleError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            OracleError::Missing(spec.program.clone())
        } else {
            OracleError::Io(spec.program.clone(), e)
        }
    })?;

    if let Some(text) = input {
        // Dropping the handle closes the pipe so the child sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| OracleError::Io(spec.program.clone(), e))?;
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| OracleError::Io(spec.program.clone(), e))?;

    if !output.status.success() {
        return Err(OracleError::Exited {
            program: spec.program.clone(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    trace!(program = %spec.program, bytes = output.stdout.len(), "collaborator output captured");

    String::from_utf8(output.stdout).map_err(|_| OracleError::Utf8(spec.program.clone()))
}

/// Resolve a program name against PATH, mirroring what `Command::spawn` will
/// do later. Names containing a path separator are checked directly.
fn resolve_program(program: &str) -> Result<PathBuf, OracleError> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        if is_executable(candidate) {
            return Ok(candidate.to_path_buf());
        }
        return Err(OracleError::Missing(program.to_string()));
    }

    let path = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path) {
        let full = dir.join(program);
        if is_executable(&full) {
            return Ok(full);
        }
    }

    Err(OracleError::Missing(program.to_string()))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Errors from the external collaborators
#[derive(Debug)]
pub enum OracleError {
    /// The program could not be found on PATH
    Missing(String),
    /// Spawning or talking to the program failed
    Io(String, std::io::Error),
    /// The program ran but exited unsuccessfully
    Exited {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    /// The program emitted non-UTF-8 output
    Utf8(String),
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Missing(program) => {
                write!(f, "collaborator '{}' not found on PATH", program)
            }
            OracleError::Io(program, e) => {
                write!(f, "collaborator '{}' failed: {}", program, e)
            }
            OracleError::Exited {
                program,
                code,
                stderr,
            } => match code {
                Some(code) => {
                    write!(f, "collaborator '{}' exited with {}: {}", program, code, stderr)
                }
                None => write!(f, "collaborator '{}' killed by signal: {}", program, stderr),
            },
            OracleError::Utf8(program) => {
                write!(f, "collaborator '{}' emitted non-UTF-8 output", program)
            }
        }
    }
}

impl std::error::Error for OracleError {}
