//! Scoped child-process invocation, shared by the front-end and GraphViz
//! renderer adapters: both need "run this command, capture stdout, and be
//! certain the child is reaped no matter how the caller returns" — the
//! design notes call this out explicitly as the one piece of the original's
//! process-handling worth re-architecting rather than reusing verbatim,
//! since the original relied on scope-exit destructors we get for free from
//! `std::process::Child`'s own `Drop`, provided we never leak a handle past
//! `wait()`.

use std::io::Read;
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn { command: String, #[source] source: std::io::Error },
    #[error("failed to read output of `{command}`: {source}")]
    Io { command: String, #[source] source: std::io::Error },
    #[error("`{command}` exited with status {status}: {stderr_tail}")]
    NonZeroExit { command: String, status: i32, stderr_tail: String },
}

/// The captured result of a successful subprocess run.
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args`, capturing stdout/stderr, and guarantee the
/// child is waited on before this function returns on every path (the
/// `Child` is never held past the point where we've called `wait`, so
/// there's nothing for a scope guard to do beyond what `Child::drop` already
/// does for an already-reaped process).
pub fn run(program: &str, args: &[String]) -> Result<Output, SubprocessError> {
    let command_line = render_command_line(program, args);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SubprocessError::Spawn { command: command_line.clone(), source })?;

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout)
            .map_err(|source| SubprocessError::Io { command: command_line.clone(), source })?;
    }
    if let Some(mut err) = child.stderr.take() {
        err.read_to_string(&mut stderr)
            .map_err(|source| SubprocessError::Io { command: command_line.clone(), source })?;
    }

    let status = child
        .wait()
        .map_err(|source| SubprocessError::Io { command: command_line.clone(), source })?;

    if !status.success() {
        let stderr_tail = tail_lines(&stderr, 5);
        return Err(SubprocessError::NonZeroExit {
            command: command_line,
            status: status.code().unwrap_or(-1),
            stderr_tail,
        });
    }

    Ok(Output { stdout, stderr })
}

fn render_command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for a in args {
        line.push(' ');
        line.push_str(a);
    }
    line
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
