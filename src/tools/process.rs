//! Running external page tools as child processes.
//!
//! Every invocation is bounded by a timeout. On expiry the child is killed
//! (`kill_on_drop`) and the run fails with [`IngestError::ToolTimeout`].
//! A non-zero exit fails with [`IngestError::ToolFailed`] carrying stderr.

use crate::error::IngestError;
use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const INPUT: &str = "{input}";
const OUTPUT: &str = "{output}";

/// A program plus argument template.
///
/// `{input}` and `{output}` in arguments are substituted with the call's
/// paths. When no argument mentions `{input}`, the input path is appended;
/// likewise for `{output}` when the call has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Expand the template for one call.
    pub fn expand(&self, input: &Path, output: Option<&Path>) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.map(|p| p.display().to_string());
        let mut has_input = false;
        let mut has_output = false;

        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                has_input |= arg.contains(INPUT);
                has_output |= arg.contains(OUTPUT);
                let arg = arg.replace(INPUT, &input);
                match &output {
                    Some(out) => arg.replace(OUTPUT, out),
                    None => arg,
                }
            })
            .collect();

        if !has_input {
            args.push(input);
        }
        if let (Some(out), false) = (output, has_output) {
            args.push(out);
        }
        args
    }
}

impl FromStr for CommandSpec {
    type Err = String;

    /// Whitespace-separated; no shell quoting.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| "command must not be empty".to_string())?;
        Ok(CommandSpec::new(program, words))
    }
}

/// Run `spec` on `input` and return its stdout as text.
pub async fn run_tool(
    tool: &'static str,
    spec: &CommandSpec,
    input: &Path,
    output: Option<&Path>,
    timeout_secs: u64,
) -> Result<String, IngestError> {
    let args = spec.expand(input, output);
    let target = input.display().to_string();
    debug!(tool, program = %spec.program, ?args, "spawning");

    let child = Command::new(&spec.program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| IngestError::ToolSpawnFailed {
            tool,
            program: spec.program.clone(),
            source,
        })?;

    let result = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        child.wait_with_output(),
    )
    .await;

    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(IngestError::ToolFailed {
                tool,
                target,
                code: None,
                stderr: e.to_string(),
            })
        }
        Err(_) => {
            return Err(IngestError::ToolTimeout {
                tool,
                target,
                secs: timeout_secs,
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IngestError::ToolFailed {
            tool,
            target,
            code: output.status.code(),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
