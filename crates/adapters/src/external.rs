//! Adapters backed by external commands.
//!
//! The request is written to the command's stdin as JSON. The command
//! answers on stdout with `{"ok": <response>}` or
//! `{"error": {"kind": "...", "message": "..."}}`.

use super::r#trait::{
    AdapterError, CircuitSimulator, CircuitSynthesizer, SimulationRequest, SynthesisRequest,
};
use async_trait::async_trait;
use geneforge_core::{PartAssignment, RowLevels, SimulationResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Error categories an external command can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalErrorKind {
    /// No assignment exists
    Unsatisfiable,
    /// The model did not settle
    Nonconvergent,
    /// The model is invalid
    InvalidModel,
    /// Anything else
    Other,
}

/// Error payload of an external command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalError {
    /// Category
    pub kind: ExternalErrorKind,
    /// Description
    pub message: String,
}

/// Reply envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalReply<T> {
    /// Success
    Ok(T),
    /// Reported failure
    Error(ExternalError),
}

/// A command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to run
    pub program: String,
    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a command line.
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Run `command`, feeding `input` as JSON and parsing stdout as JSON.
pub async fn run_json_command<I, O>(command: &CommandSpec, input: &I) -> Result<O, AdapterError>
where
    I: Serialize + ?Sized,
    O: DeserializeOwned,
{
    let start = std::time::Instant::now();
    let payload = serde_json::to_vec(input)?;

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        // A command may exit without reading its input; its status decides
        let written = match stdin.write_all(&payload).await {
            Ok(()) => stdin.shutdown().await,
            Err(e) => Err(e),
        };
        match written {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
            _ => {}
        }
    }

    let output = child.wait_with_output().await?;
    tracing::debug!(
        "{} exited with {:?} after {:?}",
        command.program,
        output.status.code(),
        start.elapsed()
    );

    if !output.status.success() {
        return Err(AdapterError::Command {
            program: command.program.clone(),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

/// Run `command` and unwrap the reply envelope.
async fn call<I, O>(command: &CommandSpec, input: &I) -> Result<O, AdapterError>
where
    I: Serialize + ?Sized,
    O: DeserializeOwned,
{
    match run_json_command::<I, ExternalReply<O>>(command, input).await? {
        ExternalReply::Ok(value) => Ok(value),
        ExternalReply::Error(err) => Err(match err.kind {
            ExternalErrorKind::Unsatisfiable => AdapterError::Unsatisfiable(err.message),
            ExternalErrorKind::Nonconvergent => AdapterError::Nonconvergent(err.message),
            ExternalErrorKind::InvalidModel => AdapterError::InvalidModel(err.message),
            ExternalErrorKind::Other => AdapterError::Command {
                program: command.program.clone(),
                status: Some(0),
                stderr: err.message,
            },
        }),
    }
}

/// Synthesizer delegating to an external compiler.
pub struct ExternalSynthesizer {
    command: CommandSpec,
}

impl ExternalSynthesizer {
    /// Create an adapter for a command.
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl CircuitSynthesizer for ExternalSynthesizer {
    fn name(&self) -> &str {
        &self.command.program
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<PartAssignment, AdapterError> {
        let assignment: PartAssignment = call(&self.command, request).await?;
        assignment
            .validate()
            .map_err(|e| AdapterError::InvalidModel(e.to_string()))?;
        Ok(assignment)
    }
}

/// Simulator delegating to an external solver. The solver returns one
/// [`RowLevels`] per requested row.
pub struct ExternalSimulator {
    command: CommandSpec,
}

impl ExternalSimulator {
    /// Create an adapter for a command.
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl CircuitSimulator for ExternalSimulator {
    fn name(&self) -> &str {
        &self.command.program
    }

    async fn simulate(&self, request: &SimulationRequest) -> Result<SimulationResult, AdapterError> {
        let rows: Vec<RowLevels> = call(&self.command, request).await?;
        if rows.len() != request.rows.len() {
            return Err(AdapterError::InvalidModel(format!(
                "{} returned {} rows for {} requested",
                self.command.program,
                rows.len(),
                request.rows.len()
            )));
        }
        Ok(SimulationResult::new(request.version, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geneforge_core::{CircuitSpec, VersionId};

    #[tokio::test]
    async fn test_cat_echoes_json() {
        let value = serde_json::json!({"a": 1, "b": [true, false]});
        let echoed: serde_json::Value = run_json_command(&CommandSpec::new("cat", &[]), &value).await.unwrap();
        assert_eq!(echoed, value);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_command_error() {
        let err = run_json_command::<_, serde_json::Value>(&CommandSpec::new("false", &[]), &1)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Command { .. }));
    }

    #[tokio::test]
    async fn test_reported_unsatisfiable() {
        let command = CommandSpec::new(
            "sh",
            &["-c", r#"cat >/dev/null; echo '{"error":{"kind":"unsatisfiable","message":"no gates"}}'"#],
        );
        let spec = CircuitSpec::from_expressions("not", ["A"], &[("GFP", "!A")]).unwrap();
        let err = ExternalSynthesizer::new(command)
            .synthesize(&SynthesisRequest::new(spec))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unsatisfiable(m) if m == "no gates"));
    }

    #[tokio::test]
    async fn test_simulator_row_count_checked() {
        let command = CommandSpec::new("sh", &["-c", r#"cat >/dev/null; echo '{"ok":[]}'"#]);
        let request = SimulationRequest {
            version: VersionId::new(),
            assignment: PartAssignment { netlist: Default::default(), parts: Default::default() },
            inputs: vec!["A".into()],
            rows: vec![vec![false], vec![true]],
            time_course: false,
        };
        let err = ExternalSimulator::new(command).simulate(&request).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidModel(_)));
    }
}
