use std::io::Write;
use std::process::{Command, Stdio};

use serde::Deserialize;

use super::{SimulationRequest, Simulator};
use crate::error::SimulationError;

/// Runs an external engine program once per request.
///
/// Protocol: the request is written to the child's stdin as one JSON object.
/// The child answers on stdout with either `{"k_s": 1.0123}` or
/// `{"error": "reason", "kind": "non_physical" | "non_convergence"}`.
/// A non-zero exit status is a failure carrying the child's stderr.
#[derive(Debug, Clone)]
pub struct CommandSimulator {
    program: String,
    args: Vec<String>,
    label: String,
}

#[derive(Debug, Deserialize)]
struct EngineResponse {
    k_s: Option<f64>,
    error: Option<String>,
    kind: Option<ErrorKind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ErrorKind {
    NonPhysical,
    NonConvergence,
}

impl CommandSimulator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let label = format!("command:{program}");
        Self {
            program,
            args,
            label,
        }
    }
}

impl Simulator for CommandSimulator {
    fn name(&self) -> &str {
        &self.label
    }

    fn simulate(&self, request: &SimulationRequest) -> Result<f64, SimulationError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| SimulationError::InvalidOutput(format!("encoding request: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SimulationError::Unavailable(format!("spawning {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading stdin closes the pipe; its
            // exit status and stdout still decide the outcome.
            let _ = stdin.write_all(&payload);
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SimulationError::Unavailable(format!("waiting for {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SimulationError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| SimulationError::InvalidOutput("empty output".into()))?;
        let response: EngineResponse = serde_json::from_str(line.trim())
            .map_err(|e| SimulationError::InvalidOutput(format!("{e}: {line}")))?;

        match response {
            EngineResponse { k_s: Some(k_s), error: None, .. } => Ok(k_s),
            EngineResponse { error: Some(reason), kind, .. } => Err(match kind {
                Some(ErrorKind::NonPhysical) => SimulationError::NonPhysical(reason),
                Some(ErrorKind::NonConvergence) | None => SimulationError::NonConvergence(reason),
            }),
            EngineResponse { k_s: None, error: None, .. } => {
                Err(SimulationError::InvalidOutput(format!("no k_s in response: {line}")))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sim::tests::request;
    use crate::sim::{SimulationOutcome, TrackMode};

    fn shell(script: &str) -> CommandSimulator {
        CommandSimulator::new("sh", vec!["-c".into(), script.into()])
    }

    #[test]
    fn reads_factor_from_last_line() {
        let sim = shell("cat > /dev/null; echo 'progress 50%'; echo '{\"k_s\": 1.0123}'");
        let k = sim.simulate(&request(150.0, TrackMode::SingleTrack)).unwrap();
        assert_eq!(k, 1.0123);
    }

    #[test]
    fn request_arrives_on_stdin() {
        // Echo the energy back as k_s.
        let sim = shell(
            "read line; e=$(echo \"$line\" | sed 's/.*\"energy_mev\":\\([0-9.]*\\).*/\\1/'); \
             echo \"{\\\"k_s\\\": $e}\"",
        );
        let k = sim.simulate(&request(150.0, TrackMode::SingleTrack)).unwrap();
        assert_eq!(k, 150.0);
    }

    #[test]
    fn engine_error_is_classified() {
        let sim = shell("cat > /dev/null; echo '{\"error\": \"gap too small\", \"kind\": \"non_physical\"}'");
        let err = sim.simulate(&request(150.0, TrackMode::SingleTrack)).unwrap_err();
        assert!(matches!(err, SimulationError::NonPhysical(r) if r == "gap too small"));
    }

    #[test]
    fn nonzero_exit_becomes_failure_outcome() {
        let sim = shell("cat > /dev/null; echo boom >&2; exit 3");
        match sim.invoke(&request(150.0, TrackMode::SingleTrack)) {
            SimulationOutcome::Failure(reason) => assert!(reason.contains("boom")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_unavailable() {
        let sim = CommandSimulator::new("/nonexistent/engine", Vec::new());
        let err = sim.simulate(&request(150.0, TrackMode::SingleTrack)).unwrap_err();
        assert!(matches!(err, SimulationError::Unavailable(_)));
    }
}
