//! Controller process wire contract
//!
//! The controller prints one JSON object on stdout:
//! ```text
//! {"ok": true,  ...details}          action performed
//! {"ok": false, "error": "...", ...} controller recognised a failure
//! ```
//! [`ControllerReport`] is the encoder used by the controller binary;
//! [`interpret`] turns a finished process into an [`ExecutionOutcome`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Failure classes callers can tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Whitelist violation caught by the executor
    #[serde(rename = "DISALLOWED")]
    Disallowed,
    /// Controller exceeded its time budget and was killed
    #[serde(rename = "TIMEOUT")]
    Timeout,
    /// Controller ran but broke the output contract or reported failure
    #[serde(rename = "PYTHON_ERROR")]
    ControllerError,
    /// Controller could not be started or exited abnormally
    #[serde(rename = "EXEC_ERROR")]
    ExecError,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Disallowed => "DISALLOWED",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::ControllerError => "PYTHON_ERROR",
            ErrorCategory::ExecError => "EXEC_ERROR",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics for a failed execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionFailure {
    pub category: ErrorCategory,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
}

impl ExecutionFailure {
    fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            signal: None,
            timed_out: false,
        }
    }

    /// Device/action pair missing from the whitelist
    pub fn disallowed(device: &str, action: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Disallowed,
            format!("Action '{}' is not permitted on device '{}'", action, device),
        )
    }

    /// Controller killed after exceeding its budget
    pub fn timeout(timeout_ms: u64) -> Self {
        Self {
            timed_out: true,
            ..Self::new(
                ErrorCategory::Timeout,
                format!("Controller did not finish within {}ms", timeout_ms),
            )
        }
    }

    /// Controller could not be started
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ExecError, message)
    }
}

/// Result of one controller invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Controller payload with the `ok` flag removed
    Success { payload: Map<String, Value> },
    Failure(ExecutionFailure),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::Failure(f) => Some(f.category),
        }
    }
}

impl From<ExecutionFailure> for ExecutionOutcome {
    fn from(failure: ExecutionFailure) -> Self {
        ExecutionOutcome::Failure(failure)
    }
}

/// The object a controller prints on stdout
///
/// `error` is only split out of a failure report. On success every key
/// except `ok` stays in `details`, whatever its name or type.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerReport {
    pub ok: bool,
    pub error: Option<String>,
    pub details: Map<String, Value>,
}

impl ControllerReport {
    pub fn success(details: Map<String, Value>) -> Self {
        Self {
            ok: true,
            error: None,
            details,
        }
    }

    pub fn failure(error: impl Into<String>, details: Map<String, Value>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            details,
        }
    }

    /// Single-line JSON encoding
    pub fn encode(&self) -> String {
        let mut object = self.details.clone();
        object.insert("ok".into(), Value::Bool(self.ok));
        if let Some(error) = &self.error {
            object.insert("error".into(), Value::String(error.clone()));
        }
        Value::Object(object).to_string()
    }

    /// Build a report from a parsed JSON value
    ///
    /// Requires an object with a boolean `ok`. A non-string `error` on a
    /// failure report is kept as its JSON text.
    pub fn from_value(value: Value) -> Option<Self> {
        let mut details = match value {
            Value::Object(map) => map,
            _ => return None,
        };
        let ok = details.remove("ok")?.as_bool()?;
        if ok {
            return Some(Self::success(details));
        }

        let error = match details.remove("error") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Some(Self {
            ok,
            error,
            details,
        })
    }

    /// Find the report in controller stdout
    ///
    /// Tries the whole output first, then each line from the last one up,
    /// so log noise printed before the report is tolerated.
    pub fn decode(stdout: &str) -> Option<Self> {
        let parse = |text: &str| {
            serde_json::from_str::<Value>(text)
                .ok()
                .and_then(Self::from_value)
        };

        let trimmed = stdout.trim();
        if let Some(report) = parse(trimmed) {
            return Some(report);
        }
        trimmed
            .lines()
            .rev()
            .map(str::trim)
            .filter(|line| line.starts_with('{'))
            .find_map(parse)
    }
}

/// How the controller process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Classify a finished controller run
pub fn interpret(exit: ProcessExit, stdout: &str, stderr: &str) -> ExecutionOutcome {
    let with_output = |category: ErrorCategory, message: String| ExecutionFailure {
        category,
        message,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code: exit.code,
        signal: exit.signal,
        timed_out: false,
    };

    if let Some(signal) = exit.signal {
        return with_output(
            ErrorCategory::ExecError,
            format!("Controller terminated by signal {}", signal),
        )
        .into();
    }

    match ControllerReport::decode(stdout) {
        Some(report) if report.ok => {
            if exit.success() {
                ExecutionOutcome::Success {
                    payload: report.details,
                }
            } else {
                with_output(
                    ErrorCategory::ExecError,
                    format!(
                        "Controller reported success but exited with {}",
                        describe_code(exit.code)
                    ),
                )
                .into()
            }
        }
        Some(report) => with_output(
            ErrorCategory::ControllerError,
            report
                .error
                .unwrap_or_else(|| "Controller reported failure".to_string()),
        )
        .into(),
        None if !exit.success() => with_output(
            ErrorCategory::ExecError,
            format!("Controller exited with {}", describe_code(exit.code)),
        )
        .into(),
        None => with_output(
            ErrorCategory::ControllerError,
            "Controller output did not match the expected contract".to_string(),
        )
        .into(),
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("code {}", c),
        None => "unknown status".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exited(code: i32) -> ProcessExit {
        ProcessExit {
            code: Some(code),
            signal: None,
        }
    }

    #[test]
    fn test_success_payload_roundtrips_unchanged() {
        let outcome = interpret(exited(0), r#"{"ok":true,"x":1}"#, "");
        let expected = json!({"x": 1});
        match outcome {
            ExecutionOutcome::Success { payload } => {
                assert_eq!(Value::Object(payload), expected);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_report_after_log_noise() {
        let stdout = "opening /dev/ttyUSB0\n{\"ok\": true, \"device\": \"lights\"}\n";
        let outcome = interpret(exited(0), stdout, "");
        assert!(outcome.is_success());
    }

    #[test]
    fn test_reported_failure_is_controller_error() {
        let stdout = r#"{"ok": false, "error": "No payload for action 'start' on 'lights'"}"#;
        let outcome = interpret(exited(1), stdout, "traceback");
        match outcome {
            ExecutionOutcome::Failure(f) => {
                assert_eq!(f.category, ErrorCategory::ControllerError);
                assert!(f.message.contains("No payload"));
                assert_eq!(f.exit_code, Some(1));
                assert_eq!(f.stderr, "traceback");
                assert!(!f.timed_out);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_unparsable_output_is_controller_error() {
        let outcome = interpret(exited(0), "Sent '3101' to device lights", "");
        match outcome {
            ExecutionOutcome::Failure(f) => {
                assert_eq!(f.category, ErrorCategory::ControllerError);
                assert_eq!(f.stdout, "Sent '3101' to device lights");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_nonzero_exit_without_report_is_exec_error() {
        let outcome = interpret(exited(127), "", "command not found");
        assert_eq!(outcome.category(), Some(ErrorCategory::ExecError));
    }

    #[test]
    fn test_success_report_with_bad_exit_is_exec_error() {
        let outcome = interpret(exited(3), r#"{"ok": true}"#, "");
        assert_eq!(outcome.category(), Some(ErrorCategory::ExecError));
    }

    #[test]
    fn test_signal_is_exec_error() {
        let exit = ProcessExit {
            code: None,
            signal: Some(9),
        };
        let outcome = interpret(exit, r#"{"ok": true}"#, "");
        match outcome {
            ExecutionOutcome::Failure(f) => {
                assert_eq!(f.category, ErrorCategory::ExecError);
                assert_eq!(f.signal, Some(9));
                assert!(f.message.contains("signal 9"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_report_encoding() {
        let mut details = Map::new();
        details.insert("device".into(), json!("lights"));
        let line = ControllerReport::success(details).encode();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value, json!({"ok": true, "device": "lights"}));

        let line = ControllerReport::failure("port busy", Map::new()).encode();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value, json!({"ok": false, "error": "port busy"}));
    }

    #[test]
    fn test_success_payload_keeps_error_key() {
        let stdout = r#"{"ok":true,"error":"stale reading","x":1}"#;
        match interpret(exited(0), stdout, "") {
            ExecutionOutcome::Success { payload } => {
                assert_eq!(
                    Value::Object(payload),
                    json!({"error": "stale reading", "x": 1})
                );
            }
            other => panic!("expected success, got {:?}", other),
        }

        let outcome = interpret(exited(0), r#"{"ok":true,"error":5}"#, "");
        match outcome {
            ExecutionOutcome::Success { payload } => assert_eq!(payload["error"], 5),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_with_structured_error() {
        let outcome = interpret(exited(1), r#"{"ok":false,"error":{"code":16}}"#, "");
        match outcome {
            ExecutionOutcome::Failure(f) => {
                assert_eq!(f.category, ErrorCategory::ControllerError);
                assert_eq!(f.message, r#"{"code":16}"#);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_report_requires_boolean_ok() {
        assert!(ControllerReport::decode(r#"{"ok":"yes"}"#).is_none());
        assert!(ControllerReport::decode(r#"{"device":"lights"}"#).is_none());
        assert!(ControllerReport::decode("[true]").is_none());
    }

    #[test]
    fn test_category_wire_names() {
        assert_eq!(
            serde_json::to_string(&ErrorCategory::ControllerError).unwrap(),
            "\"PYTHON_ERROR\""
        );
        assert_eq!(ErrorCategory::Timeout.to_string(), "TIMEOUT");
        let failure = ExecutionFailure::timeout(10_000);
        assert!(failure.timed_out);
        assert_eq!(failure.category, ErrorCategory::Timeout);
    }
}
