//! Interpreter Types
//!
//! Result and output types shared by the execution engine and the shell.

use serde::Serialize;

/// Result from executing a script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
        }
    }
}

/// Output produced while capturing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffer {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl OutputBuffer {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Script text read by `source`, kept so its errors can be rendered
#[derive(Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

/// Exit statuses of every stage of the last pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStatus {
    pub stages: Vec<i32>,
}

impl PipelineStatus {
    /// Status of the final stage; earlier failures do not change it
    pub fn final_exit_code(&self) -> i32 {
        self.stages.last().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_result_json_shape() {
        let result = ExecResult::new("out".into(), String::new(), 3);
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"{"stdout":"out","stderr":"","exitCode":3}"#);
    }

    #[test]
    fn test_final_stage_status_wins() {
        let status = PipelineStatus { stages: vec![1, 0] };
        assert_eq!(status.final_exit_code(), 0);
        assert_eq!(PipelineStatus::default().final_exit_code(), 0);
    }
}
