use serde::{Deserialize, Serialize};

/// Output reported for a command that succeeded without printing anything, so an
/// empty success can be told apart from a silent failure.
pub const EMPTY_SUCCESS_SENTINEL: &str = "✅ done";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Error,
}

/// Payload of an `output` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub output: String,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(rename = "dir", default, skip_serializing_if = "Option::is_none")]
    pub directory_display: Option<String>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl CommandResult {
    pub fn success(output: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            output: output.into(),
            error_detail: None,
            directory_display: None,
            prompt: prompt.into(),
            request_id: None,
        }
    }

    pub fn failure(
        output: impl Into<String>,
        detail: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            status: CommandStatus::Error,
            output: output.into(),
            error_detail: Some(detail.into()),
            directory_display: None,
            prompt: prompt.into(),
            request_id: None,
        }
    }

    pub fn with_directory(mut self, display: impl Into<String>) -> Self {
        self.directory_display = Some(display.into());
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}
