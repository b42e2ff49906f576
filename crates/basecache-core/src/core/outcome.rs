use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl CommandStatus {
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::UserError => 1,
            Self::Failure => 2,
        }
    }
}

/// Envelope printed by `--json`.
#[must_use]
pub fn to_json_response(command: &str, outcome: &ExecutionOutcome) -> Value {
    let status = match outcome.status {
        CommandStatus::Ok => "ok",
        CommandStatus::UserError | CommandStatus::Failure => "error",
    };
    serde_json::json!({
        "status": status,
        "command": command,
        "message": outcome.message,
        "details": outcome.details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_envelope_carries_status_and_details() {
        let outcome = ExecutionOutcome::user_error("bad snapshot", json!({"code": "BC103"}));
        let response = to_json_response("verify", &outcome);
        assert_eq!(response["status"], "error");
        assert_eq!(response["command"], "verify");
        assert_eq!(response["details"]["code"], "BC103");
        assert_eq!(outcome.status.exit_code(), 1);
    }
}
