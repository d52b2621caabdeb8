//! Wire protocol message types
//!
//! CLI and daemon exchange newline-delimited JSON documents over TCP.
//! Responses are correlated to requests purely by the `id` field; a client
//! pipelining several requests must not assume responses arrive in order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of daemon request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    /// Call a tool on an MCP server
    Call,
    /// List tools available on one server
    ListTools,
    /// List all configured servers with running state
    ListServers,
    /// Daemon status (works before config load)
    Status,
    /// Shut the daemon down
    Shutdown,
}

/// Request from CLI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Caller-chosen id, echoed in the response
    pub id: String,
    /// The operation to perform
    pub kind: RequestKind,
    /// Target server name (call, list-tools)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_name: Option<String>,
    /// Tool name (call)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool arguments (call)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    /// SKILL.md path to load if the daemon has no config yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

/// Response from daemon to CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request id this response corresponds to
    pub id: String,
    /// Whether the request succeeded
    pub success: bool,
    /// Result data on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Create a success response
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Status result reported by the daemon
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    pub config_path: Option<String>,
    pub skill_name: Option<String>,
    pub total_backends: usize,
    pub running_backends: usize,
}

/// One entry in the list-servers result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    pub name: String,
    pub running: bool,
    /// Milliseconds since the Unix epoch, or null if never used
    pub last_used_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&RequestKind::ListTools).unwrap(),
            "\"list-tools\""
        );
        assert_eq!(
            serde_json::to_string(&RequestKind::ListServers).unwrap(),
            "\"list-servers\""
        );
    }

    #[test]
    fn test_request_round_trip() {
        let json = r#"{"id":"abc","kind":"call","backendName":"echo","toolName":"echo","arguments":{"message":"hi"}}"#;
        let req: RequestEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(req.id, "abc");
        assert_eq!(req.kind, RequestKind::Call);
        assert_eq!(req.backend_name.as_deref(), Some("echo"));
        assert_eq!(req.tool_name.as_deref(), Some("echo"));
        assert!(req.config_path.is_none());

        let out = serde_json::to_string(&req).unwrap();
        assert!(out.contains("\"backendName\":\"echo\""));
        assert!(!out.contains("configPath"));
    }

    #[test]
    fn test_response_success_shape() {
        let resp = ResponseEnvelope::success("1", json!({"ok": true}));
        let out = serde_json::to_value(&resp).unwrap();
        assert_eq!(out["id"], "1");
        assert_eq!(out["success"], true);
        assert!(out.get("error").is_none());
    }

    #[test]
    fn test_response_failure_shape() {
        let resp = ResponseEnvelope::failure("2", "boom");
        let out = serde_json::to_value(&resp).unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "boom");
        assert!(out.get("result").is_none());
    }

    #[test]
    fn test_unknown_kind_fails_to_parse() {
        let json = r#"{"id":"x","kind":"reboot"}"#;
        assert!(serde_json::from_str::<RequestEnvelope>(json).is_err());
    }
}
