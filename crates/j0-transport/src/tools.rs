//! Agent-tool surface: schemas plus a dispatcher onto the session manager.

use j0_core::{ExecutionEngine, SessionFilter, SessionId, SessionStorage};
use j0_session::{ManagerError, SessionManager, parse_session_id};
use serde_json::{Map, Value, json};

use crate::protocol::{StatusResponse, ToolCall, ToolDefinition, log_lines};

pub const CREATE_SESSION: &str = "j0_create_session";
pub const EXECUTE: &str = "j0_execute";
pub const GET_SESSION: &str = "j0_get_session";
pub const LIST_SESSIONS: &str = "j0_list_sessions";
pub const GET_LOG: &str = "j0_get_log";
pub const CLOSE_SESSION: &str = "j0_close_session";
pub const SET_ENV: &str = "j0_set_env";

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

fn session_id_property() -> Value {
    json!({ "type": "string", "description": "The session ID" })
}

/// Every tool this surface exposes.
#[must_use]
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            CREATE_SESSION,
            "Create a new interactive code execution session. Returns the session ID for subsequent operations.",
            json!({
                "language": {
                    "type": "string",
                    "description": format!(
                        "Programming language for the session ({})",
                        j0_core::Language::supported_names()
                    ),
                },
                "name": { "type": "string", "description": "Optional human-readable name" },
            }),
            &["language"],
        ),
        tool(
            EXECUTE,
            "Execute code in an existing session. Returns stdout, stderr and exit code.",
            json!({
                "session_id": session_id_property(),
                "code": { "type": "string", "description": "The code to execute" },
                "stdin": { "type": "string", "description": "Optional standard input" },
            }),
            &["session_id", "code"],
        ),
        tool(
            GET_SESSION,
            "Get a session including its environment variables and execution history.",
            json!({ "session_id": session_id_property() }),
            &["session_id"],
        ),
        tool(
            LIST_SESSIONS,
            "List all execution sessions with their status.",
            json!({}),
            &[],
        ),
        tool(
            GET_LOG,
            "Get the execution log of a session: every command with its output.",
            json!({
                "session_id": session_id_property(),
                "lines": {
                    "type": "integer",
                    "description": "Number of trailing lines to return (default 100, 0 for all)",
                },
            }),
            &["session_id"],
        ),
        tool(
            CLOSE_SESSION,
            "Close a session. Its log is preserved but no more executions are accepted.",
            json!({ "session_id": session_id_property() }),
            &["session_id"],
        ),
        tool(
            SET_ENV,
            "Set an environment variable that is available to all subsequent executions.",
            json!({
                "session_id": session_id_property(),
                "key": { "type": "string", "description": "Environment variable name" },
                "value": { "type": "string", "description": "Environment variable value" },
            }),
            &["session_id", "key", "value"],
        ),
    ]
}

/// Run one tool call against `manager`.
///
/// # Errors
/// Returns `InvalidRequest` for unknown tools or missing parameters, or
/// whatever the underlying manager operation fails with.
pub async fn dispatch<S, E>(
    manager: &SessionManager<S, E>,
    call: ToolCall,
) -> Result<Value, ManagerError>
where
    S: SessionStorage,
    E: ExecutionEngine,
{
    let params = &call.params;
    tracing::debug!(tool = %call.tool, "Dispatching tool call");

    match call.tool.as_str() {
        CREATE_SESSION => {
            let language = required_str(params, "language")?;
            let name = optional_str(params, "name").map(str::to_string);
            let session = manager.create_session(language, name).await?;
            Ok(json!(session))
        }
        EXECUTE => {
            let id = session_id(params)?;
            let code = required_str(params, "code")?;
            let stdin = optional_str(params, "stdin");
            let outcome = manager.execute(id, code, stdin).await?;
            Ok(json!(outcome))
        }
        GET_SESSION => {
            let session = manager.get_session(session_id(params)?).await?;
            Ok(json!(session))
        }
        LIST_SESSIONS => {
            let sessions = manager.list_sessions(SessionFilter::default()).await?;
            Ok(json!(sessions))
        }
        GET_LOG => {
            let id = session_id(params)?;
            let lines = log_lines(params.get("lines").and_then(Value::as_i64));
            let log = manager.get_log(id, lines).await?;
            Ok(json!({ "log": log }))
        }
        CLOSE_SESSION => {
            manager.close_session(session_id(params)?).await?;
            Ok(json!(StatusResponse::new("closed")))
        }
        SET_ENV => {
            let id = session_id(params)?;
            let key = required_str(params, "key")?;
            let value = params.get("value").and_then(Value::as_str).ok_or_else(|| {
                ManagerError::InvalidRequest("value is required".to_string())
            })?;
            manager.set_env(id, key, value).await?;
            Ok(json!(StatusResponse::new("ok")))
        }
        other => Err(ManagerError::InvalidRequest(format!("unknown tool: {other}"))),
    }
}

fn optional_str<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn required_str<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, ManagerError> {
    optional_str(params, key)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ManagerError::InvalidRequest(format!("{key} is required")))
}

fn session_id(params: &Map<String, Value>) -> Result<SessionId, ManagerError> {
    parse_session_id(required_str(params, "session_id")?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::http::tests::{FakeEngine, manager};

    fn call(tool: &str, params: Value) -> ToolCall {
        ToolCall {
            tool: tool.to_string(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_definitions_cover_every_tool() {
        let defs = definitions();
        let names: HashSet<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names.len(), 7);
        for name in [
            CREATE_SESSION,
            EXECUTE,
            GET_SESSION,
            LIST_SESSIONS,
            GET_LOG,
            CLOSE_SESSION,
            SET_ENV,
        ] {
            assert!(names.contains(name), "{name}");
        }
        let execute = defs.iter().find(|d| d.name == EXECUTE).unwrap();
        assert_eq!(execute.input_schema["required"], json!(["session_id", "code"]));
    }

    #[tokio::test]
    async fn test_session_workflow() {
        let (_dir, manager) = manager(FakeEngine::printing("bar\n")).await;

        let created = tokio_test::assert_ok!(
            dispatch(&manager, call(CREATE_SESSION, json!({ "language": "bash" }))).await
        );
        let id = created["id"].as_str().unwrap().to_string();

        let ack = dispatch(
            &manager,
            call(SET_ENV, json!({ "session_id": id, "key": "FOO", "value": "bar" })),
        )
        .await
        .unwrap();
        assert_eq!(ack, json!({ "status": "ok" }));

        let outcome = dispatch(
            &manager,
            call(EXECUTE, json!({ "session_id": id, "code": "echo $FOO" })),
        )
        .await
        .unwrap();
        assert_eq!(outcome["stdout"], "bar\n");
        assert_eq!(outcome["exit_code"], 0);

        let log = dispatch(&manager, call(GET_LOG, json!({ "session_id": id, "lines": 0 })))
            .await
            .unwrap();
        assert!(log["log"].as_str().unwrap().contains("$ echo $FOO"));

        let closed = dispatch(&manager, call(CLOSE_SESSION, json!({ "session_id": id })))
            .await
            .unwrap();
        assert_eq!(closed["status"], "closed");

        let err = dispatch(
            &manager,
            call(EXECUTE, json!({ "session_id": id, "code": "echo again" })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidState { .. }));

        let sessions = dispatch(&manager, call(LIST_SESSIONS, json!({})))
            .await
            .unwrap();
        assert_eq!(sessions.as_array().unwrap().len(), 1);
        assert_eq!(sessions[0]["status"], "closed");
    }

    #[tokio::test]
    async fn test_parameter_validation() {
        let (_dir, manager) = manager(FakeEngine::printing("")).await;

        let err = dispatch(&manager, call(CREATE_SESSION, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidRequest(ref m) if m == "language is required"));

        let err = dispatch(&manager, call(GET_SESSION, json!({ "session_id": "nope" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::NotFound(ref id) if id == "nope"));

        let err = dispatch(&manager, call(GET_LOG, json!({})))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ManagerError::InvalidRequest(ref m) if m == "session_id is required")
        );

        let err = dispatch(&manager, call("j0_delete_everything", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidRequest(ref m) if m.contains("unknown tool")));
    }
}
