//! HTTP API over the session manager.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use j0_core::{EngineError, ExecutionEngine, Session, SessionId, SessionStorage};
use j0_session::{ExecutionOutcome, ManagerError, SessionManager, parse_session_id};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    protocol::{
        CreateSessionRequest, ErrorBody, ExecuteRequest, ListQuery, LogQuery, SetEnvRequest,
        StatusResponse, ToolCall, ToolDefinition, log_lines,
    },
    tools,
};

/// Manager error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ManagerError);

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        Self(ManagerError::InvalidRequest(message.into()))
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            ManagerError::NotFound(_) => StatusCode::NOT_FOUND,
            ManagerError::InvalidState { .. } => StatusCode::CONFLICT,
            ManagerError::LanguageUnsupported(_) | ManagerError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ManagerError::Engine(EngineError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ManagerError::Engine(_) => StatusCode::BAD_GATEWAY,
            ManagerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;
type Shared<S, E> = State<Arc<SessionManager<S, E>>>;

/// Build the API router.
pub fn router<S, E>(manager: Arc<SessionManager<S, E>>) -> Router
where
    S: SessionStorage + 'static,
    E: ExecutionEngine + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route(
            "/sessions",
            post(create_session::<S, E>).get(list_sessions::<S, E>),
        )
        .route(
            "/sessions/{id}",
            get(get_session::<S, E>).delete(close_session::<S, E>),
        )
        .route("/sessions/{id}/execute", post(execute::<S, E>))
        .route("/sessions/{id}/env", post(set_env::<S, E>))
        .route("/sessions/{id}/log", get(get_log::<S, E>))
        .route("/mcp/tools", get(list_tools))
        .route("/mcp/invoke", post(invoke_tool::<S, E>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(manager)
}

fn parse_id(raw: &str) -> ApiResult<SessionId> {
    Ok(parse_session_id(raw)?)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| ApiError::invalid(rejection.body_text()))
}

async fn health() -> Json<StatusResponse> {
    Json(StatusResponse::new("ok"))
}

async fn create_session<S: SessionStorage, E: ExecutionEngine>(
    State(manager): Shared<S, E>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let request = body(payload)?;
    if request.language.trim().is_empty() {
        return Err(ApiError::invalid("language is required"));
    }
    let session = manager
        .create_session(&request.language, request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions<S: SessionStorage, E: ExecutionEngine>(
    State(manager): Shared<S, E>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Session>>> {
    let Query(query) = query.map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
    let sessions = manager.list_sessions(query.into_filter()?).await?;
    Ok(Json(sessions))
}

async fn get_session<S: SessionStorage, E: ExecutionEngine>(
    State(manager): Shared<S, E>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    let session = manager.get_session(parse_id(&id)?).await?;
    Ok(Json(session))
}

async fn execute<S: SessionStorage, E: ExecutionEngine>(
    State(manager): Shared<S, E>,
    Path(id): Path<String>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> ApiResult<Json<ExecutionOutcome>> {
    let id = parse_id(&id)?;
    let request = body(payload)?;
    let outcome = manager
        .execute(id, &request.code, request.stdin.as_deref())
        .await?;
    Ok(Json(outcome))
}

async fn set_env<S: SessionStorage, E: ExecutionEngine>(
    State(manager): Shared<S, E>,
    Path(id): Path<String>,
    payload: Result<Json<SetEnvRequest>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let id = parse_id(&id)?;
    let request = body(payload)?;
    manager.set_env(id, &request.key, &request.value).await?;
    Ok(Json(StatusResponse::new("ok")))
}

async fn get_log<S: SessionStorage, E: ExecutionEngine>(
    State(manager): Shared<S, E>,
    Path(id): Path<String>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> ApiResult<String> {
    let id = parse_id(&id)?;
    let Query(query) = query.map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
    Ok(manager.get_log(id, log_lines(query.lines)).await?)
}

async fn close_session<S: SessionStorage, E: ExecutionEngine>(
    State(manager): Shared<S, E>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    manager.close_session(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_tools() -> Json<Vec<ToolDefinition>> {
    Json(tools::definitions())
}

async fn invoke_tool<S: SessionStorage, E: ExecutionEngine>(
    State(manager): Shared<S, E>,
    payload: Result<Json<ToolCall>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let call = body(payload)?;
    Ok(Json(tools::dispatch(&*manager, call).await?))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, header},
    };
    use j0_core::{JobStatus, RunResult, Submission};
    use j0_session::FileStorage;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    /// Engine returning a fixed stdout, or timing out when `stuck`.
    #[derive(Default)]
    pub(crate) struct FakeEngine {
        stdout: String,
        stuck: bool,
    }

    impl FakeEngine {
        pub(crate) fn printing(stdout: &str) -> Self {
            Self {
                stdout: stdout.into(),
                stuck: false,
            }
        }

        fn stuck() -> Self {
            Self {
                stdout: String::new(),
                stuck: true,
            }
        }
    }

    #[async_trait]
    impl ExecutionEngine for FakeEngine {
        async fn execute(&self, _submission: Submission) -> Result<RunResult, EngineError> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if self.stuck {
                return Err(EngineError::Timeout { attempts: 3 });
            }
            Ok(RunResult {
                token: "fake".into(),
                status: JobStatus::new(JobStatus::ACCEPTED, "Accepted"),
                stdout: self.stdout.clone(),
                stderr: String::new(),
                compile_output: String::new(),
                message: String::new(),
                exit_code: 0,
                time_secs: None,
                memory_kb: None,
            })
        }
    }

    pub(crate) async fn manager(
        engine: FakeEngine,
    ) -> (tempfile::TempDir, SessionManager<FileStorage, FakeEngine>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();
        (dir, SessionManager::new(storage, engine))
    }

    async fn app(engine: FakeEngine) -> (tempfile::TempDir, Router) {
        let (dir, manager) = manager(engine).await;
        (dir, router(Arc::new(manager)))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = send(app, method, uri, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(app: &Router, language: &str) -> String {
        let (status, session) = send_json(
            app,
            Method::POST,
            "/sessions",
            Some(json!({ "language": language })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        session["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, app) = app(FakeEngine::default()).await;
        let (status, body) = send_json(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (_dir, app) = app(FakeEngine::default()).await;
        let (status, session) = send_json(
            &app,
            Method::POST,
            "/sessions",
            Some(json!({ "language": "python3", "name": "scratch" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(session["language"], "python");
        assert_eq!(session["language_id"], 71);
        assert_eq!(session["status"], "active");
        assert_eq!(session["name"], "scratch");

        let id = session["id"].as_str().unwrap();
        let (status, fetched) =
            send_json(&app, Method::GET, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], session["id"]);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_language() {
        let (_dir, app) = app(FakeEngine::default()).await;

        let (status, body) =
            send_json(&app, Method::POST, "/sessions", Some(json!({ "language": "cobol" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("cobol"));

        let (status, body) = send_json(&app, Method::POST, "/sessions", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("language is required"));

        let (status, sessions) = send_json(&app, Method::GET, "/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(sessions.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids() {
        let (_dir, app) = app(FakeEngine::default()).await;

        let missing = uuid::Uuid::new_v4();
        let (status, body) =
            send_json(&app, Method::GET, &format!("/sessions/{missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains(&missing.to_string()));

        for uri in [
            "/sessions/sess-abc123",
            "/sessions/sess-abc123/log",
            "/sessions/not-a-uuid",
        ] {
            let (status, body) = send_json(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert!(body["error"].as_str().unwrap().contains("Session not found"));
        }

        let (status, _) = send_json(
            &app,
            Method::POST,
            "/sessions/sess-abc123/execute",
            Some(json!({ "code": "echo hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send_json(
            &app,
            Method::POST,
            "/sessions/sess-abc123/env",
            Some(json!({ "key": "A", "value": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, "/sessions/sess-abc123", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_execute_with_env_and_log() {
        let (_dir, app) = app(FakeEngine::printing("bar\n")).await;
        let id = create(&app, "bash").await;

        let (status, body) = send_json(
            &app,
            Method::POST,
            &format!("/sessions/{id}/env"),
            Some(json!({ "key": "FOO", "value": "bar" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));

        let (status, outcome) = send_json(
            &app,
            Method::POST,
            &format!("/sessions/{id}/execute"),
            Some(json!({ "code": "echo $FOO" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["stdout"], "bar\n");
        assert_eq!(outcome["exit_code"], 0);
        assert!(outcome["execution_id"].is_string());

        let (status, session) =
            send_json(&app, Method::GET, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["env"]["FOO"], "bar");
        assert_eq!(session["history"][0]["code"], "echo $FOO");

        let (status, log) =
            send(&app, Method::GET, &format!("/sessions/{id}/log?lines=0"), None).await;
        assert_eq!(status, StatusCode::OK);
        let log = String::from_utf8(log).unwrap();
        assert!(log.contains("$ echo $FOO"));
        assert!(log.contains("bar"));
    }

    #[tokio::test]
    async fn test_closed_session_conflicts() {
        let (_dir, app) = app(FakeEngine::printing("hi\n")).await;
        let id = create(&app, "bash").await;

        let (status, _) = send(&app, Method::DELETE, &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send_json(
            &app,
            Method::POST,
            &format!("/sessions/{id}/execute"),
            Some(json!({ "code": "echo hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("closed"));

        let (status, _) = send_json(
            &app,
            Method::POST,
            &format!("/sessions/{id}/env"),
            Some(json!({ "key": "A", "value": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, sessions) =
            send_json(&app, Method::GET, "/sessions?status=closed", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sessions.as_array().unwrap().len(), 1);

        let (status, sessions) =
            send_json(&app, Method::GET, "/sessions?status=active", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(sessions.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_engine_timeout_is_gateway_timeout() {
        let (_dir, app) = app(FakeEngine::stuck()).await;
        let id = create(&app, "bash").await;

        let (status, body) = send_json(
            &app,
            Method::POST,
            &format!("/sessions/{id}/execute"),
            Some(json!({ "code": "sleep 100" })),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body["error"].is_string());

        let (_, session) = send_json(&app, Method::GET, &format!("/sessions/{id}"), None).await;
        assert!(session["history"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_error_status_mapping() {
        let engine = |e| ApiError(ManagerError::Engine(e)).status();
        assert_eq!(
            engine(EngineError::Transport("refused".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            engine(EngineError::Submission {
                status: 422,
                body: String::new()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            engine(EngineError::Timeout { attempts: 30 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError(ManagerError::LanguageUnsupported("cobol".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_mcp_endpoints() {
        let (_dir, app) = app(FakeEngine::printing("hi\n")).await;

        let (status, defs) = send_json(&app, Method::GET, "/mcp/tools", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(defs.as_array().unwrap().len(), 7);

        let (status, session) = send_json(
            &app,
            Method::POST,
            "/mcp/invoke",
            Some(json!({ "tool": "j0_create_session", "params": { "language": "bash" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["status"], "active");

        let (status, body) = send_json(
            &app,
            Method::POST,
            "/mcp/invoke",
            Some(json!({ "tool": "j0_nope", "params": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("unknown tool"));
    }
}
