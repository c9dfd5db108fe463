//! HTTP query server.
//!
//! # Endpoints
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `GET` | `/response/{query}` | Plain-text answer. Optional `?session=<id>` |
//! | `GET` | `/api/file-status` | The status ledger as JSON (`{}` before any file) |
//! | `GET` | `/health` | `{"status":"ok","version":"..."}` |
//!
//! # Sessions
//!
//! With `query.conversation = true`, a request carrying `session=<id>`
//! continues that session's transcript. Each session has its own lock, so
//! concurrent requests in one session are answered in order while other
//! sessions proceed independently. Requests without a session are
//! stateless. At most `query.max_sessions` sessions are kept: the least
//! recently used one is evicted to make room, and sessions idle for
//! `query.session_idle_secs` expire.
//!
//! # Error Handling
//!
//! Failures return a JSON error body:
//!
//! ```json
//! { "error": { "code": "query_error", "message": "OpenAI API error 503: ..." } }
//! ```

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;

use crate::config::{Config, QueryConfig};
use crate::embedding::create_provider;
use crate::llm::create_chat_model;
use crate::query::{Conversation, QueryService};
use crate::status::{StatusLedger, StatusMap};
use crate::store::sqlite::SqliteStore;
use crate::store::VectorStore;

type SharedConversation = Arc<tokio::sync::Mutex<Conversation>>;

struct Session {
    conversation: SharedConversation,
    last_used: Instant,
}

/// Per-session transcripts, bounded in number.
///
/// Sessions idle longer than `idle` are dropped on the next lookup. When the
/// table is full, creating a session evicts the least recently used one. A
/// request already holding an evicted conversation finishes normally.
pub struct SessionStore {
    max_turns: Option<usize>,
    max_sessions: usize,
    idle: Option<Duration>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(max_turns: Option<usize>, max_sessions: usize, idle: Option<Duration>) -> Self {
        Self {
            max_turns,
            max_sessions: max_sessions.max(1),
            idle,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        let idle = (config.session_idle_secs > 0)
            .then(|| Duration::from_secs(config.session_idle_secs));
        Self::new(config.max_turns, config.max_sessions, idle)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_create(&self, id: &str) -> Result<SharedConversation, AppError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| internal("session_error", "session table lock poisoned"))?;
        let now = Instant::now();

        if let Some(idle) = self.idle {
            sessions.retain(|_, s| now.duration_since(s.last_used) < idle);
        }

        if let Some(session) = sessions.get_mut(id) {
            session.last_used = now;
            return Ok(session.conversation.clone());
        }

        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_used)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            crate::debug_event!("server", "session evicted", "{}", oldest);
        }

        let conversation = Arc::new(tokio::sync::Mutex::new(Conversation::new(self.max_turns)));
        sessions.insert(
            id.to_string(),
            Session {
                conversation: conversation.clone(),
                last_used: now,
            },
        );
        Ok(conversation)
    }
}

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    pub ledger: Arc<StatusLedger>,
    /// `None` when conversation mode is off.
    pub sessions: Option<Arc<SessionStore>>,
}

impl AppState {
    /// Wire the SQLite store, embedding provider, and LLM from config.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let backend = SqliteStore::open(config).await?;
        let store = Arc::new(VectorStore::new(
            Arc::new(backend),
            create_provider(&config.embedding)?,
            config.store.collection.clone(),
        ));
        let llm = create_chat_model(&config.llm)?;

        Ok(Self {
            query: Arc::new(QueryService::new(store, llm, &config.query)),
            ledger: Arc::new(StatusLedger::new(&config.status.path)),
            sessions: config
                .query
                .conversation
                .then(|| Arc::new(SessionStore::from_config(&config.query))),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/response/{query}", get(handle_response))
        .route("/api/file-status", get(handle_file_status))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let bind_addr = config.server.bind.clone();

    println!("Query server listening on http://{}", bind_addr);
    if state.sessions.is_some() {
        println!("  conversation mode: on (pass ?session=<id>)");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn internal(code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: code.to_string(),
        message: message.into(),
    }
}

// ============ GET /response/{query} ============

#[derive(Debug, Deserialize)]
struct ResponseParams {
    session: Option<String>,
}

async fn handle_response(
    State(state): State<AppState>,
    Path(query): Path<String>,
    Query(params): Query<ResponseParams>,
) -> Result<String, AppError> {
    crate::debug_event!("server", "query", "{}", query);

    let session = match (&state.sessions, params.session.as_deref()) {
        (Some(store), Some(id)) if !id.is_empty() => Some(store.get_or_create(id)?),
        _ => None,
    };

    let result = match session {
        Some(conv) => {
            let mut conv = conv.lock().await;
            state.query.answer(&query, Some(&mut *conv)).await
        }
        None => state.query.answer(&query, None).await,
    };

    result.map_err(|e| {
        tracing::error!("[server] query failed: {:#}", e);
        internal("query_error", format!("{:#}", e))
    })
}

// ============ GET /api/file-status ============

async fn handle_file_status(State(state): State<AppState>) -> Result<Json<StatusMap>, AppError> {
    state
        .ledger
        .read_all()
        .map(Json)
        .map_err(|e| internal("status_error", format!("{:#}", e)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
