use crate::error::AppError;
use crate::types::*;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Json, Multipart, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Router,
};
use async_stream::stream;
use dashmap::DashMap;
use futures::stream::{Stream, StreamExt};
use sqlagent_agent::{final_answer, init_agent};
use sqlagent_core::{AppConfig, Content, Event, LLM, Result};
use sqlagent_database_tools::{save_uploaded_file, DatasetKind, IngestConfig, SavedSource, SqlDatabase};
use sqlagent_model::{get_llm_list, init_llm, model_id_from_selection};
use sqlagent_runner::Runner;
use sqlagent_session::{
    state_update_event, CreateRequest, GetRequest, InMemorySessionService, InputFile, Session,
    SessionService, STATE_INPUT_FILE, STATE_MODEL,
};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub const APP_NAME: &str = "sqlagent";
const DEFAULT_USER: &str = "user";
const AGENT_AUTHOR: &str = "sql_agent";

/// Builds the chat model for a model id
pub type LlmFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn LLM>> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub session_service: Arc<dyn SessionService>,
    pub llm_factory: LlmFactory,
    /// session id -> user id
    users: Arc<DashMap<String, String>>,
    /// session id -> opened dataset
    databases: Arc<DashMap<String, Arc<SqlDatabase>>>,
}

impl AppState {
    /// In-memory sessions and models built from `config.model`
    pub fn new(config: AppConfig) -> Self {
        let model_config = config.model.clone();
        let factory: LlmFactory = Arc::new(move |model: &str| init_llm(model, &model_config));
        Self::with_llm_factory(config, factory)
    }

    pub fn with_llm_factory(config: AppConfig, llm_factory: LlmFactory) -> Self {
        Self {
            config: Arc::new(config),
            session_service: Arc::new(InMemorySessionService::new()),
            llm_factory,
            users: Arc::new(DashMap::new()),
            databases: Arc::new(DashMap::new()),
        }
    }

    fn user_of(&self, session_id: &str) -> std::result::Result<String, AppError> {
        self.users
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))
    }

    async fn load_session(
        &self,
        session_id: &str,
    ) -> std::result::Result<Arc<dyn Session>, AppError> {
        let user_id = self.user_of(session_id)?;
        let session = self
            .session_service
            .get(&GetRequest {
                app_name: APP_NAME.to_string(),
                user_id,
                session_id: session_id.to_string(),
            })
            .await?;
        Ok(session)
    }

    async fn database_for(&self, session_id: &str, input_file: &InputFile) -> Result<Arc<SqlDatabase>> {
        if let Some(db) = self.databases.get(session_id).map(|e| e.value().clone()) {
            return Ok(db);
        }
        let db = Arc::new(SqlDatabase::open(&input_file.file_path).await?);
        self.databases.insert(session_id.to_string(), db.clone());
        Ok(db)
    }
}

pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.storage.max_upload_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/models", get(list_models))
        .route("/api/v1/sessions", post(create_session))
        .route("/api/v1/sessions/:id", get(get_session).delete(delete_session))
        .route(
            "/api/v1/sessions/:id/upload",
            post(upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/sessions/:id/chat", post(chat_batch))
        .route("/api/v1/sessions/:id/chat/sse", post(chat_sse))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `config.server` and serve until `shutdown` resolves
pub async fn serve(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = state.config.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "SQL agent server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    tracing::debug!("Health check requested");
    (StatusCode::OK, "OK")
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: get_llm_list(),
        default_model: state.config.model.default_model.clone(),
    })
}

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> std::result::Result<(StatusCode, Json<SessionResponse>), AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let user_id = req.user_id.unwrap_or_else(|| DEFAULT_USER.to_string());

    let session = state
        .session_service
        .create(&CreateRequest {
            app_name: APP_NAME.to_string(),
            user_id: user_id.clone(),
            session_id: req.session_id,
            state: HashMap::new(),
        })
        .await
        .map_err(|e| AppError::Conflict(e.to_string()))?;
    state.users.insert(session.id().to_string(), user_id);

    tracing::info!(session_id = %session.id(), "Created chat session");
    Ok((StatusCode::CREATED, Json(session_response(session.as_ref()))))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> std::result::Result<Json<SessionResponse>, AppError> {
    let session = state.load_session(&session_id).await?;
    Ok(Json(session_response(session.as_ref())))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> std::result::Result<StatusCode, AppError> {
    state.user_of(&session_id)?;
    state.session_service.delete(&session_id).await?;
    state.users.remove(&session_id);
    if let Some((_, db)) = state.databases.remove(&session_id) {
        db.close().await;
    }

    tracing::info!(session_id = %session_id, "Deleted chat session");
    Ok(StatusCode::NO_CONTENT)
}

fn session_response(session: &dyn Session) -> SessionResponse {
    let input_file = session.input_file();
    SessionResponse {
        session_id: session.id().to_string(),
        user_id: session.user_id().to_string(),
        messages: session.messages(),
        banner: input_file.as_ref().map(|f| banner(&f.file_name)),
        input_file,
        model: session.selected_model(),
    }
}

fn upload_error(e: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(format!("Error uploading the file to server: {}", e))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::TooLarge(format!("Error uploading the file to server: {}", e.body_text()))
    } else {
        upload_error(e)
    }
}

async fn upload_file(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> std::result::Result<Json<UploadResponse>, AppError> {
    state.load_session(&session_id).await?;

    let kind = query
        .kind
        .as_deref()
        .map(DatasetKind::from_str)
        .transpose()
        .map_err(upload_error)?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }
    let (file_name, bytes) = upload.ok_or_else(|| upload_error("no `file` field in request"))?;

    if let Some(kind) = kind {
        if !kind.accepts(&file_name) {
            return Err(upload_error(format!(
                "{} is not a {} file (expected one of: {})",
                file_name,
                kind,
                kind.extensions().join(", ")
            )));
        }
    }

    let ingest = IngestConfig::from(&state.config.storage);
    let saved = save_uploaded_file(&file_name, &bytes, &ingest)
        .await
        .map_err(upload_error)?;
    let db = Arc::new(SqlDatabase::open(&saved.path).await.map_err(upload_error)?);
    let tables = db.usable_table_names().await.map_err(upload_error)?;

    let file_type = match (kind, saved.source) {
        (Some(kind), _) => kind.as_str(),
        (None, SavedSource::ConvertedCsv) => DatasetKind::Csv.as_str(),
        (None, _) => DatasetKind::Sqlite.as_str(),
    };
    let input_file = InputFile {
        file_type: file_type.to_string(),
        file_name: file_name.clone(),
        file_path: saved.path.display().to_string(),
    };

    let mut delta = HashMap::new();
    delta.insert(
        STATE_INPUT_FILE.to_string(),
        serde_json::to_value(&input_file).map_err(|e| AppError::Internal(e.into()))?,
    );
    state
        .session_service
        .append_event(&session_id, state_update_event("user", delta))
        .await?;
    if let Some(previous) = state.databases.insert(session_id.clone(), db) {
        previous.close().await;
    }

    tracing::info!(
        session_id = %session_id,
        file = %file_name,
        path = %input_file.file_path,
        tables = tables.len(),
        "Dataset uploaded"
    );

    Ok(Json(UploadResponse {
        banner: banner(&file_name),
        fallback: saved.source == SavedSource::Fallback,
        rows: saved.rows,
        tables,
        input_file,
    }))
}

async fn chat_batch(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, AppError> {
    let response = chat_turn(&state, &session_id, req).await?;
    Ok(Json(response))
}

async fn chat_sse(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>>, AppError>
{
    let response = chat_turn(&state, &session_id, req).await?;
    let delay = Duration::from_millis(state.config.agent.stream_delay_ms);

    let done = serde_json::to_value(&response).unwrap_or_default();
    let reply = response.reply;

    let words = stream! {
        for word in reply.split(' ') {
            yield serde_json::json!({ "delta": format!("{} ", word) });
            tokio::time::sleep(delay).await;
        }
    };

    let events = words
        .map(|delta| SseEvent::default().event("delta").data(delta.to_string()))
        .chain(futures::stream::once(async move {
            SseEvent::default().event("done").data(done.to_string())
        }))
        .map(Ok);

    Ok(Sse::new(events))
}

/// Answer one prompt in the session, recording the exchange in its transcript
async fn chat_turn(
    state: &AppState,
    session_id: &str,
    req: ChatRequest,
) -> std::result::Result<ChatResponse, AppError> {
    let session = state.load_session(session_id).await?;
    let user_id = session.user_id().to_string();

    let input_file = session
        .input_file()
        .ok_or_else(|| AppError::Conflict("Please upload a file to get started".to_string()))?;

    let model = req
        .model
        .as_deref()
        .map(model_id_from_selection)
        .map(str::to_string)
        .or_else(|| session.selected_model())
        .unwrap_or_else(|| state.config.model.default_model.clone());

    if session.selected_model().as_deref() != Some(model.as_str()) {
        let mut delta = HashMap::new();
        delta.insert(STATE_MODEL.to_string(), serde_json::Value::String(model.clone()));
        state
            .session_service
            .append_event(session_id, state_update_event("user", delta))
            .await?;
    }

    tracing::info!(session_id = %session_id, model = %model, "Chat request");

    let outcome = match build_runner(state, session_id, &input_file, &model).await {
        Ok(runner) => run_turn(&runner, &user_id, session_id, &req.prompt).await,
        Err(e) => {
            let mut question = Event::new(uuid_string(), "user".to_string());
            question.content = Some(Content::new_user_text(req.prompt.clone()));
            question.turn_complete = true;
            state.session_service.append_event(session_id, question).await?;
            Err(e)
        }
    };

    match outcome {
        Ok(reply) => Ok(ChatResponse {
            reply,
            model,
            error: None,
        }),
        Err(e) => {
            tracing::error!(session_id = %session_id, model = %model, error = %e, "SQL agent failed");
            let reply = format!(
                "Facing issues with SQL Agent. Try using a different Base LLM. Error: {}",
                e
            );
            let mut answer = Event::new(uuid_string(), AGENT_AUTHOR.to_string());
            answer.content = Some(Content::new_model_text(reply.clone()));
            answer.turn_complete = true;
            state.session_service.append_event(session_id, answer).await?;

            Ok(ChatResponse {
                reply,
                model,
                error: Some(e.to_string()),
            })
        }
    }
}

fn uuid_string() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn build_runner(
    state: &AppState,
    session_id: &str,
    input_file: &InputFile,
    model: &str,
) -> Result<Runner> {
    let db = state.database_for(session_id, input_file).await?;
    let llm = (state.llm_factory)(model)?;
    let agent = init_agent(db, llm, &state.config.agent)?;

    Runner::builder()
        .app_name(APP_NAME)
        .agent(Arc::new(agent))
        .session_service(state.session_service.clone())
        .build()
}

async fn run_turn(runner: &Runner, user_id: &str, session_id: &str, prompt: &str) -> Result<String> {
    let events = runner
        .run(
            user_id.to_string(),
            session_id.to_string(),
            Content::new_user_text(prompt),
        )
        .await?;
    final_answer(events).await
}
