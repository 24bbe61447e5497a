//! The `waypoint serve` command: axum HTTP surface over the orchestration
//! core.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use waypoint_core::client::REQUEST_ID_HEADER;
use waypoint_core::context::RequestContext;
use waypoint_core::error::OrchestratorError;
use waypoint_core::orchestrator::{PlanOrchestrator, PlanQuizOptions, PlanRequest};
use waypoint_core::quiz::{QuizGenerateRequest, QuizOrchestrator};
use waypoint_db::models::{AnswerPair, Difficulty, PlanRecord, Preferences, QuizResult, QuizView};
use waypoint_db::queries::plans as plan_db;

/// Overall deadline for one inbound request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

pub struct AppState {
    pub pool: PgPool,
    pub planner: PlanOrchestrator,
    pub quizzes: Arc<QuizOrchestrator>,
}

impl AppState {
    fn context(&self, request_id: &RequestId) -> RequestContext {
        RequestContext::new(request_id.0.clone(), REQUEST_TIMEOUT)
    }
}

/// Correlation id for the current request, set by the middleware.
#[derive(Debug, Clone)]
struct RequestId(String);

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: format!("{err:#}"),
        }
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::InvalidRequest(_) | OrchestratorError::InsufficientSource(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": { "kind": self.kind, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PlanRequestBody {
    pub goal: String,
    #[serde(default)]
    pub current_skills: Vec<String>,
    pub time_budget_hours: u32,
    pub hours_per_week: u32,
    #[serde(default)]
    pub preferences: Preferences,
    pub user_id: Option<String>,
    #[serde(default)]
    pub generate_quiz: bool,
    pub num_questions: Option<u32>,
    pub quiz_difficulty: Option<Difficulty>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponseBody {
    pub learning_path: PlanRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz: Option<QuizView>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplanBody {
    #[serde(default)]
    pub completed_lessons: Vec<Uuid>,
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuizGenerateBody {
    pub resource_ids: Vec<Uuid>,
    pub num_questions: Option<u32>,
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Serialize)]
pub struct QuizGenerateResponse {
    pub quiz: QuizView,
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuizSubmitBody {
    pub quiz_id: Uuid,
    #[serde(default)]
    pub answers: Vec<AnswerPair>,
}

#[derive(Debug, Serialize)]
pub struct UserPlansResponse {
    pub user_id: String,
    pub plans: Vec<PlanRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database_connected: bool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/plan", post(create_plan))
        .route("/plan/{id}", get(get_plan))
        .route("/plan/{id}/replan", post(replan))
        .route("/user/{user_id}/plans", get(user_plans))
        .route("/quiz/generate", post(generate_quiz))
        .route("/quiz/submit", post(submit_quiz))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Honor an inbound `X-Request-ID` (or mint one), expose it to handlers,
/// and echo it on the response.
async fn request_id_middleware(mut request: Request, next: Next) -> axum::response::Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: Arc<AppState>, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("waypoint serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("waypoint serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database_connected = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    Json(HealthResponse {
        status: if database_connected {
            "healthy"
        } else {
            "degraded"
        },
        database_connected,
    })
}

async fn create_plan(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<PlanRequestBody>,
) -> Result<Json<PlanResponseBody>, AppError> {
    let ctx = state.context(&request_id);

    let request = PlanRequest {
        goal: body.goal,
        current_skills: body.current_skills,
        time_budget_hours: body.time_budget_hours,
        hours_per_week: body.hours_per_week,
        preferences: body.preferences,
        user_id: body.user_id,
    };
    let quiz_options = body.generate_quiz.then(|| PlanQuizOptions {
        num_questions: body.num_questions,
        difficulty: body.quiz_difficulty,
    });

    let outcome = state
        .planner
        .plan(&ctx, &request, quiz_options.as_ref())
        .await?;

    Ok(Json(PlanResponseBody {
        learning_path: outcome.plan,
        quiz: outcome.quiz,
        warnings: outcome.warnings,
    }))
}

async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanRecord>, AppError> {
    let plan = plan_db::get_plan(&state.pool, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("plan {id} not found")))?;

    Ok(Json(plan))
}

async fn replan(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReplanBody>,
) -> Result<Json<PlanResponseBody>, AppError> {
    let ctx = state.context(&request_id);

    let outcome = state
        .planner
        .replan(&ctx, id, &body.completed_lessons, body.feedback.as_deref())
        .await?;

    Ok(Json(PlanResponseBody {
        learning_path: outcome.plan,
        quiz: outcome.quiz,
        warnings: outcome.warnings,
    }))
}

async fn user_plans(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserPlansResponse>, AppError> {
    let plans = plan_db::list_plans_for_user(&state.pool, &user_id)
        .await
        .map_err(AppError::internal)?;

    let total = plans.len();
    Ok(Json(UserPlansResponse {
        user_id,
        plans,
        total,
    }))
}

async fn generate_quiz(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<QuizGenerateBody>,
) -> Result<Json<QuizGenerateResponse>, AppError> {
    let ctx = state.context(&request_id);

    let request = QuizGenerateRequest {
        resource_ids: body.resource_ids,
        num_questions: body.num_questions,
        difficulty: body.difficulty,
    };
    let outcome = state.quizzes.generate(&ctx, &request).await?;

    Ok(Json(QuizGenerateResponse {
        quiz: outcome.quiz,
        warnings: outcome.warnings,
    }))
}

async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<QuizSubmitBody>,
) -> Result<Json<QuizResult>, AppError> {
    let ctx = state.context(&request_id);

    let result = state
        .quizzes
        .submit(&ctx, body.quiz_id, &body.answers)
        .await?;

    Ok(Json(result))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
