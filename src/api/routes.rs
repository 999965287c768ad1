//! HTTP route handlers, one per console action.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    ErrorLogEntry, Interest, LlmDialogue, NewResource, ProgressRecord, ProgressStatus,
    PromptTemplate, Resource, TableView, WeeklyPlan,
};
use crate::search::SearchOutcome;
use crate::services::{
    Activity, AnswerReply, ChatReply, PlanRequest, QuizView, ValidationReport, VoiceReply,
};

use super::error::ApiResult;
use super::AppState;

type AppStateRef = State<Arc<AppState>>;

const DEFAULT_DIALOGUE_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub llm_model: String,
}

pub async fn health(State(state): AppStateRef) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        llm_model: state.llm_model.clone(),
    })
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

// Chat and voice

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub email: Option<String>,
}

pub async fn chat(
    State(state): AppStateRef,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    info!(
        preview = %request.message.chars().take(50).collect::<String>(),
        "Chat message received"
    );
    let reply = state
        .agents
        .chat_respond(&request.message, request.email.as_deref())
        .await?;
    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    #[serde(default)]
    pub email: Option<String>,
}

pub async fn voice(
    State(state): AppStateRef,
    Query(query): Query<EmailQuery>,
    body: Bytes,
) -> ApiResult<Json<VoiceReply>> {
    let reply = state.voice.respond(&body, query.email.as_deref()).await?;
    Ok(Json(reply))
}

pub async fn audio(
    State(state): AppStateRef,
    Path(file): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.voice.audio(&file).await?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], bytes))
}

// Knowledge base

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    #[serde(flatten)]
    pub outcome: SearchOutcome,
    pub text: String,
}

pub async fn search_resources(
    State(state): AppStateRef,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    let outcome = state.retrieval.search(&request.query).await?;
    let text = outcome.render();
    Ok(Json(SearchResponse { outcome, text }))
}

pub async fn list_resources(State(state): AppStateRef) -> ApiResult<Json<Vec<Resource>>> {
    Ok(Json(state.retrieval.list_resources().await?))
}

pub async fn add_resource(
    State(state): AppStateRef,
    Json(resource): Json<NewResource>,
) -> ApiResult<(StatusCode, Json<Resource>)> {
    let stored = state.retrieval.add_resource(resource).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

// Validator and interview

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub filename: String,
    pub content: String,
    #[serde(default)]
    pub question: String,
}

pub async fn validate(
    State(state): AppStateRef,
    Json(request): Json<ValidateRequest>,
) -> ApiResult<Json<ValidationReport>> {
    let report = state
        .agents
        .validate_file(&request.content, &request.filename, &request.question)
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct InterviewRequest {
    pub topic: String,
    pub grade: String,
}

pub async fn interview(
    State(state): AppStateRef,
    Json(request): Json<InterviewRequest>,
) -> ApiResult<Json<StatusMessage>> {
    let text = state.agents.interview(&request.topic, &request.grade).await?;
    Ok(StatusMessage::new(text))
}

// Quiz

#[derive(Debug, Deserialize)]
pub struct StartQuizRequest {
    pub topic: String,
    #[serde(default)]
    pub email: Option<String>,
}

pub async fn start_quiz(
    State(state): AppStateRef,
    Json(request): Json<StartQuizRequest>,
) -> ApiResult<(StatusCode, Json<QuizView>)> {
    let view = state.quiz.start(&request.topic, request.email)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_quiz(
    State(state): AppStateRef,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuizView>> {
    Ok(Json(state.quiz.view(id)?))
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub option: usize,
}

pub async fn answer_quiz(
    State(state): AppStateRef,
    Path(id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<Json<AnswerReply>> {
    Ok(Json(state.quiz.answer(id, request.option).await?))
}

pub async fn reset_quiz(
    State(state): AppStateRef,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuizView>> {
    Ok(Json(state.quiz.reset(id)?))
}

// Progress

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub email: String,
    pub skill: String,
    pub status: ProgressStatus,
}

pub async fn list_progress(
    State(state): AppStateRef,
    Query(query): Query<EmailQuery>,
) -> ApiResult<Json<Vec<ProgressRecord>>> {
    let records = match query.email.as_deref().filter(|e| !e.trim().is_empty()) {
        Some(email) => state.progress.for_user(email).await?,
        None => state.progress.team().await?,
    };
    Ok(Json(records))
}

pub async fn add_progress(
    State(state): AppStateRef,
    Json(request): Json<ProgressRequest>,
) -> ApiResult<(StatusCode, Json<StatusMessage>)> {
    let message = state
        .progress
        .add(&request.email, &request.skill, request.status)
        .await?;
    Ok((StatusCode::CREATED, StatusMessage::new(message)))
}

pub async fn export_progress(State(state): AppStateRef) -> ApiResult<impl IntoResponse> {
    let csv = state.progress.export_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"progress.csv\"",
            ),
        ],
        csv,
    ))
}

pub async fn activity(
    State(state): AppStateRef,
    Path(email): Path<String>,
) -> ApiResult<Json<Activity>> {
    Ok(Json(state.progress.activity(&email).await?))
}

// Plans

pub async fn generate_plan(
    State(state): AppStateRef,
    Json(request): Json<PlanRequest>,
) -> ApiResult<(StatusCode, Json<Vec<WeeklyPlan>>)> {
    let plans = state.plans.generate(request).await?;
    Ok((StatusCode::CREATED, Json(plans)))
}

pub async fn list_plans(
    State(state): AppStateRef,
    Path(email): Path<String>,
) -> ApiResult<Json<Vec<WeeklyPlan>>> {
    Ok(Json(state.plans.plans_for(&email).await?))
}

#[derive(Debug, Deserialize)]
pub struct DialogueQuery {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list_dialogues(
    State(state): AppStateRef,
    Query(query): Query<DialogueQuery>,
) -> ApiResult<Json<Vec<LlmDialogue>>> {
    let dialogues = state
        .plans
        .dialogues(
            query.email.as_deref(),
            query.limit.unwrap_or(DEFAULT_DIALOGUE_LIMIT),
        )
        .await?;
    Ok(Json(dialogues))
}

pub async fn active_interests(State(state): AppStateRef) -> ApiResult<Json<Vec<Interest>>> {
    Ok(Json(state.admin.active_interests().await?))
}

// Admin

pub async fn list_prompts(State(state): AppStateRef) -> ApiResult<Json<Vec<PromptTemplate>>> {
    Ok(Json(state.admin.prompts().await?))
}

pub async fn get_prompt(
    State(state): AppStateRef,
    Path(agent): Path<String>,
) -> ApiResult<Json<PromptTemplate>> {
    Ok(Json(state.admin.prompt(&agent).await?))
}

#[derive(Debug, Deserialize)]
pub struct PromptUpdate {
    pub template: String,
}

pub async fn update_prompt(
    State(state): AppStateRef,
    Path(agent): Path<String>,
    Json(update): Json<PromptUpdate>,
) -> ApiResult<Json<StatusMessage>> {
    let message = state.admin.update_prompt(&agent, &update.template).await?;
    Ok(StatusMessage::new(message))
}

pub async fn all_interests(State(state): AppStateRef) -> ApiResult<Json<Vec<Interest>>> {
    Ok(Json(state.admin.interests().await?))
}

#[derive(Debug, Deserialize)]
pub struct NewInterest {
    pub title: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: i64,
}

pub async fn add_interest(
    State(state): AppStateRef,
    Json(interest): Json<NewInterest>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let id = state
        .admin
        .add_interest(&interest.title, interest.active)
        .await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

#[derive(Debug, Deserialize)]
pub struct InterestToggle {
    pub active: bool,
}

pub async fn set_interest_active(
    State(state): AppStateRef,
    Path(id): Path<i64>,
    Json(toggle): Json<InterestToggle>,
) -> ApiResult<StatusCode> {
    state.admin.set_interest_active(id, toggle.active).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_interest(
    State(state): AppStateRef,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.admin.delete_interest(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn view_table(
    State(state): AppStateRef,
    Path(table): Path<String>,
) -> ApiResult<Json<TableView>> {
    Ok(Json(state.admin.view_table(&table).await?))
}

pub async fn error_logs(State(state): AppStateRef) -> ApiResult<Json<Vec<ErrorLogEntry>>> {
    Ok(Json(state.admin.error_logs().await?))
}

#[derive(Debug, Deserialize)]
pub struct ShutdownRequest {
    #[serde(default)]
    pub confirm: bool,
}

pub async fn shutdown(
    State(state): AppStateRef,
    Json(request): Json<ShutdownRequest>,
) -> ApiResult<(StatusCode, Json<StatusMessage>)> {
    state.admin.shutdown(request.confirm).await?;
    Ok((
        StatusCode::ACCEPTED,
        StatusMessage::new("Сервер останавливается."),
    ))
}
