//! JSON-over-HTTP surface of the mentoring console.
//!
//! # Endpoints
//!
//! - `GET /health`
//! - `POST /api/v1/chat`, `POST /api/v1/voice`, `GET /api/v1/audio/{file}`
//! - `POST /api/v1/resources/search`, `GET|POST /api/v1/resources`
//! - `POST /api/v1/validate`, `POST /api/v1/interview`
//! - `POST /api/v1/quiz`, `GET /api/v1/quiz/{id}`, `POST /api/v1/quiz/{id}/answer|reset`
//! - `GET|POST /api/v1/progress`, `GET /api/v1/progress/export`, `GET /api/v1/activity/{email}`
//! - `POST /api/v1/plans`, `GET /api/v1/plans/{email}`, `GET /api/v1/dialogues`
//! - `GET /api/v1/interests`
//! - `/api/v1/admin/...`: prompts, interests, tables, errors, shutdown

mod error;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{AppError, Result};

pub use state::{AppState, Capabilities};

const VOICE_BODY_LIMIT: usize = 25 * 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route("/prompts", get(routes::list_prompts))
        .route(
            "/prompts/{agent}",
            get(routes::get_prompt).put(routes::update_prompt),
        )
        .route(
            "/interests",
            get(routes::all_interests).post(routes::add_interest),
        )
        .route(
            "/interests/{id}",
            patch(routes::set_interest_active).delete(routes::delete_interest),
        )
        .route("/tables/{table}", get(routes::view_table))
        .route("/errors", get(routes::error_logs))
        .route("/shutdown", post(routes::shutdown));

    Router::new()
        .route("/health", get(routes::health))
        // Chat and voice
        .route("/api/v1/chat", post(routes::chat))
        .route(
            "/api/v1/voice",
            post(routes::voice).layer(DefaultBodyLimit::max(VOICE_BODY_LIMIT)),
        )
        .route("/api/v1/audio/{file}", get(routes::audio))
        // Knowledge base
        .route("/api/v1/resources/search", post(routes::search_resources))
        .route(
            "/api/v1/resources",
            get(routes::list_resources).post(routes::add_resource),
        )
        // Agents
        .route("/api/v1/validate", post(routes::validate))
        .route("/api/v1/interview", post(routes::interview))
        // Quiz
        .route("/api/v1/quiz", post(routes::start_quiz))
        .route("/api/v1/quiz/{id}", get(routes::get_quiz))
        .route("/api/v1/quiz/{id}/answer", post(routes::answer_quiz))
        .route("/api/v1/quiz/{id}/reset", post(routes::reset_quiz))
        // Progress
        .route(
            "/api/v1/progress",
            get(routes::list_progress).post(routes::add_progress),
        )
        .route("/api/v1/progress/export", get(routes::export_progress))
        .route("/api/v1/activity/{email}", get(routes::activity))
        // Plans and interests
        .route("/api/v1/plans", post(routes::generate_plan))
        .route("/api/v1/plans/{email}", get(routes::list_plans))
        .route("/api/v1/dialogues", get(routes::list_dialogues))
        .route("/api/v1/interests", get(routes::active_interests))
        .nest("/api/v1/admin", admin)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves until `shutdown` fires, then lets in-flight requests finish for at most `grace`.
pub async fn serve(
    state: Arc<AppState>,
    addr: &str,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Starting SkillForge server");
    run(listener, create_router(state), shutdown, grace).await
}

/// Past the grace period the accept loop is aborted and this returns, so the
/// process can exit with requests still pending.
async fn run(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let mut handle = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut handle => return flatten(joined),
        _ = shutdown.cancelled() => {}
    }

    info!(grace_secs = grace.as_secs(), "Shutdown requested, draining in-flight requests");
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(joined) => flatten(joined)?,
        Err(_) => {
            warn!("Grace period elapsed, aborting remaining requests");
            handle.abort();
        }
    }
    info!("Server stopped");
    Ok(())
}

fn flatten(
    joined: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    joined
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?
        .map_err(AppError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::DisabledClient;
    use crate::db::Repository;
    use crate::search::NullIndex;
    use crate::services::{Synthesizer, Transcriber};
    use serde_json::{json, Value};

    struct NoSpeech;

    #[async_trait::async_trait]
    impl Transcriber for NoSpeech {
        async fn transcribe(&self, _audio_path: &std::path::Path) -> Result<String> {
            Err(AppError::FeatureUnavailable(
                crate::error::Feature::Transcription,
            ))
        }
    }

    #[async_trait::async_trait]
    impl Synthesizer for NoSpeech {
        async fn synthesize(&self, _text: &str, _language: &str) -> Result<String> {
            Err(AppError::FeatureUnavailable(
                crate::error::Feature::SpeechSynthesis,
            ))
        }
    }

    /// Spin up a server on a random port; returns the base URL, the shutdown token and the store.
    async fn start_test_server() -> (String, CancellationToken, Repository) {
        let repository = Repository::in_memory().await.unwrap();
        let capabilities = Capabilities {
            llm: Arc::new(DisabledClient),
            index: Arc::new(NullIndex),
            transcriber: Arc::new(NoSpeech),
            synthesizer: Arc::new(NoSpeech),
        };
        let token = CancellationToken::new();
        let audio_dir = std::env::temp_dir().join("skillforge-test-audio");
        let state = Arc::new(AppState::new(
            repository.clone(),
            capabilities,
            audio_dir,
            token.clone(),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = create_router(state);
        let shutdown = token.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
                .unwrap();
        });

        (format!("http://{}", addr), token, repository)
    }

    async fn get(base: &str, path: &str) -> (u16, Value) {
        let resp = reqwest::get(format!("{base}{path}")).await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
        let resp = reqwest::Client::new()
            .post(format!("{base}{path}"))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_reports_disabled_model() {
        let (base, _, _) = start_test_server().await;
        let (status, body) = get(&base, "/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["llm_model"], "disabled");
    }

    #[tokio::test]
    async fn chat_routes_by_intent() {
        let (base, _, _) = start_test_server().await;
        let (status, body) = post(&base, "/api/v1/chat", json!({"message": "найди sql"})).await;
        assert_eq!(status, 200);
        assert_eq!(body["intent"], "search");
        assert!(body["reply"].as_str().unwrap().contains("Найденные ресурсы"));

        let (_, body) = post(&base, "/api/v1/chat", json!({"message": "привет"})).await;
        assert_eq!(body["intent"], "help");
    }

    #[tokio::test]
    async fn added_resource_is_searchable() {
        let (base, _, _) = start_test_server().await;
        let (status, _) = post(
            &base,
            "/api/v1/resources",
            json!({"title": "C4 Model", "link": "https://c4model.com", "tags": "c4, arch"}),
        )
        .await;
        assert_eq!(status, 201);

        let (status, body) = post(&base, "/api/v1/resources/search", json!({"query": "C4"})).await;
        assert_eq!(status, 200);
        assert_eq!(body["source"], "fallback");
        assert!(body["text"].as_str().unwrap().contains("[C4 Model](https://c4model.com)"));

        let (status, body) = post(
            &base,
            "/api/v1/resources",
            json!({"title": "", "link": "https://x"}),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn quiz_flow_over_http() {
        let (base, _, _) = start_test_server().await;
        let (status, quiz) = post(&base, "/api/v1/quiz", json!({"topic": "REST"})).await;
        assert_eq!(status, 201);
        let id = quiz["id"].as_str().unwrap().to_string();

        post(&base, &format!("/api/v1/quiz/{id}/answer"), json!({"option": 0})).await;
        let (_, last) = post(&base, &format!("/api/v1/quiz/{id}/answer"), json!({"option": 2})).await;
        assert_eq!(last["finished"], true);
        assert_eq!(last["quiz"]["score"], 1);

        let (status, _) = post(&base, &format!("/api/v1/quiz/{id}/answer"), json!({"option": 0})).await;
        assert_eq!(status, 400);

        let (status, view) = post(&base, &format!("/api/v1/quiz/{id}/reset"), json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(view["question_number"], 1);
    }

    #[tokio::test]
    async fn plan_without_model_is_unavailable() {
        let (base, _, _) = start_test_server().await;
        let (status, body) = post(
            &base,
            "/api/v1/plans",
            json!({"user_email": "a@x.ru", "grade": "Junior", "interests": ["SQL"]}),
        )
        .await;
        assert_eq!(status, 503);
        assert_eq!(body["kind"], "dependency_absent");
    }

    #[tokio::test]
    async fn admin_guards() {
        let (base, token, _) = start_test_server().await;
        let (status, _) = get(&base, "/api/v1/admin/tables/secrets").await;
        assert_eq!(status, 400);

        let (status, body) = get(&base, "/api/v1/admin/tables/interests").await;
        assert_eq!(status, 200);
        assert_eq!(body["columns"][0], "id");

        let (status, _) = post(&base, "/api/v1/admin/shutdown", json!({})).await;
        assert_eq!(status, 400);
        assert!(!token.is_cancelled());

        let (status, _) = post(&base, "/api/v1/admin/shutdown", json!({"confirm": true})).await;
        assert_eq!(status, 202);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn store_failure_is_logged_and_mapped_to_500() {
        let (base, _, repository) = start_test_server().await;
        repository.execute_batch("DROP TABLE progress").await.unwrap();

        let (status, body) = post(
            &base,
            "/api/v1/progress",
            json!({"email": "a@x.ru", "skill": "SQL", "status": "Запланировано"}),
        )
        .await;
        assert_eq!(status, 500);
        assert_eq!(body["kind"], "database");

        let (status, logs) = get(&base, "/api/v1/admin/errors").await;
        assert_eq!(status, 200);
        assert_eq!(logs.as_array().unwrap().len(), 1);
        assert_eq!(logs[0]["error_type"], "Database");
    }

    #[tokio::test]
    async fn progress_export_is_csv() {
        let (base, _, _) = start_test_server().await;
        let (status, _) = post(
            &base,
            "/api/v1/progress",
            json!({"email": "a@x.ru", "skill": "BPMN", "status": "Изучено"}),
        )
        .await;
        assert_eq!(status, 201);

        let resp = reqwest::get(format!("{base}/api/v1/progress/export")).await.unwrap();
        assert!(resp.headers()[reqwest::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
        let text = resp.text().await.unwrap();
        assert!(text.starts_with("Email,Навык,Статус,Дата\r\n"));
        assert!(text.contains("a@x.ru,BPMN,Изучено,"));
    }

    #[tokio::test]
    async fn serve_stops_when_token_fires() {
        let repository = Repository::in_memory().await.unwrap();
        let capabilities = Capabilities {
            llm: Arc::new(DisabledClient),
            index: Arc::new(NullIndex),
            transcriber: Arc::new(NoSpeech),
            synthesizer: Arc::new(NoSpeech),
        };
        let token = CancellationToken::new();
        let state = Arc::new(AppState::new(
            repository,
            capabilities,
            std::env::temp_dir(),
            token.clone(),
        ));

        let server = tokio::spawn(serve(
            state,
            "127.0.0.1:0",
            token.clone(),
            Duration::from_secs(1),
        ));
        token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    /// Router whose handler signals once it is running, then sleeps for `delay`.
    fn slow_router(
        delay: Duration,
        started: Arc<tokio::sync::Notify>,
        finished: Arc<std::sync::atomic::AtomicBool>,
    ) -> Router {
        Router::new().route(
            "/slow",
            axum::routing::get(move || {
                let started = started.clone();
                let finished = finished.clone();
                async move {
                    started.notify_one();
                    tokio::time::sleep(delay).await;
                    finished.store(true, std::sync::atomic::Ordering::SeqCst);
                    "done"
                }
            }),
        )
    }

    #[tokio::test]
    async fn in_flight_request_drains_within_grace() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let started = Arc::new(tokio::sync::Notify::new());
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let token = CancellationToken::new();

        let server = tokio::spawn(run(
            listener,
            slow_router(Duration::from_millis(300), started.clone(), finished.clone()),
            token.clone(),
            Duration::from_secs(5),
        ));
        let request = tokio::spawn(reqwest::get(format!("http://{addr}/slow")));

        started.notified().await;
        token.cancel();

        let response = request.await.unwrap().unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "done");

        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stuck_request_is_abandoned_after_grace() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let started = Arc::new(tokio::sync::Notify::new());
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let token = CancellationToken::new();

        let server = tokio::spawn(run(
            listener,
            slow_router(Duration::from_secs(30), started.clone(), finished.clone()),
            token.clone(),
            Duration::from_millis(200),
        ));
        let _request = tokio::spawn(reqwest::get(format!("http://{addr}/slow")));

        started.notified().await;
        let cancelled_at = std::time::Instant::now();
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(cancelled_at.elapsed() < Duration::from_secs(5));
        assert!(!finished.load(std::sync::atomic::Ordering::SeqCst));
    }
}
