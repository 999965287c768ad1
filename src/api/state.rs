use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::ai::{build_llm_client, LlmClient, PromptLibrary};
use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::search::{build_embedding_index, EmbeddingIndex, RetrievalService};
use crate::services::{
    build_synthesizer, build_transcriber, AdminService, AgentService, ErrorLogger, PlanService,
    ProgressService, QuizService, Synthesizer, Transcriber, VoiceService,
};

/// Optional collaborators, chosen once at startup.
pub struct Capabilities {
    pub llm: Arc<dyn LlmClient>,
    pub index: Arc<dyn EmbeddingIndex>,
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Capabilities {
    pub fn from_config(config: &Config, repository: &Repository) -> Result<Self> {
        Ok(Self {
            llm: build_llm_client(config)?,
            index: build_embedding_index(config, repository.clone())?,
            transcriber: build_transcriber(config),
            synthesizer: build_synthesizer(config),
        })
    }
}

/// Shared state handed to every route.
pub struct AppState {
    pub retrieval: RetrievalService,
    pub agents: AgentService,
    pub plans: PlanService,
    pub quiz: QuizService,
    pub progress: ProgressService,
    pub voice: VoiceService,
    pub admin: AdminService,
    pub llm_model: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        repository: Repository,
        capabilities: Capabilities,
        audio_dir: PathBuf,
        shutdown: CancellationToken,
    ) -> Self {
        let errors = ErrorLogger::new(repository.clone());
        let prompts = PromptLibrary::new(repository.clone());
        let retrieval =
            RetrievalService::new(repository.clone(), capabilities.index, errors.clone());
        let agents = AgentService::new(
            repository.clone(),
            prompts.clone(),
            retrieval.clone(),
            errors.clone(),
        );
        let llm_model = capabilities.llm.model_name().to_string();

        Self {
            plans: PlanService::new(
                repository.clone(),
                prompts,
                capabilities.llm,
                errors.clone(),
            ),
            quiz: QuizService::new(repository.clone(), errors.clone()),
            progress: ProgressService::new(repository.clone(), errors.clone()),
            voice: VoiceService::new(
                agents.clone(),
                capabilities.transcriber,
                capabilities.synthesizer,
                errors.clone(),
                audio_dir,
            ),
            admin: AdminService::new(repository, errors, shutdown),
            retrieval,
            agents,
            llm_model,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
