use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{AppError, ErrorKind, Result};

use super::agents::AgentService;
use super::error_log::ErrorLogger;
use super::speech::{Synthesizer, Transcriber};

const REPLY_LANGUAGE: &str = "ru";

#[derive(Debug, Clone, Serialize)]
pub struct VoiceReply {
    pub transcript: Option<String>,
    pub reply: String,
    /// File name under the audio route, when speech synthesis succeeded.
    pub audio_file: Option<String>,
    pub degraded: bool,
}

impl VoiceReply {
    fn degraded(reply: String) -> Self {
        Self {
            transcript: None,
            reply,
            audio_file: None,
            degraded: true,
        }
    }
}

/// Spoken interview turn: transcribe, answer through the chat agent, speak the answer.
#[derive(Clone)]
pub struct VoiceService {
    agents: AgentService,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn Synthesizer>,
    errors: ErrorLogger,
    audio_dir: PathBuf,
}

impl VoiceService {
    pub fn new(
        agents: AgentService,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn Synthesizer>,
        errors: ErrorLogger,
        audio_dir: PathBuf,
    ) -> Self {
        Self {
            agents,
            transcriber,
            synthesizer,
            errors,
            audio_dir,
        }
    }

    pub async fn respond(&self, audio: &[u8], user_email: Option<&str>) -> Result<VoiceReply> {
        if audio.is_empty() {
            return Err(AppError::Validation("Запишите или загрузите аудио.".to_string()));
        }

        let file = self
            .errors
            .intercept("voice upload", stage_audio(audio))
            .await?;

        let transcript = match self.transcriber.transcribe(file.path()).await {
            Ok(text) => text,
            Err(e) => {
                self.errors.record("transcribe", &e).await;
                return Ok(VoiceReply::degraded(e.user_message()));
            }
        };
        if transcript.trim().is_empty() {
            return Ok(VoiceReply::degraded(
                "Не удалось распознать речь. Попробуйте ещё раз.".to_string(),
            ));
        }
        tracing::debug!(chars = transcript.chars().count(), "Transcribed voice message");

        let reply = self
            .agents
            .chat_respond(&transcript, user_email)
            .await?
            .reply;

        let audio_file = match self.synthesizer.synthesize(&reply, REPLY_LANGUAGE).await {
            Ok(file_name) => Some(file_name),
            Err(e) if e.kind() == ErrorKind::DependencyAbsent => None,
            Err(e) => {
                self.errors.record("synthesize", &e).await;
                None
            }
        };

        Ok(VoiceReply {
            transcript: Some(transcript),
            reply,
            audio_file,
            degraded: false,
        })
    }

    /// Reads a synthesized reply back. Only plain `*.mp3` names inside the audio directory.
    pub async fn audio(&self, file_name: &str) -> Result<Vec<u8>> {
        if !is_safe_audio_name(file_name) {
            return Err(AppError::Validation(format!(
                "invalid audio file name: {file_name}"
            )));
        }
        let path = self.audio_dir.join(file_name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("audio {file_name}")))
            }
            Err(e) => {
                let err = AppError::Io(e);
                self.errors.record("read audio", &err).await;
                Err(err)
            }
        }
    }
}

/// Copies the upload to a temp file the speech engine can read. The file is
/// removed when the handle drops.
async fn stage_audio(audio: &[u8]) -> Result<tempfile::NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("skillforge-voice-")
        .suffix(".wav")
        .tempfile()?;
    tokio::fs::write(file.path(), audio).await?;
    Ok(file)
}

fn is_safe_audio_name(name: &str) -> bool {
    name.ends_with(".mp3")
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::PromptLibrary;
    use crate::db::Repository;
    use crate::search::{NullIndex, RetrievalService};
    use crate::services::agents::HELP_TEXT;
    use crate::services::speech::{NullSynthesizer, NullTranscriber};
    use async_trait::async_trait;
    use std::path::Path;

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, audio_path: &Path) -> Result<String> {
            assert!(audio_path.exists());
            Ok(self.0.to_string())
        }
    }

    struct BrokenSynthesizer;

    #[async_trait]
    impl Synthesizer for BrokenSynthesizer {
        async fn synthesize(&self, _text: &str, _language: &str) -> Result<String> {
            Err(AppError::Speech("engine crashed".to_string()))
        }
    }

    async fn voice(
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> (Repository, VoiceService) {
        let repository = Repository::in_memory().await.unwrap();
        let errors = ErrorLogger::new(repository.clone());
        let retrieval =
            RetrievalService::new(repository.clone(), Arc::new(NullIndex), errors.clone());
        let agents = AgentService::new(
            repository.clone(),
            PromptLibrary::new(repository.clone()),
            retrieval,
            errors.clone(),
        );
        (
            repository,
            VoiceService::new(
                agents,
                transcriber,
                synthesizer,
                errors,
                std::env::temp_dir(),
            ),
        )
    }

    #[tokio::test]
    async fn missing_transcriber_degrades_without_chat() {
        let (repository, voice) = voice(Arc::new(NullTranscriber), Arc::new(NullSynthesizer)).await;
        let reply = voice.respond(b"RIFF", Some("a@x.ru")).await.unwrap();
        assert!(reply.degraded);
        assert!(reply.reply.starts_with("⚠️"));
        assert!(repository.get_chat_history("a@x.ru", 10).await.unwrap().is_empty());
        assert!(repository.get_error_logs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transcript_flows_through_chat() {
        let (repository, voice) = voice(
            Arc::new(FixedTranscriber("расскажи о себе")),
            Arc::new(BrokenSynthesizer),
        )
        .await;
        let reply = voice.respond(b"RIFF", Some("a@x.ru")).await.unwrap();
        assert!(!reply.degraded);
        assert_eq!(reply.reply, HELP_TEXT);
        assert_eq!(reply.audio_file, None);

        assert_eq!(repository.get_chat_history("a@x.ru", 10).await.unwrap().len(), 2);
        let logs = repository.get_error_logs(10).await.unwrap();
        assert_eq!(logs[0].error_type, "Speech");
    }

    #[tokio::test]
    async fn empty_audio_is_rejected() {
        let (_, voice) = voice(Arc::new(NullTranscriber), Arc::new(NullSynthesizer)).await;
        assert!(matches!(
            voice.respond(b"", None).await,
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn audio_names_cannot_escape_the_directory() {
        assert!(is_safe_audio_name("3f2b6c1e-8a7d-4c5e-9f00-0123456789ab.mp3"));
        assert!(!is_safe_audio_name("../secret.mp3"));
        assert!(!is_safe_audio_name("a/b.mp3"));
        assert!(!is_safe_audio_name(".mp3"));
        assert!(!is_safe_audio_name("notes.txt"));
    }

    #[tokio::test]
    async fn staged_audio_holds_the_upload() {
        let file = stage_audio(b"RIFF0000WAVE").await.unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), b"RIFF0000WAVE");
        assert!(file.path().to_string_lossy().ends_with(".wav"));
    }

    #[tokio::test]
    async fn missing_audio_is_not_found() {
        let (repository, voice) = voice(Arc::new(NullTranscriber), Arc::new(NullSynthesizer)).await;
        assert!(matches!(
            voice.audio("00000000-0000-0000-0000-000000000000.mp3").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            voice.audio("../config.toml").await,
            Err(AppError::Validation(_))
        ));
        assert!(repository.get_error_logs(10).await.unwrap().is_empty());
    }
}
