use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::Config;
use crate::error::{AppError, Feature, Result};

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Writes speech for `text` and returns the audio file's name inside the audio directory.
    async fn synthesize(&self, text: &str, language: &str) -> Result<String>;
}

pub struct NullTranscriber;

#[async_trait]
impl Transcriber for NullTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
        Err(AppError::FeatureUnavailable(Feature::Transcription))
    }
}

pub struct NullSynthesizer;

#[async_trait]
impl Synthesizer for NullSynthesizer {
    async fn synthesize(&self, _text: &str, _language: &str) -> Result<String> {
        Err(AppError::FeatureUnavailable(Feature::SpeechSynthesis))
    }
}

struct CommandOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

async fn run(program: &str, args: &[&str]) -> Result<CommandOutput> {
    tracing::debug!(program, args = ?args, "Running speech engine");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AppError::Speech(format!("failed to execute {program}: {e}")))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    })
}

/// Whisper CLI. Writes a `.txt` transcript into a scratch directory and reads it back.
pub struct CommandTranscriber {
    program: String,
    model: String,
}

impl CommandTranscriber {
    pub fn new(program: String) -> Self {
        Self {
            program,
            model: "small".to_string(),
        }
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let out_dir = tempfile::tempdir()?;
        let audio = audio_path.to_string_lossy();
        let out = out_dir.path().to_string_lossy();

        let output = run(
            &self.program,
            &[
                &*audio,
                "--model",
                self.model.as_str(),
                "--language",
                "ru",
                "--output_format",
                "txt",
                "--output_dir",
                &*out,
            ],
        )
        .await?;
        if !output.success {
            return Err(AppError::Speech(output.stderr.trim().to_string()));
        }

        let stem = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let transcript_path = out_dir.path().join(format!("{stem}.txt"));
        let text = match tokio::fs::read_to_string(&transcript_path).await {
            Ok(text) => text,
            Err(_) => output.stdout,
        };
        Ok(text.trim().to_string())
    }
}

/// gTTS CLI writing mp3 files into the audio directory.
pub struct CommandSynthesizer {
    program: String,
    audio_dir: PathBuf,
    retention: Duration,
}

impl CommandSynthesizer {
    pub fn new(program: String, audio_dir: PathBuf, retention: Duration) -> Self {
        Self {
            program,
            audio_dir,
            retention,
        }
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn synthesize(&self, text: &str, language: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let file_name = format!("{}.mp3", uuid::Uuid::new_v4());
        let path = self.audio_dir.join(&file_name);
        let path_arg = path.to_string_lossy();

        let output = run(
            &self.program,
            &[text, "--lang", language, "--output", &*path_arg],
        )
        .await?;
        if !output.success {
            return Err(AppError::Speech(output.stderr.trim().to_string()));
        }

        match prune_audio(&self.audio_dir, self.retention).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Pruned old audio replies"),
            Err(e) => tracing::warn!(error = %e, "Failed to prune audio directory"),
        }
        Ok(file_name)
    }
}

/// Deletes `*.mp3` files in `dir` last modified more than `max_age` ago.
async fn prune_audio(dir: &Path, max_age: Duration) -> Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("mp3") {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let age = now
            .duration_since(metadata.modified()?)
            .unwrap_or(Duration::ZERO);
        if age > max_age {
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Resolves a bare command name against `PATH`; paths containing a separator are checked directly.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

pub fn build_transcriber(config: &Config) -> Arc<dyn Transcriber> {
    match find_in_path(&config.whisper_command) {
        Some(path) => {
            tracing::info!(path = %path.display(), "Speech recognition enabled");
            Arc::new(CommandTranscriber::new(config.whisper_command.clone()))
        }
        None => {
            tracing::warn!(command = %config.whisper_command, "Speech recognition not installed, voice input disabled");
            Arc::new(NullTranscriber)
        }
    }
}

pub fn build_synthesizer(config: &Config) -> Arc<dyn Synthesizer> {
    match find_in_path(&config.tts_command) {
        Some(path) => {
            tracing::info!(path = %path.display(), "Speech synthesis enabled");
            Arc::new(CommandSynthesizer::new(
                config.tts_command.clone(),
                PathBuf::from(&config.audio_dir),
                Duration::from_secs(config.audio_retention_hours * 60 * 60),
            ))
        }
        None => {
            tracing::warn!(command = %config.tts_command, "Speech synthesis not installed, replies are text only");
            Arc::new(NullSynthesizer)
        }
    }
}
