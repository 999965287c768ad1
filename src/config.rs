use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

const APP_DIR: &str = "skillforge";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    pub llm_api_key: Option<String>,

    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,

    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Embedding model name. Vector search is disabled when unset.
    pub embedding_model: Option<String>,

    pub embedding_base_url: Option<String>,

    #[serde(default = "default_whisper_command")]
    pub whisper_command: String,

    #[serde(default = "default_tts_command")]
    pub tts_command: String,

    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,

    /// Synthesized replies older than this are deleted on the next write.
    #[serde(default = "default_audio_retention_hours")]
    pub audio_retention_hours: u64,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("skillforge.db").to_string_lossy().to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:7860".to_string()
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_llm_model() -> String {
    "stepfun/step-3.5-flash:free".to_string()
}

fn default_llm_temperature() -> f32 {
    0.7
}

fn default_llm_max_tokens() -> u32 {
    1000
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_whisper_command() -> String {
    "whisper".to_string()
}

fn default_tts_command() -> String {
    "gtts-cli".to_string()
}

fn default_audio_dir() -> String {
    data_dir().join("audio").to_string_lossy().to_string()
}

fn default_audio_retention_hours() -> u64 {
    24
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_log_filter() -> String {
    "warn,skillforge=info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            llm_api_key: None,
            llm_base_url: default_llm_base_url(),
            llm_model: default_llm_model(),
            llm_temperature: default_llm_temperature(),
            llm_max_tokens: default_llm_max_tokens(),
            llm_timeout_secs: default_llm_timeout_secs(),
            embedding_model: None,
            embedding_base_url: None,
            whisper_command: default_whisper_command(),
            tts_command: default_tts_command(),
            audio_dir: default_audio_dir(),
            audio_retention_hours: default_audio_retention_hours(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load from `path` (or the default location), writing defaults on first run.
    /// `OPENROUTER_API_KEY` in the environment overrides the stored key.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)?
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            config
        };

        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            if !key.trim().is_empty() {
                config.llm_api_key = Some(key);
            }
        }

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.llm_timeout_secs == 0 {
            return Err(AppError::Config(
                "llm_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn embedding_endpoint(&self) -> &str {
        self.embedding_base_url
            .as_deref()
            .unwrap_or(&self.llm_base_url)
    }
}
