use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Optional collaborators whose absence degrades a feature instead of failing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    LanguageModel,
    Transcription,
    SpeechSynthesis,
    EmbeddingIndex,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::LanguageModel => "language model",
            Feature::Transcription => "speech-to-text",
            Feature::SpeechSynthesis => "text-to-speech",
            Feature::EmbeddingIndex => "embedding index",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Language model returned HTTP {status}: {body}")]
    LlmHttp { status: u16, body: String },

    #[error("Language model request timed out")]
    LlmTimeout,

    #[error("Language model connection failed: {0}")]
    LlmConnection(String),

    #[error("Language model response malformed: {0}")]
    LlmResponse(String),

    #[error("Embedding index error: {0}")]
    Embedding(String),

    #[error("Speech engine error: {0}")]
    Speech(String),

    #[error("Feature unavailable: {0}")]
    FeatureUnavailable(Feature),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Template '{template}' references missing placeholder '{key}'")]
    MissingPlaceholder { template: String, key: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification used for logging and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ExternalService,
    DependencyAbsent,
    Validation,
    MissingPlaceholder,
    Parse,
    NotFound,
    Database,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::LlmHttp { .. }
            | AppError::LlmTimeout
            | AppError::LlmConnection(_)
            | AppError::LlmResponse(_)
            | AppError::Embedding(_)
            | AppError::Speech(_)
            | AppError::Http(_) => ErrorKind::ExternalService,
            AppError::FeatureUnavailable(_) => ErrorKind::DependencyAbsent,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::MissingPlaceholder { .. } => ErrorKind::MissingPlaceholder,
            AppError::Parse(_) | AppError::Json(_) | AppError::Toml(_) => ErrorKind::Parse,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Database(_) | AppError::Sqlite(_) => ErrorKind::Database,
            AppError::Io(_) | AppError::Config(_) => ErrorKind::Internal,
        }
    }

    /// Variant name, stored as `error_type` in the error log.
    pub fn type_name(&self) -> &'static str {
        match self {
            AppError::LlmHttp { .. } => "LlmHttp",
            AppError::LlmTimeout => "LlmTimeout",
            AppError::LlmConnection(_) => "LlmConnection",
            AppError::LlmResponse(_) => "LlmResponse",
            AppError::Embedding(_) => "Embedding",
            AppError::Speech(_) => "Speech",
            AppError::FeatureUnavailable(_) => "FeatureUnavailable",
            AppError::Validation(_) => "Validation",
            AppError::MissingPlaceholder { .. } => "MissingPlaceholder",
            AppError::Parse(_) => "Parse",
            AppError::NotFound(_) => "NotFound",
            AppError::Database(_) => "Database",
            AppError::Sqlite(_) => "Sqlite",
            AppError::Http(_) => "Http",
            AppError::Io(_) => "Io",
            AppError::Json(_) => "Json",
            AppError::Toml(_) => "Toml",
            AppError::Config(_) => "Config",
        }
    }

    /// Whether the error log table should record this error.
    pub fn is_loggable(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::DependencyAbsent | ErrorKind::Validation
        )
    }

    /// Text shown to the end user in place of the failed result.
    pub fn user_message(&self) -> String {
        match self {
            AppError::LlmHttp { status, .. } => format!("Ошибка внешнего API: {status}"),
            AppError::LlmTimeout => "Превышено время ожидания ответа от AI-помощника.".to_string(),
            AppError::LlmConnection(_) => "Не удалось подключиться к AI-помощнику.".to_string(),
            AppError::LlmResponse(_) => {
                "AI-помощник вернул некорректный ответ. Попробуйте ещё раз.".to_string()
            }
            AppError::FeatureUnavailable(Feature::LanguageModel) => {
                "⚠️ Внешний AI-помощник недоступен: не задан ключ API.".to_string()
            }
            AppError::FeatureUnavailable(Feature::Transcription) => {
                "⚠️ Распознавание речи не установлено. Голосовой ввод недоступен.".to_string()
            }
            AppError::FeatureUnavailable(Feature::SpeechSynthesis) => {
                "⚠️ Синтез речи не установлен. Ответ будет только текстовым.".to_string()
            }
            AppError::FeatureUnavailable(Feature::EmbeddingIndex) => {
                "⚠️ Векторный поиск недоступен, используется простой поиск.".to_string()
            }
            AppError::Speech(e) => format!("Ошибка распознавания: {e}"),
            AppError::Validation(msg) => format!("⚠️ {msg}"),
            AppError::NotFound(what) => format!("Не найдено: {what}"),
            _ => "Ошибка. Администратор уведомлён.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
