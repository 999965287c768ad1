use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStatus {
    #[serde(rename = "Изучено")]
    Learned,
    #[serde(rename = "В процессе")]
    InProgress,
    #[serde(rename = "Запланировано")]
    Planned,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Learned => "Изучено",
            ProgressStatus::InProgress => "В процессе",
            ProgressStatus::Planned => "Запланировано",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Изучено" => Ok(ProgressStatus::Learned),
            "В процессе" => Ok(ProgressStatus::InProgress),
            "Запланировано" => Ok(ProgressStatus::Planned),
            other => Err(AppError::Parse(format!("unknown progress status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user_id: String,
    pub skill: String,
    pub status: ProgressStatus,
    pub date: String,
}
