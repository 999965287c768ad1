use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Generated,
    /// The model call failed; sections are empty and `error` explains why.
    Ungenerated,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Generated => "generated",
            PlanStatus::Ungenerated => "ungenerated",
        }
    }

    pub fn from_db(s: &str) -> Self {
        if s == "generated" {
            PlanStatus::Generated
        } else {
            PlanStatus::Ungenerated
        }
    }
}

/// The three labeled parts extracted from a weekly plan response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSections {
    pub definitions: String,
    pub tags: String,
    pub knowledge: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyPlan {
    pub id: i64,
    pub user_email: String,
    pub week: u8,
    pub grade: String,
    pub interests: Vec<String>,
    pub status: PlanStatus,
    pub content: String,
    pub sections: PlanSections,
    pub error: Option<String>,
    pub created_at: String,
}

/// One week's outcome, ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewWeeklyPlan {
    pub user_email: String,
    pub week: u8,
    pub grade: String,
    pub interests: Vec<String>,
    pub status: PlanStatus,
    pub content: String,
    pub sections: PlanSections,
    pub error: Option<String>,
}
