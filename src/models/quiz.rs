use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub user_id: Option<String>,
    pub topic: String,
    pub score: u32,
    pub total: u32,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestAnswer {
    pub topic: String,
    pub question_index: usize,
    pub selected: String,
    pub correct: bool,
    pub date: String,
}
