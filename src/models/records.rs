use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmDialogue {
    pub user_email: Option<String>,
    pub request: String,
    pub response: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: String,
    pub error_type: String,
    pub message: String,
    pub traceback: String,
}

/// Raw view of a table for the admin console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableView {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}
