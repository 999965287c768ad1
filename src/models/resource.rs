use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    /// Fallback match: a tag occurs inside the query, or the query occurs inside the title.
    /// `query_lower` must already be lowercased.
    pub fn matches(&self, query_lower: &str) -> bool {
        if query_lower.is_empty() {
            return false;
        }
        self.tags.iter().any(|tag| query_lower.contains(tag.as_str()))
            || self.title.to_lowercase().contains(query_lower)
    }

    /// Text handed to the embedding index.
    pub fn document(&self) -> String {
        format!("{} {}", self.title, self.tags.join(","))
    }

    pub fn markdown_link(&self) -> String {
        format!("- [{}]({})", self.title, self.link)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewResource {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub tags: String,
}

impl NewResource {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() || self.link.trim().is_empty() {
            return Err(AppError::Validation(
                "Название и ссылка обязательны!".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split a comma-separated tag list into trimmed, lowercased, unique tags in input order.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',') {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
