use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::db::Repository;
use crate::error::{AppError, Result};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Substitute every `{name}` in `template`. `{{` and `}}` produce literal braces.
/// Keys in `values` that the template never mentions are ignored.
pub fn render(template_name: &str, template: &str, values: &[(&str, &str)]) -> Result<String> {
    let values: HashMap<&str, &str> = values.iter().copied().collect();
    let mut missing: Option<String> = None;

    let rendered = placeholder_re().replace_all(template, |caps: &Captures| {
        match caps.get(1) {
            None if &caps[0] == "{{" => "{".to_string(),
            None => "}".to_string(),
            Some(key) => match values.get(key.as_str()) {
                Some(value) => value.to_string(),
                None => {
                    missing.get_or_insert_with(|| key.as_str().to_string());
                    String::new()
                }
            },
        }
    });

    if let Some(key) = missing {
        return Err(AppError::MissingPlaceholder {
            template: template_name.to_string(),
            key,
        });
    }
    Ok(rendered.into_owned())
}

/// Agent prompt templates as currently stored by the admin console.
#[derive(Clone)]
pub struct PromptLibrary {
    repository: Repository,
}

impl PromptLibrary {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn template(&self, agent_name: &str) -> Result<String> {
        self.repository
            .get_prompt(agent_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("prompt for agent '{agent_name}'")))
    }

    pub async fn render(&self, agent_name: &str, values: &[(&str, &str)]) -> Result<String> {
        let template = self.template(agent_name).await?;
        render(agent_name, &template, values)
    }
}
