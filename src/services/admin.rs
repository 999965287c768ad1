use tokio_util::sync::CancellationToken;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{ErrorLogEntry, Interest, PromptTemplate, TableView};

use super::error_log::ErrorLogger;

const ERROR_LOG_LIMIT: usize = 50;

/// Operator console: prompts, interests, raw tables and shutdown.
#[derive(Clone)]
pub struct AdminService {
    repository: Repository,
    errors: ErrorLogger,
    shutdown: CancellationToken,
}

impl AdminService {
    pub fn new(repository: Repository, errors: ErrorLogger, shutdown: CancellationToken) -> Self {
        Self {
            repository,
            errors,
            shutdown,
        }
    }

    pub async fn prompts(&self) -> Result<Vec<PromptTemplate>> {
        self.errors
            .intercept("list prompts", self.repository.list_prompts())
            .await
    }

    pub async fn prompt(&self, agent_name: &str) -> Result<PromptTemplate> {
        self.errors
            .intercept("get prompt", async {
                let template = self
                    .repository
                    .get_prompt(agent_name)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("agent '{agent_name}'")))?;
                Ok(PromptTemplate {
                    agent_name: agent_name.to_string(),
                    template,
                })
            })
            .await
    }

    pub async fn update_prompt(&self, agent_name: &str, template: &str) -> Result<String> {
        if template.trim().is_empty() {
            return Err(AppError::Validation("Текст промпта не может быть пустым.".to_string()));
        }
        self.errors
            .intercept("update prompt", self.repository.update_prompt(agent_name, template))
            .await?;
        tracing::info!(agent = agent_name, "Prompt template updated");
        Ok(format!("Промпт для {agent_name} сохранён."))
    }

    pub async fn interests(&self) -> Result<Vec<Interest>> {
        self.errors
            .intercept("list interests", self.repository.get_all_interests())
            .await
    }

    pub async fn active_interests(&self) -> Result<Vec<Interest>> {
        self.errors
            .intercept("active interests", self.repository.get_active_interests())
            .await
    }

    pub async fn add_interest(&self, title: &str, active: bool) -> Result<i64> {
        self.errors
            .intercept("add interest", self.repository.insert_interest(title, active))
            .await
    }

    pub async fn set_interest_active(&self, id: i64, active: bool) -> Result<()> {
        self.errors
            .intercept("toggle interest", self.repository.set_interest_active(id, active))
            .await
    }

    pub async fn delete_interest(&self, id: i64) -> Result<()> {
        self.errors
            .intercept("delete interest", self.repository.delete_interest(id))
            .await
    }

    pub async fn view_table(&self, table: &str) -> Result<TableView> {
        self.errors
            .intercept("view table", self.repository.view_table(table))
            .await
    }

    pub async fn error_logs(&self) -> Result<Vec<ErrorLogEntry>> {
        self.errors
            .intercept("list error logs", self.repository.get_error_logs(ERROR_LOG_LIMIT))
            .await
    }

    /// Starts an orderly stop. Requires explicit confirmation.
    pub async fn shutdown(&self, confirm: bool) -> Result<()> {
        if !confirm {
            return Err(AppError::Validation(
                "Подтвердите остановку сервера.".to_string(),
            ));
        }
        self.errors
            .note("INFO", "Shutdown requested from the admin console")
            .await;
        self.shutdown.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn admin() -> (Repository, CancellationToken, AdminService) {
        let repository = Repository::in_memory().await.unwrap();
        let token = CancellationToken::new();
        let admin = AdminService::new(
            repository.clone(),
            ErrorLogger::new(repository.clone()),
            token.clone(),
        );
        (repository, token, admin)
    }

    #[tokio::test]
    async fn shutdown_needs_confirmation() {
        let (repository, token, admin) = admin().await;
        assert!(matches!(admin.shutdown(false).await, Err(AppError::Validation(_))));
        assert!(!token.is_cancelled());

        admin.shutdown(true).await.unwrap();
        assert!(token.is_cancelled());
        let logs = repository.get_error_logs(10).await.unwrap();
        assert_eq!(logs[0].error_type, "INFO");
    }

    #[tokio::test]
    async fn prompt_lookup_and_update() {
        let (_, _, admin) = admin().await;
        let prompt = admin.prompt("validator").await.unwrap();
        assert!(prompt.template.contains("{question}"));

        let message = admin.update_prompt("validator", "Проверь {question}").await.unwrap();
        assert_eq!(message, "Промпт для validator сохранён.");
        assert!(matches!(admin.prompt("ghost").await, Err(AppError::NotFound(_))));
        assert!(matches!(
            admin.update_prompt("validator", "  ").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn interest_store_failure_is_logged() {
        let (repository, _, admin) = admin().await;
        repository.execute_batch("DROP TABLE interests").await.unwrap();

        assert!(matches!(admin.interests().await, Err(AppError::Database(_))));
        let logs = repository.get_error_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].message.starts_with("list interests"));
    }
}
