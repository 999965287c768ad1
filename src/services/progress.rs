use serde::Serialize;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{ChatTurn, ProgressRecord, ProgressStatus};

use super::error_log::ErrorLogger;
use super::quiz::question_text;

const CSV_HEADER: [&str; 4] = ["Email", "Навык", "Статус", "Дата"];
const ACTIVITY_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct TestDetail {
    pub topic: String,
    pub question: String,
    pub selected: String,
    pub correct: bool,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub chat: Vec<ChatTurn>,
    pub tests: Vec<TestDetail>,
    pub achievements: Vec<ProgressRecord>,
}

#[derive(Clone)]
pub struct ProgressService {
    repository: Repository,
    errors: ErrorLogger,
}

impl ProgressService {
    pub fn new(repository: Repository, errors: ErrorLogger) -> Self {
        Self { repository, errors }
    }

    pub async fn add(&self, user_id: &str, skill: &str, status: ProgressStatus) -> Result<String> {
        let (user_id, skill) = (user_id.trim(), skill.trim());
        if user_id.is_empty() || skill.is_empty() {
            return Err(AppError::Validation("Email и навык обязательны!".to_string()));
        }
        self.errors
            .intercept("add progress", async {
                self.repository.insert_progress(user_id, skill, status).await?;
                Ok(format!("Достижение '{skill}' добавлено!"))
            })
            .await
    }

    pub async fn for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        self.errors
            .intercept("user progress", self.repository.get_progress(user_id.trim()))
            .await
    }

    pub async fn team(&self) -> Result<Vec<ProgressRecord>> {
        self.errors
            .intercept("team progress", self.repository.get_all_progress())
            .await
    }

    pub async fn export_csv(&self) -> Result<String> {
        self.errors
            .intercept("export progress", async {
                let records = self.repository.get_all_progress().await?;
                let mut out = csv_row(&CSV_HEADER);
                for record in &records {
                    out.push_str(&csv_row(&[
                        record.user_id.as_str(),
                        record.skill.as_str(),
                        record.status.as_str(),
                        record.date.as_str(),
                    ]));
                }
                Ok(out)
            })
            .await
    }

    pub async fn activity(&self, user_id: &str) -> Result<Activity> {
        let user_id = user_id.trim();
        self.errors
            .intercept("user activity", async {
                let (chat, answers, achievements) = futures::try_join!(
                    self.repository.get_chat_history(user_id, ACTIVITY_LIMIT),
                    self.repository.get_test_answers(user_id, ACTIVITY_LIMIT),
                    self.repository.get_progress(user_id),
                )?;
                let tests = answers
                    .into_iter()
                    .map(|answer| TestDetail {
                        question: question_text(&answer.topic, answer.question_index),
                        topic: answer.topic,
                        selected: answer.selected,
                        correct: answer.correct,
                        date: answer.date,
                    })
                    .collect();
                Ok(Activity {
                    chat,
                    tests,
                    achievements,
                })
            })
            .await
    }
}

/// RFC 4180 row terminated by CRLF.
fn csv_row(fields: &[&str]) -> String {
    let mut row = fields
        .iter()
        .map(|field| {
            if field.contains([',', '"', '\r', '\n']) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    row.push_str("\r\n");
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_with_separators_are_quoted() {
        assert_eq!(csv_row(&["a", "b c"]), "a,b c\r\n");
        assert_eq!(
            csv_row(&["x@y.ru", "SQL, JOIN", "say \"hi\""]),
            "x@y.ru,\"SQL, JOIN\",\"say \"\"hi\"\"\"\r\n"
        );
    }

    #[tokio::test]
    async fn export_starts_with_header() {
        let repository = Repository::in_memory().await.unwrap();
        let progress = ProgressService::new(repository.clone(), ErrorLogger::new(repository));
        progress
            .add("a@x.ru", "SQL, основы", ProgressStatus::InProgress)
            .await
            .unwrap();

        let csv = progress.export_csv().await.unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Email,Навык,Статус,Дата"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("a@x.ru,\"SQL, основы\",В процессе,"));
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let repository = Repository::in_memory().await.unwrap();
        let progress = ProgressService::new(repository.clone(), ErrorLogger::new(repository.clone()));
        assert!(matches!(
            progress.add(" ", "SQL", ProgressStatus::Planned).await,
            Err(AppError::Validation(_))
        ));
        assert!(repository.get_error_logs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failures_reach_the_error_log() {
        let repository = Repository::in_memory().await.unwrap();
        let progress = ProgressService::new(repository.clone(), ErrorLogger::new(repository.clone()));
        repository.execute_batch("DROP TABLE progress").await.unwrap();

        let err = progress
            .add("a@x.ru", "SQL", ProgressStatus::Planned)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        let logs = repository.get_error_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].error_type, "Database");
        assert!(logs[0].message.starts_with("add progress"));
    }

    #[tokio::test]
    async fn activity_resolves_question_text() {
        let repository = Repository::in_memory().await.unwrap();
        repository
            .record_quiz_answer(Some("a@x.ru"), "SQL", 0, "SELECT", true, None)
            .await
            .unwrap();
        repository
            .record_quiz_answer(Some("a@x.ru"), "Legacy", 4, "x", false, None)
            .await
            .unwrap();
        repository
            .insert_chat_turn("a@x.ru", "user", "привет")
            .await
            .unwrap();

        let activity = ProgressService::new(repository.clone(), ErrorLogger::new(repository))
            .activity("a@x.ru")
            .await
            .unwrap();
        assert_eq!(activity.chat.len(), 1);
        assert_eq!(activity.tests[0].question, "Вопрос 5");
        assert_eq!(
            activity.tests[1].question,
            "Какой оператор используется для выборки данных?"
        );
        assert!(activity.achievements.is_empty());
    }
}
