use serde::Serialize;

use crate::ai::PromptLibrary;
use crate::db::Repository;
use crate::error::Result;
use crate::search::RetrievalService;

use super::error_log::ErrorLogger;
use super::validator::{self, ArtifactKind};

pub const HELP_TEXT: &str = "Я могу: составить план развития, найти учебные материалы, проверить файл, провести голосовое собеседование. Выберите вкладку.";

const JUNIOR_PLAN: &str = "\
📚 **Неделя 1:** Основы SQL (SELECT, JOIN, агрегация) — тренажёр SQL-EX
📚 **Неделя 2:** Нотация BPMN 2.0, создание диаграмм — видео на YouTube
📚 **Неделя 3:** REST API, OpenAPI, Postman — документация Swagger
📚 **Неделя 4:** Подготовка к аттестации, mock-интервью, soft skills";

const MIDDLE_PLAN: &str = "\
🚀 **Неделя 1:** Проектирование API, идемпотентность, пагинация
🚀 **Неделя 2:** Kafka basics, event-driven архитектура, протоколы
🚀 **Неделя 3:** Event Storming, DDD, bounded context
🚀 **Неделя 4:** Проведение интервью, менторство, code review";

const GENERAL_PLAN: &str = "\
🎯 **Неделя 1:** SQL (оптимизация запросов, индексы)
🎯 **Неделя 2:** BPMN, CMMN, DMN — сравнение
🎯 **Неделя 3:** REST, gRPC, GraphQL — когда что выбирать
🎯 **Неделя 4:** Софт-скиллы: коммуникация с заказчиком, управление ожиданиями";

const INTERVIEW_BANK: [(&str, [&str; 3]); 3] = [
    (
        "sql",
        [
            "Чем отличается INNER JOIN от LEFT JOIN?",
            "Что такое индекс и когда его использовать?",
            "Объясните разницу между UNION и UNION ALL.",
        ],
    ),
    (
        "bpmn",
        [
            "Какие основные элементы BPMN 2.0 вы знаете?",
            "Чем отличается процесс от подпроцесса?",
            "Как моделировать исключительные ситуации в BPMN?",
        ],
    ),
    (
        "api",
        [
            "Что такое идемпотентность в REST?",
            "Какие статус-коды HTTP вы используете чаще всего?",
            "В чём разница между PUT и PATCH?",
        ],
    ),
];

const GENERIC_QUESTIONS: [&str; 3] = [
    "Расскажите о вашем опыте системного анализа.",
    "Как вы собираете требования?",
    "Как документируете архитектурные решения?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Plan,
    Search,
    Help,
}

impl Intent {
    pub fn detect(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("план") {
            Intent::Plan
        } else if ["найди", "ресурс", "статья"].iter().any(|w| lower.contains(w)) {
            Intent::Search
        } else {
            Intent::Help
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub intent: Intent,
    pub reply: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub kind: ArtifactKind,
    pub verdict: String,
    pub report: String,
}

/// Text agents behind the chat tab and the validator/interview tabs.
#[derive(Clone)]
pub struct AgentService {
    repository: Repository,
    prompts: PromptLibrary,
    retrieval: RetrievalService,
    errors: ErrorLogger,
}

impl AgentService {
    pub fn new(
        repository: Repository,
        prompts: PromptLibrary,
        retrieval: RetrievalService,
        errors: ErrorLogger,
    ) -> Self {
        Self {
            repository,
            prompts,
            retrieval,
            errors,
        }
    }

    /// Routes the message by intent. Both turns are recorded when `user_email` is given.
    pub async fn chat_respond(&self, message: &str, user_email: Option<&str>) -> Result<ChatReply> {
        let intent = Intent::detect(message);
        tracing::debug!(?intent, "Chat message routed");

        let reply = match intent {
            Intent::Plan => self.plan_agent(message).await?,
            Intent::Search => self.search_agent(message).await?,
            Intent::Help => HELP_TEXT.to_string(),
        };

        if let Some(email) = user_email.filter(|e| !e.trim().is_empty()) {
            self.errors
                .intercept("chat history", async {
                    self.repository.insert_chat_turn(email, "user", message).await?;
                    self.repository
                        .insert_chat_turn(email, "assistant", &reply)
                        .await
                })
                .await?;
        }

        Ok(ChatReply { intent, reply })
    }

    pub async fn plan_agent(&self, message: &str) -> Result<String> {
        self.errors
            .intercept("plan_agent", async {
                let lower = message.to_lowercase();
                let (grade, plan) = if lower.contains("junior") {
                    ("Junior", JUNIOR_PLAN)
                } else if lower.contains("middle") {
                    ("Middle", MIDDLE_PLAN)
                } else {
                    ("General", GENERAL_PLAN)
                };
                let prompt = self.prompts.render("plan_agent", &[("grade", grade)]).await?;
                Ok(format!("**Промпт агента:** {prompt}\n\n{plan}"))
            })
            .await
    }

    pub async fn search_agent(&self, query: &str) -> Result<String> {
        let prompt = self
            .errors
            .intercept(
                "search_agent",
                self.prompts.render("search_agent", &[("query", query)]),
            )
            .await?;
        // retrieval records its own failures
        let resources = self.retrieval.find_resources(query).await?;
        Ok(format!(
            "**Промпт агента:** {prompt}\n\n**Найденные ресурсы:**\n{resources}"
        ))
    }

    pub async fn validate_file(
        &self,
        content: &str,
        filename: &str,
        question: &str,
    ) -> Result<ValidationReport> {
        self.errors
            .intercept("validator", async {
                let kind = validator::classify(filename, content);
                let verdict = validator::verdict(kind, content);
                let excerpt: String = content.chars().take(50).collect();
                let prompt = self
                    .prompts
                    .render("validator", &[("question", question), ("content", &excerpt)])
                    .await?;
                tracing::info!(filename, ?kind, "Validated artifact");
                Ok(ValidationReport {
                    kind,
                    report: format!("**Промпт агента:** {prompt}\n\n**Вердикт:** {verdict}"),
                    verdict,
                })
            })
            .await
    }

    pub async fn interview(&self, topic: &str, grade: &str) -> Result<String> {
        self.errors
            .intercept("interview_agent", async {
                // template must still be present and well-formed
                self.prompts
                    .render("interview_agent", &[("topic", topic), ("grade", grade)])
                    .await?;
                let questions = interview_questions(topic);
                let numbered = questions
                    .iter()
                    .enumerate()
                    .map(|(i, q)| format!("{}. {q}", i + 1))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(format!("**Тема:** {topic} ({grade})\n\n**Вопросы:**\n{numbered}"))
            })
            .await
    }
}

/// First bank whose key occurs in the topic, else the generic questions.
pub fn interview_questions(topic: &str) -> [&'static str; 3] {
    let lower = topic.to_lowercase();
    INTERVIEW_BANK
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|(_, questions)| *questions)
        .unwrap_or(GENERIC_QUESTIONS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::search::NullIndex;
    use std::sync::Arc;

    async fn agents() -> (Repository, AgentService) {
        let repository = Repository::in_memory().await.unwrap();
        let errors = ErrorLogger::new(repository.clone());
        let retrieval =
            RetrievalService::new(repository.clone(), Arc::new(NullIndex), errors.clone());
        let service = AgentService::new(
            repository.clone(),
            PromptLibrary::new(repository.clone()),
            retrieval,
            errors,
        );
        (repository, service)
    }

    #[test]
    fn intents_follow_keywords() {
        assert_eq!(Intent::detect("Составь ПЛАН для junior"), Intent::Plan);
        assert_eq!(Intent::detect("Найди что-нибудь про SQL"), Intent::Search);
        assert_eq!(Intent::detect("Нужна статья по BPMN"), Intent::Search);
        assert_eq!(Intent::detect("привет"), Intent::Help);
        // plan wins when both appear
        assert_eq!(Intent::detect("найди план"), Intent::Plan);
    }

    #[tokio::test]
    async fn plan_agent_picks_grade() {
        let (_, service) = agents().await;
        let reply = service.plan_agent("план для Middle").await.unwrap();
        assert!(reply.contains("Middle"));
        assert!(reply.contains("Kafka basics"));

        let reply = service.plan_agent("какой план?").await.unwrap();
        assert!(reply.contains("General"));
        assert!(reply.contains("gRPC"));
    }

    #[tokio::test]
    async fn search_intent_appends_resources() {
        let (_, service) = agents().await;
        let reply = service.chat_respond("найди ресурс по kafka", None).await.unwrap();
        assert_eq!(reply.intent, Intent::Search);
        assert!(reply
            .reply
            .contains("- [Kafka basics](https://kafka.apache.org/quickstart)"));
    }

    #[tokio::test]
    async fn chat_turns_are_recorded_for_known_user() {
        let (repository, service) = agents().await;
        let reply = service.chat_respond("привет", Some("a@x.ru")).await.unwrap();
        assert_eq!(reply.reply, HELP_TEXT);

        let history = repository.get_chat_history("a@x.ru", 20).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "assistant");
        assert_eq!(history[1].content, "привет");
    }

    #[tokio::test]
    async fn broken_template_is_reported_and_logged() {
        let (repository, service) = agents().await;
        repository
            .update_prompt("search_agent", "Ищи {topic}")
            .await
            .unwrap();

        let err = service.search_agent("sql").await.unwrap_err();
        assert!(matches!(err, AppError::MissingPlaceholder { ref key, .. } if key == "topic"));
        let logs = repository.get_error_logs(10).await.unwrap();
        assert_eq!(logs[0].error_type, "MissingPlaceholder");
    }

    #[tokio::test]
    async fn validator_report_includes_excerpt() {
        let (_, service) = agents().await;
        let report = service
            .validate_file("SELECT * FROM orders o JOIN users u ON u.id = o.user_id", "q.sql", "Найти заказы")
            .await
            .unwrap();
        assert_eq!(report.kind, ArtifactKind::Sql);
        assert!(report.verdict.contains("JOIN"));
        assert!(report.report.contains("Найти заказы"));
    }

    #[tokio::test]
    async fn interview_uses_topic_bank() {
        let (_, service) = agents().await;
        let text = service.interview("REST API", "Middle").await.unwrap();
        assert!(text.starts_with("**Тема:** REST API (Middle)"));
        assert!(text.contains("1. Что такое идемпотентность в REST?"));

        assert_eq!(interview_questions("Коммуникации"), GENERIC_QUESTIONS);
    }
}
