use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::db::Repository;
use crate::error::{AppError, Result};

use super::error_log::ErrorLogger;

const RUN_IDLE_LIMIT: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug)]
pub struct Question {
    pub question: &'static str,
    pub options: &'static [&'static str],
    pub answer: usize,
}

#[derive(Debug)]
pub struct Topic {
    pub name: &'static str,
    pub questions: &'static [Question],
}

pub static QUIZ_BANK: [Topic; 3] = [
    Topic {
        name: "SQL",
        questions: &[
            Question {
                question: "Какой оператор используется для выборки данных?",
                options: &["SELECT", "INSERT", "UPDATE", "DELETE"],
                answer: 0,
            },
            Question {
                question: "Какой оператор объединяет таблицы по условию?",
                options: &["JOIN", "UNION", "MERGE", "COMBINE"],
                answer: 0,
            },
            Question {
                question: "Какой оператор сортирует результат?",
                options: &["ORDER BY", "GROUP BY", "SORT BY", "HAVING"],
                answer: 0,
            },
        ],
    },
    Topic {
        name: "BPMN",
        questions: &[
            Question {
                question: "Какой элемент BPMN обозначает событие?",
                options: &["Круг", "Прямоугольник", "Ромб", "Стрелка"],
                answer: 0,
            },
            Question {
                question: "Что обозначает пунктирная стрелка?",
                options: &["Поток сообщений", "Поток управления", "Ассоциация", "Комментарий"],
                answer: 2,
            },
        ],
    },
    Topic {
        name: "REST",
        questions: &[
            Question {
                question: "Какой метод HTTP используется для обновления ресурса?",
                options: &["PUT", "GET", "POST", "DELETE"],
                answer: 0,
            },
            Question {
                question: "Какой статус-код означает 'успешно создано'?",
                options: &["201", "200", "204", "404"],
                answer: 0,
            },
        ],
    },
];

pub fn find_topic(name: &str) -> Option<&'static Topic> {
    let name = name.trim();
    QUIZ_BANK.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

/// Question text for an answer log row, or a numbered placeholder when the bank no longer has it.
pub fn question_text(topic: &str, index: usize) -> String {
    find_topic(topic)
        .and_then(|t| t.questions.get(index))
        .map(|q| q.question.to_string())
        .unwrap_or_else(|| format!("Вопрос {}", index + 1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizState {
    Question(usize),
    Finished,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub question_index: usize,
    pub selected: String,
    pub correct: bool,
    pub feedback: String,
    pub finished: bool,
}

/// One pass over a topic's questions.
#[derive(Debug, Clone)]
pub struct QuizRun {
    pub id: Uuid,
    pub topic: &'static Topic,
    pub user_email: Option<String>,
    pub state: QuizState,
    pub score: u32,
    touched: Instant,
}

impl QuizRun {
    pub fn new(topic: &'static Topic, user_email: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            user_email,
            state: QuizState::Question(0),
            score: 0,
            touched: Instant::now(),
        }
    }

    pub fn total(&self) -> u32 {
        self.topic.questions.len() as u32
    }

    pub fn answer(&mut self, option: usize) -> Result<AnswerOutcome> {
        let QuizState::Question(index) = self.state else {
            return Err(AppError::Validation(
                "Тест завершён! Сбросьте тест для новой попытки.".to_string(),
            ));
        };
        let question = &self.topic.questions[index];
        let Some(selected) = question.options.get(option) else {
            return Err(AppError::Validation(format!(
                "Нет варианта ответа с номером {option}."
            )));
        };

        let correct = option == question.answer;
        if correct {
            self.score += 1;
        }
        self.state = if index + 1 < self.topic.questions.len() {
            QuizState::Question(index + 1)
        } else {
            QuizState::Finished
        };
        self.touched = Instant::now();

        Ok(AnswerOutcome {
            question_index: index,
            selected: selected.to_string(),
            correct,
            feedback: if correct {
                "✅ Верно!".to_string()
            } else {
                format!(
                    "❌ Неверно. Правильный ответ: {}",
                    question.options[question.answer]
                )
            },
            finished: self.state == QuizState::Finished,
        })
    }

    pub fn reset(&mut self) {
        self.state = QuizState::Question(0);
        self.score = 0;
        self.touched = Instant::now();
    }

    pub fn view(&self) -> QuizView {
        let (question_number, question, options) = match self.state {
            QuizState::Question(index) => {
                let q = &self.topic.questions[index];
                (
                    Some(index + 1),
                    Some(format!("**Вопрос {}:** {}", index + 1, q.question)),
                    q.options.iter().map(|o| o.to_string()).collect(),
                )
            }
            QuizState::Finished => (None, None, Vec::new()),
        };
        QuizView {
            id: self.id,
            topic: self.topic.name.to_string(),
            finished: self.state == QuizState::Finished,
            question_number,
            question,
            options,
            score: self.score,
            total: self.total(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizView {
    pub id: Uuid,
    pub topic: String,
    pub finished: bool,
    pub question_number: Option<usize>,
    pub question: Option<String>,
    pub options: Vec<String>,
    pub score: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerReply {
    #[serde(flatten)]
    pub outcome: AnswerOutcome,
    pub quiz: QuizView,
    pub summary: Option<String>,
}

/// Live quiz runs keyed by id. Results are persisted when a run finishes.
#[derive(Clone)]
pub struct QuizService {
    repository: Repository,
    errors: ErrorLogger,
    runs: Arc<Mutex<HashMap<Uuid, QuizRun>>>,
}

impl QuizService {
    pub fn new(repository: Repository, errors: ErrorLogger) -> Self {
        Self {
            repository,
            errors,
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn runs(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, QuizRun>> {
        // a panic while holding the lock cannot leave a run half-updated
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn start(&self, topic: &str, user_email: Option<String>) -> Result<QuizView> {
        let topic = find_topic(topic)
            .ok_or_else(|| AppError::NotFound(format!("Тема '{topic}' не найдена")))?;
        let user_email = user_email.filter(|e| !e.trim().is_empty());
        let run = QuizRun::new(topic, user_email);
        let view = run.view();

        let mut runs = self.runs();
        runs.retain(|_, r| r.touched.elapsed() < RUN_IDLE_LIMIT);
        runs.insert(run.id, run);
        tracing::debug!(id = %view.id, topic = %view.topic, "Quiz started");
        Ok(view)
    }

    pub fn view(&self, id: Uuid) -> Result<QuizView> {
        self.runs()
            .get(&id)
            .map(QuizRun::view)
            .ok_or_else(|| AppError::NotFound(format!("quiz {id}")))
    }

    pub fn reset(&self, id: Uuid) -> Result<QuizView> {
        let mut runs = self.runs();
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("quiz {id}")))?;
        run.reset();
        Ok(run.view())
    }

    /// Applies the answer to a copy of the run and commits it only after the
    /// store accepted the rows, so a failed write leaves the run retryable.
    pub async fn answer(&self, id: Uuid, option: usize) -> Result<AnswerReply> {
        let mut next = self
            .runs()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("quiz {id}")))?;
        let outcome = next.answer(option)?;
        let view = next.view();
        let topic = next.topic.name;

        let result = outcome.finished.then_some((view.score, view.total));
        self.errors
            .intercept(
                "quiz answer",
                self.repository.record_quiz_answer(
                    next.user_email.as_deref(),
                    topic,
                    outcome.question_index,
                    &outcome.selected,
                    outcome.correct,
                    result,
                ),
            )
            .await?;
        self.runs().insert(id, next);

        let summary = result.map(|(score, total)| {
            tracing::info!(topic, score, total, "Quiz finished");
            format!("✅ Вы набрали {score} из {total}. Результат сохранён.")
        });

        Ok(AnswerReply {
            outcome,
            quiz: view,
            summary,
        })
    }
}
