use std::sync::Arc;

use serde::Deserialize;

use crate::ai::{parse_plan_sections, LlmClient, PromptLibrary};
use crate::db::Repository;
use crate::error::{AppError, ErrorKind, Result};
use crate::models::{LlmDialogue, NewWeeklyPlan, PlanSections, PlanStatus, WeeklyPlan};

use super::error_log::ErrorLogger;

pub const PLAN_WEEKS: u8 = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    pub user_email: String,
    pub grade: String,
    pub interests: Vec<String>,
}

impl PlanRequest {
    fn validate(&self) -> Result<()> {
        if self.user_email.trim().is_empty() {
            return Err(AppError::Validation("Укажите email.".to_string()));
        }
        if self.interests.iter().all(|i| i.trim().is_empty()) {
            return Err(AppError::Validation(
                "Выберите хотя бы одно направление.".to_string(),
            ));
        }
        Ok(())
    }

    fn grade(&self) -> &str {
        match self.grade.trim() {
            "" => "General",
            grade => grade,
        }
    }
}

/// Position of the workflow: weeks are generated strictly in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStep {
    Week(u8),
    Done,
}

impl PlanStep {
    pub fn start() -> Self {
        PlanStep::Week(1)
    }

    pub fn next(self) -> Self {
        match self {
            PlanStep::Week(week) if week < PLAN_WEEKS => PlanStep::Week(week + 1),
            _ => PlanStep::Done,
        }
    }
}

#[derive(Clone)]
pub struct PlanService {
    repository: Repository,
    prompts: PromptLibrary,
    llm: Arc<dyn LlmClient>,
    errors: ErrorLogger,
}

impl PlanService {
    pub fn new(
        repository: Repository,
        prompts: PromptLibrary,
        llm: Arc<dyn LlmClient>,
        errors: ErrorLogger,
    ) -> Self {
        Self {
            repository,
            prompts,
            llm,
            errors,
        }
    }

    /// Generates and stores one record per week. A failed model call marks that
    /// week `ungenerated` and the workflow moves on; nothing is persisted when the
    /// model is not configured at all.
    pub async fn generate(&self, request: PlanRequest) -> Result<Vec<WeeklyPlan>> {
        self.errors.intercept("weekly plan", self.run(request)).await
    }

    async fn run(&self, request: PlanRequest) -> Result<Vec<WeeklyPlan>> {
        request.validate()?;
        let interests: Vec<String> = request
            .interests
            .iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();
        let email = request.user_email.trim().to_string();
        let grade = request.grade().to_string();
        let interests_text = interests.join(", ");

        // render every prompt up front so a broken template stops before any model call
        let mut prompts = Vec::with_capacity(PLAN_WEEKS as usize);
        for week in 1..=PLAN_WEEKS {
            let week_text = week.to_string();
            let prompt = self
                .prompts
                .render(
                    "weekly_plan",
                    &[
                        ("grade", grade.as_str()),
                        ("interests", interests_text.as_str()),
                        ("week", week_text.as_str()),
                    ],
                )
                .await?;
            prompts.push(prompt);
        }

        let mut plans = Vec::with_capacity(PLAN_WEEKS as usize);
        let mut step = PlanStep::start();
        while let PlanStep::Week(week) = step {
            let prompt = &prompts[(week - 1) as usize];
            tracing::info!(email = %email, week, "Generating weekly plan");

            let plan = match self.llm.generate(prompt, None).await {
                Ok(content) => {
                    self.repository
                        .insert_llm_dialogue(Some(&email), prompt, &content)
                        .await?;
                    NewWeeklyPlan {
                        user_email: email.clone(),
                        week,
                        grade: grade.clone(),
                        interests: interests.clone(),
                        status: PlanStatus::Generated,
                        sections: parse_plan_sections(&content),
                        content,
                        error: None,
                    }
                }
                Err(e) if e.kind() == ErrorKind::DependencyAbsent => return Err(e),
                Err(e) => {
                    self.errors.record(&format!("weekly plan week {week}"), &e).await;
                    let message = e.user_message();
                    self.repository
                        .insert_llm_dialogue(Some(&email), prompt, &message)
                        .await?;
                    NewWeeklyPlan {
                        user_email: email.clone(),
                        week,
                        grade: grade.clone(),
                        interests: interests.clone(),
                        status: PlanStatus::Ungenerated,
                        content: message,
                        sections: PlanSections::default(),
                        error: Some(e.to_string()),
                    }
                }
            };
            plans.push(plan);
            step = step.next();
        }

        let ids = self.repository.insert_weekly_plans(plans).await?;
        let stored = self.repository.get_weekly_plans(&email).await?;
        Ok(stored.into_iter().filter(|p| ids.contains(&p.id)).collect())
    }

    pub async fn plans_for(&self, email: &str) -> Result<Vec<WeeklyPlan>> {
        self.errors
            .intercept("list plans", self.repository.get_weekly_plans(email.trim()))
            .await
    }

    /// Model call log, newest first, optionally for one user.
    pub async fn dialogues(&self, email: Option<&str>, limit: usize) -> Result<Vec<LlmDialogue>> {
        let email = email.map(str::trim).filter(|e| !e.is_empty());
        self.errors
            .intercept("list dialogues", self.repository.get_llm_dialogues(email, limit))
            .await
    }
}
