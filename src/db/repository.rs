use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    parse_tags, ChatTurn, ErrorLogEntry, Interest, LlmDialogue, NewResource, NewWeeklyPlan,
    PlanSections, PlanStatus, ProgressRecord, ProgressStatus, PromptTemplate, Resource,
    TableView, TestAnswer, TestResult, WeeklyPlan,
};

use super::schema::{SCHEMA, VIEWABLE_TABLES};
use super::seed::{DEFAULT_INTERESTS, DEFAULT_KNOWLEDGE_BASE, DEFAULT_PROMPTS};

const TABLE_VIEW_LIMIT: i64 = 100;

/// Handle to the shared store. Every call runs on the connection's own thread,
/// so statements from concurrent requests never interleave.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    /// Schema only, without the default rows.
    #[cfg(test)]
    pub async fn unseeded() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Runs raw statements, used by tests to break or restore tables.
    #[cfg(test)]
    pub async fn execute_batch(&self, sql: &'static str) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;

            let tx = conn.transaction()?;
            for (name, template) in DEFAULT_PROMPTS {
                tx.execute(
                    "INSERT OR IGNORE INTO agent_prompts (agent_name, prompt_template) VALUES (?1, ?2)",
                    params![name, template],
                )?;
            }

            let resources: i64 =
                tx.query_row("SELECT COUNT(*) FROM knowledge_base", [], |row| row.get(0))?;
            if resources == 0 {
                for (title, link, tags) in DEFAULT_KNOWLEDGE_BASE {
                    tx.execute(
                        "INSERT INTO knowledge_base (title, link, tags) VALUES (?1, ?2, ?3)",
                        params![title, link, tags],
                    )?;
                }
            }

            let interests: i64 =
                tx.query_row("SELECT COUNT(*) FROM interests", [], |row| row.get(0))?;
            if interests == 0 {
                for title in DEFAULT_INTERESTS {
                    tx.execute(
                        "INSERT INTO interests (title, active) VALUES (?1, 1)",
                        params![title],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Knowledge base

    /// Always inserts a new row; identical resources are not deduplicated.
    pub async fn insert_resource(&self, resource: NewResource) -> Result<i64> {
        resource.validate()?;
        let tags = parse_tags(&resource.tags).join(",");
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO knowledge_base (title, link, tags) VALUES (?1, ?2, ?3)",
                    params![resource.title.trim(), resource.link.trim(), tags],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Newest first.
    pub async fn get_all_resources(&self) -> Result<Vec<Resource>> {
        let resources = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, link, tags, created_at FROM knowledge_base ORDER BY id DESC",
                )?;
                let resources = stmt
                    .query_map([], resource_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(resources)
            })
            .await?;
        Ok(resources)
    }

    pub async fn get_resource(&self, id: i64) -> Result<Option<Resource>> {
        let resource = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, link, tags, created_at FROM knowledge_base WHERE id = ?1",
                )?;
                let resource = stmt.query_row(params![id], resource_from_row).optional()?;
                Ok(resource)
            })
            .await?;
        Ok(resource)
    }

    /// Case-insensitive tag/title match, newest first.
    pub async fn search_resources(&self, query: &str) -> Result<Vec<Resource>> {
        let query = query.trim().to_lowercase();
        let resources = self.get_all_resources().await?;
        Ok(resources
            .into_iter()
            .filter(|r| r.matches(&query))
            .collect())
    }

    // Prompt templates

    pub async fn get_prompt(&self, agent_name: &str) -> Result<Option<String>> {
        let agent_name = agent_name.to_string();
        let template = self
            .conn
            .call(move |conn| {
                let template = conn
                    .query_row(
                        "SELECT prompt_template FROM agent_prompts WHERE agent_name = ?1",
                        params![agent_name],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(template)
            })
            .await?;
        Ok(template)
    }

    pub async fn update_prompt(&self, agent_name: &str, template: &str) -> Result<()> {
        let name = agent_name.to_string();
        let template = template.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE agent_prompts SET prompt_template = ?1 WHERE agent_name = ?2",
                    params![template, name],
                )?;
                Ok(updated)
            })
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("agent '{agent_name}'")));
        }
        Ok(())
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptTemplate>> {
        let prompts = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT agent_name, prompt_template FROM agent_prompts ORDER BY agent_name",
                )?;
                let prompts = stmt
                    .query_map([], |row| {
                        Ok(PromptTemplate {
                            agent_name: row.get(0)?,
                            template: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(prompts)
            })
            .await?;
        Ok(prompts)
    }

    // Interests

    pub async fn insert_interest(&self, title: &str, active: bool) -> Result<i64> {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Название обязательно!".to_string()));
        }
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO interests (title, active) VALUES (?1, ?2)",
                    params![title, active],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn set_interest_active(&self, id: i64, active: bool) -> Result<()> {
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE interests SET active = ?1 WHERE id = ?2",
                    params![active, id],
                )?;
                Ok(updated)
            })
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("interest {id}")));
        }
        Ok(())
    }

    pub async fn delete_interest(&self, id: i64) -> Result<()> {
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute("DELETE FROM interests WHERE id = ?1", params![id])?;
                Ok(deleted)
            })
            .await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("interest {id}")));
        }
        Ok(())
    }

    pub async fn get_all_interests(&self) -> Result<Vec<Interest>> {
        self.query_interests("SELECT id, title, active, created_at FROM interests ORDER BY id")
            .await
    }

    pub async fn get_active_interests(&self) -> Result<Vec<Interest>> {
        self.query_interests(
            "SELECT id, title, active, created_at FROM interests WHERE active = 1 ORDER BY id",
        )
        .await
    }

    async fn query_interests(&self, sql: &'static str) -> Result<Vec<Interest>> {
        let interests = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(sql)?;
                let interests = stmt
                    .query_map([], |row| {
                        Ok(Interest {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            active: row.get::<_, i64>(2)? != 0,
                            created_at: timestamp_or_now(row.get::<_, Option<String>>(3)?),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(interests)
            })
            .await?;
        Ok(interests)
    }

    // Progress

    pub async fn insert_progress(
        &self,
        user_id: &str,
        skill: &str,
        status: ProgressStatus,
    ) -> Result<()> {
        let user_id = user_id.to_string();
        let skill = skill.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO progress (user_id, skill, status, date) VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, skill, status.as_str(), now_stamp()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_progress(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        self.query_progress(Some(user_id.to_string())).await
    }

    pub async fn get_all_progress(&self) -> Result<Vec<ProgressRecord>> {
        self.query_progress(None).await
    }

    async fn query_progress(&self, user_id: Option<String>) -> Result<Vec<ProgressRecord>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, skill, status, date FROM progress
                     WHERE ?1 IS NULL OR user_id = ?1
                     ORDER BY date DESC, rowid DESC",
                )?;
                let rows = stmt
                    .query_map(params![user_id], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(user_id, skill, status, date)| -> Result<ProgressRecord> {
                Ok(ProgressRecord {
                    user_id,
                    skill,
                    status: status.parse()?,
                    date,
                })
            })
            .collect()
    }

    // Chat history

    pub async fn insert_chat_turn(&self, user_id: &str, role: &str, content: &str) -> Result<()> {
        let user_id = user_id.to_string();
        let role = role.to_string();
        let content = content.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO chat_history (user_id, role, content, date) VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, role, content, now_stamp()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Most recent turns first.
    pub async fn get_chat_history(&self, user_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let user_id = user_id.to_string();
        let turns = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT role, content, date FROM chat_history
                     WHERE user_id = ?1 ORDER BY rowid DESC LIMIT ?2",
                )?;
                let turns = stmt
                    .query_map(params![user_id, limit as i64], |row| {
                        Ok(ChatTurn {
                            role: row.get(0)?,
                            content: row.get(1)?,
                            date: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(turns)
            })
            .await?;
        Ok(turns)
    }

    // Quiz results

    pub async fn get_test_results(&self, user_id: Option<&str>) -> Result<Vec<TestResult>> {
        let user_id = user_id.map(str::to_string);
        let results = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, topic, score, total, date FROM test_results
                     WHERE ?1 IS NULL OR user_id = ?1 ORDER BY rowid DESC",
                )?;
                let results = stmt
                    .query_map(params![user_id], |row| {
                        Ok(TestResult {
                            user_id: row.get(0)?,
                            topic: row.get(1)?,
                            score: row.get(2)?,
                            total: row.get(3)?,
                            date: row.get(4)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(results)
            })
            .await?;
        Ok(results)
    }

    /// Writes one quiz answer in a single transaction: the answer row when the
    /// user is known, plus the final `(score, total)` row when the run just finished.
    pub async fn record_quiz_answer(
        &self,
        user_id: Option<&str>,
        topic: &str,
        question_index: usize,
        selected: &str,
        correct: bool,
        result: Option<(u32, u32)>,
    ) -> Result<()> {
        let user_id = user_id.map(str::to_string);
        let topic = topic.to_string();
        let selected = selected.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let date = now_stamp();
                if let Some(user_id) = &user_id {
                    tx.execute(
                        "INSERT INTO test_answers (user_id, topic, question_index, selected, correct, date)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![user_id, topic, question_index as i64, selected, correct, date],
                    )?;
                }
                if let Some((score, total)) = result {
                    tx.execute(
                        "INSERT INTO test_results (user_id, topic, score, total, date) VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![user_id, topic, score, total, date],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Most recent answers first.
    pub async fn get_test_answers(&self, user_id: &str, limit: usize) -> Result<Vec<TestAnswer>> {
        let user_id = user_id.to_string();
        let answers = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT topic, question_index, selected, correct, date FROM test_answers
                     WHERE user_id = ?1 ORDER BY rowid DESC LIMIT ?2",
                )?;
                let answers = stmt
                    .query_map(params![user_id, limit as i64], |row| {
                        Ok(TestAnswer {
                            topic: row.get(0)?,
                            question_index: row.get::<_, i64>(1)? as usize,
                            selected: row.get(2)?,
                            correct: row.get::<_, i64>(3)? != 0,
                            date: row.get(4)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(answers)
            })
            .await?;
        Ok(answers)
    }

    // Error log

    pub async fn insert_error_log(&self, error_type: &str, message: &str, traceback: &str) -> Result<()> {
        let error_type = error_type.to_string();
        let message = message.to_string();
        let traceback = traceback.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO error_logs (timestamp, error_type, message, traceback) VALUES (?1, ?2, ?3, ?4)",
                    params![now_stamp(), error_type, message, traceback],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Newest first.
    pub async fn get_error_logs(&self, limit: usize) -> Result<Vec<ErrorLogEntry>> {
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, error_type, message, traceback FROM error_logs
                     ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
                )?;
                let entries = stmt
                    .query_map(params![limit as i64], |row| {
                        Ok(ErrorLogEntry {
                            timestamp: row.get(0)?,
                            error_type: row.get(1)?,
                            message: row.get(2)?,
                            traceback: row.get(3)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    // Weekly plans

    /// Persists all weeks of one generation atomically, returning their ids in order.
    pub async fn insert_weekly_plans(&self, plans: Vec<NewWeeklyPlan>) -> Result<Vec<i64>> {
        let encoded = plans
            .into_iter()
            .map(|plan| -> Result<(String, NewWeeklyPlan)> {
                Ok((serde_json::to_string(&plan.interests)?, plan))
            })
            .collect::<Result<Vec<_>>>()?;

        let ids = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut ids = Vec::with_capacity(encoded.len());
                for (interests, plan) in encoded {
                    tx.execute(
                        r#"INSERT INTO weekly_plans
                           (user_email, week, grade, interests, status, content, definitions, tags, knowledge, error)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                        params![
                            plan.user_email,
                            plan.week,
                            plan.grade,
                            interests,
                            plan.status.as_str(),
                            plan.content,
                            plan.sections.definitions,
                            plan.sections.tags,
                            plan.sections.knowledge,
                            plan.error,
                        ],
                    )?;
                    ids.push(tx.last_insert_rowid());
                }
                tx.commit()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    /// Newest generation first, weeks ascending within a generation.
    pub async fn get_weekly_plans(&self, user_email: &str) -> Result<Vec<WeeklyPlan>> {
        let user_email = user_email.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                // ids of one generation are consecutive, so id - week identifies it
                let mut stmt = conn.prepare(
                    r#"SELECT id, user_email, week, grade, interests, status, content,
                              definitions, tags, knowledge, error, created_at
                       FROM weekly_plans WHERE user_email = ?1
                       ORDER BY (id - week) DESC, week ASC"#,
                )?;
                let rows = stmt
                    .query_map(params![user_email], |row| {
                        Ok((
                            row.get::<_, String>(4)?,
                            WeeklyPlan {
                                id: row.get(0)?,
                                user_email: row.get(1)?,
                                week: row.get(2)?,
                                grade: row.get(3)?,
                                interests: Vec::new(),
                                status: PlanStatus::from_db(&row.get::<_, String>(5)?),
                                content: row.get(6)?,
                                sections: PlanSections {
                                    definitions: row.get(7)?,
                                    tags: row.get(8)?,
                                    knowledge: row.get(9)?,
                                },
                                error: row.get(10)?,
                                created_at: row.get(11)?,
                            },
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(interests, mut plan)| -> Result<WeeklyPlan> {
                plan.interests = serde_json::from_str(&interests)?;
                Ok(plan)
            })
            .collect()
    }

    // LLM dialogues

    pub async fn insert_llm_dialogue(
        &self,
        user_email: Option<&str>,
        request: &str,
        response: &str,
    ) -> Result<()> {
        let user_email = user_email.map(str::to_string);
        let request = request.to_string();
        let response = response.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO llm_dialogues (user_email, request, response, date) VALUES (?1, ?2, ?3, ?4)",
                    params![user_email, request, response, now_stamp()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_llm_dialogues(
        &self,
        user_email: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LlmDialogue>> {
        let user_email = user_email.map(str::to_string);
        let dialogues = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_email, request, response, date FROM llm_dialogues
                     WHERE ?1 IS NULL OR user_email = ?1 ORDER BY id DESC LIMIT ?2",
                )?;
                let dialogues = stmt
                    .query_map(params![user_email, limit as i64], |row| {
                        Ok(LlmDialogue {
                            user_email: row.get(0)?,
                            request: row.get(1)?,
                            response: row.get(2)?,
                            date: row.get(3)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(dialogues)
            })
            .await?;
        Ok(dialogues)
    }

    // Admin table browser

    /// Last rows of a whitelisted table, most recent first, every value rendered as text.
    pub async fn view_table(&self, table: &str) -> Result<TableView> {
        let Some(table) = VIEWABLE_TABLES.iter().find(|t| **t == table).copied() else {
            return Err(AppError::Validation(format!("unknown table: {table}")));
        };

        let (columns, rows) = self
            .conn
            .call(move |conn| {
                let mut info = conn.prepare(&format!("PRAGMA table_info({table})"))?;
                let columns = info
                    .query_map([], |row| row.get::<_, String>(1))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let mut stmt = conn.prepare(&format!(
                    "SELECT * FROM {table} ORDER BY rowid DESC LIMIT {TABLE_VIEW_LIMIT}"
                ))?;
                let width = stmt.column_count();
                let rows = stmt
                    .query_map([], |row| {
                        (0..width)
                            .map(|i| row.get_ref(i).map(render_value))
                            .collect::<rusqlite::Result<Vec<_>>>()
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok((columns, rows))
            })
            .await?;

        Ok(TableView {
            table: table.to_string(),
            columns,
            rows,
        })
    }
}

fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn timestamp_or_now(value: Option<String>) -> DateTime<Utc> {
    value
        .and_then(|s| parse_datetime(&s))
        .unwrap_or_else(Utc::now)
}

fn resource_from_row(row: &Row) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: row.get(0)?,
        title: row.get(1)?,
        link: row.get(2)?,
        tags: parse_tags(&row.get::<_, Option<String>>(3)?.unwrap_or_default()),
        created_at: timestamp_or_now(row.get(4)?),
    })
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
