pub const SCHEMA: &str = r#"
-- self-reported achievements
CREATE TABLE IF NOT EXISTS progress (
    user_id TEXT NOT NULL,
    skill TEXT NOT NULL,
    status TEXT NOT NULL,
    date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_progress_user_id ON progress(user_id);

-- one editable template per agent
CREATE TABLE IF NOT EXISTS agent_prompts (
    agent_name TEXT PRIMARY KEY,
    prompt_template TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS error_logs (
    timestamp TEXT NOT NULL,
    error_type TEXT NOT NULL,
    message TEXT NOT NULL,
    traceback TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_results (
    user_id TEXT,
    topic TEXT NOT NULL,
    score INTEGER NOT NULL,
    total INTEGER NOT NULL,
    date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_history (
    user_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_history_user_id ON chat_history(user_id);

CREATE TABLE IF NOT EXISTS test_answers (
    user_id TEXT NOT NULL,
    topic TEXT NOT NULL,
    question_index INTEGER NOT NULL,
    selected TEXT NOT NULL,
    correct INTEGER NOT NULL,
    date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_test_answers_user_id ON test_answers(user_id);

-- learning resources
CREATE TABLE IF NOT EXISTS knowledge_base (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    link TEXT NOT NULL,
    tags TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS interests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- no foreign key to interests: deleting an interest leaves plans untouched
CREATE TABLE IF NOT EXISTS weekly_plans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_email TEXT NOT NULL,
    week INTEGER NOT NULL,
    grade TEXT NOT NULL,
    interests TEXT NOT NULL,
    status TEXT NOT NULL,
    content TEXT NOT NULL,
    definitions TEXT NOT NULL,
    tags TEXT NOT NULL,
    knowledge TEXT NOT NULL,
    error TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_weekly_plans_user_email ON weekly_plans(user_email);

CREATE TABLE IF NOT EXISTS llm_dialogues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_email TEXT,
    request TEXT NOT NULL,
    response TEXT NOT NULL,
    date TEXT NOT NULL
);
"#;

/// Tables the admin console may browse.
pub const VIEWABLE_TABLES: [&str; 10] = [
    "progress",
    "agent_prompts",
    "error_logs",
    "test_results",
    "chat_history",
    "test_answers",
    "knowledge_base",
    "interests",
    "weekly_plans",
    "llm_dialogues",
];
