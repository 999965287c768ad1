use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Sql,
    Bpmn,
    Unknown,
}

/// Result of the structural SQL check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlCheck {
    Valid { uses_join: bool },
    Invalid(String),
}

const SQL_KEYWORDS: [&str; 8] = [
    "select", "with", "insert", "update", "delete", "create", "alter", "drop",
];

fn extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

pub fn classify(filename: &str, content: &str) -> ArtifactKind {
    let ext = extension(filename);
    if matches!(ext.as_str(), "sql" | "txt") && (content.contains("SELECT") || content.contains("select")) {
        return ArtifactKind::Sql;
    }
    if matches!(ext.as_str(), "bpmn" | "xml" | "txt")
        && (content.contains("Actor")
            || content.contains("Flow")
            || content.to_lowercase().contains("process"))
    {
        return ArtifactKind::Bpmn;
    }
    ArtifactKind::Unknown
}

/// Checks that quotes and parentheses balance and that every statement
/// starts with a recognised keyword. Line comments are ignored.
pub fn check_sql(content: &str) -> SqlCheck {
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut statements: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if let Some(q) = quote {
                current.push(c);
                if c == q {
                    // doubled quote is an escape
                    if chars.peek() == Some(&q) {
                        current.push(q);
                        chars.next();
                    } else {
                        quote = None;
                    }
                }
                continue;
            }
            match c {
                '-' if chars.peek() == Some(&'-') => break,
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return SqlCheck::Invalid("лишняя закрывающая скобка".to_string());
                    }
                    current.push(c);
                }
                ';' => statements.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        current.push('\n');
    }

    if quote.is_some() {
        return SqlCheck::Invalid("незакрытая кавычка".to_string());
    }
    if depth != 0 {
        return SqlCheck::Invalid("несбалансированные скобки".to_string());
    }
    statements.push(current);

    let statements: Vec<&str> = statements
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if statements.is_empty() {
        return SqlCheck::Invalid("пустой запрос".to_string());
    }

    for statement in &statements {
        let first = statement
            .trim_start_matches(|c: char| c == '(' || c.is_whitespace())
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if !SQL_KEYWORDS.contains(&first.as_str()) {
            return SqlCheck::Invalid(format!("неизвестная команда: {first}"));
        }
    }

    SqlCheck::Valid {
        uses_join: content.to_lowercase().contains("join"),
    }
}

pub fn verdict(kind: ArtifactKind, content: &str) -> String {
    match kind {
        ArtifactKind::Sql => match check_sql(content) {
            SqlCheck::Valid { uses_join: true } => {
                "✅ Синтаксис SQL корректен. Использован JOIN, проверьте типы.".to_string()
            }
            SqlCheck::Valid { uses_join: false } => {
                "✅ Синтаксис SQL корректен. Рекомендуется добавить условия WHERE и индексы."
                    .to_string()
            }
            SqlCheck::Invalid(reason) => format!("❌ Некорректный SQL-запрос: {reason}."),
        },
        ArtifactKind::Bpmn => {
            "✅ BPMN-диаграмма описана верно. Добавьте обработку ошибок и альтернативные потоки."
                .to_string()
        }
        ArtifactKind::Unknown => "❌ Формат не распознан. Загрузите SQL-запрос (.sql), BPMN-схему (.bpmn) или текстовое описание.".to_string(),
    }
}
