//! Extraction of labeled sections from free-text model output.
//!
//! Grammar, line oriented:
//!
//! ```text
//! header  := ws* '#'* ws* "**" label rest
//! section := header line*        (up to the next header or end of text)
//! ```
//!
//! Text after the closing `**` on a header line belongs to that section.

use crate::models::PlanSections;

pub const DEFINITIONS_LABEL: &str = "Определения";
pub const TAGS_LABEL: &str = "Теги";
pub const KNOWLEDGE_LABEL: &str = "Знания";

/// Body of the first section whose header starts with `label` (case-insensitive),
/// trimmed. Empty when no such header exists.
pub fn extract_section(text: &str, label: &str) -> String {
    let label = label.to_lowercase();
    let mut body: Option<Vec<&str>> = None;

    for line in text.lines() {
        if let Some(header) = header_text(line) {
            if body.is_some() {
                break;
            }
            if header.to_lowercase().starts_with(&label) {
                let inline = inline_body(header);
                body = Some(if inline.is_empty() { Vec::new() } else { vec![inline] });
            }
            continue;
        }
        if let Some(lines) = body.as_mut() {
            lines.push(line);
        }
    }

    body.map(|lines| lines.join("\n").trim().to_string())
        .unwrap_or_default()
}

pub fn parse_plan_sections(text: &str) -> PlanSections {
    PlanSections {
        definitions: extract_section(text, DEFINITIONS_LABEL),
        tags: extract_section(text, TAGS_LABEL),
        knowledge: extract_section(text, KNOWLEDGE_LABEL),
    }
}

fn header_text(line: &str) -> Option<&str> {
    line.trim_start()
        .trim_start_matches('#')
        .trim_start()
        .strip_prefix("**")
}

fn inline_body(header: &str) -> &str {
    match header.find("**") {
        Some(end) => header[end + 2..].trim_start_matches(':').trim(),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "Вступление недели.\n\
**Определения:**\n\
- JOIN: соединение таблиц\n\
- Индекс: структура для поиска\n\
\n\
**Теги**: sql, join\n\
### **Знания**\n\
Научиться писать запросы с JOIN.\n";

    #[test]
    fn extracts_all_three_sections() {
        let sections = parse_plan_sections(RESPONSE);
        assert_eq!(
            sections.definitions,
            "- JOIN: соединение таблиц\n- Индекс: структура для поиска"
        );
        assert_eq!(sections.tags, "sql, join");
        assert_eq!(sections.knowledge, "Научиться писать запросы с JOIN.");
    }

    #[test]
    fn missing_section_is_empty() {
        let sections = parse_plan_sections("**Определения**\nтолько определения");
        assert_eq!(sections.definitions, "только определения");
        assert_eq!(sections.tags, "");
        assert_eq!(sections.knowledge, "");
    }

    #[test]
    fn arbitrary_text_never_panics() {
        for text in ["", "**", "****", "**Теги", "\n\n**Знания**:", "⚠️ ошибка"] {
            let _ = parse_plan_sections(text);
        }
        assert_eq!(extract_section("**Знания**:", KNOWLEDGE_LABEL), "");
    }

    #[test]
    fn label_match_ignores_case() {
        assert_eq!(extract_section("**ТЕГИ** bpmn", TAGS_LABEL), "bpmn");
    }

    #[test]
    fn section_ends_at_next_bold_header() {
        let text = "**Теги**\nsql\n**Другое**\nне относится";
        assert_eq!(extract_section(text, TAGS_LABEL), "sql");
    }
}
