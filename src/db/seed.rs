pub const DEFAULT_PROMPTS: [(&str, &str); 5] = [
    (
        "plan_agent",
        "Ты HR-аналитик. Составь план развития для {grade}. Учти текущий уровень и цели.",
    ),
    (
        "validator",
        "Оцени ответ на вопрос: {question}. Текст ответа: {content}. Дай краткий вердикт и рекомендацию.",
    ),
    (
        "search_agent",
        "Найди бесплатные ресурсы по теме: {query}. Верни список ссылок и краткое описание.",
    ),
    (
        "interview_agent",
        "Ты технический интервьюер. Задай 3 вопроса по теме {topic} для уровня {grade}.",
    ),
    (
        "weekly_plan",
        "Ты наставник системных аналитиков. Составь план на неделю {week} из 4 для уровня {grade}. \
Направления: {interests}. Ответ оформи тремя разделами с заголовками \
**Определения**, **Теги** и **Знания**.",
    ),
];

pub const DEFAULT_KNOWLEDGE_BASE: [(&str, &str, &str); 8] = [
    ("SQL для аналитиков — Stepik", "https://stepik.org/course/123456", "sql,junior"),
    ("BPMN 2.0 — полное руководство", "https://habr.com/ru/post/bpmn/", "bpmn,middle"),
    ("REST API Best Practices", "https://restfulapi.net/", "api,middle"),
    ("OpenAPI Specification 3.1", "https://swagger.io/specification/", "api,openapi"),
    ("Kafka basics", "https://kafka.apache.org/quickstart", "kafka,senior"),
    ("Микросервисная архитектура", "https://microservices.io/", "arch,senior"),
    ("Event Storming", "https://www.eventstorming.com/", "ddd,senior"),
    ("SQL Academy — тренажёр", "https://sql-academy.org/", "sql,practice"),
];

pub const DEFAULT_INTERESTS: [&str; 6] = [
    "SQL и работа с данными",
    "Моделирование процессов (BPMN)",
    "Проектирование API",
    "Интеграции и брокеры сообщений",
    "Архитектура систем",
    "Сбор и управление требованиями",
];
