mod interest;
mod plan;
mod progress;
mod prompt;
mod quiz;
mod records;
mod resource;

pub use interest::Interest;
pub use plan::{NewWeeklyPlan, PlanSections, PlanStatus, WeeklyPlan};
pub use progress::{ProgressRecord, ProgressStatus};
pub use prompt::PromptTemplate;
pub use quiz::{TestAnswer, TestResult};
pub use records::{ChatTurn, ErrorLogEntry, LlmDialogue, TableView};
pub use resource::{parse_tags, NewResource, Resource};
