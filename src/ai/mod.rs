mod client;
mod prompts;
mod sections;

pub use client::{build_llm_client, DisabledClient, LlmClient, LlmRequest, LlmResponse};
pub use prompts::PromptLibrary;
pub use sections::parse_plan_sections;
