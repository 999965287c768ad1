mod admin;
mod agents;
mod error_log;
mod planner;
mod progress;
mod quiz;
mod speech;
mod validator;
mod voice;

pub use admin::AdminService;
pub use agents::{AgentService, ChatReply, ValidationReport};
pub use error_log::ErrorLogger;
pub use planner::{PlanRequest, PlanService};
pub use progress::{Activity, ProgressService};
pub use quiz::{AnswerReply, QuizService, QuizView};
pub use speech::{build_synthesizer, build_transcriber, Synthesizer, Transcriber};
pub use voice::{VoiceReply, VoiceService};
