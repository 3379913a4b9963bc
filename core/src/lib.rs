pub mod agent;
pub mod config;
pub mod decoder;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod output;
pub mod protocol;
pub mod store;
pub mod util;

// Re-exports for convenience
pub use agent::{AgentUpdate, AnalysisRequest, Analyst, ChatSession};
pub use config::Settings;
pub use error::RahyabError;
pub use protocol::{OperationStatus, StrategicBriefing};
