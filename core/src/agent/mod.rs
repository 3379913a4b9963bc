//! Analysis agent
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ORCHESTRATOR     Retry loop (async)                        │
//! │  - Per-attempt deadline, cancellation, RETRYING statuses    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PIPELINE         One attempt                               │
//! │  - Analyst: prompt -> transport stream -> decoder           │
//! │  - AgentUpdate: Status | Briefing                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DECODER          Pure state machine (no async/IO)          │
//! │  - framer -> sanitizer -> interpreter -> assembler          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`ChatSession`] continues the conversation once a briefing exists.

pub mod chat;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;

pub use chat::{ChatSession, ReplyStream};
pub use orchestrator::Orchestrator;
pub use pipeline::{decode_stream, AgentUpdate, AnalysisRequest, Analyst, ModelParameters, UpdateStream};
pub use prompt::PromptBuilder;
