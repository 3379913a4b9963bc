//! Model transport
//!
//! The decoder only sees a stream of [`StreamEvent`]s; [`ModelTransport`] is
//! the seam between it and the hosted model.

pub mod client;

pub use client::GeminiClient;

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// One item of a streamed model response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental text, not aligned with any packet boundary
    Content(String),
    /// The provider refused the prompt or stopped for safety reasons
    Blocked { reason: String },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A single streaming generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub contents: Vec<ChatMessage>,
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Let the model ground its answer with web search
    pub live_search: bool,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamEvent>> + Send>>;

/// Anything that can stream a model response.
pub trait ModelTransport: Send + Sync {
    fn stream_generate(&self, request: GenerationRequest) -> ChunkStream;
}
