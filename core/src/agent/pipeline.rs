//! Analysis pipeline
//!
//! One attempt = one streaming generation call decoded into status updates
//! and a final briefing. [`Analyst::run`] wraps attempts in the retry
//! orchestrator.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::orchestrator::Orchestrator;
use super::prompt::PromptBuilder;
use crate::config::{GenerationConfig, Settings};
use crate::decoder::{decoder_for, RunContext, StreamDecoder};
use crate::error::RahyabError;
use crate::knowledge::build_context;
use crate::llm::{ChatMessage, ChunkStream, GenerationRequest, ModelTransport, StreamEvent};
use crate::protocol::{InputMode, OperationStatus, SearchLevel, StrategicBriefing};

/// Item of an analysis stream
#[derive(Debug, Clone)]
pub enum AgentUpdate {
    Status(OperationStatus),
    Briefing(StrategicBriefing),
}

pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<AgentUpdate, RahyabError>> + Send>>;

/// Sampling parameters and persona for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    pub temperature: f32,
    pub top_p: f32,
    pub system_instruction: String,
}

impl Default for ModelParameters {
    fn default() -> Self {
        let generation = GenerationConfig::default();
        Self {
            temperature: generation.temperature,
            top_p: generation.top_p,
            system_instruction: generation.system_instruction,
        }
    }
}

impl ModelParameters {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            temperature: settings.generation.temperature,
            top_p: settings.generation.top_p,
            system_instruction: settings.system_instruction(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub query: String,
    pub level: SearchLevel,
    pub mode: InputMode,
    pub knowledge_base_context: Option<String>,
    pub parameters: ModelParameters,
}

impl AnalysisRequest {
    /// Request with parameters and knowledge-base context taken from settings.
    pub fn from_settings(
        query: impl Into<String>,
        level: SearchLevel,
        mode: InputMode,
        settings: &Settings,
    ) -> Self {
        let knowledge_base_context = if settings.features.knowledge_base {
            Some(build_context(&settings.knowledge_base.sources)).filter(|c| !c.is_empty())
        } else {
            None
        };

        Self {
            query: query.into(),
            level,
            mode,
            knowledge_base_context,
            parameters: ModelParameters::from_settings(settings),
        }
    }

    pub fn run_context(&self) -> RunContext {
        RunContext::new(self.query.clone(), self.level)
    }
}

/// Decode a raw chunk stream into agent updates.
///
/// Emits one status per state change and finishes with the briefing. A
/// blocked response or a transport failure ends the stream with an error.
pub fn decode_stream(chunks: ChunkStream, mut decoder: Box<dyn StreamDecoder>) -> UpdateStream {
    Box::pin(async_stream::try_stream! {
        let mut chunks = chunks;

        while let Some(item) = chunks.next().await {
            match item.map_err(RahyabError::from)? {
                StreamEvent::Content(text) => {
                    for status in decoder.feed(&text) {
                        yield AgentUpdate::Status(status);
                    }
                }
                StreamEvent::Blocked { reason } => {
                    Err(RahyabError::StreamBlocked { reason })?;
                }
                StreamEvent::Done => break,
            }
        }

        let completion = decoder.finish()?;
        debug!("Stream decoded: {:?}", decoder.diagnostics());
        for status in completion.statuses {
            yield AgentUpdate::Status(status);
        }
        yield AgentUpdate::Briefing(completion.briefing);
    })
}

/// Runs analyses against a model transport
#[derive(Clone)]
pub struct Analyst {
    transport: Arc<dyn ModelTransport>,
    settings: Settings,
}

impl Analyst {
    pub fn new(transport: Arc<dyn ModelTransport>, settings: Settings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Generation call for one attempt of `request`.
    pub fn generation_request(&self, request: &AnalysisRequest) -> GenerationRequest {
        let prompt = PromptBuilder::new(
            self.settings.protocol,
            self.settings.features.live_search,
            self.settings.features.knowledge_base,
        )
        .build(request);

        GenerationRequest {
            contents: vec![ChatMessage::user(prompt)],
            system_instruction: Some(request.parameters.system_instruction.clone()),
            temperature: Some(request.parameters.temperature),
            top_p: Some(request.parameters.top_p),
            live_search: self.settings.features.live_search,
        }
    }

    /// A single attempt without retries or deadline. Each call starts from a
    /// fresh decoder.
    pub fn attempt(&self, request: &AnalysisRequest) -> UpdateStream {
        let chunks = self.transport.stream_generate(self.generation_request(request));
        let decoder = decoder_for(self.settings.protocol, request.run_context());
        decode_stream(chunks, decoder)
    }

    /// Full run: attempts with per-attempt deadline, retry statuses between
    /// attempts and cancellation through `cancel`.
    pub fn run(&self, request: AnalysisRequest, cancel: CancellationToken) -> UpdateStream {
        let analyst = self.clone();
        let total = self.settings.retry.total_attempts();
        Orchestrator::new(self.settings.retry.clone()).run(
            move |attempt| {
                info!(
                    "Analysis attempt {}/{} for {} query",
                    attempt + 1,
                    total,
                    request.level.as_str()
                );
                analyst.attempt(&request)
            },
            cancel,
        )
    }
}
