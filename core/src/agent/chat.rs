//! Follow-up chat about a finished briefing

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

use super::pipeline::ModelParameters;
use crate::error::RahyabError;
use crate::llm::{ChatMessage, GenerationRequest, ModelTransport, StreamEvent};
use crate::protocol::StrategicBriefing;

/// Cumulative reply text; every item contains the whole reply so far.
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String, RahyabError>> + Send>>;

pub struct ChatSession {
    transport: Arc<dyn ModelTransport>,
    parameters: ModelParameters,
    history: Arc<Mutex<Vec<ChatMessage>>>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ModelTransport>, parameters: ModelParameters) -> Self {
        Self {
            transport,
            parameters,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Session whose history opens with the original query and a model turn
    /// carrying the executive summary.
    pub fn for_briefing(
        transport: Arc<dyn ModelTransport>,
        parameters: ModelParameters,
        briefing: &StrategicBriefing,
    ) -> Self {
        let session = Self::new(transport, parameters);
        {
            let mut history = session.history.lock();
            history.push(ChatMessage::user(briefing.query.clone()));
            history.push(ChatMessage::model(summary_message(briefing)));
        }
        session
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().clone()
    }

    /// Send a follow-up message.
    ///
    /// The reply is added to the history once the stream completes. If the
    /// reply fails, the message is taken back out of the history.
    pub fn send(&self, message: &str) -> ReplyStream {
        let contents = {
            let mut history = self.history.lock();
            history.push(ChatMessage::user(message));
            history.clone()
        };
        let pending_len = contents.len();

        let request = GenerationRequest {
            contents,
            system_instruction: Some(self.parameters.system_instruction.clone()),
            temperature: Some(self.parameters.temperature),
            top_p: Some(self.parameters.top_p),
            live_search: false,
        };
        let mut chunks = self.transport.stream_generate(request);
        let history = self.history.clone();

        Box::pin(async_stream::try_stream! {
            let mut reply = String::new();
            let outcome: Result<(), RahyabError> = loop {
                match chunks.next().await {
                    Some(Ok(StreamEvent::Content(text))) => {
                        reply.push_str(&text);
                        yield reply.clone();
                    }
                    Some(Ok(StreamEvent::Blocked { reason })) => {
                        break Err(RahyabError::StreamBlocked { reason });
                    }
                    Some(Ok(StreamEvent::Done)) | None => break Ok(()),
                    Some(Err(e)) => break Err(RahyabError::from(e)),
                }
            };

            match outcome {
                Ok(()) => history.lock().push(ChatMessage::model(reply)),
                Err(e) => {
                    warn!("Follow-up message failed: {}", e);
                    history.lock().truncate(pending_len - 1);
                    Err(e)?;
                }
            }
        })
    }
}

fn summary_message(briefing: &StrategicBriefing) -> String {
    format!(
        "The strategic analysis for your query is complete.\n\n**Executive summary:**\n{}\n\nYou can now ask follow-up questions.",
        briefing.executive_summary
    )
}
