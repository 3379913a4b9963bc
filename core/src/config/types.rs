//! Configuration section types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::knowledge::KnowledgeBaseSource;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are 'Rah-Yab', a strategic AI protocol for deep analysis and engineering anti-fragile solutions. \
Your primary mission is to transform complex queries into actionable, comprehensive strategic reports. \
You operate with a mission-critical mindset, performing every analysis with the highest level of precision, atomicity, and self-criticism.

Fundamental principles:

1. Absolute factualism and evidence citation. Never fabricate information. All claims, analyses, and findings must be \
traceable to evidence in the knowledge base or live web search results. If information is unavailable, state it explicitly.

2. Adversarial mindset and ruthless self-critique. In each reasoning cycle, actively seek to disprove, challenge, and \
break your initial solutions. The goal is an answer that withstands the harshest scrutiny.

3. Source prioritization. The knowledge base is your primary source. Only if its information is insufficient, use live web search.

4. Synthesis. After reporting found sources you must synthesize them: reference them explicitly, combine key insights, \
identify conflicting information, and derive conclusions from the evidence. Simply listing sources is a protocol violation.

5. Formatting. Code snippets, configuration files and command-line instructions must be enclosed in Markdown code blocks.";

/// Endpoint configuration for the hosted model
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EndpointConfig {
    /// Model identifier, e.g. "gemini-2.5-flash"
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the Generative Language API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Usually supplied through RAHYAB_API_KEY instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

/// Sampling and persona settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    /// Language every answer must be written in
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            system_instruction: default_system_instruction(),
            language: default_language(),
        }
    }
}

fn default_temperature() -> f32 {
    0.4
}

fn default_top_p() -> f32 {
    0.95
}

fn default_system_instruction() -> String {
    DEFAULT_SYSTEM_INSTRUCTION.to_string()
}

fn default_language() -> String {
    "Persian".to_string()
}

/// Feature toggles
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FeaturesConfig {
    /// Ground answers with Google Search
    #[serde(default = "default_true")]
    pub live_search: bool,

    /// Include the indexed knowledge-base sources in the prompt
    #[serde(default = "default_true")]
    pub knowledge_base: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            live_search: true,
            knowledge_base: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Retry and deadline settings for one analysis run
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RetryConfig {
    /// Attempts after the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Deadline for a single attempt, in seconds
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Pause between attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_attempt_timeout_secs() -> u64 {
    480
}

fn default_retry_delay_ms() -> u64 {
    2000
}

/// Output format the model is instructed to stream
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WireProtocol {
    /// Delimited JSON event packets
    #[default]
    Events,
    /// `<thinking>` block with inline tags, followed by a bare JSON report
    LegacyTags,
}

impl FromStr for WireProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "events" | "event" | "json_events" => Ok(WireProtocol::Events),
            "legacy_tags" | "legacy" | "tags" => Ok(WireProtocol::LegacyTags),
            _ => Err(format!("Unknown wire protocol: {}", s)),
        }
    }
}

impl fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireProtocol::Events => write!(f, "events"),
            WireProtocol::LegacyTags => write!(f, "legacy_tags"),
        }
    }
}

/// Sources indexed into the knowledge base
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct KnowledgeBaseConfig {
    #[serde(default)]
    pub sources: Vec<KnowledgeBaseSource>,
}
