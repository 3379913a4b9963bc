//! Knowledge-base sources and the prompt context built from them

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    GithubRepository,
    Website,
}

impl SourceType {
    pub fn from_url(url: &str) -> Self {
        if url.contains("github.com") {
            SourceType::GithubRepository
        } else {
            SourceType::Website
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::GithubRepository => write!(f, "GITHUB_REPOSITORY"),
            SourceType::Website => write!(f, "WEBSITE"),
        }
    }
}

/// Indexing state of a source. Only `indexed` sources reach the prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    #[default]
    Indexed,
    Indexing,
    Error,
    Queued,
    Syncing,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct KnowledgeBaseSource {
    pub url: String,
    /// Display name; derived from the URL when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Derived from the URL when absent
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SourceType>,
    #[serde(default)]
    pub status: IndexStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_indexed: Option<String>,
}

impl KnowledgeBaseSource {
    /// New indexed source for a cleaned-up URL.
    pub fn new(url: &str) -> Self {
        Self {
            url: clean_url(url),
            name: None,
            kind: None,
            status: IndexStatus::Indexed,
            last_indexed: None,
        }
    }

    pub fn source_type(&self) -> SourceType {
        self.kind.unwrap_or_else(|| SourceType::from_url(&self.url))
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => extract_source_name(&self.url, self.source_type()),
        }
    }
}

/// Reduce a URL to the resource worth indexing.
///
/// GitHub links are cut to `owner/repo`, GitHub Pages links to their first
/// path segment. Other URLs are returned unchanged.
pub fn clean_url(url: &str) -> String {
    let trimmed = url.trim();
    let Ok(parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    let host = parsed.host_str().unwrap_or_default();
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if host == "github.com" && segments.len() >= 2 {
        return format!("https://github.com/{}/{}", segments[0], segments[1]);
    }
    if host.ends_with("github.io") {
        let origin = parsed.origin().ascii_serialization();
        return match segments.first() {
            Some(first) => format!("{}/{}", origin, first),
            None => origin,
        };
    }
    trimmed.to_string()
}

/// Short human name for a source: `owner/repo` for GitHub, the host otherwise.
pub fn extract_source_name(url: &str, kind: SourceType) -> String {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return url.to_string();
    };

    match kind {
        SourceType::GithubRepository => {
            let segments: Vec<&str> = parsed
                .path_segments()
                .map(|s| s.filter(|p| !p.is_empty()).collect())
                .unwrap_or_default();
            match segments.as_slice() {
                [owner, repo, ..] => format!("{}/{}", owner, repo),
                [single] => single.to_string(),
                [] => "repository".to_string(),
            }
        }
        SourceType::Website => parsed.host_str().unwrap_or(url).to_string(),
    }
}

/// Prompt context listing every indexed source. Empty when none are indexed.
pub fn build_context(sources: &[KnowledgeBaseSource]) -> String {
    let entries: Vec<String> = sources
        .iter()
        .filter(|s| s.status == IndexStatus::Indexed)
        .map(|s| {
            format!(
                "- Source: {} ({})\n  URL: {}",
                s.display_name(),
                s.source_type(),
                s.url
            )
        })
        .collect();

    if entries.is_empty() {
        return String::new();
    }
    format!(
        "The following information sources have been indexed and are available for your analysis. \
Prioritize these sources in your reasoning:\n{}",
        entries.join("\n")
    )
}
