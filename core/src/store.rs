//! Key-value persistence for briefing history and source feedback
//!
//! Values are JSON documents stored under string keys. [`FileStore`] keeps
//! them in a single JSON object file under the user data directory;
//! [`MemoryStore`] is the in-process variant.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::protocol::{SourceFeedback, StrategicBriefing};

pub const HISTORY_KEY: &str = "rah-yab-history";
pub const FEEDBACK_KEY: &str = "rah-yab-source-feedback";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not find data directory")]
    NoDataDir,
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// JSON object file, rewritten on every change
pub struct FileStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
}

impl FileStore {
    /// `<data dir>/rahyab/store.json`
    pub fn open_default() -> Result<Self, StoreError> {
        let path = dirs::data_dir()
            .ok_or(StoreError::NoDataDir)?
            .join("rahyab")
            .join("store.json");
        Self::open(path)
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        next.insert(key.to_string(), value);
        self.persist(&next)?;
        *data = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        if !data.contains_key(key) {
            return Ok(());
        }
        let mut next = data.clone();
        next.remove(key);
        self.persist(&next)?;
        *data = next;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.data.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.data.lock().remove(key);
        Ok(())
    }
}

/// Read a typed value. A value that no longer matches the type is reported
/// and treated as absent.
fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StoreError> {
    match store.get(key)? {
        Some(value) => match serde_json::from_value(value) {
            Ok(typed) => Ok(Some(typed)),
            Err(e) => {
                warn!("Ignoring unreadable value under {}: {}", key, e);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

fn store_value<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError> {
    store.set(key, serde_json::to_value(value)?)
}

/// Saved briefings, newest first
pub struct BriefingHistory<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> BriefingHistory<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<StrategicBriefing>, StoreError> {
        Ok(load(self.store, HISTORY_KEY)?.unwrap_or_default())
    }

    pub fn find(&self, id: &str) -> Result<Option<StrategicBriefing>, StoreError> {
        Ok(self.list()?.into_iter().find(|b| b.id == id))
    }

    /// Prepend a briefing. Returns `false` if one with the same id is
    /// already saved.
    pub fn save(&self, briefing: &StrategicBriefing) -> Result<bool, StoreError> {
        let mut briefings = self.list()?;
        if briefings.iter().any(|b| b.id == briefing.id) {
            return Ok(false);
        }
        briefings.insert(0, briefing.clone());
        store_value(self.store, HISTORY_KEY, &briefings)?;
        Ok(true)
    }

    /// Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut briefings = self.list()?;
        let before = briefings.len();
        briefings.retain(|b| b.id != id);
        if briefings.len() == before {
            return Ok(false);
        }
        store_value(self.store, HISTORY_KEY, &briefings)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        store_value(self.store, HISTORY_KEY, &Vec::<StrategicBriefing>::new())
    }
}

/// Per-URL source feedback
pub struct FeedbackBook<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> FeedbackBook<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    pub fn all(&self) -> Result<IndexMap<String, SourceFeedback>, StoreError> {
        Ok(load(self.store, FEEDBACK_KEY)?.unwrap_or_default())
    }

    /// Record `feedback` for `url`, or clear it when the same verdict is
    /// given twice. Returns the verdict now in effect.
    pub fn toggle(&self, url: &str, feedback: SourceFeedback) -> Result<Option<SourceFeedback>, StoreError> {
        let mut all = self.all()?;
        let current = if all.get(url) == Some(&feedback) {
            all.shift_remove(url);
            None
        } else {
            all.insert(url.to_string(), feedback);
            Some(feedback)
        };
        store_value(self.store, FEEDBACK_KEY, &all)?;
        Ok(current)
    }

    /// Overlay stored feedback onto the briefing's sources.
    pub fn apply(&self, briefing: &mut StrategicBriefing) -> Result<(), StoreError> {
        apply_feedback(briefing, &self.all()?);
        Ok(())
    }
}

/// Stored feedback wins over feedback carried by the briefing itself.
pub fn apply_feedback(briefing: &mut StrategicBriefing, feedback: &IndexMap<String, SourceFeedback>) {
    for source in &mut briefing.evidence_dossier.sources {
        if let Some(verdict) = feedback.get(&source.url) {
            source.feedback = Some(*verdict);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SearchLevel;
    use serde_json::json;

    fn briefing(summary: &str) -> StrategicBriefing {
        StrategicBriefing::from_model_value(
            json!({
                "executiveSummary": summary,
                "evidenceDossier": {
                    "title": "Evidence",
                    "sources": [
                        { "url": "https://a.example", "title": "A", "summary": "", "relevanceScore": 7 },
                        { "url": "https://b.example", "title": "B", "summary": "", "relevanceScore": 5, "feedback": "useful" }
                    ]
                }
            }),
            "q",
            SearchLevel::Level2,
            "briefing",
        )
        .unwrap()
    }

    #[test]
    fn test_history_save_prepends_without_duplicates() {
        let store = MemoryStore::new();
        let history = BriefingHistory::new(&store);
        let first = briefing("first");
        let second = briefing("second");

        assert!(history.save(&first).unwrap());
        assert!(history.save(&second).unwrap());
        assert!(!history.save(&first).unwrap());

        let list = history.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].executive_summary, "second");
        assert_eq!(list[1].executive_summary, "first");
        assert_eq!(history.find(&first.id).unwrap().unwrap().executive_summary, "first");
    }

    #[test]
    fn test_history_delete_and_clear() {
        let store = MemoryStore::new();
        let history = BriefingHistory::new(&store);
        let kept = briefing("kept");
        let dropped = briefing("dropped");
        history.save(&kept).unwrap();
        history.save(&dropped).unwrap();

        assert!(history.delete(&dropped.id).unwrap());
        assert!(!history.delete("missing").unwrap());
        assert_eq!(history.list().unwrap().len(), 1);

        history.clear().unwrap();
        assert!(history.list().unwrap().is_empty());
        assert!(history.find(&kept.id).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_history_reads_as_empty() {
        let store = MemoryStore::new();
        store.set(HISTORY_KEY, json!({ "not": "a list" })).unwrap();
        assert!(BriefingHistory::new(&store).list().unwrap().is_empty());
    }

    #[test]
    fn test_feedback_toggle() {
        let store = MemoryStore::new();
        let book = FeedbackBook::new(&store);

        assert_eq!(
            book.toggle("https://a.example", SourceFeedback::Useful).unwrap(),
            Some(SourceFeedback::Useful)
        );
        assert_eq!(
            book.toggle("https://a.example", SourceFeedback::NotUseful).unwrap(),
            Some(SourceFeedback::NotUseful)
        );
        assert_eq!(book.toggle("https://a.example", SourceFeedback::NotUseful).unwrap(), None);
        assert!(book.all().unwrap().is_empty());
    }

    #[test]
    fn test_feedback_overlay() {
        let store = MemoryStore::new();
        let book = FeedbackBook::new(&store);
        book.toggle("https://a.example", SourceFeedback::NotUseful).unwrap();

        let mut b = briefing("x");
        book.apply(&mut b).unwrap();
        let sources = &b.evidence_dossier.sources;
        assert_eq!(sources[0].feedback, Some(SourceFeedback::NotUseful));
        assert_eq!(sources[1].feedback, Some(SourceFeedback::Useful));
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("store.json");

        {
            let store = FileStore::open(&path).unwrap();
            BriefingHistory::new(&store).save(&briefing("persisted")).unwrap();
            FeedbackBook::new(&store)
                .toggle("https://b.example", SourceFeedback::NotUseful)
                .unwrap();
        }

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get(HISTORY_KEY).is_some());
        assert_eq!(raw[FEEDBACK_KEY]["https://b.example"], "not_useful");

        let store = FileStore::open(&path).unwrap();
        let list = BriefingHistory::new(&store).list().unwrap();
        assert_eq!(list[0].executive_summary, "persisted");

        store.remove(HISTORY_KEY).unwrap();
        let reopened = FileStore::open(&path).unwrap();
        assert!(reopened.get(HISTORY_KEY).unwrap().is_none());
    }

    #[test]
    fn test_file_store_failed_write_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let store = FileStore::open(blocker.join("store.json")).unwrap();
        assert!(store.set(HISTORY_KEY, Value::Array(Vec::new())).is_err());
        assert!(store.get(HISTORY_KEY).unwrap().is_none());
        assert!(store.remove(HISTORY_KEY).is_ok());
    }

    #[test]
    fn test_file_store_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "  \n").unwrap();
        let store = FileStore::open(&path).unwrap();
        assert!(store.get(FEEDBACK_KEY).unwrap().is_none());
    }
}
