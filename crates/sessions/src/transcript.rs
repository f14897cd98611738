//! TranscriptStore: durable append-only log of conversation records.
//!
//! Each session gets a `<sessionId>.jsonl` append log for durability; an
//! in-memory index (rebuilt from the logs at startup) serves the lookup,
//! update, archive, and delete operations the append-only file itself
//! cannot serve efficiently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use sa_domain::error::{Error, Result};
use sa_domain::model::{Role, TranscriptRecord};
use sa_domain::trace::TraceEvent;

/// A single session's grouped summary for `ListConversations`.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub session_id: String,
    pub message_count: usize,
    pub last_body: String,
    pub last_timestamp: chrono::DateTime<Utc>,
}

/// Durable, append-only transcript store.
pub struct TranscriptStore {
    base_dir: PathBuf,
    records: RwLock<HashMap<String, TranscriptRecord>>,
}

impl TranscriptStore {
    /// Build the store, replaying every `.jsonl` file under `base_dir` to
    /// rebuild the in-memory index.
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(Error::Io)?;

        let mut records = HashMap::new();
        if let Ok(entries) = std::fs::read_dir(base_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                let Ok(raw) = std::fs::read_to_string(&path) else {
                    continue;
                };
                for line in raw.lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<TranscriptRecord>(line) {
                        Ok(rec) => {
                            records.insert(rec.id.clone(), rec);
                        }
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "skipping malformed transcript line");
                        }
                    }
                }
            }
        }

        tracing::info!(records = records.len(), dir = %base_dir.display(), "transcript store loaded");

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    /// Append one record for `session_id`. `role` `user|agent|system`.
    pub fn append(
        &self,
        session_id: &str,
        user_id: Option<String>,
        role: Role,
        body: impl Into<String>,
        order_id: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<TranscriptRecord> {
        let now = Utc::now();
        let record = TranscriptRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_owned(),
            user_id,
            role,
            body: body.into(),
            order_id,
            metadata,
            created_at: now,
            updated_at: now,
            archived: false,
        };

        self.append_line(&record)?;
        self.records.write().insert(record.id.clone(), record.clone());

        TraceEvent::TranscriptAppend {
            session_id: session_id.to_owned(),
            lines: 1,
        }
        .emit();

        Ok(record)
    }

    fn append_line(&self, record: &TranscriptRecord) -> Result<()> {
        let path = self.base_dir.join(format!("{}.jsonl", record.session_id));
        let json = serde_json::to_string(record)?;
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Io)?;
        writeln!(file, "{json}").map_err(Error::Io)?;
        Ok(())
    }

    /// Fetch records for a session, newest first. Rejects cross-user reads
    /// when `requesting_user` is set and does not match the session's
    /// records (returns an empty vec rather than an error).
    pub fn get_by_session(
        &self,
        session_id: &str,
        limit: usize,
        offset: usize,
        requesting_user: Option<&str>,
    ) -> Vec<TranscriptRecord> {
        let records = self.records.read();
        let mut matched: Vec<TranscriptRecord> = records
            .values()
            .filter(|r| r.session_id == session_id && !r.archived)
            .filter(|r| match requesting_user {
                Some(uid) => r.user_id.as_deref() == Some(uid),
                None => true,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.into_iter().skip(offset).take(limit).collect()
    }

    pub fn get_by_user(&self, user_id: &str, limit: usize, offset: usize) -> Vec<TranscriptRecord> {
        let records = self.records.read();
        let mut matched: Vec<TranscriptRecord> = records
            .values()
            .filter(|r| r.user_id.as_deref() == Some(user_id) && !r.archived)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.into_iter().skip(offset).take(limit).collect()
    }

    pub fn get_by_order(&self, order_id: &str) -> Vec<TranscriptRecord> {
        let records = self.records.read();
        let mut matched: Vec<TranscriptRecord> = records
            .values()
            .filter(|r| r.order_id.as_deref() == Some(order_id))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matched
    }

    /// Update a record's body and/or metadata in the in-memory index and
    /// append a correcting line to the log (the log itself stays
    /// append-only; the in-memory index reflects the latest write).
    pub fn update(
        &self,
        record_id: &str,
        body: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<TranscriptRecord> {
        let mut records = self.records.write();
        let record = records
            .get_mut(record_id)
            .ok_or_else(|| Error::NotFound(format!("transcript record '{record_id}'")))?;
        if let Some(b) = body {
            record.body = b;
        }
        if let Some(m) = metadata {
            record.metadata = Some(m);
        }
        record.updated_at = Utc::now();
        let updated = record.clone();
        drop(records);
        self.append_line(&updated)?;
        Ok(updated)
    }

    pub fn delete(&self, record_id: &str) -> Result<()> {
        self.records
            .write()
            .remove(record_id)
            .ok_or_else(|| Error::NotFound(format!("transcript record '{record_id}'")))?;
        Ok(())
    }

    pub fn archive(&self, record_id: &str) -> Result<TranscriptRecord> {
        let mut records = self.records.write();
        let record = records
            .get_mut(record_id)
            .ok_or_else(|| Error::NotFound(format!("transcript record '{record_id}'")))?;
        record.archived = true;
        record.updated_at = Utc::now();
        let updated = record.clone();
        drop(records);
        self.append_line(&updated)?;
        Ok(updated)
    }

    /// Group records by session for `user_id`, sorted by last activity
    /// descending, with `last_body` truncated to 100 characters.
    pub fn list_conversations(&self, user_id: &str, limit: usize) -> Vec<ConversationSummary> {
        let records = self.records.read();
        let mut by_session: HashMap<String, Vec<&TranscriptRecord>> = HashMap::new();
        for r in records.values() {
            if r.user_id.as_deref() == Some(user_id) && !r.archived {
                by_session.entry(r.session_id.clone()).or_default().push(r);
            }
        }

        let mut summaries: Vec<ConversationSummary> = by_session
            .into_iter()
            .filter_map(|(session_id, mut recs)| {
                recs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let last = recs.first()?;
                Some(ConversationSummary {
                    session_id,
                    message_count: recs.len(),
                    last_body: truncate(&last.body, 100),
                    last_timestamp: last.created_at,
                })
            })
            .collect();

        summaries.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
        summaries.truncate(limit);
        summaries
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    s[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (TranscriptStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn append_and_get_by_session() {
        let (store, _dir) = store();
        store
            .append("s1", Some("u1".into()), Role::User, "hola", None, None)
            .unwrap();
        store
            .append("s1", Some("u1".into()), Role::Agent, "buenas", None, None)
            .unwrap();

        let recs = store.get_by_session("s1", 10, 0, None);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].body, "buenas");
    }

    #[test]
    fn cross_user_read_rejected() {
        let (store, _dir) = store();
        store
            .append("s1", Some("u1".into()), Role::User, "hola", None, None)
            .unwrap();

        let recs = store.get_by_session("s1", 10, 0, Some("u2"));
        assert!(recs.is_empty());
    }

    #[test]
    fn archive_hides_from_session_reads() {
        let (store, _dir) = store();
        let rec = store
            .append("s1", Some("u1".into()), Role::User, "hola", None, None)
            .unwrap();
        store.archive(&rec.id).unwrap();

        let recs = store.get_by_session("s1", 10, 0, None);
        assert!(recs.is_empty());
    }

    #[test]
    fn list_conversations_truncates_last_body() {
        let (store, _dir) = store();
        let long = "x".repeat(200);
        store
            .append("s1", Some("u1".into()), Role::User, long, None, None)
            .unwrap();

        let convs = store.list_conversations("u1", 10);
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].last_body.len(), 100);
    }

    #[test]
    fn survives_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TranscriptStore::new(dir.path()).unwrap();
            store
                .append("s1", Some("u1".into()), Role::User, "hola", None, None)
                .unwrap();
        }
        let reloaded = TranscriptStore::new(dir.path()).unwrap();
        let recs = reloaded.get_by_session("s1", 10, 0, None);
        assert_eq!(recs.len(), 1);
    }
}
