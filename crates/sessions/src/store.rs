//! Session store: fast K/V persistence of conversation state with TTL.
//!
//! Persists `sessions.json` and `script_sessions.json` under the configured
//! state path. A read that finds an expired or corrupt entry is treated as
//! a miss, consistent with the "no panics on backend trouble" contract.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};
use sa_domain::model::{ScriptSession, Session};
use sa_domain::trace::TraceEvent;

const DEFAULT_TTL_SECONDS: i64 = 1800;

/// Wraps a stored value with the timestamp it must expire at.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TtlEntry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fast K/V store for [`Session`] and [`ScriptSession`] state, each under a
/// disjoint key namespace (`session:{id}` / `guion_session:{id}`), backed
/// by a JSON file for durability across restarts.
pub struct SessionStore {
    sessions_path: PathBuf,
    script_sessions_path: PathBuf,
    default_ttl: chrono::Duration,
    sessions: RwLock<HashMap<String, TtlEntry<Session>>>,
    script_sessions: RwLock<HashMap<String, TtlEntry<ScriptSession>>>,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions/*.json`.
    pub fn new(state_path: &Path, ttl_seconds: i64) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let sessions_path = dir.join("sessions.json");
        let script_sessions_path = dir.join("script_sessions.json");

        let sessions = load_json(&sessions_path);
        let script_sessions = load_json(&script_sessions_path);

        tracing::info!(
            sessions = sessions.len(),
            script_sessions = script_sessions.len(),
            path = %dir.display(),
            "session store loaded"
        );

        Ok(Self {
            sessions_path,
            script_sessions_path,
            default_ttl: chrono::Duration::seconds(if ttl_seconds > 0 {
                ttl_seconds
            } else {
                DEFAULT_TTL_SECONDS
            }),
            sessions: RwLock::new(sessions),
            script_sessions: RwLock::new(script_sessions),
        })
    }

    // ── Session (chat) ──────────────────────────────────────────────

    pub fn get(&self, session_id: &str) -> Option<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        match sessions.get(session_id) {
            Some(entry) if !is_expired(entry.expires_at, now) => Some(entry.value.clone()),
            Some(_) => {
                sessions.remove(session_id);
                None
            }
            None => None,
        }
    }

    /// Save a session, resetting its TTL (default unless overridden).
    pub fn save(&self, session: Session, ttl: Option<chrono::Duration>) -> Result<()> {
        let expires_at = Utc::now() + ttl.unwrap_or(self.default_ttl);
        let session_id = session.session_id.clone();
        self.sessions.write().insert(
            session_id,
            TtlEntry {
                value: session,
                expires_at,
            },
        );
        self.flush_sessions()
    }

    pub fn extend_ttl(&self, session_id: &str, ttl: Option<chrono::Duration>) -> Result<()> {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.expires_at = Utc::now() + ttl.unwrap_or(self.default_ttl);
        }
        drop(sessions);
        self.flush_sessions()
    }

    pub fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.write().remove(session_id);
        self.flush_sessions()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Resolve or create a session for the given id.
    pub fn resolve_or_create(&self, session_id: &str) -> (Session, bool) {
        if let Some(existing) = self.get(session_id) {
            return (existing, false);
        }

        let session = Session::new(session_id);
        TraceEvent::SessionResolved {
            session_key: session_id.to_owned(),
            session_id: session_id.to_owned(),
            is_new: true,
        }
        .emit();

        (session, true)
    }

    // ── ScriptSession ───────────────────────────────────────────────

    pub fn get_script(&self, session_id: &str) -> Option<ScriptSession> {
        let now = Utc::now();
        let mut sessions = self.script_sessions.write();
        match sessions.get(session_id) {
            Some(entry) if !is_expired(entry.expires_at, now) => Some(entry.value.clone()),
            Some(_) => {
                sessions.remove(session_id);
                None
            }
            None => None,
        }
    }

    pub fn save_script(&self, session: ScriptSession, ttl: Option<chrono::Duration>) -> Result<()> {
        let expires_at = Utc::now() + ttl.unwrap_or(self.default_ttl);
        let session_id = session.session_id.clone();
        self.script_sessions.write().insert(
            session_id,
            TtlEntry {
                value: session,
                expires_at,
            },
        );
        self.flush_script_sessions()
    }

    pub fn delete_script(&self, session_id: &str) -> Result<()> {
        self.script_sessions.write().remove(session_id);
        self.flush_script_sessions()
    }

    // ── Health ──────────────────────────────────────────────────────

    /// Verify the store can read/write its backing files.
    pub fn health_check(&self) -> Result<()> {
        self.flush_sessions()?;
        self.flush_script_sessions()
    }

    fn flush_sessions(&self) -> Result<()> {
        let sessions = self.sessions.read();
        write_json(&self.sessions_path, &*sessions)
    }

    fn flush_script_sessions(&self) -> Result<()> {
        let sessions = self.script_sessions.read();
        write_json(&self.script_sessions_path, &*sessions)
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> HashMap<String, T> {
    if !path.exists() {
        return HashMap::new();
    }
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read session store file, starting empty");
            HashMap::new()
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Other(format!("serializing session store: {e}")))?;
    std::fs::write(path, json).map_err(Error::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_store(ttl_seconds: i64) -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), ttl_seconds).unwrap();
        (store, dir)
    }

    #[test]
    fn resolve_or_create_is_new_then_found() {
        let (store, _dir) = tmp_store(1800);
        let (session, is_new) = store.resolve_or_create("s1");
        assert!(is_new);
        store.save(session, None).unwrap();

        let found = store.get("s1");
        assert!(found.is_some());
    }

    #[test]
    fn expired_session_is_treated_as_miss() {
        let (store, _dir) = tmp_store(1800);
        let session = Session::new("s1");
        store
            .save(session, Some(chrono::Duration::milliseconds(1)))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(store.get("s1").is_none());
    }

    #[test]
    fn save_resets_ttl() {
        let (store, _dir) = tmp_store(1800);
        let session = Session::new("s1");
        store.save(session.clone(), None).unwrap();
        store.extend_ttl("s1", None).unwrap();
        assert!(store.get("s1").is_some());
    }

    #[test]
    fn script_session_disjoint_from_chat_session() {
        let (store, _dir) = tmp_store(1800);
        let session = Session::new("s1");
        store.save(session, None).unwrap();

        assert!(store.get_script("s1").is_none());
    }
}
