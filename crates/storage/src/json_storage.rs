//! JSON-lines session log.
//!
//! Stores one `<session>.jsonl` file per session under `sessions/`. Files are
//! only ever opened in append mode. Appends to one session are serialized by
//! that session's lock; sessions never wait on each other's file I/O.

use super::trait_::check_sequence;
use super::{LogEntry, LogError, LogRecord, Result, SessionLog};
use geneforge_core::SessionId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// File-based append-only log.
pub struct JsonlSessionLog {
    root: PathBuf,
    /// Per-session append lock guarding the next sequence number (`None`
    /// until the file has been read).
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<Option<u64>>>>>,
}

impl JsonlSessionLog {
    /// Create the log, creating `sessions/` under `root` if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("sessions")).await?;

        Ok(Self {
            root,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self, id: SessionId) -> PathBuf {
        self.root.join("sessions").join(format!("{}.jsonl", id))
    }

    async fn session_lock(&self, session: SessionId) -> Arc<Mutex<Option<u64>>> {
        self.sessions.lock().await.entry(session).or_default().clone()
    }

    async fn read_entries(&self, session: SessionId) -> Result<Option<Vec<LogEntry>>> {
        let text = match fs::read_to_string(self.session_path(session)).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry = serde_json::from_str(line).map_err(|e| LogError::Corrupt {
                session,
                reason: format!("line {}: {}", n + 1, e),
            })?;
            entries.push(entry);
        }
        Ok(Some(entries))
    }
}

#[async_trait::async_trait]
impl SessionLog for JsonlSessionLog {
    async fn append(&self, session: SessionId, record: LogRecord) -> Result<LogEntry> {
        let lock = self.session_lock(session).await;
        let mut next_seq = lock.lock().await;

        let seq = match *next_seq {
            Some(seq) => seq,
            // Resuming a log written by an earlier process
            None => self
                .read_entries(session)
                .await?
                .map_or(0, |entries| entries.len() as u64),
        };

        let entry = LogEntry {
            session,
            seq,
            timestamp: chrono::Utc::now(),
            record,
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_path(session))
            .await?;
        let len = file.metadata().await?.len();
        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // Drop any partial line so the file stays parseable
            if let Err(trunc) = file.set_len(len).await {
                tracing::warn!("Could not truncate session {} after failed append: {}", session, trunc);
            }
            return Err(e.into());
        }

        *next_seq = Some(seq + 1);
        tracing::debug!("Appended {} #{} to session {}", entry.record.label(), seq, session);
        Ok(entry)
    }

    async fn entries(&self, session: SessionId) -> Result<Vec<LogEntry>> {
        let entries = self
            .read_entries(session)
            .await?
            .ok_or_else(|| LogError::NotFound(format!("session {}", session)))?;
        check_sequence(session, &entries)?;
        Ok(entries)
    }

    async fn sessions(&self) -> Result<Vec<SessionId>> {
        let mut ids = Vec::new();
        let mut rd = fs::read_dir(self.root.join("sessions")).await?;
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse().ok()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geneforge_core::ControllerState;

    fn transition(from: ControllerState, to: ControllerState) -> LogRecord {
        LogRecord::StateChanged { from, to, iteration: 0 }
    }

    #[tokio::test]
    async fn test_append_and_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlSessionLog::new(dir.path()).await.unwrap();
        let session = SessionId::new();

        log.append(session, transition(ControllerState::Designing, ControllerState::Simulating)).await.unwrap();
        let second = log.append(session, transition(ControllerState::Simulating, ControllerState::Evaluating)).await.unwrap();
        assert_eq!(second.seq, 1);

        let entries = log.entries(session).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].record, transition(ControllerState::Simulating, ControllerState::Evaluating));
        assert_eq!(log.sessions().await.unwrap(), vec![session]);
    }

    #[tokio::test]
    async fn test_resumes_sequence_from_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionId::new();
        {
            let log = JsonlSessionLog::new(dir.path()).await.unwrap();
            log.append(session, transition(ControllerState::Designing, ControllerState::Simulating)).await.unwrap();
        }
        let log = JsonlSessionLog::new(dir.path()).await.unwrap();
        let entry = log.append(session, transition(ControllerState::Simulating, ControllerState::Failed)).await.unwrap();
        assert_eq!(entry.seq, 1);
        assert_eq!(log.entries(session).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlSessionLog::new(dir.path()).await.unwrap();
        assert!(matches!(log.entries(SessionId::new()).await, Err(LogError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_corrupt_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlSessionLog::new(dir.path()).await.unwrap();
        let session = SessionId::new();
        log.append(session, transition(ControllerState::Designing, ControllerState::Simulating)).await.unwrap();

        let path = dir.path().join("sessions").join(format!("{}.jsonl", session));
        let mut text = tokio::fs::read_to_string(&path).await.unwrap();
        text.push_str("{not json\n");
        tokio::fs::write(&path, text).await.unwrap();

        assert!(matches!(log.entries(session).await, Err(LogError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_sessions_do_not_block_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlSessionLog::new(dir.path()).await.unwrap();
        let (busy, idle) = (SessionId::new(), SessionId::new());

        let lock = log.session_lock(busy).await;
        let _held = lock.lock().await;

        let appended = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            log.append(idle, transition(ControllerState::Designing, ControllerState::Simulating)),
        )
        .await;
        assert_eq!(appended.unwrap().unwrap().seq, 0);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(JsonlSessionLog::new(dir.path()).await.unwrap());
        let session = SessionId::new();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let log = log.clone();
            tasks.spawn(async move {
                log.append(session, transition(ControllerState::Simulating, ControllerState::Evaluating))
                    .await
                    .unwrap()
                    .seq
            });
        }
        let mut seqs = Vec::new();
        while let Some(seq) = tasks.join_next().await {
            seqs.push(seq.unwrap());
        }
        seqs.sort();
        assert_eq!(seqs, (0..16).collect::<Vec<u64>>());
        assert_eq!(log.entries(session).await.unwrap().len(), 16);
    }
}
