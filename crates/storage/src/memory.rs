//! In-memory session log.

use super::{LogEntry, LogError, LogRecord, Result, SessionLog};
use async_trait::async_trait;
use geneforge_core::SessionId;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Session log held in memory, used by tests and dry runs.
#[derive(Default)]
pub struct MemorySessionLog {
    sessions: RwLock<BTreeMap<SessionId, Vec<LogEntry>>>,
}

impl MemorySessionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionLog for MemorySessionLog {
    async fn append(&self, session: SessionId, record: LogRecord) -> Result<LogEntry> {
        let mut sessions = self.sessions.write().await;
        let entries = sessions.entry(session).or_default();
        let entry = LogEntry {
            session,
            seq: entries.len() as u64,
            timestamp: chrono::Utc::now(),
            record,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn entries(&self, session: SessionId) -> Result<Vec<LogEntry>> {
        self.sessions
            .read()
            .await
            .get(&session)
            .cloned()
            .ok_or_else(|| LogError::NotFound(format!("session {}", session)))
    }

    async fn sessions(&self) -> Result<Vec<SessionId>> {
        Ok(self.sessions.read().await.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geneforge_core::{ExhaustionReason, SessionStatus};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_appends_get_distinct_seqs() {
        let log = Arc::new(MemorySessionLog::new());
        let session = SessionId::new();

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append(session, LogRecord::SessionFinished {
                    status: SessionStatus::Exhausted { reason: ExhaustionReason::StopRequested },
                    iterations: i,
                    best: None,
                })
                .await
                .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let entries = log.entries(session).await.unwrap();
        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (0..8).collect::<Vec<_>>());
    }
}
