//! In-progress upload sessions
//!
//! The registry map is only touched to insert, look up or remove a handle. All
//! per-session coordination happens on the [`SessionHandle`] itself, so disk I/O
//! for one session never blocks another.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cofile_core::models::UploadSession;
use cofile_core::AppError;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Lifecycle of a session handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Accepting chunks
    Initialized,
    /// A finalize holds the session; chunk writes are refused
    Finalizing,
    Finalized,
    Cancelled,
}

#[derive(Debug)]
struct ReceiptState {
    received: BTreeSet<u64>,
    phase: SessionPhase,
}

/// Consistent view of a session's receipt state
#[derive(Debug, Clone)]
pub struct ReceiptSnapshot {
    pub received: BTreeSet<u64>,
    pub phase: SessionPhase,
}

impl ReceiptSnapshot {
    pub fn is_complete(&self, total_chunks: u64) -> bool {
        self.received.len() as u64 == total_chunks
    }
}

pub struct SessionHandle {
    session: UploadSession,
    state: Mutex<ReceiptState>,
    // Chunk writes hold the read side while touching staging; finalize and cancel
    // take the write side to wait them out.
    io_gate: RwLock<()>,
}

impl SessionHandle {
    pub fn new(session: UploadSession) -> Self {
        Self {
            session,
            state: Mutex::new(ReceiptState {
                received: BTreeSet::new(),
                phase: SessionPhase::Initialized,
            }),
            io_gate: RwLock::new(()),
        }
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn id(&self) -> Uuid {
        self.session.id
    }

    /// Look up a handle on behalf of `caller`. Sessions of other users are reported
    /// as missing.
    pub fn ensure_owner(&self, caller: Uuid) -> Result<(), AppError> {
        if self.session.owner_id != caller {
            return Err(session_not_found(self.session.id));
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> ReceiptSnapshot {
        let state = self.state.lock().await;
        ReceiptSnapshot {
            received: state.received.clone(),
            phase: state.phase,
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    /// Enter a chunk write. Fails unless the session is accepting chunks.
    ///
    /// The phase is checked before waiting on the gate so a write never queues
    /// behind a running finalize, and again once the gate is held.
    pub async fn begin_write(&self) -> Result<RwLockReadGuard<'_, ()>, AppError> {
        self.ensure_accepting().await?;
        let guard = self.io_gate.read().await;
        self.ensure_accepting().await?;
        Ok(guard)
    }

    async fn ensure_accepting(&self) -> Result<(), AppError> {
        match self.state.lock().await.phase {
            SessionPhase::Initialized => Ok(()),
            SessionPhase::Finalizing | SessionPhase::Finalized => Err(AppError::Conflict(format!(
                "Upload session {} is being finalized and no longer accepts chunks",
                self.session.id
            ))),
            SessionPhase::Cancelled => Err(session_not_found(self.session.id)),
        }
    }

    /// Record a chunk as present. Returns the number of distinct chunks received.
    /// Only valid while holding the guard from [`SessionHandle::begin_write`].
    pub async fn mark_received(&self, index: u64) -> Result<u64, AppError> {
        if index >= self.session.total_chunks {
            return Err(AppError::InvalidInput(format!(
                "Chunk index {} is out of range (0..{})",
                index, self.session.total_chunks
            )));
        }
        let mut state = self.state.lock().await;
        state.received.insert(index);
        Ok(state.received.len() as u64)
    }

    /// Move to `Finalizing` and wait for in-flight chunk writes to drain.
    pub async fn begin_finalize(&self) -> Result<RwLockWriteGuard<'_, ()>, AppError> {
        {
            let mut state = self.state.lock().await;
            match state.phase {
                SessionPhase::Initialized => state.phase = SessionPhase::Finalizing,
                SessionPhase::Finalizing | SessionPhase::Finalized => {
                    return Err(AppError::Conflict(format!(
                        "Upload session {} is already being finalized",
                        self.session.id
                    )))
                }
                SessionPhase::Cancelled => return Err(session_not_found(self.session.id)),
            }
        }
        Ok(self.io_gate.write().await)
    }

    /// Return a failed finalize to `Initialized` so the client can retry.
    pub async fn abort_finalize(&self) {
        let mut state = self.state.lock().await;
        if state.phase == SessionPhase::Finalizing {
            state.phase = SessionPhase::Initialized;
        }
    }

    pub async fn mark_finalized(&self) {
        self.state.lock().await.phase = SessionPhase::Finalized;
    }

    /// Move to `Cancelled` and wait for in-flight chunk writes to drain. A session
    /// that is being finalized cannot be cancelled.
    pub async fn begin_cancel(&self) -> Result<RwLockWriteGuard<'_, ()>, AppError> {
        {
            let mut state = self.state.lock().await;
            match state.phase {
                SessionPhase::Initialized => state.phase = SessionPhase::Cancelled,
                SessionPhase::Cancelled => {}
                SessionPhase::Finalizing | SessionPhase::Finalized => {
                    return Err(AppError::Conflict(format!(
                        "Upload session {} is being finalized and cannot be cancelled",
                        self.session.id
                    )))
                }
            }
        }
        Ok(self.io_gate.write().await)
    }
}

pub(crate) fn session_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Upload session {} not found", id))
}

/// Concurrency-safe keyed store of in-progress upload sessions
#[derive(Default)]
pub struct UploadSessionRegistry {
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
}

impl UploadSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, session: UploadSession) -> Uuid {
        let id = session.id;
        self.sessions.insert(id, Arc::new(SessionHandle::new(session)));
        id
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<SessionHandle>, AppError> {
        self.sessions
            .get(&id)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| session_not_found(id))
    }

    pub fn delete(&self, id: Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Handles of sessions created before `cutoff`
    pub fn created_before(&self, cutoff: DateTime<Utc>) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .filter(|h| h.value().session.created_at < cutoff)
            .map(|h| Arc::clone(h.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
