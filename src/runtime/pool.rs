use super::session::{Orchestrator, Session, TurnOutcome};
use super::snapshot::SessionSnapshot;
use crate::error::RuntimeError;
use ahash::AHashMap;
use itertools::Itertools;
use rayon::prelude::*;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

/// Independent sessions keyed by id, sharing one orchestrator.
///
/// Each session sits behind its own lock, so turns of different sessions run
/// concurrently while turns of the same session are serialized.
pub struct SessionPool {
    orchestrator: Arc<Orchestrator>,
    sessions: RwLock<AHashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionPool {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            sessions: RwLock::new(AHashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Returns the session with `id`, creating it if needed.
    pub fn session(&self, id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(id.to_string()).or_insert_with(|| {
            debug!(session = id, "opened session");
            Arc::new(Mutex::new(Session::new(id, Arc::clone(&self.orchestrator))))
        }))
    }

    pub fn handle_turn(&self, id: &str, text: &str) -> Result<TurnOutcome, RuntimeError> {
        let session = self.session(id);
        let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
        session.handle_turn(text)
    }

    /// Processes `(session id, text)` turns, sessions in parallel. Turns of one
    /// session run in submission order and their results keep that order; the
    /// order between sessions is unspecified.
    pub fn handle_batch(
        &self,
        turns: Vec<(String, String)>,
    ) -> Vec<(String, Result<TurnOutcome, RuntimeError>)> {
        let groups = turns.into_iter().into_group_map();
        groups
            .into_par_iter()
            .flat_map_iter(|(id, texts)| {
                let session = self.session(&id);
                let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
                texts
                    .into_iter()
                    .map(|text| (id.clone(), session.handle_turn(&text)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn snapshot(&self, id: &str) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).map(|session| {
            session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot()
        })
    }

    /// Installs a restored session, replacing any session with the same id.
    pub fn restore(&self, snapshot: SessionSnapshot) -> Result<(), RuntimeError> {
        let session = Session::restore(Arc::clone(&self.orchestrator), snapshot)?;
        let id = session.id().to_string();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(session)));
        Ok(())
    }

    /// Drops a session, returning its final snapshot.
    pub fn remove(&self, id: &str) -> Option<SessionSnapshot> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)?;
        let session = removed.lock().unwrap_or_else(PoisonError::into_inner);
        Some(session.snapshot())
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .sorted()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
