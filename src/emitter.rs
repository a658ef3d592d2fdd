//! Post-commit event emission.
//!
//! [`CommitEmitter`] is a listener that forwards successful commits and rollbacks to
//! `event_emitter_rs` subscribers, one event per affected object with the object id as
//! payload. Subscribers run on the emitter's own threads.

use std::sync::Mutex;

use event_emitter_rs::EventEmitter;

use crate::listener::{ListenerError, ListenerResult, TransactionListener};
use crate::object_id::ObjectId;
use crate::transaction::TransactionId;

pub const COMMITTED: &str = "Committed";
pub const ROLLED_BACK: &str = "RolledBack";

pub struct CommitEmitter {
    event_emitter: Mutex<EventEmitter>,
}

impl CommitEmitter {
    pub fn new() -> Self {
        CommitEmitter {
            event_emitter: Mutex::new(EventEmitter::new()),
        }
    }

    /// Register a listener for [`COMMITTED`] or [`ROLLED_BACK`].
    pub fn on<F>(&self, event: &str, listener: F) -> Result<(), ListenerError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let mut event_emitter = self
            .event_emitter
            .lock()
            .map_err(|_| ListenerError::new("commit emitter lock poisoned"))?;
        event_emitter.on(event, listener);
        Ok(())
    }

    fn emit_all(&self, event: &str, ids: &[ObjectId]) -> ListenerResult {
        let mut event_emitter = self
            .event_emitter
            .lock()
            .map_err(|_| ListenerError::new("commit emitter lock poisoned"))?;
        for id in ids {
            event_emitter.emit(event, id.to_string());
        }
        Ok(())
    }
}

impl Default for CommitEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionListener for CommitEmitter {
    fn committed(&self, tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        tracing::trace!(%tx, count = ids.len(), "emitting committed events");
        self.emit_all(COMMITTED, ids)
    }

    fn rolled_back(&self, tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        tracing::trace!(%tx, count = ids.len(), "emitting rolled back events");
        self.emit_all(ROLLED_BACK, ids)
    }
}
