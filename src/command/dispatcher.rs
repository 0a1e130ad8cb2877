//! Handler registry and request correlation for one connection.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use log::debug;
use tokio::sync::oneshot;

use super::{CommandError, CommandHandler, CommandName, ReplyParameters};

/// Maps command names to handlers and tracks requests awaiting a reply.
///
/// Handlers are registered before serving starts; [`seal`](Self::seal)
/// freezes the table so lookups never race with registration.
#[derive(Default)]
pub struct CommandDispatcher {
    handlers: RwLock<HashMap<CommandName, Arc<dyn CommandHandler>>>,
    sealed: AtomicBool,
    last_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<ReplyParameters>>,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `handler` for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Sealed`] once serving started and
    /// [`CommandError::DuplicateHandler`] if `name` is taken.
    pub fn register(
        &self,
        name: CommandName,
        handler: impl CommandHandler,
    ) -> Result<(), CommandError> {
        self.register_shared(name, Arc::new(handler))
    }

    /// Register an already shared handler for `name`.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_shared(
        &self,
        name: CommandName,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), CommandError> {
        if self.is_sealed() {
            return Err(CommandError::Sealed);
        }
        let mut handlers = self.handlers.write().expect("lock poisoned");
        if handlers.contains_key(&name) {
            return Err(CommandError::DuplicateHandler(name));
        }
        handlers.insert(name, handler);
        Ok(())
    }

    /// Register `handler` unless a handler for `name` already exists.
    ///
    /// Returns whether the handler was installed.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Sealed`] once serving started.
    pub fn register_default(
        &self,
        name: CommandName,
        handler: impl CommandHandler,
    ) -> Result<bool, CommandError> {
        match self.register_shared(name, Arc::new(handler)) {
            Ok(()) => Ok(true),
            Err(CommandError::DuplicateHandler(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Freeze the handler table.
    pub fn seal(&self) { self.sealed.store(true, Ordering::Release); }

    #[must_use]
    pub fn is_sealed(&self) -> bool { self.sealed.load(Ordering::Acquire) }

    /// Look up the handler for `name`.
    #[must_use]
    pub fn handler(&self, name: &CommandName) -> Option<Arc<dyn CommandHandler>> {
        self.handlers
            .read()
            .expect("lock poisoned")
            .get(name)
            .cloned()
    }

    /// Allocate a fresh correlation id.
    pub fn next_id(&self) -> u64 { self.last_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1) }

    /// Register interest in the reply to request `id`.
    pub fn expect_reply(&self, id: u64) -> oneshot::Receiver<ReplyParameters> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        rx
    }

    /// Stop waiting for request `id`.
    pub fn forget_reply(&self, id: u64) { self.pending.remove(&id); }

    /// Deliver a reply to its waiting request.
    ///
    /// Returns `false` if nobody was waiting for `id`.
    pub fn resolve_reply(&self, id: u64, reply: ReplyParameters) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => tx.send(reply).is_ok(),
            None => {
                debug!("unsolicited reply: id={id}");
                false
            }
        }
    }

    /// Drop every pending request so its waiter observes a closed connection.
    pub fn cancel_pending(&self) { self.pending.clear(); }

    /// Number of requests still awaiting a reply.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.pending.len() }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self
            .handlers
            .read()
            .expect("lock poisoned")
            .keys()
            .map(ToString::to_string)
            .collect();
        names.sort();
        f.debug_struct("CommandDispatcher")
            .field("handlers", &names)
            .field("sealed", &self.is_sealed())
            .field("pending", &self.pending.len())
            .finish()
    }
}
