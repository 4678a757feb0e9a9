use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::engine::{AutomationEngine, EngineFault, EngineProvider};

struct Acquired<E> {
    engine: Arc<E>,
    /// Whether this process started the instance. Attached instances are
    /// never quit on dispose; they outlive this component.
    spawned: bool,
}

/// Process-wide, lazily-acquired handle to the external automation engine.
///
/// Construct one at process start and share it (`Arc`) with every writer.
/// Acquisition is double-checked: the common already-initialized path takes
/// only a read lock, and at most one thread performs the attach-or-create
/// attempt at a time.
pub struct EngineConnection<P: EngineProvider> {
    provider: P,
    state: RwLock<Option<Acquired<P::Engine>>>,
}

impl<P: EngineProvider> EngineConnection<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            state: RwLock::new(None),
        }
    }

    /// Idempotent, thread-safe acquisition. Returns `true` iff a usable
    /// handle exists afterwards; never panics and never returns an error.
    pub fn ensure_ready(&self) -> bool {
        if self.state.read().is_some() {
            return true;
        }

        let mut guard = self.state.write();
        if guard.is_some() {
            return true;
        }

        match self.acquire() {
            Ok(acquired) => {
                *guard = Some(acquired);
                true
            }
            Err(fault) => {
                error!(%fault, "automation engine unavailable");
                false
            }
        }
    }

    /// Attach first: it is cheap and avoids piling up hidden processes.
    fn acquire(&self) -> Result<Acquired<P::Engine>, EngineFault> {
        match self.provider.attach_existing() {
            Ok(engine) => {
                debug!("attached to running engine instance");
                Ok(Acquired {
                    engine: Arc::new(engine),
                    spawned: false,
                })
            }
            Err(attach_fault) => {
                debug!(%attach_fault, "no running instance, starting one hidden");
                let engine = self.provider.create_hidden()?;
                debug!("engine instance started (invisible)");
                Ok(Acquired {
                    engine: Arc::new(engine),
                    spawned: true,
                })
            }
        }
    }

    /// The cached engine handle, if acquisition has succeeded.
    pub fn engine(&self) -> Option<Arc<P::Engine>> {
        self.state
            .read()
            .as_ref()
            .map(|acquired| Arc::clone(&acquired.engine))
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().is_some()
    }

    /// Releases the handle. Quits the application only when this process
    /// spawned it. Must not race in-flight write calls.
    pub fn dispose(&self) {
        let taken = self.state.write().take();
        if let Some(acquired) = taken {
            if acquired.spawned {
                debug!("quitting spawned engine instance");
                if let Err(fault) = acquired.engine.quit() {
                    warn!(%fault, "engine quit failed");
                }
            }
        }
    }
}
