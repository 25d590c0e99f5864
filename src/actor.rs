//! Actor-safe dispatch: run sync work only when a named actor is live.
//!
//! The registry is an injected capability owned by the host; the scheduler
//! core never tracks actors itself.

use crate::scheduler::Scheduler;
use std::sync::Arc;
use tracing::trace;

/// Host-owned lookup for named actors.
pub trait ActorRegistry: Send + Sync {
    /// Identifier callers hold on to.
    type Id: Send;
    /// The live actor object handed to dispatched work.
    type Actor;

    /// Look up the actor, if it is currently known.
    fn resolve(&self, id: &Self::Id) -> Option<Self::Actor>;
    /// Whether a resolved actor is currently live.
    fn is_live(&self, actor: &Self::Actor) -> bool;
}

/// Convenience wrapper over [`Scheduler::run_sync`] that resolves an actor
/// at fire time and skips the work when the actor is absent or no longer
/// live.
pub struct SafeActorDispatch<R: ActorRegistry> {
    scheduler: Arc<Scheduler>,
    registry: Arc<R>,
}

impl<R> SafeActorDispatch<R>
where
    R: ActorRegistry + 'static,
    R::Id: 'static,
{
    pub fn new(scheduler: Arc<Scheduler>, registry: Arc<R>) -> Self {
        Self {
            scheduler,
            registry,
        }
    }

    /// Queue `work` on the sync path; at drain time it runs only if `id`
    /// resolves to a live actor. An absent or non-live actor is not an
    /// error: the work is silently skipped.
    pub fn run_safe(&self, id: R::Id, work: impl FnOnce(R::Actor) + Send + 'static) {
        let registry = Arc::clone(&self.registry);
        self.scheduler.run_sync(move || {
            let Some(actor) = registry.resolve(&id) else {
                trace!("actor not found; skipping dispatched work");
                return;
            };
            if registry.is_live(&actor) {
                work(actor);
            } else {
                trace!("actor not live; skipping dispatched work");
            }
        });
    }
}
