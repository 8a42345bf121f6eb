//! Action context and controller ownership.
//!
//! A controller takes part in at most one action at a time. The
//! [`ControllerRegistry`] records which action owns which controller and is
//! passed explicitly to every action; there is no process-wide instance.
//!
//! [`ActionContext`] is the scoped resource of one action execution: creating
//! it claims the controllers (all or nothing), dropping it runs the pending
//! finish hooks and releases the claim. This holds on every exit path,
//! including a failed start and a panic unwinding through the action loop.

use daq_core::error::{AppResult, DaqError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

// =============================================================================
// Controller Registry
// =============================================================================

/// Controller name → id of the owning action.
#[derive(Debug, Default)]
pub struct ControllerRegistry {
    owners: Mutex<HashMap<String, String>>,
}

impl ControllerRegistry {
    /// Creates a registry with no claimed controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every controller for `owner`, or none of them.
    pub fn claim(&self, owner: &str, controllers: &[String]) -> AppResult<()> {
        let mut owners = self.owners.lock();
        if let Some((controller, current)) = controllers
            .iter()
            .find_map(|c| owners.get(c).map(|o| (c, o)))
        {
            return Err(DaqError::ControllerBusy {
                controller: controller.clone(),
                owner: current.clone(),
            });
        }
        for controller in controllers {
            owners.insert(controller.clone(), owner.to_string());
        }
        Ok(())
    }

    /// Releases the controllers still owned by `owner`.
    pub fn release(&self, owner: &str, controllers: &[String]) {
        let mut owners = self.owners.lock();
        for controller in controllers {
            if owners.get(controller).is_some_and(|o| o == owner) {
                owners.remove(controller);
            }
        }
    }

    /// Id of the action owning `controller`, if any.
    pub fn owner(&self, controller: &str) -> Option<String> {
        self.owners.lock().get(controller).cloned()
    }

    /// `true` if some action owns `controller`.
    pub fn is_busy(&self, controller: &str) -> bool {
        self.owners.lock().contains_key(controller)
    }

    /// Number of claimed controllers.
    pub fn busy_count(&self) -> usize {
        self.owners.lock().len()
    }
}

// =============================================================================
// Action Context
// =============================================================================

type FinishHook = Box<dyn FnOnce() + Send>;

/// One execution of an action.
///
/// Holds the claim on its controllers and the finish hooks. Dropping it runs the
/// hooks and releases the controllers.
pub struct ActionContext {
    id: String,
    registry: Arc<ControllerRegistry>,
    controllers: Vec<String>,
    hooks: Mutex<Vec<(String, FinishHook)>>,
}

impl ActionContext {
    /// Claims `controllers` in `registry` for a new action execution.
    pub fn enter(registry: Arc<ControllerRegistry>, controllers: Vec<String>) -> AppResult<Self> {
        let id = Uuid::new_v4().to_string();
        registry.claim(&id, &controllers)?;
        debug!(action_id = %id, ?controllers, "Controllers claimed");
        Ok(Self {
            id,
            registry,
            controllers,
            hooks: Mutex::new(Vec::new()),
        })
    }

    /// Unique id of this execution.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claimed controllers, in name order.
    pub fn controllers(&self) -> &[String] {
        &self.controllers
    }

    /// Registers a hook run once when the action finishes.
    pub fn add_finish_hook(&self, name: impl Into<String>, hook: impl FnOnce() + Send + 'static) {
        self.hooks.lock().push((name.into(), Box::new(hook)));
    }

    /// Hooks not run yet.
    pub fn pending_hooks(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Runs pending finish hooks in registration order. A panicking hook is
    /// logged and does not prevent the others from running.
    pub fn run_finish_hooks(&self) {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for (name, hook) in hooks {
            if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
                error!(action_id = %self.id, hook = %name, "Finish hook panicked");
            }
        }
    }
}

impl Drop for ActionContext {
    fn drop(&mut self) {
        self.run_finish_hooks();
        self.registry.release(&self.id, &self.controllers);
        debug!(action_id = %self.id, "Controllers released");
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("id", &self.id)
            .field("controllers", &self.controllers)
            .field("pending_hooks", &self.pending_hooks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_claim_is_all_or_nothing() {
        let registry = ControllerRegistry::new();
        registry.claim("a1", &names(&["tg", "mot"])).unwrap();

        let err = registry.claim("a2", &names(&["ct", "mot"])).unwrap_err();
        assert!(matches!(err, DaqError::ControllerBusy { ref controller, ref owner }
            if controller == "mot" && owner == "a1"));
        assert!(!registry.is_busy("ct"));

        registry.release("a2", &names(&["tg"]));
        assert_eq!(registry.owner("tg").as_deref(), Some("a1"));
        registry.release("a1", &names(&["tg", "mot"]));
        assert_eq!(registry.busy_count(), 0);
    }

    #[test]
    fn test_context_releases_on_drop() {
        let registry = Arc::new(ControllerRegistry::new());
        {
            let ctx = ActionContext::enter(registry.clone(), names(&["tg"])).unwrap();
            assert_eq!(registry.owner("tg").as_deref(), Some(ctx.id()));
            assert!(ActionContext::enter(registry.clone(), names(&["tg"])).is_err());
        }
        assert!(!registry.is_busy("tg"));
        assert!(ActionContext::enter(registry, names(&["tg"])).is_ok());
    }

    #[test]
    fn test_finish_hooks_run_exactly_once() {
        let registry = Arc::new(ControllerRegistry::new());
        let count = Arc::new(AtomicUsize::new(0));
        {
            let ctx = ActionContext::enter(registry, names(&["tg"])).unwrap();
            for _ in 0..3 {
                let c = count.clone();
                ctx.add_finish_hook("count", move || {
                    c.fetch_add(1, Ordering::SeqCst);
                });
            }
            ctx.run_finish_hooks();
            ctx.run_finish_hooks();
            assert_eq!(count.load(Ordering::SeqCst), 3);
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_hook_does_not_skip_others() {
        let registry = Arc::new(ControllerRegistry::new());
        let count = Arc::new(AtomicUsize::new(0));
        let ctx = ActionContext::enter(registry.clone(), names(&["tg"])).unwrap();
        ctx.add_finish_hook("boom", || panic!("hook failure"));
        let c = count.clone();
        ctx.add_finish_hook("count", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        drop(ctx);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!registry.is_busy("tg"));
    }
}
