//! Global scopes and the current-scope binding of each thread.

use crate::context::ExecutionContext;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Identifier of a scope, unique within its context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// A global object that scripts run against.
///
/// Created by [`ExecutionContext::create_scope`]. All scopes of a context
/// share its compiled code.
pub struct Scope {
    id: ScopeId,
    context: Arc<ExecutionContext>,
}

impl Scope {
    pub(crate) fn new(id: ScopeId, context: Arc<ExecutionContext>) -> Self {
        Self { id, context }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("id", &self.id).finish_non_exhaustive()
    }
}

thread_local! {
    static CURRENT_SCOPE: RefCell<Option<Arc<Scope>>> = const { RefCell::new(None) };
}

/// The scope bound to the calling thread.
pub fn current_scope() -> Option<Arc<Scope>> {
    CURRENT_SCOPE.with(|current| current.borrow().clone())
}

/// Binds `scope` to the calling thread and returns the previous binding.
///
/// Binding a scope drops every constant folded in its context, since folded
/// values may belong to the scope that was bound before.
pub fn set_current_scope(scope: Option<Arc<Scope>>) -> Option<Arc<Scope>> {
    if let Some(scope) = &scope {
        if let Some(constants) = scope.context.global_constants() {
            constants.invalidate_all();
        }
        trace!(scope = %scope.id, "binding current scope");
    }
    CURRENT_SCOPE.with(|current| current.replace(scope))
}

/// Binds `scope` until the returned guard is dropped.
pub fn enter_scope(scope: Arc<Scope>) -> ScopeEntered {
    ScopeEntered {
        previous: set_current_scope(Some(scope)),
    }
}

/// Restores the previously bound scope on drop.
#[must_use = "the scope is unbound as soon as this guard is dropped"]
pub struct ScopeEntered {
    previous: Option<Arc<Scope>>,
}

impl Drop for ScopeEntered {
    fn drop(&mut self) {
        set_current_scope(self.previous.take());
    }
}
