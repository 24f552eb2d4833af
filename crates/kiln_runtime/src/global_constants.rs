//! Constant folding of global bindings.
//!
//! While a context has exactly one [`Scope`](crate::Scope), generated code
//! may treat a global binding as a constant guarded by a [`Guard`]. Creating
//! a second scope disables folding for the rest of the context's life, since
//! code compiled once is shared by every scope and a folded value would leak
//! across them.

use crate::guard::Guard;
use kiln_common::Constant;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle of a [`GlobalConstants`] optimizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OptimizerState {
    /// Folding is enabled and bindings may be folded.
    Active = 0,
    /// Every folded binding was dropped; folding may resume.
    Invalidated = 1,
    /// Folding is off for good.
    PermanentlyDisabled = 2,
}

impl OptimizerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => OptimizerState::Active,
            1 => OptimizerState::Invalidated,
            _ => OptimizerState::PermanentlyDisabled,
        }
    }
}

struct FoldedBinding {
    value: Constant,
    guard: Arc<Guard>,
}

/// Per-context optimizer for global bindings.
pub struct GlobalConstants {
    state: AtomicU8,
    // every state transition happens with this lock held
    bindings: Mutex<HashMap<String, FoldedBinding>>,
}

impl GlobalConstants {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(OptimizerState::Active as u8),
            bindings: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> OptimizerState {
        OptimizerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_disabled(&self) -> bool {
        self.state() == OptimizerState::PermanentlyDisabled
    }

    /// Folds `name` to `value` and returns the guard code must check.
    ///
    /// Returns `None` once the optimizer is permanently disabled. Refolding a
    /// name invalidates the guard of its previous value.
    pub fn fold(&self, name: &str, value: Constant) -> Option<Arc<Guard>> {
        let mut bindings = self.bindings.lock();
        if self.is_disabled() {
            return None;
        }
        self.transition(OptimizerState::Active);

        let guard = Arc::new(Guard::new(name));
        let previous = bindings.insert(
            name.to_string(),
            FoldedBinding {
                value,
                guard: Arc::clone(&guard),
            },
        );
        if let Some(previous) = previous {
            previous.guard.invalidate();
        }
        debug!(name, "folded global binding");
        Some(guard)
    }

    /// The folded value of `name`, if it is still valid.
    pub fn lookup(&self, name: &str) -> Option<Constant> {
        let bindings = self.bindings.lock();
        bindings
            .get(name)
            .filter(|binding| binding.guard.is_valid())
            .map(|binding| binding.value.clone())
    }

    /// Drops the folded value of `name` after the binding was reassigned.
    pub fn invalidate_binding(&self, name: &str) -> bool {
        match self.bindings.lock().remove(name) {
            Some(binding) => {
                binding.guard.invalidate();
                debug!(name, "invalidated folded global binding");
                true
            }
            None => false,
        }
    }

    /// Drops every folded binding; folding may resume afterwards.
    pub fn invalidate_all(&self) {
        let mut bindings = self.bindings.lock();
        for (_, binding) in bindings.drain() {
            binding.guard.invalidate();
        }
        if !self.is_disabled() {
            self.transition(OptimizerState::Invalidated);
        }
    }

    /// Drops every folded binding and disables folding for good.
    pub fn invalidate_forever(&self) {
        let mut bindings = self.bindings.lock();
        for (_, binding) in bindings.drain() {
            binding.guard.invalidate();
        }
        if !self.is_disabled() {
            self.transition(OptimizerState::PermanentlyDisabled);
            info!("global constant folding disabled: context has more than one scope");
        }
    }

    /// Number of currently folded bindings.
    pub fn folded_count(&self) -> usize {
        self.bindings.lock().len()
    }

    fn transition(&self, to: OptimizerState) {
        let from = self.state();
        assert!(
            from != OptimizerState::PermanentlyDisabled
                || to == OptimizerState::PermanentlyDisabled,
            "global constants optimizer cannot leave the permanently disabled state (to {to:?})"
        );
        self.state.store(to as u8, Ordering::Release);
    }
}

impl Default for GlobalConstants {
    fn default() -> Self {
        Self::new()
    }
}
