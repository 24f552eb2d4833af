//! Named invalidation guards.
//!
//! Generated code that depends on an assumption (a builtin was not replaced,
//! a global still holds its folded value) checks a [`Guard`] and falls back
//! to the generic path once the guard is invalidated. Invalidation is
//! one-way.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Guard {
    name: Arc<str>,
    valid: AtomicBool,
}

impl Guard {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            valid: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Invalidates the guard; returns `true` if this call did it.
    pub fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Context-wide registry handing out one guard per name.
#[derive(Default)]
pub struct GuardRegistry {
    guards: RwLock<HashMap<String, Arc<Guard>>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the guard named `name`, creating it on first request.
    ///
    /// Concurrent first requests for the same name observe the same guard.
    pub fn get_or_create(&self, name: &str) -> Arc<Guard> {
        if let Some(guard) = self.guards.read().get(name) {
            return Arc::clone(guard);
        }
        let mut guards = self.guards.write();
        Arc::clone(
            guards
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Guard::new(name))),
        )
    }

    /// Invalidates the guard named `name`, if it exists.
    pub fn invalidate(&self, name: &str) -> bool {
        self.guards
            .read()
            .get(name)
            .is_some_and(|guard| guard.invalidate())
    }

    pub fn len(&self) -> usize {
        self.guards.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.read().is_empty()
    }
}
