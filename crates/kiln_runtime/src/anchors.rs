//! Per-origin isolation anchors, held weakly.

use crate::error::InstallError;
use crate::installer::IsolationAnchor;
use crate::target::InstallTarget;
use kiln_source::Origin;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Maps each origin to the anchor its isolated units are defined against.
///
/// Anchors are kept alive only by the handles installed against them; once
/// every such handle is gone the next request for the origin creates a new
/// anchor.
#[derive(Default)]
pub struct AnchorCache {
    anchors: HashMap<Origin, Weak<IsolationAnchor>>,
}

impl AnchorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live anchor for `origin`, creating one if needed.
    pub fn get_or_create(
        &mut self,
        origin: &Origin,
        target: &dyn InstallTarget,
    ) -> Result<Arc<IsolationAnchor>, InstallError> {
        self.anchors.retain(|_, anchor| anchor.strong_count() > 0);

        if let Some(anchor) = self.anchors.get(origin).and_then(Weak::upgrade) {
            return Ok(anchor);
        }
        let id = target.create_anchor(origin)?;
        debug!(origin = %origin, anchor = %id, "created isolation anchor");
        let anchor = Arc::new(IsolationAnchor::new(id, origin.clone()));
        self.anchors.insert(origin.clone(), Arc::downgrade(&anchor));
        Ok(anchor)
    }

    /// Number of origins with a live anchor.
    pub fn live_count(&self) -> usize {
        self.anchors.values().filter(|a| a.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::LocalTarget;

    #[test]
    fn same_origin_shares_anchor() {
        let target = LocalTarget::new();
        let mut cache = AnchorCache::new();
        let origin = Origin::new("file:a.js");
        let a = cache.get_or_create(&origin, &target).unwrap();
        let b = cache.get_or_create(&origin, &target).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(target.anchor_count(), 1);
    }

    #[test]
    fn distinct_origins_get_distinct_anchors() {
        let target = LocalTarget::new();
        let mut cache = AnchorCache::new();
        let a = cache.get_or_create(&Origin::new("file:a.js"), &target).unwrap();
        let b = cache.get_or_create(&Origin::new("file:b.js"), &target).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(cache.live_count(), 2);
    }

    #[test]
    fn dropped_anchor_is_recreated() {
        let target = LocalTarget::new();
        let mut cache = AnchorCache::new();
        let origin = Origin::new("file:a.js");
        let first = cache.get_or_create(&origin, &target).unwrap().id();
        assert_eq!(cache.live_count(), 0);
        let second = cache.get_or_create(&origin, &target).unwrap().id();
        assert_ne!(first, second);
    }

    #[test]
    fn unavailable_isolation_propagates() {
        let target = LocalTarget::with_isolation(false);
        let mut cache = AnchorCache::new();
        let err = cache
            .get_or_create(&Origin::new("file:a.js"), &target)
            .unwrap_err();
        assert_eq!(err, InstallError::IsolationUnavailable);
    }
}
