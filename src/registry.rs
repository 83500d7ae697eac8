//! Universal views cache.
//!
//! One "select everything" [`Constraint`] per schema instance, keyed by
//! [`Dmr::id`]. Construction happens under the write lock, so concurrent
//! first requests for the same schema build it once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::constraint::Constraint;
use crate::dmr::Dmr;
use crate::error::{CeError, Result};

/// Injectable registry of universal views.
#[derive(Debug, Default)]
pub struct UniversalViews {
    inner: RwLock<HashMap<u64, Arc<Constraint>>>,
}

impl UniversalViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// The universal view of `dmr`, built on first request.
    pub fn get_or_build(&self, dmr: &Arc<Dmr>) -> Result<Arc<Constraint>> {
        {
            let views = self.inner.read().map_err(|e| CeError::State(format!("lock: {}", e)))?;
            if let Some(view) = views.get(&dmr.id()) {
                return Ok(Arc::clone(view));
            }
        }

        let mut views = self.inner.write().map_err(|e| CeError::State(format!("lock: {}", e)))?;
        if let Some(view) = views.get(&dmr.id()) {
            return Ok(Arc::clone(view));
        }
        let view = Arc::new(Constraint::universal(Arc::clone(dmr))?);
        debug!(schema = dmr.name(), id = dmr.id(), "universal view built");
        views.insert(dmr.id(), Arc::clone(&view));
        Ok(view)
    }

    /// Drop the cached view for a schema being unloaded.
    pub fn invalidate(&self, schema_id: u64) -> Result<bool> {
        let mut views = self.inner.write().map_err(|e| CeError::State(format!("lock: {}", e)))?;
        let removed = views.remove(&schema_id).is_some();
        if removed {
            debug!(id = schema_id, "universal view invalidated");
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        let mut views = self.inner.write().map_err(|e| CeError::State(format!("lock: {}", e)))?;
        views.clear();
        Ok(())
    }

    /// Number of cached views.
    pub fn len(&self) -> Result<usize> {
        let views = self.inner.read().map_err(|e| CeError::State(format!("lock: {}", e)))?;
        Ok(views.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
