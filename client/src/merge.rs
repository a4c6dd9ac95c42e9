//! Merge layer: blends remote reads with not-yet-synced local records.

use std::sync::Arc;

use cask_engine::Record;
use tracing::debug;

use crate::error::Result;
use crate::storage::RecordStore;

/// Produces display lists from a remote result set and the local store.
#[derive(Clone)]
pub struct MergeLayer {
    store: Arc<dyn RecordStore>,
}

impl MergeLayer {
    /// Create a merge layer reading from `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Merge `remote` with the local records of `table`. Local copies win.
    pub async fn merge(&self, table: &str, remote: Vec<Record>) -> Result<Vec<Record>> {
        let local = self.store.get_all(table).await?;
        let result = cask_engine::merge(remote, local);

        if result.replaced > 0 || result.appended > 0 {
            debug!(
                table,
                replaced = result.replaced,
                appended = result.appended,
                "Local records shadow remote results"
            );
        }
        Ok(result.into_records())
    }
}
