//! Extension delegate registry.
//!
//! Externally registered handlers persist schema-extension data for an
//! entity after its core rows have been written. The engine calls them
//! with the entity and its resolved identity but knows nothing about
//! their internals; no registered delegate is the default and a no-op.

use crate::batch::WriterRegistry;
use crate::error::Result;
use crate::model::CityObject;
use async_trait::async_trait;
use std::sync::Arc;

/// Handler persisting additional data for an imported entity.
#[async_trait]
pub trait ExtensionDelegate: Send + Sync {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    /// Persist extension rows for `entity`, keyed by its resolved `id`.
    /// Rows go through the run's writer registry and share its batching.
    async fn persist(
        &self,
        entity: &CityObject,
        id: i64,
        writers: &mut WriterRegistry,
    ) -> Result<()>;
}

/// Delegates registered before a run starts.
#[derive(Default, Clone)]
pub struct DelegateRegistry {
    delegates: Vec<Arc<dyn ExtensionDelegate>>,
}

impl DelegateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a delegate. Multiple delegates run in registration order.
    pub fn register(&mut self, delegate: Arc<dyn ExtensionDelegate>) {
        self.delegates.push(delegate);
    }

    /// Registered delegates, in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ExtensionDelegate>> {
        self.delegates.iter()
    }

    /// True when no delegate is registered.
    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}
