use std::sync::Arc;

use conveyor_dispatch::{PendingStore, WorkerPool};

/// Shared application state passed to every route handler.
pub struct AppState {
    pub store: PendingStore,
    pub pool: Arc<WorkerPool>,
}

impl AppState {
    pub fn new(store: PendingStore, pool: Arc<WorkerPool>) -> Self {
        Self { store, pool }
    }
}
