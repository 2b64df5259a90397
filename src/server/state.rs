use std::sync::Arc;

use crate::cache::Cache;
use crate::db::Database;
use crate::facerec::Coordinator;

/// Everything the handlers need, owned here and shared by reference.
pub struct AppState {
    pub db: Database,
    pub cache: Arc<Cache>,
    pub coordinator: Coordinator,
}

impl AppState {
    pub fn new(db: Database, cache: Arc<Cache>, coordinator: Coordinator) -> Arc<Self> {
        Arc::new(AppState { db, cache, coordinator })
    }
}
