use crate::{config::Config, db::Database, hub::EventHub, storage::ObjectStorage};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub hub: Arc<EventHub>,
    pub storage: ObjectStorage,
}

impl AppState {
    pub fn new(db: Database, config: Config, storage: ObjectStorage) -> Self {
        Self {
            db,
            config,
            hub: Arc::new(EventHub::new()),
            storage,
        }
    }
}
