pub mod rest;

use crate::config::Config;
use crate::db::DbPool;
use crate::namespace::Namespace;
use crate::storage::Backend;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub namespace: Arc<Namespace>,
    pub config: Config,
}

impl AppState {
    pub fn new(db: DbPool, backend: Arc<dyn Backend>, config: Config) -> Self {
        let namespace = Namespace::new(backend, db.clone(), &config.public_url);
        Self {
            db,
            namespace: Arc::new(namespace),
            config,
        }
    }
}
