use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::storage::{DocumentStorage, FileStorage};

/// Shared handles every service works against.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<Config>,
    pub db: Database,
    pub storage: Arc<dyn DocumentStorage>,
}

impl PipelineContext {
    pub fn new(config: Arc<Config>, db: Database, storage: Arc<dyn DocumentStorage>) -> Self {
        Self {
            config,
            db,
            storage,
        }
    }

    /// Opens the configured database and storage directory.
    pub fn open(config: Config) -> Result<Self> {
        let db = Database::open(Path::new(&config.database_path))?;
        let storage = FileStorage::new(&config.storage_directory);
        tracing::info!(
            storage = %crate::sanitize::redact_path(Path::new(&config.storage_directory)),
            "Pipeline context opened"
        );
        Ok(Self::new(Arc::new(config), db, Arc::new(storage)))
    }
}
