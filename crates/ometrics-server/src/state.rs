use crate::config::ServerConfig;
use crate::usecase::MetricUseCases;
use ometrics_storage::memory::MemoryStorage;
use ometrics_storage::sqlite::SqliteStorage;
use ometrics_storage::{MetricStorage, StorageError};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// The storage engine selected by configuration.
pub enum Backend {
    Memory(Arc<MemoryStorage>),
    Sqlite(Arc<SqliteStorage>),
}

impl Backend {
    /// SQLite when a database path is configured, the in-memory store
    /// otherwise.
    pub fn open(config: &ServerConfig) -> Result<Self, StorageError> {
        match config.sqlite_storage() {
            Some(db) => Ok(Backend::Sqlite(Arc::new(SqliteStorage::open(&db)?))),
            None => Ok(Backend::Memory(Arc::new(MemoryStorage::new(
                config.memory_storage(),
            )))),
        }
    }

    pub fn storage(&self) -> Arc<dyn MetricStorage> {
        match self {
            Backend::Memory(memory) => memory.clone(),
            Backend::Sqlite(sqlite) => sqlite.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::Sqlite(_) => "sqlite",
        }
    }

    /// Starts the periodic snapshot task of the in-memory store, if any.
    pub fn spawn_background(&self, cancel: CancellationToken, span: Span) -> Option<JoinHandle<()>> {
        match self {
            Backend::Memory(memory) => memory.spawn_flush_loop(cancel, span),
            Backend::Sqlite(_) => None,
        }
    }

    /// Final snapshot for stores without a background task.
    pub fn close(&self) {
        if let Backend::Memory(memory) = self {
            memory.close();
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricUseCases>,
    pub signing_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(storage: Arc<dyn MetricStorage>, signing_key: Option<&str>) -> Self {
        Self {
            metrics: Arc::new(MetricUseCases::new(storage)),
            signing_key: signing_key.map(Arc::from),
        }
    }
}
