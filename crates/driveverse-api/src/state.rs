use std::path::PathBuf;
use std::sync::Arc;

use tracing::error;

use driveverse_db::Database;
use driveverse_gateway::dispatcher::Dispatcher;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub config: ApiConfig,
}

/// Settings the HTTP layer needs. Built by the binary from the environment.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    /// Root of the statically served `/uploads` tree.
    pub upload_dir: PathBuf,
    pub max_image_bytes: usize,
}

impl AppStateInner {
    pub fn new(db: Database, dispatcher: Dispatcher, config: ApiConfig) -> AppState {
        Arc::new(Self {
            db: Arc::new(db),
            dispatcher,
            config,
        })
    }

    /// Run a blocking storage call off the async runtime.
    pub async fn run_db<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.to_string())
            })?
            .map_err(ApiError::from)
    }
}
