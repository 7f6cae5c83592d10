//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::error::UploadError;
use crate::storage::ContentStore;
use crate::upload::UploadService;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to prepare content store: {0}")]
    ContentStore(#[from] UploadError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    uploads: UploadService,
}

impl AppState {
    /// Create a new application state, creating the content root if needed
    pub async fn new(config: Config) -> Result<Self, StateError> {
        let store = ContentStore::new(config.storage.upload_dir.clone());
        store.ensure_root().await?;

        let uploads = UploadService::new(store).with_delay(config.upload.delay());

        Ok(Self {
            inner: Arc::new(AppStateInner { config, uploads }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the upload service
    pub fn uploads(&self) -> &UploadService {
        &self.inner.uploads
    }

    /// Public URL for a stored path
    pub fn service_url(&self, path: &std::path::Path) -> String {
        let relative = self.uploads().store().relative_path(path);
        self.config().storage.service_url(&relative)
    }
}
