use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{info, instrument, warn};

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::catalog::{Catalog, CatalogSource},
};

/// Owns the active catalog snapshot and replaces it atomically on reload.
///
/// Readers hold cheap `Arc<Catalog>` clones; a reload that fails validation
/// leaves the previous snapshot serving.
pub struct CatalogService {
    path: Option<PathBuf>,
    current: RwLock<Arc<Catalog>>,
    event_sender: Option<Arc<EventSender>>,
}

impl CatalogService {
    /// Wraps an already-validated catalog with no backing file. Reload is
    /// unavailable; used for embedded catalogs and tests.
    pub fn from_catalog(catalog: Catalog) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(catalog)),
            event_sender: None,
        }
    }

    /// Loads the catalog from `path`, failing fast on validation errors.
    #[instrument(skip(event_sender))]
    pub fn load(
        path: impl AsRef<Path> + std::fmt::Debug,
        event_sender: Option<Arc<EventSender>>,
    ) -> Result<Self, ServiceError> {
        let path = path.as_ref().to_path_buf();
        let catalog = read_catalog(&path)?;
        info!(items = catalog.len(), currency = %catalog.currency, "catalog loaded");
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(catalog)),
            event_sender,
        })
    }

    /// Re-reads the catalog file. Either the whole new catalog replaces the
    /// active one or the error is returned and nothing changes.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<usize, ServiceError> {
        let path = self.path.as_deref().ok_or_else(|| {
            ServiceError::ValidationError("no catalog source configured".to_string())
        })?;
        let catalog = read_catalog(path)?;
        let items = catalog.len();

        {
            let mut guard = self
                .current
                .write()
                .map_err(|_| anyhow::anyhow!("catalog lock poisoned"))?;
            *guard = Arc::new(catalog);
        }
        info!(items, "catalog reloaded");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::CatalogReloaded { items }).await {
                warn!(error = %e, "failed to send catalog reloaded event");
            }
        }
        Ok(items)
    }

    /// Current catalog snapshot.
    pub fn current(&self) -> Arc<Catalog> {
        self.current
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }
}

fn read_catalog(path: &Path) -> Result<Catalog, ServiceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ServiceError::ValidationError(format!("cannot read catalog {}: {}", path.display(), e))
    })?;
    let source: CatalogSource = serde_json::from_str(&raw).map_err(|e| {
        ServiceError::ValidationError(format!("catalog {} is not valid JSON: {}", path.display(), e))
    })?;
    Catalog::from_source(source)
}
