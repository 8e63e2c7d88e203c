use std::sync::Arc;

use crate::ingress::ImageStore;
use crate::provider::VisionProvider;

/// Shared across handlers. Built once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn VisionProvider>,
    pub store: Arc<ImageStore>,
}

impl AppState {
    pub fn new(provider: Arc<dyn VisionProvider>, store: ImageStore) -> Self {
        Self {
            provider,
            store: Arc::new(store),
        }
    }
}
