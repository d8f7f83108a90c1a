use std::sync::Arc;

use crate::service::OpponentService;
use crate::vault::MarkdownVault;

pub struct AppState<E, V, L, D = MarkdownVault> {
    pub service: Arc<OpponentService<E, V, L, D>>,
}

impl<E, V, L, D> AppState<E, V, L, D> {
    pub fn new(service: Arc<OpponentService<E, V, L, D>>) -> Self {
        Self { service }
    }
}

impl<E, V, L, D> Clone for AppState<E, V, L, D> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}
