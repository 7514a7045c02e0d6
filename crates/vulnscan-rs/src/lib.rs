pub mod adapters;
pub mod api;
pub mod config;
pub mod db;
pub mod executor;
pub mod jobs;
pub mod models;
pub mod parser;
pub mod report;
pub mod store;

use std::sync::Arc;

use tokio::sync::Notify;

pub use api::build_router;

/// Shared by every request handler. Workers receive the same store and
/// wake-up signal directly.
#[derive(Clone)]
pub struct AppState {
    pub store: store::JobStore,
    pub wake: Arc<Notify>,
}

impl AppState {
    pub fn new(store: store::JobStore, wake: Arc<Notify>) -> Self {
        Self { store, wake }
    }
}
