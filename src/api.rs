//! HTTP API for the intake service
//!
//! The messaging channel posts normalized inbound events to `/webhook`;
//! the remaining routes are read-only operator views.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::db::Database;
use crate::runtime::RuntimeManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeManager>,
    pub db: Database,
}

impl AppState {
    pub fn new(runtime: Arc<RuntimeManager>, db: Database) -> Self {
        Self { runtime, db }
    }
}
