// Library exports for the API server, binary tools and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use config::Config;
use db::PgStore;
use services::notifications::NotificationSink;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: PgStore,
    pub redis: redis::aio::MultiplexedConnection,
    pub config: Arc<Config>,
    pub notifications: Arc<dyn NotificationSink>,
}
