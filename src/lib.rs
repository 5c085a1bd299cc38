use std::sync::Arc;

use cache::CacheService;
use config::Config;
use database::Database;

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub cache: CacheService,
    pub database: Option<Database>,
    pub config: Arc<Config>,
}
