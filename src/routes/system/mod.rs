mod handler;
mod model;

pub use handler::{health, not_found, service_info, system_stats};
pub use model::{ComponentStatus, HealthResponse, ServiceInfo, SystemStatsResponse};
