use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Up,
    Down,
    NotConfigured,
}

impl From<bool> for ComponentStatus {
    fn from(alive: bool) -> Self {
        if alive {
            ComponentStatus::Up
        } else {
            ComponentStatus::Down
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub version: String,
    pub redis: ComponentStatus,
    pub database: ComponentStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatsResponse {
    pub backend: String,
    pub redis: BTreeMap<String, String>,
}
