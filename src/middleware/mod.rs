mod error_handler;
mod rate_limit;

pub use error_handler::log_server_errors;
pub use rate_limit::{RateLimiter, client_ip, rate_limit};
