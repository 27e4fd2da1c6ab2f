pub mod app_state;
pub mod cache;
pub mod config;
pub mod errors;
pub mod extractor;
pub mod handlers;
pub mod lending;
pub mod middleware_rate_limit;
pub mod models;
pub mod store;
pub mod validation;

pub use app_state::AppState;
pub use config::Config;
pub use errors::*;
pub use models::*;
