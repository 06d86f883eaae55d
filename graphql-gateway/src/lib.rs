pub mod app;
pub mod config;

pub use app::{build_auth, build_router, AppState};
pub use config::GatewayConfig;
