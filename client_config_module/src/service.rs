mod auth;
mod client_api;
mod config;
mod error;
mod mailbox_api;
mod server;
mod state;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::{ServiceConfig, DEFAULT_BODY_MAX_BYTES};
pub use error::ApiError;
pub use server::{build_router, run_server};
pub use state::AppState;
