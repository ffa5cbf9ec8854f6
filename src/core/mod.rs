pub mod app_state;
pub mod cache;
pub mod config;
pub mod error;
pub mod types;

pub use app_state::AppState;
