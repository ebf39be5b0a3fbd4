//! Core configuration and utilities for the Thrive client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_SUPABASE_PUBLISHABLE_KEY, DEFAULT_SUPABASE_URL, DEFAULT_WEB_SYSTEM_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
