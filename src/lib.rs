// ABOUTME: Root library module exposing the web server, admin gate and CLI commands
// ABOUTME: Platform-agnostic gate logic and configuration live in brokersite-core

pub mod admin;
pub mod server;
pub mod site;
pub mod upload;

// Re-export platform-agnostic modules from brokersite-core
pub use brokersite_core::config;
pub use brokersite_core::gate;
pub use brokersite_core::lookup;
pub use brokersite_core::metrics;
pub use brokersite_core::paths;
pub use brokersite_core::whitelist;

pub use server::{build_router, AppState};
