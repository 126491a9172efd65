// ABOUTME: Admin area: the access gate plus the pages it protects
// ABOUTME: Everything under /admin sits behind gate_middleware

pub mod auth;
pub mod routes;
pub mod templates;

pub use auth::{gate_middleware, TabSession};
pub use routes::admin_router;
