// ABOUTME: Admin route handlers, reachable only once the gate has authorized the visitor
// ABOUTME: Serves the dashboard and the static CMS bundle

use axum::{extract::State, routing::get, Router};
use std::path::Path;
use tower_http::services::ServeDir;

use crate::admin::templates::DashboardTemplate;
use crate::server::AppState;

/// Build the admin router mounted at /admin
pub fn admin_router(cms_dir: &str) -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .nest_service("/cms", ServeDir::new(cms_dir))
}

async fn dashboard(State(state): State<AppState>) -> DashboardTemplate {
    let admin = &state.config.admin;
    DashboardTemplate {
        site_name: state.config.server.site_name.clone(),
        whitelist: admin.whitelist.clone(),
        address_source: if admin.trust_forwarded_for {
            "proxy-appended X-Forwarded-For hop"
        } else {
            "connection peer"
        }
        .to_string(),
        cms_available: Path::new(&admin.cms_dir).join("index.html").is_file(),
    }
}
