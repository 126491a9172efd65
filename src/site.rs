// ABOUTME: Public pages of the website
// ABOUTME: Anything not routed here falls through to the static public directory

use axum::extract::State;

use crate::admin::templates::HomeTemplate;
use crate::server::AppState;

pub async fn home(State(state): State<AppState>) -> HomeTemplate {
    HomeTemplate {
        site_name: state.config.server.site_name.clone(),
    }
}

pub async fn health() -> &'static str {
    "ok"
}
