// ABOUTME: Askama template structs for the public site and the admin gate
// ABOUTME: Templates are compiled into binary at build time

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use brokersite_core::gate::GateView;

/// Render through askama and hand axum an HTML body
macro_rules! html_response {
    ($($template:ty),* $(,)?) => {
        $(
            impl IntoResponse for $template {
                fn into_response(self) -> Response {
                    match self.render() {
                        Ok(body) => Html(body).into_response(),
                        Err(e) => {
                            tracing::error!(error = %e, template = stringify!($template), "Failed to render template");
                            StatusCode::INTERNAL_SERVER_ERROR.into_response()
                        }
                    }
                }
            }
        )*
    };
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub site_name: String,
}

#[derive(Template)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub site_name: String,
    pub whitelist: String,
    pub address_source: String,
    pub cms_available: bool,
}

/// Password challenge shown in place of any protected page
#[derive(Template)]
#[template(path = "admin/unlock.html")]
pub struct UnlockTemplate {
    pub site_name: String,
    /// Where to go after a successful unlock
    pub next: String,
    pub error: Option<String>,
    pub input: String,
}

impl UnlockTemplate {
    pub fn from_view(site_name: &str, next: &str, view: &GateView) -> Self {
        Self {
            site_name: site_name.to_string(),
            next: next.to_string(),
            error: view.error.clone(),
            input: view.input.clone(),
        }
    }
}

html_response!(HomeTemplate, DashboardTemplate, UnlockTemplate);
