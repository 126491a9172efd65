// ABOUTME: Admin gate middleware plus the unlock and logout handlers
// ABOUTME: Bridges tower-sessions and the HTTP request into the access gate

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use std::net::SocketAddr;
use tower_sessions::Session;

use brokersite_core::gate::{AuthorizationState, GateView, SessionFlagStore, SESSION_FLAG_KEY};
use brokersite_core::lookup::CallerContext;
use brokersite_core::paths::{is_admin_path, ADMIN_PREFIX};

use super::templates::UnlockTemplate;
use crate::server::AppState;

/// The visitor's cookie session, holding the authorization flag
#[derive(Debug, Clone)]
pub struct TabSession(Session);

impl TabSession {
    pub fn new(session: Session) -> Self {
        Self(session)
    }
}

#[async_trait]
impl SessionFlagStore for TabSession {
    async fn get(&self) -> Result<bool> {
        Ok(self.0.get::<bool>(SESSION_FLAG_KEY).await?.unwrap_or(false))
    }

    async fn set(&self) -> Result<()> {
        self.0.insert(SESSION_FLAG_KEY, true).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.0.remove::<bool>(SESSION_FLAG_KEY).await?;
        Ok(())
    }
}

/// What the gate needs to know about the connection
fn caller_context(request: &Request, trust_forwarded_for: bool) -> CallerContext {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let forwarded_for = trust_forwarded_for
        .then(|| {
            request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .flatten();
    CallerContext {
        peer,
        forwarded_for,
    }
}

/// Redirect target after unlocking: the requested admin page, else the dashboard
fn unlock_destination(next: &str) -> &str {
    let path = next.split(['?', '#']).next().unwrap_or("");
    if is_admin_path(path) {
        next
    } else {
        ADMIN_PREFIX
    }
}

/// The challenge page for any view that is not authorized. `Loading` is only a
/// view's initial state, so a view that never resolved is challenged too.
fn challenge_unless_authorized(site_name: &str, requested: &str, view: &GateView) -> Option<Response> {
    match view.state {
        AuthorizationState::Authorized => None,
        AuthorizationState::Unauthorized | AuthorizationState::Loading => {
            Some(UnlockTemplate::from_view(site_name, requested, view).into_response())
        }
    }
}

/// Gate middleware for admin paths.
///
/// Non-admin requests pass straight through. For admin paths the session flag
/// is consulted first, then the whitelist; an unauthorized visitor gets the
/// password challenge in place of the page, with a 200 and no redirect.
pub async fn gate_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !is_admin_path(&path) {
        return next.run(request).await;
    }

    let Some(session) = request.extensions().get::<Session>().cloned() else {
        tracing::error!(path = %path, "Session layer missing, refusing admin request");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let caller = caller_context(&request, state.config.admin.trust_forwarded_for);
    let remote_addr = caller
        .peer
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let requested = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let flag = TabSession::new(session);
    let mut view = GateView::new();
    view.initialize(&state.gate, &flag, &caller).await;

    match challenge_unless_authorized(&state.config.server.site_name, &requested, &view) {
        None => {
            tracing::debug!(remote_addr = %remote_addr, path = %path, "Admin access granted");
            next.run(request).await
        }
        Some(challenge) => {
            tracing::info!(remote_addr = %remote_addr, path = %path, "Admin access requires password");
            challenge
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UnlockForm {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: String,
}

/// POST /unlock
pub async fn unlock(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<UnlockForm>,
) -> Response {
    let flag = TabSession::new(session.clone());
    let mut view = GateView::new();
    view.submit(&state.gate, &flag, &form.password).await;

    if view.state != AuthorizationState::Authorized {
        tracing::warn!("Admin password rejected");
        return UnlockTemplate::from_view(&state.config.server.site_name, &form.next, &view)
            .into_response();
    }

    // new session id once privileges change
    if let Err(e) = session.cycle_id().await {
        tracing::warn!(error = %e, "Failed to rotate session id after unlock");
    }

    let destination = unlock_destination(&form.next);
    tracing::info!(destination = %destination, "Admin unlocked with password");
    Redirect::to(destination).into_response()
}

/// GET|POST /logout
pub async fn logout(State(state): State<AppState>, session: Session) -> Response {
    if let Err(e) = state.gate.logout(&TabSession::new(session)).await {
        tracing::error!(error = %e, "Failed to clear admin session flag");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    tracing::info!("Admin logged out");
    Redirect::to("/").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_unlock_destination() {
        assert_eq!(unlock_destination("/admin/cms/"), "/admin/cms/");
        assert_eq!(unlock_destination("/admin?tab=posts"), "/admin?tab=posts");
        assert_eq!(unlock_destination(""), "/admin");
        assert_eq!(unlock_destination("/"), "/admin");
        assert_eq!(unlock_destination("https://evil.example/admin"), "/admin");
        assert_eq!(unlock_destination("//evil.example/admin"), "/admin");
        assert_eq!(unlock_destination("/administrator"), "/admin");
    }

    fn request_with(peer: Option<SocketAddr>, forwarded: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/admin");
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(addr) = peer {
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_caller_context_ignores_forwarded_header_unless_trusted() {
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 51234);
        let request = request_with(Some(peer), Some("203.0.113.7"));

        let untrusted = caller_context(&request, false);
        assert_eq!(untrusted.peer, Some(peer.ip()));
        assert!(untrusted.forwarded_for.is_none());

        let trusted = caller_context(&request, true);
        assert_eq!(trusted.forwarded_for.as_deref(), Some("203.0.113.7"));
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_unresolved_view_gets_challenge() {
        let view = GateView::new();
        assert_eq!(view.state, AuthorizationState::Loading);

        let response = challenge_unless_authorized("Harbour", "/admin/cms/", &view).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(r#"action="/unlock""#));
        assert!(html.contains(r#"name="next" value="/admin/cms/""#));
    }

    #[test]
    fn test_authorized_view_passes_through() {
        let view = GateView {
            state: AuthorizationState::Authorized,
            ..GateView::new()
        };
        assert!(challenge_unless_authorized("Harbour", "/admin", &view).is_none());
    }

    #[test]
    fn test_caller_context_without_connect_info() {
        let context = caller_context(&request_with(None, None), true);
        assert!(context.peer.is_none());
        assert!(context.forwarded_for.is_none());
    }
}
