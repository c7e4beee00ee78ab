//! IP allow/deny enforcement (spec §6 `ALLOWED_IPS`/`BLOCKED_IPS`,
//! `TRUST_PROXY`), folded in as request-pipeline stage 0 ahead of
//! authentication (SPEC_FULL.md §10.5).

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

use crate::state::AppState;

fn client_ip(req: &Request, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        if let Some(forwarded) = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next() {
                return Some(first.trim().to_string());
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

pub async fn ip_filter_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (trust_proxy, allowed, blocked) = {
        let settings = state.get_settings();
        (
            settings.server.trust_proxy,
            settings.server.allowed_ips.clone(),
            settings.server.blocked_ips.clone(),
        )
    };

    if allowed.is_empty() && blocked.is_empty() {
        return next.run(req).await;
    }

    let Some(ip) = client_ip(&req, trust_proxy) else {
        return next.run(req).await;
    };

    if blocked.iter().any(|b| b == &ip) {
        tracing::warn!(ip, "rejected request from blocked IP");
        return (StatusCode::FORBIDDEN, "IP address blocked").into_response();
    }

    if !allowed.is_empty() && !allowed.iter().any(|a| a == &ip) {
        tracing::warn!(ip, "rejected request from IP outside the allow list");
        return (StatusCode::FORBIDDEN, "IP address not allowed").into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusts_first_forwarded_for_entry() {
        let req = Request::builder()
            .header("X-Forwarded-For", "203.0.113.5, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req, true).as_deref(), Some("203.0.113.5"));
    }
}
