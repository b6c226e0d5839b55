//! Reverse proxy to tenant containers.
//!
//! Every non-reserved path lands here: verify the session, resolve the
//! tenant, gate on the container actually running (the runtime is the
//! source of truth — the caches are hints), rewrite trust headers, record
//! activity, and stream the request through. A cold tenant gets the wake
//! sentinel instead of a proxied response.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use caretaker_runtime::runtime::{first_tenant_address, inspect_is_running};

use crate::cookies;
use crate::error::AppError;
use crate::state::{AppState, ProxyTarget};

/// Headers that never cross the proxy boundary.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");

/// Session-gated fallback handler for all proxied paths.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    req: Request,
) -> Result<Response, AppError> {
    let cookie = jar
        .get(&state.config.cookie_name)
        .ok_or_else(|| AppError::Unauthorized("missing session cookie".to_owned()))?;
    let claims = state.sessions.verify(cookie.value()).await?;

    let renewed = match state.sessions.maybe_renew(&claims) {
        Ok(renewed) => renewed,
        Err(e) => {
            warn!(error = %e, "session renewal failed during proxy");
            None
        }
    };

    let tenant = state.namer.tenant_key(&claims.sub);
    let inspect = state
        .runtime
        .inspect(&tenant)
        .await
        .map_err(|e| AppError::BadGateway(e.to_string()))?;
    let running = inspect.as_ref().is_some_and(inspect_is_running);
    let Some(inspect) = inspect.filter(|_| running) else {
        return Err(AppError::Sleeping);
    };

    let target = {
        if let Some(target) = state.proxy_targets.read().await.get(&tenant).cloned() {
            target
        } else {
            // Double-checked insert: racing misses resolve once.
            let mut cache = state.proxy_targets.write().await;
            if let Some(target) = cache.get(&tenant).cloned() {
                target
            } else {
                let ip = first_tenant_address(&inspect).ok_or_else(|| {
                    AppError::BadGateway(format!("no address for tenant {tenant}"))
                })?;
                let target = ProxyTarget {
                    ip,
                    port: state.config.tenant_port,
                };
                cache.insert(tenant.clone(), target.clone());
                target
            }
        }
    };

    state.touch(&tenant).await;

    let mut response = match forward(&state, &target, &claims.sub, addr, req).await {
        Ok(response) => response,
        Err(e) => {
            // Drop the cached address: a recreated container may have a new
            // IP, and the next request should re-resolve it.
            warn!(tenant = %tenant, error = %e, "proxy send failed, dropping cached target");
            state.drop_proxy_target(&tenant).await;
            return Err(AppError::BadGateway("tenant unreachable".to_owned()));
        }
    };

    if let Some(issued) = renewed {
        let cookie = cookies::session_cookie(&state.config, &issued);
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "renewed session cookie not header-safe"),
        }
    }

    Ok(response)
}

/// Stream the request to the tenant and the response back verbatim.
async fn forward(
    state: &AppState,
    target: &ProxyTarget,
    user_id: &str,
    addr: SocketAddr,
    req: Request,
) -> Result<Response, reqwest::Error> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let url = format!("{}{}", target.origin(), path_and_query);

    let headers = forward_headers(&parts.headers, &addr.ip().to_string(), user_id);

    let upstream = state
        .http
        .request(parts.method, url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await?;

    let status = upstream.status();
    let headers = upstream.headers().clone();
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    for (name, value) in &headers {
        if !is_hop_by_hop(name) {
            response.headers_mut().append(name.clone(), value.clone());
        }
    }
    Ok(response)
}

/// Build the outgoing header set.
///
/// Hop-by-hop headers and the original `Host` are dropped (the client sets
/// `Host` from the target URL). The trust headers are always overwritten —
/// the supervisor is the sole source of tenant-facing identity, so inbound
/// values never survive.
fn forward_headers(incoming: &HeaderMap, client_ip: &str, user_id: &str) -> HeaderMap {
    let original_host = incoming
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    let mut out = HeaderMap::new();
    for (name, value) in incoming {
        if is_hop_by_hop(name)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || name == X_FORWARDED_FOR
            || name == X_FORWARDED_PROTO
            || name == X_FORWARDED_HOST
            || name == X_USER_ID
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    if let Ok(value) = HeaderValue::from_str(client_ip) {
        out.insert(X_FORWARDED_FOR, value);
    }
    out.insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));
    if !original_host.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&original_host) {
            out.insert(X_FORWARDED_HOST, value);
        }
    }
    match HeaderValue::from_str(user_id) {
        Ok(value) => {
            out.insert(X_USER_ID, value);
        }
        Err(e) => warn!(error = %e, "user id not header-safe, X-User-ID omitted"),
    }

    out
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}
