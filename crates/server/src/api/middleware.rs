//! API-key authentication middleware and callback-URL validation.

use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};

use crate::metrics::AUTH_FAILURES_TOTAL;
use crate::state::AppState;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Whether a presented key is the master key or one of the named keys in
/// the settings table.
pub fn key_is_valid(state: &AppState, key: &str) -> bool {
    if let Some(master) = state.config().auth.api_key.as_deref() {
        if constant_time_eq(key, master) {
            return true;
        }
    }
    state
        .settings()
        .get_prefixed(super::api_keys::API_KEY_PREFIX)
        .map(|keys| keys.values().any(|v| constant_time_eq(key, v)))
        .unwrap_or(false)
}

/// Require a valid API key on every request. When no master key is
/// configured the API is open.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.config().auth.api_key.is_none() {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key_is_valid(&state, key) => next.run(request).await,
        _ => {
            AUTH_FAILURES_TOTAL.inc();
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "invalid or missing API key" })),
            )
                .into_response()
        }
    }
}

/// Compare keys without leaking length/position via timing: compare the
/// SHA-256 digests, which are fixed-size.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let da = Sha256::digest(a.as_bytes());
    let db = Sha256::digest(b.as_bytes());
    let mut diff = 0u8;
    for (x, y) in da.iter().zip(db.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Validate a user-provided webhook callback URL.
///
/// Rejects non-http(s) schemes and hosts that resolve to loopback,
/// private-range, link-local or otherwise reserved addresses, so a
/// callback cannot be pointed at internal services.
pub fn validate_callback_url(url: &str) -> Result<(), String> {
    let parsed = url::Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(format!("scheme {scheme} not allowed")),
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| "URL has no host".to_string())?;

    if host.eq_ignore_ascii_case("localhost") {
        return Err("localhost not allowed".to_string());
    }

    // Literal IPs are checked directly; hostnames are resolved.
    let addrs: Vec<IpAddr> = if let Ok(ip) = host.parse::<IpAddr>() {
        vec![ip]
    } else {
        use std::net::ToSocketAddrs;
        let port = parsed.port_or_known_default().unwrap_or(443);
        (host, port)
            .to_socket_addrs()
            .map_err(|e| format!("cannot resolve {host}: {e}"))?
            .map(|a| a.ip())
            .collect()
    };

    for addr in addrs {
        if is_forbidden_ip(&addr) {
            return Err(format!("{host} resolves to a forbidden address ({addr})"));
        }
    }
    Ok(())
}

fn is_forbidden_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                // Carrier-grade NAT 100.64.0.0/10.
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique-local fc00::/7 and link-local fe80::/10.
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("secret-key", "secret-key"));
        assert!(!constant_time_eq("secret-key", "secret-kex"));
        assert!(!constant_time_eq("short", "longer-key"));
    }

    #[test]
    fn test_callback_rejects_bad_schemes() {
        assert!(validate_callback_url("ftp://example.com/x").is_err());
        assert!(validate_callback_url("file:///etc/passwd").is_err());
        assert!(validate_callback_url("gopher://example.com").is_err());
    }

    #[test]
    fn test_callback_rejects_localhost_and_loopback() {
        assert!(validate_callback_url("http://localhost/hook").is_err());
        assert!(validate_callback_url("http://127.0.0.1/hook").is_err());
        assert!(validate_callback_url("http://[::1]/hook").is_err());
    }

    #[test]
    fn test_callback_rejects_private_ranges() {
        assert!(validate_callback_url("http://10.1.2.3/hook").is_err());
        assert!(validate_callback_url("http://192.168.1.10/hook").is_err());
        assert!(validate_callback_url("http://172.16.0.1/hook").is_err());
        assert!(validate_callback_url("http://169.254.1.1/hook").is_err());
        assert!(validate_callback_url("http://100.64.0.1/hook").is_err());
    }

    #[test]
    fn test_callback_accepts_public_ip() {
        assert!(validate_callback_url("https://93.184.216.34/hook").is_ok());
    }

    #[test]
    fn test_forbidden_ip_classification() {
        assert!(is_forbidden_ip(&"127.0.0.1".parse().unwrap()));
        assert!(is_forbidden_ip(&"fe80::1".parse().unwrap()));
        assert!(is_forbidden_ip(&"fc00::1".parse().unwrap()));
        assert!(!is_forbidden_ip(&"93.184.216.34".parse().unwrap()));
        assert!(!is_forbidden_ip(&"2606:2800:220:1::1".parse().unwrap()));
    }
}
