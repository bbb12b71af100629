use axum::{
    extract::{connect_info::ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Extract client IP from proxy headers, if any.
pub fn ip_from_proxy_headers(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(h) = headers.get("x-forwarded-for").and_then(|hv| hv.to_str().ok()) {
        if let Some(first) = h.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }
    if let Some(h) = headers.get("x-real-ip").and_then(|hv| hv.to_str().ok()) {
        if let Ok(ip) = h.trim().parse::<IpAddr>() {
            return Some(ip);
        }
    }
    None
}

/// The host part (no port) of the client address used to scope throttle keys.
///
/// Forwarding headers are client-controlled, so they are only honoured when
/// the deployment sits behind a trusted proxy.
pub fn client_host(headers: &HeaderMap, remote: Option<SocketAddr>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(ip) = ip_from_proxy_headers(headers) {
            return ip.to_string();
        }
    }
    match remote {
        Some(addr) => addr.ip().to_string(),
        None => IpAddr::from([127, 0, 0, 1]).to_string(),
    }
}

/// Optional extractor for remote socket address. Unlike `ConnectInfo`, this never rejects
/// if the connection info extension is absent (e.g. in tests or custom services).
#[derive(Clone, Copy, Debug, Default)]
pub struct MaybeRemoteAddr(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for MaybeRemoteAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeRemoteAddr(parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn strips_port_from_remote_addr() {
        let headers = HeaderMap::new();
        let v4: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        let v6: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        assert_eq!(client_host(&headers, Some(v4), false), "10.1.2.3");
        assert_eq!(client_host(&headers, Some(v6), false), "2001:db8::1");
    }

    #[test]
    fn proxy_headers_need_explicit_trust() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let remote: SocketAddr = "10.0.0.1:80".parse().unwrap();
        assert_eq!(client_host(&headers, Some(remote), false), "10.0.0.1");
        assert_eq!(client_host(&headers, Some(remote), true), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_loopback() {
        assert_eq!(client_host(&HeaderMap::new(), None, false), "127.0.0.1");
    }
}
