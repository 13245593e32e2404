//! Reverse proxy to the externally served site.

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::Uri;
use axum::response::Response;
use reqwest::Url;

use crate::server::ServerError;

/// Largest request body forwarded upstream.
const MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

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

/// The site requests are forwarded to.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
    origin: Url,
    start_path: String,
}

impl Upstream {
    /// Parse a proxy target such as `mysite.local/php` or
    /// `https://localhost:8080`. `http://` is assumed without a scheme.
    pub fn new(target: &str) -> Result<Self, ServerError> {
        let with_scheme = if target.contains("://") {
            target.to_string()
        } else {
            format!("http://{}", target)
        };

        let url = Url::parse(&with_scheme)
            .map_err(|e| ServerError::InvalidProxy(format!("{}: {}", target, e)))?;
        if url.host_str().is_none() {
            return Err(ServerError::InvalidProxy(format!("{}: missing host", target)));
        }

        let mut origin = url.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ServerError::Proxy(e.to_string()))?;

        Ok(Self {
            client,
            origin,
            start_path: url.path().to_string(),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Path the browser should open first.
    pub fn start_path(&self) -> &str {
        &self.start_path
    }

    /// `host[:port]` of the upstream.
    pub fn authority(&self) -> String {
        let host = self.origin.host_str().unwrap_or_default();
        match self.origin.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Upstream URL for a request URI. The path is taken verbatim, so
    /// `//host/...` stays on the upstream origin.
    pub fn target_url(&self, uri: &Uri) -> Url {
        let mut url = self.origin.clone();
        url.set_path(uri.path());
        url.set_query(uri.query());
        url
    }

    /// Forward a request and return the upstream response, with upstream
    /// URLs rewritten to point at the proxy.
    pub async fn forward(&self, request: Request) -> Result<Response, ServerError> {
        let (parts, body) = request.into_parts();

        let proxy_host = parts
            .headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let url = self.target_url(&parts.uri);

        let body = axum::body::to_bytes(body, MAX_REQUEST_BYTES)
            .await
            .map_err(|e| ServerError::Proxy(e.to_string()))?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        // Bodies must stay uncompressed so they can be rewritten
        headers.remove(header::ACCEPT_ENCODING);

        tracing::debug!("{} {}", parts.method, url);

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ServerError::Proxy(e.to_string()))?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| ServerError::Proxy(e.to_string()))?;

        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);

        let body = match &proxy_host {
            Some(proxy_host) => {
                if let Some(location) = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) {
                    let rewritten = self.rewrite(location, proxy_host);
                    if let Ok(value) = HeaderValue::from_str(&rewritten) {
                        headers.insert(header::LOCATION, value);
                    }
                }
                if is_text(&headers) && !headers.contains_key(header::CONTENT_ENCODING) {
                    Bytes::from(self.rewrite(&String::from_utf8_lossy(&bytes), proxy_host))
                } else {
                    bytes
                }
            }
            None => bytes,
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Replace absolute upstream URLs with proxy URLs.
    pub fn rewrite(&self, text: &str, proxy_host: &str) -> String {
        let authority = self.authority();
        let scheme = self.origin.scheme();

        text.replace(
            &format!("{}://{}", scheme, authority),
            &format!("http://{}", proxy_host),
        )
        .replace(
            &format!("{}:\\/\\/{}", scheme, authority),
            &format!("http:\\/\\/{}", proxy_host),
        )
        .replace(&format!("//{}", authority), &format!("//{}", proxy_host))
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(HeaderName::from_static(name));
    }
}

fn is_text(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/")
                || ct.contains("javascript")
                || ct.contains("json")
                || ct.contains("xml")
        })
        .unwrap_or(false)
}
